use axum::extract::{Path, State};
use axum::Json;
use serde_json::Value;

use crate::codes;
use crate::db::{self, scope_bounds, tables as t};
use crate::error::{AppError, Result};
use crate::models::{FileInfo, FileRecord};
use crate::routes::ok_json;
use crate::AppState;

/// List an event's uploaded files, newest first.
///
/// Works on any existing event regardless of gate state, so a finished
/// (expired or archived) event can still feed its slideshow.
pub async fn list_files(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<Value>> {
    let code = codes::normalize(&code);
    let db = state.db.clone();

    let mut records = tokio::task::spawn_blocking(move || -> Result<Vec<FileRecord>> {
        let read_txn = db.begin_read()?;

        let events = read_txn.open_table(t::EVENTS)?;
        if events.get(code.as_str())?.is_none() {
            return Err(AppError::NotFound("Event"));
        }

        let files = read_txn.open_table(t::FILES)?;
        let (start, end) = scope_bounds(&code);
        let mut out = Vec::new();
        for entry in files.range(start.as_str()..end.as_str())? {
            let (_, value) = entry?;
            out.push(db::decode(value.value())?);
        }
        Ok(out)
    })
    .await??;

    records.sort_by_key(|r| std::cmp::Reverse(r.created_at));
    let files: Vec<FileInfo> = records.into_iter().map(FileInfo::from).collect();
    Ok(ok_json(files))
}
