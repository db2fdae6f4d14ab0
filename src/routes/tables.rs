use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::Utc;
use redb::ReadableTable;
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::codes;
use crate::db::{self, scope_bounds, scoped_key, tables as t};
use crate::error::{AppError, Result};
use crate::models::table::join_url;
use crate::models::{EventRecord, TableInfo, TableRecord, UserRecord};
use crate::routes::{created_json, ok_json, require_user};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateTableRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct RenameTableRequest {
    pub name: String,
}

fn can_manage(user: &UserRecord, event: &EventRecord) -> bool {
    user.is_admin || event.created_by == user.id
}

fn fetch_event(
    events: &impl ReadableTable<&'static str, &'static [u8]>,
    code: &str,
) -> Result<EventRecord> {
    events
        .get(code)?
        .map(|v| db::decode(v.value()))
        .transpose()?
        .ok_or(AppError::NotFound("Event"))
}

/// List an event's tables for the guest-facing picker page
pub async fn list_tables(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<Value>> {
    let code = codes::normalize(&code);
    let db = state.db.clone();

    let mut records = tokio::task::spawn_blocking(move || -> Result<Vec<TableRecord>> {
        let read_txn = db.begin_read()?;

        let events = read_txn.open_table(t::EVENTS)?;
        fetch_event(&events, &code)?;

        let event_tables = read_txn.open_table(t::EVENT_TABLES)?;
        let (start, end) = scope_bounds(&code);
        let mut out = Vec::new();
        for entry in event_tables.range(start.as_str()..end.as_str())? {
            let (_, value) = entry?;
            out.push(db::decode(value.value())?);
        }
        Ok(out)
    })
    .await??;

    records.sort_by_key(|r| r.created_at);
    let tables: Vec<TableInfo> = records.into_iter().map(TableInfo::from).collect();
    Ok(ok_json(tables))
}

/// Add a table to an event.
///
/// Each table gets its own key, so two admins adding tables at the
/// same time both land instead of overwriting a shared array.
pub async fn create_table(
    State(state): State<AppState>,
    Path(code): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<CreateTableRequest>,
) -> Result<(StatusCode, Json<Value>)> {
    let user = require_user(&state, &headers).await?;
    let code = codes::normalize(&code);
    let name = payload.name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::InvalidInput("Name must not be empty".to_string()));
    }

    let base_url = state.config.public_base_url.clone();
    let db = state.db.clone();

    let record = tokio::task::spawn_blocking(move || -> Result<TableRecord> {
        let write_txn = db.begin_write()?;
        let record;
        {
            let events = write_txn.open_table(t::EVENTS)?;
            let event = fetch_event(&events, &code)?;
            if !can_manage(&user, &event) {
                return Err(AppError::Forbidden);
            }
            drop(events);

            let table_id = Uuid::new_v4().to_string();
            record = TableRecord {
                id: table_id.clone(),
                name,
                qr_code: join_url(&base_url, &code, &table_id),
                photo_count: 0,
                created_at: Utc::now().timestamp(),
            };

            let mut event_tables = write_txn.open_table(t::EVENT_TABLES)?;
            let bytes = db::encode(&record)?;
            let key = scoped_key(&code, &table_id);
            event_tables.insert(key.as_str(), bytes.as_slice())?;
        }
        write_txn.commit()?;
        Ok(record)
    })
    .await??;

    Ok(created_json(TableInfo::from(record)))
}

/// Rename a table. Touches only that table's key.
pub async fn rename_table(
    State(state): State<AppState>,
    Path((code, table_id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(payload): Json<RenameTableRequest>,
) -> Result<Json<Value>> {
    let user = require_user(&state, &headers).await?;
    let code = codes::normalize(&code);
    let name = payload.name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::InvalidInput("Name must not be empty".to_string()));
    }

    let db = state.db.clone();

    let record = tokio::task::spawn_blocking(move || -> Result<TableRecord> {
        let write_txn = db.begin_write()?;
        let record;
        {
            let events = write_txn.open_table(t::EVENTS)?;
            let event = fetch_event(&events, &code)?;
            if !can_manage(&user, &event) {
                return Err(AppError::Forbidden);
            }
            drop(events);

            let mut event_tables = write_txn.open_table(t::EVENT_TABLES)?;
            let key = scoped_key(&code, &table_id);
            let mut existing: TableRecord = event_tables
                .get(key.as_str())?
                .map(|v| db::decode(v.value()))
                .transpose()?
                .ok_or(AppError::NotFound("Table"))?;

            existing.name = name;
            let bytes = db::encode(&existing)?;
            event_tables.insert(key.as_str(), bytes.as_slice())?;
            record = existing;
        }
        write_txn.commit()?;
        Ok(record)
    })
    .await??;

    Ok(ok_json(TableInfo::from(record)))
}

/// Delete a table. File records that referenced it keep their table id.
pub async fn delete_table(
    State(state): State<AppState>,
    Path((code, table_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Json<Value>> {
    let user = require_user(&state, &headers).await?;
    let code = codes::normalize(&code);
    let db = state.db.clone();

    tokio::task::spawn_blocking(move || -> Result<()> {
        let write_txn = db.begin_write()?;
        {
            let events = write_txn.open_table(t::EVENTS)?;
            let event = fetch_event(&events, &code)?;
            if !can_manage(&user, &event) {
                return Err(AppError::Forbidden);
            }
            drop(events);

            let mut event_tables = write_txn.open_table(t::EVENT_TABLES)?;
            let key = scoped_key(&code, &table_id);
            if event_tables.remove(key.as_str())?.is_none() {
                return Err(AppError::NotFound("Table"));
            }
        }
        write_txn.commit()?;
        Ok(())
    })
    .await??;

    Ok(ok_json(serde_json::json!({ "deleted": true })))
}
