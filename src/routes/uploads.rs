use axum::extract::{Multipart, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::Utc;
use redb::ReadableTable;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::codes;
use crate::constants::{DEFAULT_MAX_FILE_SIZE, MAX_RELAY_BYTES};
use crate::db::{self, scoped_key, tables as t};
use crate::error::{AppError, Result};
use crate::models::file::validate_file_name;
use crate::models::{EventRecord, FileInfo, FileRecord, TableRecord, UploadWindow};
use crate::routes::{append_activity, created_json, request_meta};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct UploadRequest {
    pub name: String,
    pub size: u64,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    #[serde(rename = "tableId")]
    pub table_id: Option<String>,
    #[serde(rename = "uploadedBy")]
    pub uploaded_by: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadAdmission {
    pub upload_url: String,
    pub file: FileInfo,
}

/// Check a file descriptor against the event's limits
fn admit_descriptor(event: &EventRecord, name: &str, size: u64, mime_type: &str) -> Result<()> {
    if !validate_file_name(name) {
        return Err(AppError::InvalidInput("Invalid file name".to_string()));
    }
    if size == 0 {
        return Err(AppError::InvalidInput("File is empty".to_string()));
    }
    if size > event.max_file_size.unwrap_or(DEFAULT_MAX_FILE_SIZE) {
        return Err(AppError::PayloadTooLarge);
    }
    if !event.accepts_mime(mime_type) {
        return Err(AppError::InvalidInput(format!(
            "File type {} is not accepted for this event",
            mime_type
        )));
    }
    Ok(())
}

/// Folder name carrying the human label and the unique code
fn folder_name(event: &EventRecord) -> String {
    format!("{} ({})", event.name, event.code)
}

/// Gate the event read-only, without consuming anything.
/// Used for the cheap pre-check before talking to the blob store.
fn gated_event(db: &crate::db::Db, code: &str, now: i64) -> Result<EventRecord> {
    let read_txn = db.begin_read()?;
    let events = read_txn.open_table(t::EVENTS)?;
    let existing = events
        .get(code)?
        .map(|v| db::decode(v.value()))
        .transpose()?;
    Ok(codes::gate_event(existing, now)?)
}

/// Record an accepted upload.
///
/// Runs in one write transaction: the gate is re-checked against the
/// current record, the rate-limit window is advanced, `current_files`
/// is incremented, the file record and activity entry are written, and
/// the table tally is bumped. Concurrent admissions serialize here, so
/// the quota cap is authoritative rather than advisory.
#[allow(clippy::too_many_arguments)]
fn commit_upload(
    db: &crate::db::Db,
    code: &str,
    record: FileRecord,
    folder_id: &str,
    client_key: &str,
    per_hour: u32,
    per_day: u32,
    user_agent: Option<String>,
    ip: Option<String>,
) -> Result<FileRecord> {
    let now = Utc::now().timestamp();
    let write_txn = db.begin_write()?;
    {
        let mut events = write_txn.open_table(t::EVENTS)?;
        let existing = events
            .get(code)?
            .map(|v| db::decode(v.value()))
            .transpose()?;
        let mut event = codes::gate_event(existing, now)?;
        admit_descriptor(&event, &record.name, record.size, &record.mime_type)?;

        // Rate limit per client, inside the same transaction
        let mut windows = write_txn.open_table(t::UPLOAD_WINDOWS)?;
        let mut window: UploadWindow = windows
            .get(client_key)?
            .map(|v| db::decode(v.value()))
            .transpose()?
            .unwrap_or_else(|| UploadWindow::new(now));
        window.check_and_increment(now, per_hour, per_day)?;
        let bytes = db::encode(&window)?;
        windows.insert(client_key, bytes.as_slice())?;
        drop(windows);

        event.current_files += 1;
        event.folder_id = Some(folder_id.to_string());
        let bytes = db::encode(&event)?;
        events.insert(code, bytes.as_slice())?;
        drop(events);

        if let Some(table_id) = &record.table_id {
            let mut event_tables = write_txn.open_table(t::EVENT_TABLES)?;
            let key = scoped_key(code, table_id);
            let mut table: TableRecord = event_tables
                .get(key.as_str())?
                .map(|v| db::decode(v.value()))
                .transpose()?
                .ok_or(AppError::NotFound("Table"))?;
            table.photo_count += 1;
            let bytes = db::encode(&table)?;
            event_tables.insert(key.as_str(), bytes.as_slice())?;
        }

        let mut files = write_txn.open_table(t::FILES)?;
        let bytes = db::encode(&record)?;
        let key = scoped_key(code, &record.id);
        files.insert(key.as_str(), bytes.as_slice())?;
        drop(files);

        append_activity(
            &write_txn,
            None,
            "upload.accept",
            Some(code.to_string()),
            user_agent,
            ip,
        )?;
    }
    write_txn.commit()?;

    Ok(record)
}

/// Upload admission, sign-and-redirect pattern
///
/// Validates the code gate and the descriptor, ensures the per-event
/// blob folder, opens a resumable upload session, and records the
/// accepted file. The client then pushes the bytes straight to the
/// returned URL.
pub async fn request_upload(
    State(state): State<AppState>,
    Path(code): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<UploadRequest>,
) -> Result<(StatusCode, Json<Value>)> {
    let code = codes::normalize(&code);
    let now = Utc::now().timestamp();

    // Cheap pre-check before any upstream call
    let db = state.db.clone();
    let check_code = code.clone();
    let event =
        tokio::task::spawn_blocking(move || gated_event(&db, &check_code, now)).await??;
    admit_descriptor(&event, &payload.name, payload.size, &payload.mime_type)?;

    let folder_id = match &event.folder_id {
        Some(id) => id.clone(),
        None => state.blob.ensure_folder(&folder_name(&event)).await?,
    };
    let upload_url = state
        .blob
        .create_upload_session(&folder_id, &payload.name, &payload.mime_type, payload.size)
        .await?;

    let (user_agent, ip) = request_meta(&headers);
    let client_key = ip.clone().unwrap_or_else(|| "local".to_string());
    let record = FileRecord {
        id: Uuid::new_v4().to_string(),
        blob_id: None,
        name: payload.name,
        size: payload.size,
        mime_type: payload.mime_type,
        event_code: code.clone(),
        table_id: payload.table_id,
        uploaded_by: payload.uploaded_by,
        created_at: now,
    };

    let db = state.db.clone();
    let per_hour = state.config.uploads_per_hour;
    let per_day = state.config.uploads_per_day;
    let record = tokio::task::spawn_blocking(move || {
        commit_upload(
            &db, &code, record, &folder_id, &client_key, per_hour, per_day, user_agent, ip,
        )
    })
    .await??;

    tracing::info!(
        "Upload admitted for event {}: {} ({} bytes)",
        record.event_code,
        record.name,
        record.size
    );

    Ok(created_json(UploadAdmission {
        upload_url,
        file: record.into(),
    }))
}

/// Upload admission, server-relay pattern
///
/// Multipart body with a `file` part (and optional `tableId` part).
/// The bytes pass through the server into the blob store; the file
/// record is persisted only after the upstream accepts them.
pub async fn relay_upload(
    State(state): State<AppState>,
    Path(code): Path<String>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<Value>)> {
    let code = codes::normalize(&code);
    let now = Utc::now().timestamp();

    let mut file_name: Option<String> = None;
    let mut mime_type: Option<String> = None;
    let mut bytes: Option<Vec<u8>> = None;
    let mut table_id: Option<String> = None;
    let mut uploaded_by: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::InvalidInput(format!("Malformed multipart body: {}", e)))?
    {
        match field.name().unwrap_or("") {
            "file" => {
                file_name = field.file_name().map(|s| s.to_string());
                mime_type = field.content_type().map(|s| s.to_string());
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::InvalidInput(format!("Unreadable file part: {}", e)))?;
                if data.len() > MAX_RELAY_BYTES {
                    return Err(AppError::PayloadTooLarge);
                }
                bytes = Some(data.to_vec());
            }
            "tableId" => {
                table_id = Some(field.text().await.map_err(|e| {
                    AppError::InvalidInput(format!("Unreadable tableId part: {}", e))
                })?);
            }
            "uploadedBy" => {
                uploaded_by = Some(field.text().await.map_err(|e| {
                    AppError::InvalidInput(format!("Unreadable uploadedBy part: {}", e))
                })?);
            }
            _ => {}
        }
    }

    let bytes = bytes.ok_or_else(|| {
        AppError::InvalidInput("Multipart body must contain a file part".to_string())
    })?;
    let file_name = file_name
        .ok_or_else(|| AppError::InvalidInput("File part must carry a filename".to_string()))?;
    let mime_type = mime_type.unwrap_or_else(|| "application/octet-stream".to_string());
    let size = bytes.len() as u64;

    let db = state.db.clone();
    let check_code = code.clone();
    let event =
        tokio::task::spawn_blocking(move || gated_event(&db, &check_code, now)).await??;
    admit_descriptor(&event, &file_name, size, &mime_type)?;

    let folder_id = match &event.folder_id {
        Some(id) => id.clone(),
        None => state.blob.ensure_folder(&folder_name(&event)).await?,
    };
    let blob_id = state
        .blob
        .upload_bytes(&folder_id, &file_name, &mime_type, bytes)
        .await?;

    let (user_agent, ip) = request_meta(&headers);
    let client_key = ip.clone().unwrap_or_else(|| "local".to_string());
    let record = FileRecord {
        id: Uuid::new_v4().to_string(),
        blob_id: Some(blob_id),
        name: file_name,
        size,
        mime_type,
        event_code: code.clone(),
        table_id,
        uploaded_by,
        created_at: now,
    };

    let db = state.db.clone();
    let per_hour = state.config.uploads_per_hour;
    let per_day = state.config.uploads_per_day;
    let record = tokio::task::spawn_blocking(move || {
        commit_upload(
            &db, &code, record, &folder_id, &client_key, per_hour, per_day, user_agent, ip,
        )
    })
    .await??;

    tracing::info!(
        "Relayed upload stored for event {}: {} ({} bytes)",
        record.event_code,
        record.name,
        record.size
    );

    Ok(created_json(FileInfo::from(record)))
}
