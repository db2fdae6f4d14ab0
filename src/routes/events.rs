use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::Utc;
use redb::ReadableTable;
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::codes;
use crate::constants::{ERR_CODE_TAKEN, ERR_INVALID_CODE};
use crate::db::{self, scope_bounds, scoped_key, tables as t};
use crate::error::{AppError, Result};
use crate::models::table::join_url;
use crate::models::{Event, EventRecord, EventStatus, PublicEvent, TableRecord, UserRecord};
use crate::routes::{
    append_activity, created_json, double_option, ok_json, request_meta, require_user,
};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateEventRequest {
    pub code: Option<String>,
    pub name: String,
    pub description: Option<String>,
    #[serde(rename = "maxFiles")]
    pub max_files: Option<u32>,
    #[serde(rename = "maxFileSize")]
    pub max_file_size: Option<u64>,
    #[serde(rename = "allowedTypes")]
    pub allowed_types: Option<Vec<String>>,
    #[serde(rename = "expiresAt")]
    pub expires_at: Option<i64>,
}

/// Optional fields use double-option deserialization: an omitted field
/// is untouched, an explicit null clears it.
#[derive(Debug, Deserialize)]
pub struct UpdateEventRequest {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    #[serde(default, rename = "maxFiles", deserialize_with = "double_option")]
    pub max_files: Option<Option<u32>>,
    #[serde(default, rename = "maxFileSize", deserialize_with = "double_option")]
    pub max_file_size: Option<Option<u64>>,
    #[serde(default, rename = "allowedTypes", deserialize_with = "double_option")]
    pub allowed_types: Option<Option<Vec<String>>>,
    #[serde(default, rename = "expiresAt", deserialize_with = "double_option")]
    pub expires_at: Option<Option<i64>>,
}

/// Whether the user may manage this event
fn can_manage(user: &UserRecord, event: &EventRecord) -> bool {
    user.is_admin || event.created_by == user.id
}

/// Create a new event
///
/// A client-supplied code is normalized to uppercase first, so
/// `"abc123"` collides with an existing `"ABC123"` (409). Without a
/// supplied code a fresh one is generated; generation retries until it
/// misses, inside the same transaction that inserts.
///
/// New events start pending unless the deployment auto-approves or the
/// creator is an admin.
pub async fn create_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateEventRequest>,
) -> Result<(StatusCode, Json<Value>)> {
    let user = require_user(&state, &headers).await?;

    let name = payload.name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::InvalidInput("Name must not be empty".to_string()));
    }

    let supplied_code = match payload.code.as_deref() {
        Some(raw) => {
            let code = codes::normalize(raw);
            if !codes::is_valid_format(&code) {
                return Err(AppError::InvalidInput(ERR_INVALID_CODE.to_string()));
            }
            Some(code)
        }
        None => None,
    };

    let status = if state.config.auto_approve_events || user.is_admin {
        EventStatus::Active
    } else {
        EventStatus::Pending
    };

    let (user_agent, ip) = request_meta(&headers);
    let db = state.db.clone();
    let creator_id = user.id.clone();
    let creator_email = user.email.clone();

    let record = tokio::task::spawn_blocking(move || -> Result<EventRecord> {
        let now = Utc::now().timestamp();
        let write_txn = db.begin_write()?;
        let record;
        {
            let mut events = write_txn.open_table(t::EVENTS)?;

            let code = match supplied_code {
                Some(code) => {
                    if events.get(code.as_str())?.is_some() {
                        return Err(AppError::Conflict(ERR_CODE_TAKEN.to_string()));
                    }
                    code
                }
                None => loop {
                    let candidate = codes::generate();
                    if events.get(candidate.as_str())?.is_none() {
                        break candidate;
                    }
                },
            };

            record = EventRecord {
                id: Uuid::new_v4().to_string(),
                code: code.clone(),
                name,
                description: payload.description,
                status,
                max_files: payload.max_files,
                current_files: 0,
                max_file_size: payload.max_file_size,
                allowed_types: payload.allowed_types,
                created_by: creator_id,
                created_at: now,
                expires_at: payload.expires_at,
                folder_id: None,
            };
            let bytes = db::encode(&record)?;
            events.insert(code.as_str(), bytes.as_slice())?;
            drop(events);

            append_activity(
                &write_txn,
                Some(creator_email),
                "event.create",
                Some(code),
                user_agent,
                ip,
            )?;
        }
        write_txn.commit()?;

        tracing::info!("Event {} created ({:?})", record.code, record.status);
        Ok(record)
    })
    .await??;

    Ok(created_json(Event::from(record)))
}

/// List the caller's events, or every event for admins
pub async fn list_events(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>> {
    let user = require_user(&state, &headers).await?;
    let db = state.db.clone();

    let mut records = tokio::task::spawn_blocking(move || -> Result<Vec<EventRecord>> {
        let read_txn = db.begin_read()?;
        let events = read_txn.open_table(t::EVENTS)?;

        let mut out = Vec::new();
        for entry in events.iter()? {
            let (_, value) = entry?;
            let record: EventRecord = db::decode(value.value())?;
            if user.is_admin || record.created_by == user.id {
                out.push(record);
            }
        }
        Ok(out)
    })
    .await??;

    records.sort_by_key(|r| std::cmp::Reverse(r.created_at));
    let events: Vec<Event> = records.into_iter().map(Event::from).collect();
    Ok(ok_json(events))
}

/// Public event lookup through the code gate
///
/// Guests hitting a pending, archived, expired, or full event get the
/// gate's rejection rather than the record.
pub async fn get_event(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<Value>> {
    let code = codes::normalize(&code);
    let db = state.db.clone();

    let record = tokio::task::spawn_blocking(move || -> Result<EventRecord> {
        let now = Utc::now().timestamp();
        let read_txn = db.begin_read()?;
        let events = read_txn.open_table(t::EVENTS)?;
        let existing = events
            .get(code.as_str())?
            .map(|v| db::decode(v.value()))
            .transpose()?;
        Ok(codes::gate_event(existing, now)?)
    })
    .await??;

    Ok(ok_json(PublicEvent::from(record)))
}

/// Partial update of an event's editable fields.
/// Code, counters, and lifecycle state are not editable here.
pub async fn update_event(
    State(state): State<AppState>,
    Path(code): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<UpdateEventRequest>,
) -> Result<Json<Value>> {
    let user = require_user(&state, &headers).await?;
    let code = codes::normalize(&code);
    let db = state.db.clone();

    let record = tokio::task::spawn_blocking(move || -> Result<EventRecord> {
        let write_txn = db.begin_write()?;
        let record;
        {
            let mut events = write_txn.open_table(t::EVENTS)?;
            let mut existing: EventRecord = events
                .get(code.as_str())?
                .map(|v| db::decode(v.value()))
                .transpose()?
                .ok_or(AppError::NotFound("Event"))?;

            if !can_manage(&user, &existing) {
                return Err(AppError::Forbidden);
            }

            if let Some(name) = payload.name {
                let name = name.trim().to_string();
                if name.is_empty() {
                    return Err(AppError::InvalidInput("Name must not be empty".to_string()));
                }
                existing.name = name;
            }
            if let Some(description) = payload.description {
                existing.description = description;
            }
            if let Some(max_files) = payload.max_files {
                existing.max_files = max_files;
            }
            if let Some(max_file_size) = payload.max_file_size {
                existing.max_file_size = max_file_size;
            }
            if let Some(allowed_types) = payload.allowed_types {
                existing.allowed_types = allowed_types;
            }
            if let Some(expires_at) = payload.expires_at {
                existing.expires_at = expires_at;
            }

            let bytes = db::encode(&existing)?;
            events.insert(code.as_str(), bytes.as_slice())?;
            record = existing;
        }
        write_txn.commit()?;
        Ok(record)
    })
    .await??;

    Ok(ok_json(Event::from(record)))
}

/// Delete an event together with its table and file records
pub async fn delete_event(
    State(state): State<AppState>,
    Path(code): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Value>> {
    let user = require_user(&state, &headers).await?;
    let code = codes::normalize(&code);
    let (user_agent, ip) = request_meta(&headers);
    let email = user.email.clone();
    let db = state.db.clone();

    tokio::task::spawn_blocking(move || -> Result<()> {
        let write_txn = db.begin_write()?;
        {
            let mut events = write_txn.open_table(t::EVENTS)?;
            let existing: EventRecord = events
                .get(code.as_str())?
                .map(|v| db::decode(v.value()))
                .transpose()?
                .ok_or(AppError::NotFound("Event"))?;

            if !can_manage(&user, &existing) {
                return Err(AppError::Forbidden);
            }

            events.remove(code.as_str())?;
            drop(events);

            remove_event_children(&write_txn, &code)?;

            append_activity(
                &write_txn,
                Some(email),
                "event.delete",
                Some(code.clone()),
                user_agent,
                ip,
            )?;
        }
        write_txn.commit()?;

        tracing::info!("Event {} deleted", code);
        Ok(())
    })
    .await??;

    Ok(ok_json(serde_json::json!({ "deleted": true })))
}

/// Remove every table and file record scoped to the event code.
/// Caller must not hold EVENT_TABLES or FILES open.
pub(crate) fn remove_event_children(txn: &redb::WriteTransaction, code: &str) -> Result<()> {
    let (start, end) = scope_bounds(code);

    let mut event_tables = txn.open_table(t::EVENT_TABLES)?;
    let keys: Vec<String> = event_tables
        .range(start.as_str()..end.as_str())?
        .map(|entry| entry.map(|(k, _)| k.value().to_string()))
        .collect::<std::result::Result<_, _>>()?;
    for key in keys {
        event_tables.remove(key.as_str())?;
    }
    drop(event_tables);

    let mut files = txn.open_table(t::FILES)?;
    let keys: Vec<String> = files
        .range(start.as_str()..end.as_str())?
        .map(|entry| entry.map(|(k, _)| k.value().to_string()))
        .collect::<std::result::Result<_, _>>()?;
    for key in keys {
        files.remove(key.as_str())?;
    }

    Ok(())
}

/// Clone an event under a fresh generated code with zeroed counters.
/// Tables are copied with reset photo tallies and new QR links; the
/// clone starts pending like any other new event.
pub async fn duplicate_event(
    State(state): State<AppState>,
    Path(code): Path<String>,
    headers: HeaderMap,
) -> Result<(StatusCode, Json<Value>)> {
    let user = require_user(&state, &headers).await?;
    let code = codes::normalize(&code);
    let (user_agent, ip) = request_meta(&headers);
    let base_url = state.config.public_base_url.clone();
    let auto_approve = state.config.auto_approve_events;
    let db = state.db.clone();

    let record = tokio::task::spawn_blocking(move || -> Result<EventRecord> {
        let now = Utc::now().timestamp();
        let write_txn = db.begin_write()?;
        let clone;
        {
            let mut events = write_txn.open_table(t::EVENTS)?;
            let source: EventRecord = events
                .get(code.as_str())?
                .map(|v| db::decode(v.value()))
                .transpose()?
                .ok_or(AppError::NotFound("Event"))?;

            if !can_manage(&user, &source) {
                return Err(AppError::Forbidden);
            }

            let new_code = loop {
                let candidate = codes::generate();
                if events.get(candidate.as_str())?.is_none() {
                    break candidate;
                }
            };

            clone = EventRecord {
                id: Uuid::new_v4().to_string(),
                code: new_code.clone(),
                name: source.name.clone(),
                description: source.description.clone(),
                status: if auto_approve || user.is_admin {
                    EventStatus::Active
                } else {
                    EventStatus::Pending
                },
                max_files: source.max_files,
                current_files: 0,
                max_file_size: source.max_file_size,
                allowed_types: source.allowed_types.clone(),
                created_by: user.id.clone(),
                created_at: now,
                expires_at: source.expires_at,
                folder_id: None,
            };
            let bytes = db::encode(&clone)?;
            events.insert(new_code.as_str(), bytes.as_slice())?;
            drop(events);

            // Copy the table layout with fresh ids and zeroed tallies
            let (start, end) = scope_bounds(&code);
            let mut event_tables = write_txn.open_table(t::EVENT_TABLES)?;
            let mut sources: Vec<TableRecord> = Vec::new();
            for entry in event_tables.range(start.as_str()..end.as_str())? {
                let (_, value) = entry?;
                sources.push(db::decode(value.value())?);
            }

            for table in sources {
                let table_id = Uuid::new_v4().to_string();
                let copy = TableRecord {
                    id: table_id.clone(),
                    name: table.name,
                    qr_code: join_url(&base_url, &new_code, &table_id),
                    photo_count: 0,
                    created_at: now,
                };
                let bytes = db::encode(&copy)?;
                let key = scoped_key(&new_code, &table_id);
                event_tables.insert(key.as_str(), bytes.as_slice())?;
            }
            drop(event_tables);

            append_activity(
                &write_txn,
                Some(user.email.clone()),
                "event.duplicate",
                Some(new_code),
                user_agent,
                ip,
            )?;
        }
        write_txn.commit()?;

        tracing::info!("Event {} duplicated as {}", code, clone.code);
        Ok(clone)
    })
    .await??;

    Ok(created_json(Event::from(record)))
}
