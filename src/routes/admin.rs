use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::Utc;
use redb::{ReadableTable, ReadableTableMetadata};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use uuid::Uuid;

use crate::codes;
use crate::constants::{DEFAULT_ACTIVITY_LIMIT, ERR_INVALID_CODE, MAX_ACTIVITY_LIMIT};
use crate::db::{self, tables as t};
use crate::error::{AppError, Result};
use crate::models::user::normalize_email;
use crate::models::{
    Activity, ActivityRecord, BetaCode, BetaCodeRecord, Event, EventRecord, EventStatus,
    SessionRecord, User, UserRecord,
};
use crate::routes::{
    append_activity, created_json, double_option, ok_json, request_meta, require_admin,
};
use crate::security::constant_time_eq;
use crate::AppState;

use super::events::remove_event_children;

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    /// Shared admin key; alternative to an admin session for monitoring
    pub key: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminStats {
    pub user_count: u64,
    pub event_count: u64,
    pub pending_event_count: u64,
    pub file_count: u64,
    pub beta_code_count: u64,
    pub database_size_bytes: u64,
}

#[derive(Debug, Deserialize)]
pub struct ActivityQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct CreateBetaCodeRequest {
    pub code: Option<String>,
    #[serde(rename = "maxUses")]
    pub max_uses: Option<u32>,
    #[serde(rename = "expiresAt")]
    pub expires_at: Option<i64>,
}

/// Cap and expiry use double-option deserialization: omitted fields are
/// untouched, an explicit null lifts the cap or expiry.
#[derive(Debug, Deserialize)]
pub struct UpdateBetaCodeRequest {
    #[serde(rename = "isActive")]
    pub is_active: Option<bool>,
    #[serde(default, rename = "maxUses", deserialize_with = "double_option")]
    pub max_uses: Option<Option<u32>>,
    #[serde(default, rename = "expiresAt", deserialize_with = "double_option")]
    pub expires_at: Option<Option<i64>>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    #[serde(rename = "isAdmin")]
    pub is_admin: bool,
}

/// Admin statistics for monitoring
///
/// Reachable with an admin session, or with the configured ADMIN_KEY
/// query parameter so external monitoring needs no account.
pub async fn admin_stats(
    State(state): State<AppState>,
    Query(params): Query<StatsQuery>,
    headers: HeaderMap,
) -> Result<Json<Value>> {
    let key_ok = match (&params.key, &state.config.admin_key) {
        (Some(provided), Some(expected)) => constant_time_eq(provided, expected),
        _ => false,
    };
    if !key_ok {
        require_admin(&state, &headers).await?;
    }

    let database_size_bytes = fs::metadata(&state.config.database_path)
        .map(|m| m.len())
        .unwrap_or(0);

    let db = state.db.clone();
    let stats = tokio::task::spawn_blocking(move || -> Result<AdminStats> {
        let read_txn = db.begin_read()?;

        let user_count = read_txn.open_table(t::USERS)?.len()?;
        let file_count = read_txn.open_table(t::FILES)?.len()?;
        let beta_code_count = read_txn.open_table(t::BETA_CODES)?.len()?;

        let events = read_txn.open_table(t::EVENTS)?;
        let event_count = events.len()?;
        let mut pending_event_count = 0;
        for entry in events.iter()? {
            let (_, value) = entry?;
            let record: EventRecord = db::decode(value.value())?;
            if record.status == EventStatus::Pending {
                pending_event_count += 1;
            }
        }

        Ok(AdminStats {
            user_count,
            event_count,
            pending_event_count,
            file_count,
            beta_code_count,
            database_size_bytes,
        })
    })
    .await??;

    Ok(ok_json(stats))
}

/// Events awaiting approval, oldest first
pub async fn pending_events(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>> {
    require_admin(&state, &headers).await?;
    let db = state.db.clone();

    let mut records = tokio::task::spawn_blocking(move || -> Result<Vec<EventRecord>> {
        let read_txn = db.begin_read()?;
        let events = read_txn.open_table(t::EVENTS)?;
        let mut out = Vec::new();
        for entry in events.iter()? {
            let (_, value) = entry?;
            let record: EventRecord = db::decode(value.value())?;
            if record.status == EventStatus::Pending {
                out.push(record);
            }
        }
        Ok(out)
    })
    .await??;

    records.sort_by_key(|r| r.created_at);
    let events: Vec<Event> = records.into_iter().map(Event::from).collect();
    Ok(ok_json(events))
}

/// Shift an event between lifecycle states, enforcing the allowed
/// transition. Only the status field changes.
async fn transition_event(
    state: AppState,
    headers: HeaderMap,
    code: String,
    from: EventStatus,
    to: EventStatus,
    action: &'static str,
) -> Result<Json<Value>> {
    let admin = require_admin(&state, &headers).await?;
    let code = codes::normalize(&code);
    let (user_agent, ip) = request_meta(&headers);
    let email = admin.email;
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

            if existing.status != from {
                return Err(AppError::Conflict(format!(
                    "Event is {:?}, expected {:?}",
                    existing.status, from
                )));
            }

            existing.status = to;
            let bytes = db::encode(&existing)?;
            events.insert(code.as_str(), bytes.as_slice())?;
            record = existing;
            drop(events);

            append_activity(
                &write_txn,
                Some(email),
                action,
                Some(code.clone()),
                user_agent,
                ip,
            )?;
        }
        write_txn.commit()?;

        tracing::info!("Event {}: {}", code, action);
        Ok(record)
    })
    .await??;

    Ok(ok_json(Event::from(record)))
}

/// pending -> active
pub async fn approve_event(
    State(state): State<AppState>,
    Path(code): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Value>> {
    transition_event(
        state,
        headers,
        code,
        EventStatus::Pending,
        EventStatus::Active,
        "event.approve",
    )
    .await
}

/// active -> inactive
pub async fn archive_event(
    State(state): State<AppState>,
    Path(code): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Value>> {
    transition_event(
        state,
        headers,
        code,
        EventStatus::Active,
        EventStatus::Inactive,
        "event.archive",
    )
    .await
}

/// inactive -> active
pub async fn activate_event(
    State(state): State<AppState>,
    Path(code): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Value>> {
    transition_event(
        state,
        headers,
        code,
        EventStatus::Inactive,
        EventStatus::Active,
        "event.activate",
    )
    .await
}

/// Reject a pending event: the event and its sub-records are removed
pub async fn reject_event(
    State(state): State<AppState>,
    Path(code): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Value>> {
    let admin = require_admin(&state, &headers).await?;
    let code = codes::normalize(&code);
    let (user_agent, ip) = request_meta(&headers);
    let email = admin.email;
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

            if existing.status != EventStatus::Pending {
                return Err(AppError::Conflict(
                    "Only pending events can be rejected".to_string(),
                ));
            }

            events.remove(code.as_str())?;
            drop(events);

            remove_event_children(&write_txn, &code)?;

            append_activity(
                &write_txn,
                Some(email),
                "event.reject",
                Some(code.clone()),
                user_agent,
                ip,
            )?;
        }
        write_txn.commit()?;

        tracing::info!("Event {} rejected and removed", code);
        Ok(())
    })
    .await??;

    Ok(ok_json(serde_json::json!({ "rejected": true })))
}

/// Recent activity, newest first
pub async fn recent_activity(
    State(state): State<AppState>,
    Query(params): Query<ActivityQuery>,
    headers: HeaderMap,
) -> Result<Json<Value>> {
    require_admin(&state, &headers).await?;
    let limit = params
        .limit
        .unwrap_or(DEFAULT_ACTIVITY_LIMIT)
        .min(MAX_ACTIVITY_LIMIT);
    let db = state.db.clone();

    let records = tokio::task::spawn_blocking(move || -> Result<Vec<ActivityRecord>> {
        let read_txn = db.begin_read()?;
        let activity = read_txn.open_table(t::ACTIVITY)?;
        let mut out = Vec::new();
        for entry in activity.iter()?.rev().take(limit) {
            let (_, value) = entry?;
            out.push(db::decode(value.value())?);
        }
        Ok(out)
    })
    .await??;

    let entries: Vec<Activity> = records.into_iter().map(Activity::from).collect();
    Ok(ok_json(entries))
}

/// Create a beta code, generating one when none is supplied
pub async fn create_beta_code(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateBetaCodeRequest>,
) -> Result<(StatusCode, Json<Value>)> {
    require_admin(&state, &headers).await?;

    let supplied = match payload.code.as_deref() {
        Some(raw) => {
            let code = codes::normalize(raw);
            if !codes::is_valid_format(&code) {
                return Err(AppError::InvalidInput(ERR_INVALID_CODE.to_string()));
            }
            Some(code)
        }
        None => None,
    };

    let db = state.db.clone();
    let record = tokio::task::spawn_blocking(move || -> Result<BetaCodeRecord> {
        let write_txn = db.begin_write()?;
        let record;
        {
            let mut beta_codes = write_txn.open_table(t::BETA_CODES)?;

            let code = match supplied {
                Some(code) => {
                    if beta_codes.get(code.as_str())?.is_some() {
                        return Err(AppError::Conflict(
                            "A beta code with this value already exists".to_string(),
                        ));
                    }
                    code
                }
                None => loop {
                    let candidate = codes::generate();
                    if beta_codes.get(candidate.as_str())?.is_none() {
                        break candidate;
                    }
                },
            };

            record = BetaCodeRecord {
                id: Uuid::new_v4().to_string(),
                code: code.clone(),
                is_active: true,
                max_uses: payload.max_uses,
                current_uses: 0,
                expires_at: payload.expires_at,
                created_at: Utc::now().timestamp(),
            };
            let bytes = db::encode(&record)?;
            beta_codes.insert(code.as_str(), bytes.as_slice())?;
        }
        write_txn.commit()?;
        Ok(record)
    })
    .await??;

    Ok(created_json(BetaCode::from(record)))
}

/// List every beta code
pub async fn list_beta_codes(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>> {
    require_admin(&state, &headers).await?;
    let db = state.db.clone();

    let mut records = tokio::task::spawn_blocking(move || -> Result<Vec<BetaCodeRecord>> {
        let read_txn = db.begin_read()?;
        let beta_codes = read_txn.open_table(t::BETA_CODES)?;
        let mut out = Vec::new();
        for entry in beta_codes.iter()? {
            let (_, value) = entry?;
            out.push(db::decode(value.value())?);
        }
        Ok(out)
    })
    .await??;

    records.sort_by_key(|r| std::cmp::Reverse(r.created_at));
    let entries: Vec<BetaCode> = records.into_iter().map(BetaCode::from).collect();
    Ok(ok_json(entries))
}

/// Adjust a beta code's activity flag, cap, or expiry.
/// `current_uses` is never edited.
pub async fn update_beta_code(
    State(state): State<AppState>,
    Path(code): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<UpdateBetaCodeRequest>,
) -> Result<Json<Value>> {
    require_admin(&state, &headers).await?;
    let code = codes::normalize(&code);
    let db = state.db.clone();

    let record = tokio::task::spawn_blocking(move || -> Result<BetaCodeRecord> {
        let write_txn = db.begin_write()?;
        let record;
        {
            let mut beta_codes = write_txn.open_table(t::BETA_CODES)?;
            let mut existing: BetaCodeRecord = beta_codes
                .get(code.as_str())?
                .map(|v| db::decode(v.value()))
                .transpose()?
                .ok_or(AppError::NotFound("Beta code"))?;

            if let Some(is_active) = payload.is_active {
                existing.is_active = is_active;
            }
            if let Some(max_uses) = payload.max_uses {
                existing.max_uses = max_uses;
            }
            if let Some(expires_at) = payload.expires_at {
                existing.expires_at = expires_at;
            }

            let bytes = db::encode(&existing)?;
            beta_codes.insert(code.as_str(), bytes.as_slice())?;
            record = existing;
        }
        write_txn.commit()?;
        Ok(record)
    })
    .await??;

    Ok(ok_json(BetaCode::from(record)))
}

/// Delete a beta code
pub async fn delete_beta_code(
    State(state): State<AppState>,
    Path(code): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Value>> {
    require_admin(&state, &headers).await?;
    let code = codes::normalize(&code);
    let db = state.db.clone();

    tokio::task::spawn_blocking(move || -> Result<()> {
        let write_txn = db.begin_write()?;
        {
            let mut beta_codes = write_txn.open_table(t::BETA_CODES)?;
            if beta_codes.remove(code.as_str())?.is_none() {
                return Err(AppError::NotFound("Beta code"));
            }
        }
        write_txn.commit()?;
        Ok(())
    })
    .await??;

    Ok(ok_json(serde_json::json!({ "deleted": true })))
}

/// List every registered user
pub async fn list_users(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<Value>> {
    require_admin(&state, &headers).await?;
    let db = state.db.clone();

    let mut records = tokio::task::spawn_blocking(move || -> Result<Vec<UserRecord>> {
        let read_txn = db.begin_read()?;
        let users = read_txn.open_table(t::USERS)?;
        let mut out = Vec::new();
        for entry in users.iter()? {
            let (_, value) = entry?;
            out.push(db::decode(value.value())?);
        }
        Ok(out)
    })
    .await??;

    records.sort_by_key(|r| std::cmp::Reverse(r.created_at));
    let entries: Vec<User> = records.into_iter().map(User::from).collect();
    Ok(ok_json(entries))
}

/// Toggle a user's admin flag. Admins cannot strip their own flag,
/// which would otherwise allow locking every admin out.
pub async fn update_user(
    State(state): State<AppState>,
    Path(email): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<Json<Value>> {
    let admin = require_admin(&state, &headers).await?;
    let email = normalize_email(&email);

    if email == admin.email && !payload.is_admin {
        return Err(AppError::InvalidInput(
            "Cannot remove your own admin access".to_string(),
        ));
    }

    let db = state.db.clone();
    let record = tokio::task::spawn_blocking(move || -> Result<UserRecord> {
        let write_txn = db.begin_write()?;
        let record;
        {
            let mut users = write_txn.open_table(t::USERS)?;
            let mut existing: UserRecord = users
                .get(email.as_str())?
                .map(|v| db::decode(v.value()))
                .transpose()?
                .ok_or(AppError::NotFound("User"))?;

            existing.is_admin = payload.is_admin;
            let bytes = db::encode(&existing)?;
            users.insert(email.as_str(), bytes.as_slice())?;
            record = existing;
        }
        write_txn.commit()?;
        Ok(record)
    })
    .await??;

    Ok(ok_json(User::from(record)))
}

/// Delete a user account and their sessions. Their events remain and
/// can be reassigned or removed separately.
pub async fn delete_user(
    State(state): State<AppState>,
    Path(email): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Value>> {
    let admin = require_admin(&state, &headers).await?;
    let email = normalize_email(&email);

    if email == admin.email {
        return Err(AppError::InvalidInput(
            "Cannot delete your own account".to_string(),
        ));
    }

    let db = state.db.clone();
    tokio::task::spawn_blocking(move || -> Result<()> {
        let write_txn = db.begin_write()?;
        {
            let mut users = write_txn.open_table(t::USERS)?;
            if users.remove(email.as_str())?.is_none() {
                return Err(AppError::NotFound("User"));
            }
            drop(users);

            // Revoke every session belonging to the removed account
            let mut sessions = write_txn.open_table(t::SESSIONS)?;
            let mut stale = Vec::new();
            for entry in sessions.iter()? {
                let (key, value) = entry?;
                let session: SessionRecord = db::decode(value.value())?;
                if session.email == email {
                    stale.push(key.value().to_string());
                }
            }
            for key in stale {
                sessions.remove(key.as_str())?;
            }
        }
        write_txn.commit()?;

        tracing::info!("User {} deleted", email);
        Ok(())
    })
    .await??;

    Ok(ok_json(serde_json::json!({ "deleted": true })))
}
