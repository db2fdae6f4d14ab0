pub mod accounts;
pub mod admin;
pub mod beta;
pub mod events;
pub mod files;
pub mod health;
pub mod tables;
pub mod uploads;

use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::db::{self, tables as t};
use crate::error::{AppError, Result};
use crate::models::{ActivityRecord, SessionRecord, UserRecord};
use crate::security::hash_token;
use crate::AppState;

pub use accounts::{login, me, register};
pub use admin::{
    activate_event, admin_stats, approve_event, archive_event, create_beta_code,
    delete_beta_code, delete_user, list_beta_codes, list_users, pending_events,
    recent_activity, reject_event, update_beta_code, update_user,
};
pub use beta::validate_beta_code;
pub use events::{
    create_event, delete_event, duplicate_event, get_event, list_events, update_event,
};
pub use files::list_files;
pub use health::health_check;
pub use tables::{create_table, delete_table, list_tables, rename_table};
pub use uploads::{relay_upload, request_upload};

/// Deserializer distinguishing an absent PATCH field from an explicit
/// null: missing -> None, null -> Some(None), value -> Some(Some(v)).
/// Lets clients clear optional fields.
pub fn double_option<'de, T, D>(de: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(de).map(Some)
}

/// Success envelope: `{ success: true, data }`
pub fn ok_json<T: Serialize>(data: T) -> Json<Value> {
    Json(json!({ "success": true, "data": data }))
}

/// Success envelope with a 201 status for freshly created resources
pub fn created_json<T: Serialize>(data: T) -> (StatusCode, Json<Value>) {
    (StatusCode::CREATED, ok_json(data))
}

/// Best-effort client address, honoring the usual proxy header
pub fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// (user_agent, ip) pair recorded into activity entries
pub fn request_meta(headers: &HeaderMap) -> (Option<String>, Option<String>) {
    let user_agent = headers
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());
    (user_agent, client_ip(headers))
}

/// Append an activity record inside the caller's write transaction.
/// The caller must not hold the ACTIVITY table open.
pub fn append_activity(
    txn: &redb::WriteTransaction,
    user: Option<String>,
    action: &str,
    event_code: Option<String>,
    user_agent: Option<String>,
    ip: Option<String>,
) -> Result<()> {
    let record = ActivityRecord {
        id: Uuid::new_v4().to_string(),
        user,
        action: action.to_string(),
        event_code,
        timestamp: Utc::now().timestamp(),
        user_agent,
        ip,
    };
    let key = record.key(Utc::now().timestamp_millis());
    let bytes = db::encode(&record)?;

    let mut activity = txn.open_table(t::ACTIVITY)?;
    activity.insert(key.as_str(), bytes.as_slice())?;
    Ok(())
}

/// Resolve the bearer token in the Authorization header to a user.
/// Missing header, unknown token, expired session, or a vanished user
/// all yield 401.
pub async fn require_user(state: &AppState, headers: &HeaderMap) -> Result<UserRecord> {
    let token = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|v| v.to_string())
        .ok_or(AppError::Unauthorized)?;

    let token_hash = hash_token(&token, &state.config.secret_pepper);
    let db = state.db.clone();

    let user = tokio::task::spawn_blocking(move || -> Result<UserRecord> {
        let read_txn = db.begin_read()?;

        let sessions = read_txn.open_table(t::SESSIONS)?;
        let session: SessionRecord = sessions
            .get(token_hash.as_str())?
            .map(|v| db::decode(v.value()))
            .transpose()?
            .ok_or(AppError::Unauthorized)?;

        if Utc::now().timestamp() >= session.expires_at {
            return Err(AppError::Unauthorized);
        }

        let users = read_txn.open_table(t::USERS)?;
        let user: UserRecord = users
            .get(session.email.as_str())?
            .map(|v| db::decode(v.value()))
            .transpose()?
            .ok_or(AppError::Unauthorized)?;

        Ok(user)
    })
    .await??;

    Ok(user)
}

/// Like require_user but additionally demands the admin flag
pub async fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<UserRecord> {
    let user = require_user(state, headers).await?;
    if !user.is_admin {
        return Err(AppError::Forbidden);
    }
    Ok(user)
}
