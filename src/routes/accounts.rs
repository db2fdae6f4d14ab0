use axum::http::{HeaderMap, StatusCode};
use axum::{extract::State, Json};
use chrono::Utc;
use redb::ReadableTable;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::codes;
use crate::constants::ERR_PASSWORD_TOO_SHORT;
use crate::db::{self, tables as t};
use crate::error::{AppError, Result};
use crate::models::user::{normalize_email, validate_email, validate_password};
use crate::models::{SessionRecord, User, UserRecord};
use crate::routes::{append_activity, created_json, ok_json, request_meta, require_user};
use crate::security::{generate_token, hash_password, hash_token, verify_password};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub name: String,
    pub password: String,
    #[serde(rename = "betaCode")]
    pub beta_code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatedUser {
    pub user: User,
    pub token: String,
}

/// Register a new account
///
/// When the deployment gates registration behind beta codes, the
/// submitted code is validated and one use is consumed inside the same
/// write transaction that creates the account, so a one-use code cannot
/// admit two concurrent registrations.
///
/// Returns 409 Conflict if the email is already registered.
pub async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<Value>)> {
    validate_email(&payload.email).map_err(|e| AppError::InvalidInput(e.to_string()))?;
    if !validate_password(&payload.password) {
        return Err(AppError::InvalidInput(ERR_PASSWORD_TOO_SHORT.to_string()));
    }
    let name = payload.name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::InvalidInput("Name must not be empty".to_string()));
    }

    let beta_code = payload.beta_code.as_deref().map(codes::normalize);
    if state.config.require_beta_code && beta_code.is_none() {
        return Err(AppError::InvalidInput(
            "A beta code is required to register".to_string(),
        ));
    }

    let email = normalize_email(&payload.email);
    let password_hash = hash_password(&payload.password, &state.config.secret_pepper);
    let token = generate_token();
    let token_hash = hash_token(&token, &state.config.secret_pepper);
    let (user_agent, ip) = request_meta(&headers);
    let require_beta = state.config.require_beta_code;
    let session_ttl = state.config.session_ttl_secs;
    let db = state.db.clone();

    let user = tokio::task::spawn_blocking(move || -> Result<UserRecord> {
        let now = Utc::now().timestamp();
        let write_txn = db.begin_write()?;
        let record;
        {
            let mut users = write_txn.open_table(t::USERS)?;
            if users.get(email.as_str())?.is_some() {
                return Err(AppError::Conflict(
                    "An account with this email already exists".to_string(),
                ));
            }

            // Consume one beta use in the same transaction as the insert
            if require_beta {
                let code = beta_code.as_deref().unwrap_or_default();
                let mut beta_codes = write_txn.open_table(t::BETA_CODES)?;
                let existing = beta_codes
                    .get(code)?
                    .map(|v| db::decode(v.value()))
                    .transpose()?;
                let mut beta = codes::gate_beta(existing, now).map_err(|r| match r {
                    codes::GateRejection::NotFound => {
                        AppError::InvalidInput("Unknown beta code".to_string())
                    }
                    other => other.into(),
                })?;
                beta.current_uses += 1;
                let bytes = db::encode(&beta)?;
                beta_codes.insert(code, bytes.as_slice())?;
            }

            record = UserRecord {
                id: Uuid::new_v4().to_string(),
                email: email.clone(),
                name,
                is_admin: false,
                password_hash,
                created_at: now,
                last_login_at: Some(now),
            };
            let bytes = db::encode(&record)?;
            users.insert(email.as_str(), bytes.as_slice())?;
            drop(users);

            // Registration doubles as the first login
            let mut sessions = write_txn.open_table(t::SESSIONS)?;
            let session = SessionRecord {
                email: email.clone(),
                created_at: now,
                expires_at: now + session_ttl,
            };
            let bytes = db::encode(&session)?;
            sessions.insert(token_hash.as_str(), bytes.as_slice())?;
            drop(sessions);

            append_activity(
                &write_txn,
                Some(email.clone()),
                "account.register",
                None,
                user_agent,
                ip,
            )?;
        }
        write_txn.commit()?;

        tracing::info!("New account registered: {}", record.id);
        Ok(record)
    })
    .await??;

    Ok(created_json(AuthenticatedUser {
        user: user.into(),
        token,
    }))
}

/// Log in with email and password, returning a bearer session token
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<Value>> {
    let email = normalize_email(&payload.email);
    let password = payload.password;
    let pepper = state.config.secret_pepper.clone();
    let token = generate_token();
    let token_hash = hash_token(&token, &pepper);
    let (user_agent, ip) = request_meta(&headers);
    let session_ttl = state.config.session_ttl_secs;
    let db = state.db.clone();

    let user = tokio::task::spawn_blocking(move || -> Result<UserRecord> {
        let now = Utc::now().timestamp();
        let write_txn = db.begin_write()?;
        let record;
        {
            let mut users = write_txn.open_table(t::USERS)?;
            let mut found: UserRecord = users
                .get(email.as_str())?
                .map(|v| db::decode(v.value()))
                .transpose()?
                // Same error for unknown email and bad password
                .ok_or(AppError::Unauthorized)?;

            if !verify_password(&password, &pepper, &found.password_hash) {
                tracing::warn!("Failed login attempt for {}", email);
                return Err(AppError::Unauthorized);
            }

            found.last_login_at = Some(now);
            let bytes = db::encode(&found)?;
            users.insert(email.as_str(), bytes.as_slice())?;
            record = found;
            drop(users);

            let mut sessions = write_txn.open_table(t::SESSIONS)?;
            let session = SessionRecord {
                email: email.clone(),
                created_at: now,
                expires_at: now + session_ttl,
            };
            let bytes = db::encode(&session)?;
            sessions.insert(token_hash.as_str(), bytes.as_slice())?;
            drop(sessions);

            append_activity(
                &write_txn,
                Some(email.clone()),
                "account.login",
                None,
                user_agent,
                ip,
            )?;
        }
        write_txn.commit()?;

        Ok(record)
    })
    .await??;

    Ok(ok_json(AuthenticatedUser {
        user: user.into(),
        token,
    }))
}

/// Session introspection for the logged-in user
pub async fn me(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<Value>> {
    let user = require_user(&state, &headers).await?;
    Ok(ok_json(User::from(user)))
}
