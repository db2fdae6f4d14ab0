//! Momento Server Library
//!
//! Exports the core types, the router, and the route handlers for
//! testing and reuse.

pub mod blob;
pub mod codes;
pub mod config;
pub mod constants;
pub mod db;
pub mod error;
pub mod models;
pub mod routes;
pub mod security;

pub use config::Config;
pub use db::{open_database, Db};
pub use error::{AppError, Result};

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, patch, post};
use axum::Router;
use std::sync::Arc;

use blob::BlobStore;
use constants::MAX_RELAY_BYTES;
use routes::*;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub config: Config,
    pub blob: Arc<dyn BlobStore>,
}

impl AppState {
    /// Create a new AppState with the given store, configuration, and
    /// blob adapter
    pub fn new(db: Db, config: Config, blob: Arc<dyn BlobStore>) -> Self {
        Self { db, config, blob }
    }
}

/// Build the full application router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        // Accounts
        .route("/api/accounts/register", post(register))
        .route("/api/accounts/login", post(login))
        .route("/api/accounts/me", get(me))
        // Beta gate
        .route("/api/beta/validate", get(validate_beta_code))
        // Events
        .route("/api/events", post(create_event).get(list_events))
        .route(
            "/api/events/:code",
            get(get_event).patch(update_event).delete(delete_event),
        )
        .route("/api/events/:code/duplicate", post(duplicate_event))
        .route(
            "/api/events/:code/tables",
            get(list_tables).post(create_table),
        )
        .route(
            "/api/events/:code/tables/:table_id",
            patch(rename_table).delete(delete_table),
        )
        .route("/api/events/:code/files", get(list_files))
        // Uploads
        .route("/api/events/:code/uploads", post(request_upload))
        .route("/api/events/:code/uploads/direct", post(relay_upload))
        // Admin
        .route("/api/admin/stats", get(admin_stats))
        .route("/api/admin/activity", get(recent_activity))
        .route("/api/admin/events/pending", get(pending_events))
        .route("/api/admin/events/:code/approve", post(approve_event))
        .route("/api/admin/events/:code/reject", post(reject_event))
        .route("/api/admin/events/:code/archive", post(archive_event))
        .route("/api/admin/events/:code/activate", post(activate_event))
        .route(
            "/api/admin/beta-codes",
            get(list_beta_codes).post(create_beta_code),
        )
        .route(
            "/api/admin/beta-codes/:code",
            patch(update_beta_code).delete(delete_beta_code),
        )
        .route("/api/admin/users", get(list_users))
        .route(
            "/api/admin/users/:email",
            patch(update_user).delete(delete_user),
        )
        .layer(DefaultBodyLimit::max(MAX_RELAY_BYTES))
        .with_state(state)
}
