//! Integration tests for the Momento Server API
//!
//! These tests verify the complete request/response cycle for all
//! endpoints against a temporary store and a stub blob adapter.

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

use momento_server::blob::{BlobError, BlobStore};
use momento_server::db::{open_database, Db};
use momento_server::{router, AppState, Config};

const TEST_PEPPER: &str = "test-pepper";
const TEST_ADMIN_KEY: &str = "test-admin-key";
const STUB_UPLOAD_URL: &str = "https://blob.test/session/abc123";
const STUB_BLOB_ID: &str = "blob-001";

// =============================================================================
// Test Helpers
// =============================================================================

/// Blob adapter stub: every call succeeds with fixed ids
struct StubBlobStore;

#[async_trait]
impl BlobStore for StubBlobStore {
    async fn ensure_folder(&self, _name: &str) -> Result<String, BlobError> {
        Ok("folder-1".to_string())
    }

    async fn create_upload_session(
        &self,
        _folder_id: &str,
        _name: &str,
        _mime_type: &str,
        _size: u64,
    ) -> Result<String, BlobError> {
        Ok(STUB_UPLOAD_URL.to_string())
    }

    async fn upload_bytes(
        &self,
        _folder_id: &str,
        _name: &str,
        _mime_type: &str,
        _bytes: Vec<u8>,
    ) -> Result<String, BlobError> {
        Ok(STUB_BLOB_ID.to_string())
    }
}

/// Create a test configuration
fn test_config() -> Config {
    Config {
        server_host: "127.0.0.1".to_string(),
        server_port: 0,                // Random port
        database_path: "".to_string(), // Will be set per test
        allowed_origins: vec!["http://localhost:5173".to_string()],
        environment: "test".to_string(),
        public_base_url: "http://localhost:5173".to_string(),
        secret_pepper: TEST_PEPPER.to_string(),
        admin_key: Some(TEST_ADMIN_KEY.to_string()),
        require_beta_code: false,
        auto_approve_events: false,
        session_ttl_secs: 3600,
        uploads_per_hour: 100,
        uploads_per_day: 1000,
        blob: None,
    }
}

/// Create a test database in a temporary directory
fn create_test_db(temp_dir: &TempDir) -> Db {
    let db_path = temp_dir.path().join("test.db");
    open_database(&db_path).expect("Failed to create test database")
}

/// Create a test app router with the default test config
fn create_test_app(db: Db) -> Router {
    create_test_app_with_config(db, test_config())
}

fn create_test_app_with_config(db: Db, config: Config) -> Router {
    let state = AppState::new(db, config, Arc::new(StubBlobStore));
    router(state)
}

/// Parse response body as JSON
async fn body_to_json(body: Body) -> Value {
    let bytes = body.collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Create a request with a JSON body and optional bearer token
fn make_json_request(method: &str, uri: &str, body: Value, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

/// Create a GET request with optional bearer token
fn make_get_request(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

/// Register an account and return its bearer token
async fn register_account(app: &Router, email: &str) -> String {
    let response = app
        .clone()
        .oneshot(make_json_request(
            "POST",
            "/api/accounts/register",
            json!({
                "email": email,
                "name": "Test Host",
                "password": "password123",
            }),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = body_to_json(response.into_body()).await;
    body["data"]["token"].as_str().unwrap().to_string()
}

/// Flip the admin flag directly in the store
fn promote_to_admin(db: &Db, email: &str) {
    use momento_server::db::{decode, encode, tables};
    use momento_server::models::UserRecord;
    use redb::ReadableTable;

    let write_txn = db.begin_write().unwrap();
    {
        let mut users = write_txn.open_table(tables::USERS).unwrap();
        let mut record: UserRecord = users
            .get(email)
            .unwrap()
            .map(|v| decode(v.value()).unwrap())
            .expect("user must exist");
        record.is_admin = true;
        let bytes = encode(&record).unwrap();
        users.insert(email, bytes.as_slice()).unwrap();
    }
    write_txn.commit().unwrap();
}

/// Count the table and file records still keyed under an event code
fn scoped_children(db: &Db, code: &str) -> (usize, usize) {
    use momento_server::db::{scope_bounds, tables};

    let (start, end) = scope_bounds(code);
    let read_txn = db.begin_read().unwrap();
    let event_tables = read_txn.open_table(tables::EVENT_TABLES).unwrap();
    let tables_left = event_tables
        .range(start.as_str()..end.as_str())
        .unwrap()
        .count();
    let files = read_txn.open_table(tables::FILES).unwrap();
    let files_left = files.range(start.as_str()..end.as_str()).unwrap().count();
    (tables_left, files_left)
}

/// Register a fresh admin and return their token.
/// Events created by this token are active immediately.
async fn setup_admin(app: &Router, db: &Db, email: &str) -> String {
    let token = register_account(app, email).await;
    promote_to_admin(db, email);
    token
}

/// Create an event through the API and return its code
async fn create_event(app: &Router, token: &str, body: Value) -> Value {
    let response = app
        .clone()
        .oneshot(make_json_request("POST", "/api/events", body, Some(token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    body_to_json(response.into_body()).await
}

/// Build a multipart request for the relay-upload endpoint
fn make_multipart_upload(uri: &str, file_name: &str, mime: &str, data: &[u8]) -> Request<Body> {
    let boundary = "momento-test-boundary";
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n",
            file_name
        )
        .as_bytes(),
    );
    body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", mime).as_bytes());
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());

    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={}", boundary),
        )
        .body(Body::from(body))
        .unwrap()
}

// =============================================================================
// Health Check Tests
// =============================================================================

#[tokio::test]
async fn test_health_check() {
    let temp_dir = TempDir::new().unwrap();
    let app = create_test_app(create_test_db(&temp_dir));

    let response = app
        .oneshot(make_get_request("/health", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_to_json(response.into_body()).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["database"], "connected");
}

// =============================================================================
// Account Tests
// =============================================================================

#[tokio::test]
async fn test_register_login_me() {
    let temp_dir = TempDir::new().unwrap();
    let app = create_test_app(create_test_db(&temp_dir));

    let token = register_account(&app, "host@example.com").await;

    // The registration token works immediately
    let response = app
        .clone()
        .oneshot(make_get_request("/api/accounts/me", Some(&token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_to_json(response.into_body()).await;
    assert_eq!(body["data"]["email"], "host@example.com");
    assert_eq!(body["data"]["isAdmin"], false);

    // Fresh login issues a second working token
    let response = app
        .clone()
        .oneshot(make_json_request(
            "POST",
            "/api/accounts/login",
            json!({ "email": "Host@Example.com", "password": "password123" }),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_to_json(response.into_body()).await;
    assert!(body["data"]["token"].as_str().unwrap().len() >= 32);
}

#[tokio::test]
async fn test_register_duplicate_email_conflicts() {
    let temp_dir = TempDir::new().unwrap();
    let app = create_test_app(create_test_db(&temp_dir));

    register_account(&app, "host@example.com").await;

    let response = app
        .oneshot(make_json_request(
            "POST",
            "/api/accounts/register",
            json!({
                "email": "HOST@example.com",
                "name": "Other",
                "password": "password123",
            }),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let body = body_to_json(response.into_body()).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "conflict");
}

#[tokio::test]
async fn test_login_wrong_password_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let app = create_test_app(create_test_db(&temp_dir));

    register_account(&app, "host@example.com").await;

    let response = app
        .oneshot(make_json_request(
            "POST",
            "/api/accounts/login",
            json!({ "email": "host@example.com", "password": "wrong-password" }),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

// =============================================================================
// Beta Code Tests
// =============================================================================

#[tokio::test]
async fn test_beta_code_lifecycle_and_exhaustion() {
    let temp_dir = TempDir::new().unwrap();
    let db = create_test_db(&temp_dir);

    // Admin creates BETA24 with a single use on the open app
    let open_app = create_test_app(db.clone());
    let admin = setup_admin(&open_app, &db, "admin@example.com").await;

    let response = open_app
        .clone()
        .oneshot(make_json_request(
            "POST",
            "/api/admin/beta-codes",
            json!({ "code": "BETA24", "maxUses": 1 }),
            Some(&admin),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    // Lowercase lookup validates: codes are case-normalized
    let response = open_app
        .clone()
        .oneshot(make_get_request("/api/beta/validate?code=beta24", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_to_json(response.into_body()).await;
    assert_eq!(body["data"]["valid"], true);

    // A gated deployment consumes the single use on registration
    let mut gated_config = test_config();
    gated_config.require_beta_code = true;
    let gated_app = create_test_app_with_config(db.clone(), gated_config);

    let response = gated_app
        .clone()
        .oneshot(make_json_request(
            "POST",
            "/api/accounts/register",
            json!({
                "email": "guest@example.com",
                "name": "Guest",
                "password": "password123",
                "betaCode": "beta24",
            }),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    // The code is exhausted now
    let response = open_app
        .clone()
        .oneshot(make_get_request("/api/beta/validate?code=beta24", None))
        .await
        .unwrap();
    let body = body_to_json(response.into_body()).await;
    assert_eq!(body["data"]["valid"], false);
    assert_eq!(body["data"]["reason"], "exhausted");

    // And rejects the next gated registration
    let response = gated_app
        .oneshot(make_json_request(
            "POST",
            "/api/accounts/register",
            json!({
                "email": "late@example.com",
                "name": "Late",
                "password": "password123",
                "betaCode": "BETA24",
            }),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_gated_registration_requires_code() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = test_config();
    config.require_beta_code = true;
    let app = create_test_app_with_config(create_test_db(&temp_dir), config);

    let response = app
        .oneshot(make_json_request(
            "POST",
            "/api/accounts/register",
            json!({
                "email": "guest@example.com",
                "name": "Guest",
                "password": "password123",
            }),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_update_beta_code_clears_expiry() {
    let temp_dir = TempDir::new().unwrap();
    let db = create_test_db(&temp_dir);
    let app = create_test_app(db.clone());
    let admin = setup_admin(&app, &db, "admin@example.com").await;

    let response = app
        .clone()
        .oneshot(make_json_request(
            "POST",
            "/api/admin/beta-codes",
            json!({ "code": "EARLY1", "expiresAt": 1 }),
            Some(&admin),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .clone()
        .oneshot(make_get_request("/api/beta/validate?code=EARLY1", None))
        .await
        .unwrap();
    let body = body_to_json(response.into_body()).await;
    assert_eq!(body["data"]["valid"], false);
    assert_eq!(body["data"]["reason"], "expired");

    // An explicit null lifts the expiry
    let response = app
        .clone()
        .oneshot(make_json_request(
            "PATCH",
            "/api/admin/beta-codes/EARLY1",
            json!({ "expiresAt": null }),
            Some(&admin),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_to_json(response.into_body()).await;
    assert!(body["data"].get("expiresAt").is_none());

    let response = app
        .oneshot(make_get_request("/api/beta/validate?code=EARLY1", None))
        .await
        .unwrap();
    let body = body_to_json(response.into_body()).await;
    assert_eq!(body["data"]["valid"], true);
}

// =============================================================================
// Event Lifecycle Tests
// =============================================================================

#[tokio::test]
async fn test_event_code_conflict_is_case_insensitive() {
    let temp_dir = TempDir::new().unwrap();
    let db = create_test_db(&temp_dir);
    let app = create_test_app(db.clone());
    let admin = setup_admin(&app, &db, "admin@example.com").await;

    create_event(
        &app,
        &admin,
        json!({ "code": "ABC123", "name": "Wedding" }),
    )
    .await;

    let response = app
        .oneshot(make_json_request(
            "POST",
            "/api/events",
            json!({ "code": "abc123", "name": "Other wedding" }),
            Some(&admin),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_pending_event_is_gated_until_approved() {
    let temp_dir = TempDir::new().unwrap();
    let db = create_test_db(&temp_dir);
    let app = create_test_app(db.clone());
    let admin = setup_admin(&app, &db, "admin@example.com").await;
    let host = register_account(&app, "host@example.com").await;

    // Non-admin events start pending
    let body = create_event(&app, &host, json!({ "code": "PARTY1", "name": "Party" })).await;
    assert_eq!(body["data"]["status"], "pending");
    assert_eq!(body["data"]["isActive"], false);

    // Guests cannot reach a pending event
    let response = app
        .clone()
        .oneshot(make_get_request("/api/events/PARTY1", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // It shows in the admin queue
    let response = app
        .clone()
        .oneshot(make_get_request("/api/admin/events/pending", Some(&admin)))
        .await
        .unwrap();
    let body = body_to_json(response.into_body()).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    // Approving flips the status and nothing else
    let response = app
        .clone()
        .oneshot(make_json_request(
            "POST",
            "/api/admin/events/PARTY1/approve",
            json!({}),
            Some(&admin),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_to_json(response.into_body()).await;
    assert_eq!(body["data"]["status"], "active");
    assert_eq!(body["data"]["isActive"], true);
    assert_eq!(body["data"]["name"], "Party");
    assert_eq!(body["data"]["currentFiles"], 0);

    // Now guests can see it
    let response = app
        .clone()
        .oneshot(make_get_request("/api/events/party1", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Approving twice conflicts: the event is no longer pending
    let response = app
        .oneshot(make_json_request(
            "POST",
            "/api/admin/events/PARTY1/approve",
            json!({}),
            Some(&admin),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_reject_removes_event() {
    let temp_dir = TempDir::new().unwrap();
    let db = create_test_db(&temp_dir);
    let app = create_test_app(db.clone());
    let admin = setup_admin(&app, &db, "admin@example.com").await;
    let host = register_account(&app, "host@example.com").await;

    create_event(&app, &host, json!({ "code": "DENYME", "name": "Nope" })).await;

    // A table added while the event awaits approval goes down with it
    let response = app
        .clone()
        .oneshot(make_json_request(
            "POST",
            "/api/events/DENYME/tables",
            json!({ "name": "Table 1" }),
            Some(&host),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(scoped_children(&db, "DENYME"), (1, 0));

    let response = app
        .clone()
        .oneshot(make_json_request(
            "POST",
            "/api/admin/events/DENYME/reject",
            json!({}),
            Some(&admin),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(scoped_children(&db, "DENYME"), (0, 0));

    // Gone for guests and for the host's listing
    let response = app
        .clone()
        .oneshot(make_get_request("/api/events/DENYME", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .oneshot(make_get_request("/api/events", Some(&host)))
        .await
        .unwrap();
    let body = body_to_json(response.into_body()).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_delete_event_removes_children() {
    let temp_dir = TempDir::new().unwrap();
    let db = create_test_db(&temp_dir);
    let app = create_test_app(db.clone());
    let admin = setup_admin(&app, &db, "admin@example.com").await;

    create_event(&app, &admin, json!({ "code": "GONE01", "name": "Short-lived" })).await;

    // One table and one accepted upload under the event
    let response = app
        .clone()
        .oneshot(make_json_request(
            "POST",
            "/api/events/GONE01/tables",
            json!({ "name": "Table 1" }),
            Some(&admin),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_to_json(response.into_body()).await;
    let table_id = body["data"]["id"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(make_json_request(
            "POST",
            "/api/events/GONE01/uploads",
            json!({
                "name": "p.jpg",
                "size": 100,
                "mimeType": "image/jpeg",
                "tableId": table_id,
            }),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(scoped_children(&db, "GONE01"), (1, 1));

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/api/events/GONE01")
                .header("authorization", format!("Bearer {}", admin))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // The event, its listings, and the stored child records are gone
    let response = app
        .clone()
        .oneshot(make_get_request("/api/events/GONE01/files", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .oneshot(make_get_request("/api/events/GONE01/tables", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(scoped_children(&db, "GONE01"), (0, 0));
}

#[tokio::test]
async fn test_update_event_clears_optional_fields() {
    let temp_dir = TempDir::new().unwrap();
    let db = create_test_db(&temp_dir);
    let app = create_test_app(db.clone());
    let admin = setup_admin(&app, &db, "admin@example.com").await;

    create_event(
        &app,
        &admin,
        json!({
            "code": "CLEAR1",
            "name": "Clearable",
            "description": "launch night",
            "expiresAt": 1,
        }),
    )
    .await;

    // Already past its expiry, so guests are gated
    let response = app
        .clone()
        .oneshot(make_get_request("/api/events/CLEAR1", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Explicit nulls clear the expiry and description
    let response = app
        .clone()
        .oneshot(make_json_request(
            "PATCH",
            "/api/events/CLEAR1",
            json!({ "description": null, "expiresAt": null }),
            Some(&admin),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_to_json(response.into_body()).await;
    assert!(body["data"].get("description").is_none());
    assert!(body["data"].get("expiresAt").is_none());
    assert_eq!(body["data"]["name"], "Clearable");

    // No longer expiring, guests get through
    let response = app
        .clone()
        .oneshot(make_get_request("/api/events/CLEAR1", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Omitted fields stay untouched
    let response = app
        .oneshot(make_json_request(
            "PATCH",
            "/api/events/CLEAR1",
            json!({ "maxFiles": 9 }),
            Some(&admin),
        ))
        .await
        .unwrap();
    let body = body_to_json(response.into_body()).await;
    assert_eq!(body["data"]["maxFiles"], 9);
    assert_eq!(body["data"]["name"], "Clearable");
}

#[tokio::test]
async fn test_archive_and_activate() {
    let temp_dir = TempDir::new().unwrap();
    let db = create_test_db(&temp_dir);
    let app = create_test_app(db.clone());
    let admin = setup_admin(&app, &db, "admin@example.com").await;

    create_event(&app, &admin, json!({ "code": "GALA24", "name": "Gala" })).await;

    let response = app
        .clone()
        .oneshot(make_json_request(
            "POST",
            "/api/admin/events/GALA24/archive",
            json!({}),
            Some(&admin),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Archived events are gated for guests
    let response = app
        .clone()
        .oneshot(make_get_request("/api/events/GALA24", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .clone()
        .oneshot(make_json_request(
            "POST",
            "/api/admin/events/GALA24/activate",
            json!({}),
            Some(&admin),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(make_get_request("/api/events/GALA24", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_duplicate_event_zeroes_counters() {
    let temp_dir = TempDir::new().unwrap();
    let db = create_test_db(&temp_dir);
    let app = create_test_app(db.clone());
    let admin = setup_admin(&app, &db, "admin@example.com").await;

    create_event(
        &app,
        &admin,
        json!({ "code": "SRC001", "name": "Original", "maxFiles": 5 }),
    )
    .await;

    // One accepted upload so the source counter is non-zero
    let response = app
        .clone()
        .oneshot(make_json_request(
            "POST",
            "/api/events/SRC001/uploads",
            json!({ "name": "a.jpg", "size": 100, "mimeType": "image/jpeg" }),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .clone()
        .oneshot(make_json_request(
            "POST",
            "/api/events/SRC001/duplicate",
            json!({}),
            Some(&admin),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_to_json(response.into_body()).await;

    let clone_code = body["data"]["code"].as_str().unwrap();
    assert_ne!(clone_code, "SRC001");
    assert_eq!(body["data"]["currentFiles"], 0);
    assert_eq!(body["data"]["name"], "Original");
    assert_eq!(body["data"]["maxFiles"], 5);
}

#[tokio::test]
async fn test_update_event_requires_ownership() {
    let temp_dir = TempDir::new().unwrap();
    let db = create_test_db(&temp_dir);
    let app = create_test_app(db.clone());
    let admin = setup_admin(&app, &db, "admin@example.com").await;
    let other = register_account(&app, "other@example.com").await;

    create_event(&app, &admin, json!({ "code": "MINE01", "name": "Mine" })).await;

    let response = app
        .clone()
        .oneshot(make_json_request(
            "PATCH",
            "/api/events/MINE01",
            json!({ "name": "Stolen" }),
            Some(&other),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .oneshot(make_json_request(
            "PATCH",
            "/api/events/MINE01",
            json!({ "name": "Renamed" }),
            Some(&admin),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_to_json(response.into_body()).await;
    assert_eq!(body["data"]["name"], "Renamed");
}

// =============================================================================
// Table Tests
// =============================================================================

#[tokio::test]
async fn test_table_crud() {
    let temp_dir = TempDir::new().unwrap();
    let db = create_test_db(&temp_dir);
    let app = create_test_app(db.clone());
    let admin = setup_admin(&app, &db, "admin@example.com").await;

    create_event(&app, &admin, json!({ "code": "DINNER", "name": "Dinner" })).await;

    // Two tables
    let response = app
        .clone()
        .oneshot(make_json_request(
            "POST",
            "/api/events/DINNER/tables",
            json!({ "name": "Table 1" }),
            Some(&admin),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_to_json(response.into_body()).await;
    let table_one = body["data"]["id"].as_str().unwrap().to_string();
    assert!(body["data"]["qrCode"]
        .as_str()
        .unwrap()
        .contains("/e/DINNER?table="));

    let response = app
        .clone()
        .oneshot(make_json_request(
            "POST",
            "/api/events/DINNER/tables",
            json!({ "name": "Table 2" }),
            Some(&admin),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    // Rename the first; the second is untouched
    let response = app
        .clone()
        .oneshot(make_json_request(
            "PATCH",
            &format!("/api/events/DINNER/tables/{}", table_one),
            json!({ "name": "Head table" }),
            Some(&admin),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(make_get_request("/api/events/DINNER/tables", None))
        .await
        .unwrap();
    let body = body_to_json(response.into_body()).await;
    let tables = body["data"].as_array().unwrap();
    assert_eq!(tables.len(), 2);
    assert_eq!(tables[0]["name"], "Head table");
    assert_eq!(tables[1]["name"], "Table 2");

    // Delete the first
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/events/DINNER/tables/{}", table_one))
                .header("authorization", format!("Bearer {}", admin))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(make_get_request("/api/events/DINNER/tables", None))
        .await
        .unwrap();
    let body = body_to_json(response.into_body()).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

// =============================================================================
// Upload Admission Tests
// =============================================================================

#[tokio::test]
async fn test_upload_admission_increments_quota() {
    let temp_dir = TempDir::new().unwrap();
    let db = create_test_db(&temp_dir);
    let app = create_test_app(db.clone());
    let admin = setup_admin(&app, &db, "admin@example.com").await;

    create_event(
        &app,
        &admin,
        json!({ "code": "QUOTA1", "name": "Small", "maxFiles": 2 }),
    )
    .await;

    for expected in 1..=2 {
        let response = app
            .clone()
            .oneshot(make_json_request(
                "POST",
                "/api/events/QUOTA1/uploads",
                json!({ "name": "p.jpg", "size": 100, "mimeType": "image/jpeg" }),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_to_json(response.into_body()).await;
        assert_eq!(body["data"]["uploadUrl"], STUB_UPLOAD_URL);

        // The counter grows by exactly one per accepted upload
        let response = app
            .clone()
            .oneshot(make_get_request("/api/events", Some(&admin)))
            .await
            .unwrap();
        let body = body_to_json(response.into_body()).await;
        assert_eq!(body["data"][0]["currentFiles"], expected);
    }

    // The third admission hits the cap
    let response = app
        .oneshot(make_json_request(
            "POST",
            "/api/events/QUOTA1/uploads",
            json!({ "name": "p.jpg", "size": 100, "mimeType": "image/jpeg" }),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_to_json(response.into_body()).await;
    assert_eq!(body["error"]["code"], "validation");
}

#[tokio::test]
async fn test_upload_rejects_oversize_and_wrong_type() {
    let temp_dir = TempDir::new().unwrap();
    let db = create_test_db(&temp_dir);
    let app = create_test_app(db.clone());
    let admin = setup_admin(&app, &db, "admin@example.com").await;

    create_event(
        &app,
        &admin,
        json!({
            "code": "STRICT",
            "name": "Strict",
            "maxFileSize": 1000,
            "allowedTypes": ["image/*"],
        }),
    )
    .await;

    let response = app
        .clone()
        .oneshot(make_json_request(
            "POST",
            "/api/events/STRICT/uploads",
            json!({ "name": "big.jpg", "size": 2000, "mimeType": "image/jpeg" }),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);

    let response = app
        .clone()
        .oneshot(make_json_request(
            "POST",
            "/api/events/STRICT/uploads",
            json!({ "name": "movie.mp4", "size": 500, "mimeType": "video/mp4" }),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .oneshot(make_json_request(
            "POST",
            "/api/events/STRICT/uploads",
            json!({ "name": "ok.jpg", "size": 500, "mimeType": "image/jpeg" }),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn test_upload_to_expired_event_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let db = create_test_db(&temp_dir);
    let app = create_test_app(db.clone());
    let admin = setup_admin(&app, &db, "admin@example.com").await;

    create_event(
        &app,
        &admin,
        json!({ "code": "OLDONE", "name": "Done", "expiresAt": 1 }),
    )
    .await;

    let response = app
        .oneshot(make_json_request(
            "POST",
            "/api/events/OLDONE/uploads",
            json!({ "name": "p.jpg", "size": 100, "mimeType": "image/jpeg" }),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_upload_rate_limit() {
    let temp_dir = TempDir::new().unwrap();
    let db = create_test_db(&temp_dir);
    let mut config = test_config();
    config.uploads_per_hour = 2;
    let app = create_test_app_with_config(db.clone(), config);
    let admin = setup_admin(&app, &db, "admin@example.com").await;

    create_event(&app, &admin, json!({ "code": "BUSY01", "name": "Busy" })).await;

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(make_json_request(
                "POST",
                "/api/events/BUSY01/uploads",
                json!({ "name": "p.jpg", "size": 100, "mimeType": "image/jpeg" }),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    let response = app
        .oneshot(make_json_request(
            "POST",
            "/api/events/BUSY01/uploads",
            json!({ "name": "p.jpg", "size": 100, "mimeType": "image/jpeg" }),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_relay_upload_persists_file_record() {
    let temp_dir = TempDir::new().unwrap();
    let db = create_test_db(&temp_dir);
    let app = create_test_app(db.clone());
    let admin = setup_admin(&app, &db, "admin@example.com").await;

    create_event(&app, &admin, json!({ "code": "RELAY1", "name": "Relay" })).await;

    let response = app
        .clone()
        .oneshot(make_multipart_upload(
            "/api/events/RELAY1/uploads/direct",
            "group.jpg",
            "image/jpeg",
            b"not-really-a-jpeg",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_to_json(response.into_body()).await;
    assert_eq!(body["data"]["blobId"], STUB_BLOB_ID);
    assert_eq!(body["data"]["name"], "group.jpg");

    let response = app
        .oneshot(make_get_request("/api/events/RELAY1/files", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_to_json(response.into_body()).await;
    let files = body["data"].as_array().unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0]["mimeType"], "image/jpeg");
    assert_eq!(files[0]["size"], 17);
}

#[tokio::test]
async fn test_upload_to_unknown_event_is_404() {
    let temp_dir = TempDir::new().unwrap();
    let app = create_test_app(create_test_db(&temp_dir));

    let response = app
        .oneshot(make_json_request(
            "POST",
            "/api/events/NOSUCH/uploads",
            json!({ "name": "p.jpg", "size": 100, "mimeType": "image/jpeg" }),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// =============================================================================
// Admin Surface Tests
// =============================================================================

#[tokio::test]
async fn test_admin_routes_require_admin() {
    let temp_dir = TempDir::new().unwrap();
    let db = create_test_db(&temp_dir);
    let app = create_test_app(db.clone());
    let host = register_account(&app, "host@example.com").await;

    // No token at all
    let response = app
        .clone()
        .oneshot(make_get_request("/api/admin/users", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Logged in but not an admin
    let response = app
        .oneshot(make_get_request("/api/admin/users", Some(&host)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_admin_stats_with_shared_key() {
    let temp_dir = TempDir::new().unwrap();
    let db = create_test_db(&temp_dir);
    let app = create_test_app(db.clone());
    register_account(&app, "host@example.com").await;

    let response = app
        .clone()
        .oneshot(make_get_request(
            &format!("/api/admin/stats?key={}", TEST_ADMIN_KEY),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_to_json(response.into_body()).await;
    assert_eq!(body["data"]["userCount"], 1);

    let response = app
        .oneshot(make_get_request("/api/admin/stats?key=wrong", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_user_management_and_activity() {
    let temp_dir = TempDir::new().unwrap();
    let db = create_test_db(&temp_dir);
    let app = create_test_app(db.clone());
    let admin = setup_admin(&app, &db, "admin@example.com").await;
    register_account(&app, "host@example.com").await;

    // Promote then demote the host
    let response = app
        .clone()
        .oneshot(make_json_request(
            "PATCH",
            "/api/admin/users/host@example.com",
            json!({ "isAdmin": true }),
            Some(&admin),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_to_json(response.into_body()).await;
    assert_eq!(body["data"]["isAdmin"], true);

    // Admins cannot demote themselves
    let response = app
        .clone()
        .oneshot(make_json_request(
            "PATCH",
            "/api/admin/users/admin@example.com",
            json!({ "isAdmin": false }),
            Some(&admin),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Delete the other account
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/api/admin/users/host@example.com")
                .header("authorization", format!("Bearer {}", admin))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(make_get_request("/api/admin/users", Some(&admin)))
        .await
        .unwrap();
    let body = body_to_json(response.into_body()).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    // Registrations left an audit trail, newest first
    let response = app
        .oneshot(make_get_request("/api/admin/activity?limit=10", Some(&admin)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_to_json(response.into_body()).await;
    let entries = body["data"].as_array().unwrap();
    assert!(!entries.is_empty());
    assert!(entries
        .iter()
        .any(|e| e["action"] == "account.register"));
}
