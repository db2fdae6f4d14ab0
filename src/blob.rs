//! Blob-store adapter: the server holds the only valid credential and
//! talks to an external Drive-style REST API for folder lookup, resumable
//! upload sessions, and server-relayed uploads.

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::config::BlobConfig;
use crate::error::AppError;

const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const FILES_URL: &str = "https://www.googleapis.com/drive/v3/files";
const UPLOAD_URL: &str = "https://www.googleapis.com/upload/drive/v3/files";
const FOLDER_MIME: &str = "application/vnd.google-apps.folder";

/// Refresh slightly early so an in-flight request never carries a token
/// that expires mid-call.
const TOKEN_EXPIRY_SLACK_SECS: i64 = 60;

#[derive(Error, Debug)]
pub enum BlobError {
    #[error("blob store is not configured: {0}")]
    NotConfigured(&'static str),

    #[error("{0}")]
    Upstream(String),
}

impl From<BlobError> for AppError {
    fn from(e: BlobError) -> Self {
        match e {
            BlobError::NotConfigured(msg) => AppError::Configuration(msg.to_string()),
            BlobError::Upstream(msg) => AppError::Upstream(msg),
        }
    }
}

impl From<reqwest::Error> for BlobError {
    fn from(e: reqwest::Error) -> Self {
        BlobError::Upstream(e.to_string())
    }
}

/// External object-storage capability consumed by the upload routes.
///
/// One production implementation (DriveClient); tests install a stub.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Idempotently find-or-create a folder with the given name and
    /// return its id.
    async fn ensure_folder(&self, name: &str) -> Result<String, BlobError>;

    /// Open a resumable upload session for a file in the given folder
    /// and return the session URL the client pushes bytes to.
    async fn create_upload_session(
        &self,
        folder_id: &str,
        name: &str,
        mime_type: &str,
        size: u64,
    ) -> Result<String, BlobError>;

    /// Relay file bytes through the server into the given folder and
    /// return the blob id assigned upstream.
    async fn upload_bytes(
        &self,
        folder_id: &str,
        name: &str,
        mime_type: &str,
        bytes: Vec<u8>,
    ) -> Result<String, BlobError>;
}

/// Placeholder used when no credentials are configured. Every call
/// fails with a configuration error at first use, per the error design.
pub struct DisabledBlobStore;

#[async_trait]
impl BlobStore for DisabledBlobStore {
    async fn ensure_folder(&self, _name: &str) -> Result<String, BlobError> {
        Err(BlobError::NotConfigured(
            "BLOB_CLIENT_ID / BLOB_CLIENT_SECRET / BLOB_REFRESH_TOKEN are not set",
        ))
    }

    async fn create_upload_session(
        &self,
        _folder_id: &str,
        _name: &str,
        _mime_type: &str,
        _size: u64,
    ) -> Result<String, BlobError> {
        Err(BlobError::NotConfigured(
            "BLOB_CLIENT_ID / BLOB_CLIENT_SECRET / BLOB_REFRESH_TOKEN are not set",
        ))
    }

    async fn upload_bytes(
        &self,
        _folder_id: &str,
        _name: &str,
        _mime_type: &str,
        _bytes: Vec<u8>,
    ) -> Result<String, BlobError> {
        Err(BlobError::NotConfigured(
            "BLOB_CLIENT_ID / BLOB_CLIENT_SECRET / BLOB_REFRESH_TOKEN are not set",
        ))
    }
}

struct CachedToken {
    access_token: String,
    expires_at: i64,
}

/// Drive API client holding the refresh credential and a cached
/// short-lived access token.
pub struct DriveClient {
    http: reqwest::Client,
    config: BlobConfig,
    token: Mutex<Option<CachedToken>>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Deserialize)]
struct DriveFile {
    id: String,
}

#[derive(Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

impl DriveClient {
    pub fn new(config: BlobConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
            token: Mutex::new(None),
        }
    }

    /// Exchange the refresh token for an access token, reusing the
    /// cached one until shortly before expiry.
    async fn access_token(&self) -> Result<String, BlobError> {
        let now = Utc::now().timestamp();

        let mut guard = self.token.lock().await;
        if let Some(cached) = guard.as_ref() {
            if now < cached.expires_at - TOKEN_EXPIRY_SLACK_SECS {
                return Ok(cached.access_token.clone());
            }
        }

        tracing::debug!("Refreshing blob store access token");

        let response = self
            .http
            .post(TOKEN_URL)
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("refresh_token", self.config.refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(BlobError::Upstream(format!(
                "token refresh failed ({}): {}",
                status, body
            )));
        }

        let token: TokenResponse = response.json().await?;
        let access_token = token.access_token.clone();
        *guard = Some(CachedToken {
            access_token: token.access_token,
            expires_at: now + token.expires_in,
        });

        Ok(access_token)
    }

    async fn read_upstream_error(response: reqwest::Response, context: &str) -> BlobError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        BlobError::Upstream(format!("{} ({}): {}", context, status, body))
    }
}

#[async_trait]
impl BlobStore for DriveClient {
    async fn ensure_folder(&self, name: &str) -> Result<String, BlobError> {
        let token = self.access_token().await?;

        // Drive query strings quote with single quotes; escape any in the name
        let escaped = name.replace('\'', "\\'");
        let mut query = format!(
            "name = '{}' and mimeType = '{}' and trashed = false",
            escaped, FOLDER_MIME
        );
        if let Some(root) = &self.config.root_folder_id {
            query.push_str(&format!(" and '{}' in parents", root));
        }

        let response = self
            .http
            .get(FILES_URL)
            .bearer_auth(&token)
            .query(&[("q", query.as_str()), ("fields", "files(id)")])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::read_upstream_error(response, "folder lookup failed").await);
        }

        let list: FileList = response.json().await?;
        if let Some(existing) = list.files.into_iter().next() {
            return Ok(existing.id);
        }

        // Not found: create it
        let mut metadata = serde_json::json!({
            "name": name,
            "mimeType": FOLDER_MIME,
        });
        if let Some(root) = &self.config.root_folder_id {
            metadata["parents"] = serde_json::json!([root]);
        }

        let response = self
            .http
            .post(FILES_URL)
            .bearer_auth(&token)
            .json(&metadata)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::read_upstream_error(response, "folder creation failed").await);
        }

        let folder: DriveFile = response.json().await?;
        tracing::info!("Created blob folder '{}' ({})", name, folder.id);
        Ok(folder.id)
    }

    async fn create_upload_session(
        &self,
        folder_id: &str,
        name: &str,
        mime_type: &str,
        size: u64,
    ) -> Result<String, BlobError> {
        let token = self.access_token().await?;

        let metadata = serde_json::json!({
            "name": name,
            "parents": [folder_id],
        });

        let response = self
            .http
            .post(UPLOAD_URL)
            .bearer_auth(&token)
            .query(&[("uploadType", "resumable")])
            .header("X-Upload-Content-Type", mime_type)
            .header("X-Upload-Content-Length", size.to_string())
            .json(&metadata)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::read_upstream_error(response, "upload session failed").await);
        }

        response
            .headers()
            .get("location")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
            .ok_or_else(|| {
                BlobError::Upstream("upload session response carried no location".to_string())
            })
    }

    async fn upload_bytes(
        &self,
        folder_id: &str,
        name: &str,
        mime_type: &str,
        bytes: Vec<u8>,
    ) -> Result<String, BlobError> {
        let token = self.access_token().await?;

        // Two steps: push the media, then attach name and parent folder
        let response = self
            .http
            .post(UPLOAD_URL)
            .bearer_auth(&token)
            .query(&[("uploadType", "media")])
            .header("Content-Type", mime_type)
            .body(bytes)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::read_upstream_error(response, "media upload failed").await);
        }

        let file: DriveFile = response.json().await?;

        let response = self
            .http
            .patch(format!("{}/{}", FILES_URL, file.id))
            .bearer_auth(&token)
            .query(&[("addParents", folder_id)])
            .json(&serde_json::json!({ "name": name }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::read_upstream_error(response, "upload finalize failed").await);
        }

        Ok(file.id)
    }
}
