use std::env;

/// Credentials and endpoints for the external blob store.
///
/// Optional as a whole: deployments without credentials still serve
/// everything except uploads, which fail with a configuration error
/// at first use.
#[derive(Debug, Clone)]
pub struct BlobConfig {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    pub root_folder_id: Option<String>,
}

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub database_path: String,
    pub allowed_origins: Vec<String>,
    pub environment: String,
    /// Base URL used to build table QR join links
    pub public_base_url: String,
    /// Server-side pepper mixed into password and token hashes
    pub secret_pepper: String,
    /// Optional shared key unlocking /api/admin/stats without a session
    pub admin_key: Option<String>,
    /// Whether registration requires a valid beta code
    pub require_beta_code: bool,
    /// Whether newly created events skip the pending-approval state
    pub auto_approve_events: bool,
    pub session_ttl_secs: i64,
    pub uploads_per_hour: u32,
    pub uploads_per_day: u32,
    pub blob: Option<BlobConfig>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, String> {
        // Load .env file if it exists (development)
        dotenvy::dotenv().ok();

        let server_host = env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let server_port = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .map_err(|_| "Invalid SERVER_PORT")?;

        let database_path =
            env::var("DATABASE_PATH").unwrap_or_else(|_| "./data/momento.db".to_string());

        let allowed_origins = env::var("ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .collect();

        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let public_base_url =
            env::var("PUBLIC_BASE_URL").unwrap_or_else(|_| "http://localhost:5173".to_string());

        let secret_pepper = env::var("SECRET_PEPPER")
            .map_err(|_| "SECRET_PEPPER must be set for password and token hashing")?;

        let admin_key = env::var("ADMIN_KEY").ok().filter(|k| !k.is_empty());

        let require_beta_code = env::var("REQUIRE_BETA_CODE")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let auto_approve_events = env::var("AUTO_APPROVE_EVENTS")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let session_ttl_secs = env::var("SESSION_TTL_SECS")
            .unwrap_or_else(|_| "604800".to_string())
            .parse()
            .map_err(|_| "Invalid SESSION_TTL_SECS")?;

        let uploads_per_hour = env::var("UPLOADS_PER_HOUR")
            .unwrap_or_else(|_| "60".to_string())
            .parse()
            .map_err(|_| "Invalid UPLOADS_PER_HOUR")?;

        let uploads_per_day = env::var("UPLOADS_PER_DAY")
            .unwrap_or_else(|_| "300".to_string())
            .parse()
            .map_err(|_| "Invalid UPLOADS_PER_DAY")?;

        // Blob credentials are read as a unit: all three or nothing
        let blob = match (
            env::var("BLOB_CLIENT_ID").ok(),
            env::var("BLOB_CLIENT_SECRET").ok(),
            env::var("BLOB_REFRESH_TOKEN").ok(),
        ) {
            (Some(client_id), Some(client_secret), Some(refresh_token)) => Some(BlobConfig {
                client_id,
                client_secret,
                refresh_token,
                root_folder_id: env::var("BLOB_ROOT_FOLDER_ID").ok(),
            }),
            _ => None,
        };

        Ok(Config {
            server_host,
            server_port,
            database_path,
            allowed_origins,
            environment,
            public_base_url,
            secret_pepper,
            admin_key,
            require_beta_code,
            auto_approve_events,
            session_ttl_secs,
            uploads_per_hour,
            uploads_per_day,
            blob,
        })
    }

    /// Get server address as string
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}
