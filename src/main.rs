use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use momento_server::blob::{BlobStore, DisabledBlobStore, DriveClient};
use momento_server::{open_database, router, AppState, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "momento_server=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Momento Server...");

    // Load configuration
    let config = Config::from_env().map_err(|e| anyhow::anyhow!(e))?;

    tracing::info!(
        "Environment: {}, Server: {}",
        config.environment,
        config.server_address()
    );

    // Open the embedded store
    let db = open_database(&config.database_path)?;

    // Blob adapter: live client with credentials, otherwise disabled
    // until first use (uploads then fail with a configuration error)
    let blob: Arc<dyn BlobStore> = match config.blob.clone() {
        Some(blob_config) => {
            tracing::info!("Blob store client configured");
            Arc::new(DriveClient::new(blob_config))
        }
        None => {
            tracing::warn!("Blob store credentials missing; uploads are disabled");
            Arc::new(DisabledBlobStore)
        }
    };

    // Configure CORS
    let cors = CorsLayer::new()
        .allow_origin(
            config
                .allowed_origins
                .iter()
                .map(|s| s.parse())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| anyhow::anyhow!("Invalid ALLOWED_ORIGINS entry: {}", e))?,
        )
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PATCH,
            axum::http::Method::DELETE,
        ])
        .allow_headers(Any);

    // Create app state and router
    let state = AppState::new(db, config.clone(), blob);
    let app = router(state).layer(cors).layer(TraceLayer::new_for_http());

    // Start server
    let addr: SocketAddr = config.server_address().parse()?;
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
