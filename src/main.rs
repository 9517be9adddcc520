use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing_subscriber::EnvFilter;

use kumite_backend::api;
use kumite_backend::archive::LogArchive;
use kumite_backend::config::Config;
use kumite_backend::db::Database;
use kumite_backend::engine::server::ScoreboardServer;
use kumite_backend::metrics;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Invalid configuration: {e}");
            std::process::exit(2);
        }
    };

    metrics::register_metrics();

    // Storage is optional: without it the archive lives in memory only.
    let db = match Database::new(&config.database_url).await {
        Ok(db) => Some(Arc::new(db)),
        Err(e) => {
            tracing::warn!("Log store unavailable, running in memory: {e}");
            None
        }
    };
    let archive = match &db {
        Some(db) => match db.read_logs().await {
            Ok(entries) => {
                tracing::info!(entries = entries.len(), "Loaded match logs");
                LogArchive::from_entries(entries)
            }
            Err(e) => {
                tracing::warn!("Stored match logs unreadable, starting empty: {e}");
                LogArchive::new()
            }
        },
        None => LogArchive::new(),
    };

    let server = Arc::new(ScoreboardServer::new(config.session_settings(), archive, db));

    let mut app = api::router(server);
    if let Some(dir) = &config.static_dir {
        tracing::info!("Serving static files from {}", dir.display());
        app = app.fallback_service(ServeDir::new(dir));
    }
    let app = app.layer(CorsLayer::permissive());

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!("Failed to bind to {addr}: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!(
        duration = %config.duration.label(),
        "Kumite backend listening on port {}",
        config.port
    );
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {e}");
        std::process::exit(1);
    }
}
