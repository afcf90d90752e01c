//! millwork-api server binary.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use millwork_api::{router, AppConfig, AppState};
use millwork_cad::{DataExtractor, McpCadConnector};
use millwork_db::{Database, MemoryStore, PoolConfig, Stores};
use millwork_inference::{DimensionInterpreter, OllamaBackend};
use millwork_jobs::JobWorker;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with configurable output
    //
    // Environment variables:
    //   LOG_FORMAT  - "json" or "text" (default: "text")
    //   LOG_FILE    - path to log file (optional, enables file logging)
    //   LOG_ANSI    - "true"/"false" override ANSI colors (auto-detected by default)
    //   RUST_LOG    - standard env filter (default: "millwork_api=debug,tower_http=debug")
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "millwork_api=debug,tower_http=debug".into());

    let registry = tracing_subscriber::registry().with(env_filter);

    let _file_guard = if let Some(ref path) = log_file {
        let file_dir = std::path::Path::new(path)
            .parent()
            .unwrap_or(std::path::Path::new("."));
        let file_name = std::path::Path::new(path)
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("millwork-api.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(log_ansi.unwrap_or(false));
            registry.with(layer).init();
        }
        Some(guard)
    } else {
        // Console-only output
        if log_format == "json" {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer();
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            }
            registry.with(layer).init();
        }
        None
    };

    info!(
        log_format = %log_format,
        log_file = log_file.as_deref().unwrap_or("(stdout)"),
        "Logging initialized"
    );

    let config = AppConfig::from_env()?;

    // Storage: PostgreSQL when configured, otherwise an in-process store
    let (stores, _db) = match std::env::var("DATABASE_URL") {
        Ok(url) if !url.trim().is_empty() => {
            let db = Database::connect_with_config(
                &url,
                PoolConfig::from_env().for_workers(config.worker.max_concurrent_jobs),
            )
            .await?;
            db.migrate().await?;
            info!("Connected to database, migrations applied");
            (db.stores(), Some(db))
        }
        _ => {
            warn!("DATABASE_URL not set, using in-memory store; data is lost on restart");
            (Stores::memory(Arc::new(MemoryStore::new())), None)
        }
    };

    let connector = Arc::new(McpCadConnector::from_env()?);
    info!(rpc_url = %connector.config().rpc_url, "CAD connector configured");
    let extractor = Arc::new(DataExtractor::new(connector));

    let backend = OllamaBackend::from_env();
    info!(base_url = backend.base_url(), "Interpretation backend configured");
    let interpreter = Arc::new(DimensionInterpreter::new(Arc::new(backend)));

    let state = AppState::new(&stores, extractor, interpreter, &config);

    let worker = JobWorker::new(
        state.orchestrator.clone(),
        stores.jobs.clone(),
        stores.job_notify.clone(),
        config.worker.clone(),
    );
    let worker_handle = worker.start();

    let app = router(state, &config);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped, shutting down job worker");
    if let Err(e) = worker_handle.shutdown().await {
        warn!(error = %e, "Job worker did not acknowledge shutdown");
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
