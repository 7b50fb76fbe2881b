use anyhow::{Context, Result};
use chrono::TimeDelta;
use file_store::{
    FileRecords, StorageOrchestrator, UploadCoordinator, config::AppConfig, db,
    handlers::AppState,
};
use std::{fs, io::ErrorKind, path::Path};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = AppConfig::from_env_and_args()?;

    tracing::info!(
        backend = %cfg.backend,
        storage_dir = %cfg.storage_dir,
        database_url = %cfg.database_url,
        "Starting file-store"
    );

    // --- Ensure storage directory exists ---
    if !Path::new(&cfg.storage_dir).exists() {
        fs::create_dir_all(&cfg.storage_dir)
            .with_context(|| format!("creating storage directory {}", cfg.storage_dir))?;
        tracing::info!("Created storage directory at {}", cfg.storage_dir);
    }

    // --- Initialize SQLite connection ---
    let db = db::connect(&cfg.database_url).await?;

    // --- Handle migration mode ---
    if migrate {
        db::run_migrations(&db).await?;
        tracing::info!("Database migration complete.");
        return Ok(()); // exit after migration
    }
    // Schema statements are idempotent.
    db::run_migrations(&db).await?;

    // --- Initialize storage engine ---
    let orchestrator = StorageOrchestrator::new(cfg.backend, &cfg.storage_dir, db.clone());
    let records = FileRecords::new(db.clone());
    let coordinator = UploadCoordinator::new(orchestrator, records, cfg.url_prefix.clone())
        .with_leftover_grace(TimeDelta::seconds(i64::from(cfg.leftover_grace_secs)));

    // --- Build router ---
    let app = file_store::app(AppState::new(coordinator, &cfg.storage_dir));

    // --- Start server ---
    let listener = bind(&cfg).await?;
    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", err);
            }
            tracing::info!("Shutdown signal received, draining connections");
        })
        .await?;

    Ok(())
}

/// Bind the configured address. A wildcard host that is refused falls back
/// to loopback on the same port.
async fn bind(cfg: &AppConfig) -> Result<TcpListener> {
    let addr = cfg.addr();
    match TcpListener::bind(&addr).await {
        Ok(listener) => Ok(listener),
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            Ok(TcpListener::bind(&fallback_addr).await?)
        }
        Err(err) => Err(err.into()),
    }
}
