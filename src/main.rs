use anyhow::{Context, Result};
use axum::Router;
use image_vault::{
    config::AppConfig,
    imaging::ImageEngine,
    pipeline::{ImagePipeline, WorkerPool},
    repositories::{DiskStorage, MemoryCache, SqliteMetadataRepository},
    routes,
    services::ImageService,
    state::AppState,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::{fs, io::ErrorKind, path::PathBuf, str::FromStr, sync::Arc};
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

    tracing::info!("Starting image-vault with config: {:?}", cfg);

    // --- Ensure storage directory exists ---
    let storage_dir = PathBuf::from(&cfg.storage_dir);
    if !storage_dir.exists() {
        fs::create_dir_all(&storage_dir)
            .with_context(|| format!("creating storage directory {}", cfg.storage_dir))?;
        tracing::info!("Created storage directory at {}", cfg.storage_dir);
    }

    // --- Initialize SQLite connection ---
    let connect = SqliteConnectOptions::from_str(&cfg.database_url)
        .with_context(|| format!("parsing database url `{}`", cfg.database_url))?
        .create_if_missing(true);
    if let Some(parent) = connect.get_filename().parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
            tracing::info!("Created missing directory {:?}", parent);
        }
    }
    tracing::debug!("Connecting to {}", cfg.database_url);

    let db = Arc::new(
        SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect)
            .await
            .context("connecting to SQLite")?,
    );
    let metadata = SqliteMetadataRepository::new(db.clone());

    // --- Handle migration mode ---
    if migrate {
        metadata.migrate().await.context("running migrations")?;
        tracing::info!("Database migration complete.");
        return Ok(()); // exit after migration
    }

    // --- Pipeline + service ---
    let pool = WorkerPool::new(cfg.pool(), Arc::new(ImageEngine));
    let pipeline = ImagePipeline::new(Arc::new(pool), cfg.preview());
    let images = ImageService::new(
        Arc::new(metadata),
        Arc::new(DiskStorage::new(&storage_dir)),
        Arc::new(MemoryCache::with_capacity(cfg.cache_max_bytes)),
        pipeline.clone(),
        cfg.service(),
    );

    // --- Build router ---
    let state = AppState {
        images,
        db,
        storage_dir,
    };
    let app: Router = routes::routes::routes(cfg.max_image_size).with_state(state);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
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
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // In-flight requests are done; let queued jobs finish before exiting.
    pipeline.wait().await;
    tracing::info!("Shutdown complete.");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", err);
        // without a signal handler, run until killed
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
