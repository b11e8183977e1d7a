use anyhow::{Context, Result};
use axum::Router;
use std::{io::ErrorKind, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod handlers;
mod middleware;
mod models;
mod routes;
mod services;
mod state;
mod store;

use config::{AppConfig, StoreBackend};
use state::{AccessPolicy, AppState};
use store::{
    ObjectStore, fs_store::FsStore, memory_store::MemoryStore, s3_store::S3Store,
};

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config ---
    let cfg = AppConfig::from_env_and_args()?;

    tracing::info!("Starting media-relay with config: {:?}", cfg);

    // --- Initialize the shared gateway handle ---
    let store = build_store(&cfg).await?;
    tracing::info!("Using {} object store", store.name());

    let state = AppState::new(
        store,
        AccessPolicy::new(cfg.allowed_referrer.as_str()),
        &cfg.playback_content_type,
        cfg.relay_buffer,
        cfg.max_upload_bytes,
    );

    // --- Build router ---
    let app: Router = routes::routes::routes(state);

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
    axum::serve(listener, app).await?;

    Ok(())
}

/// Construct the one gateway instance shared by every request.
async fn build_store(cfg: &AppConfig) -> Result<Arc<dyn ObjectStore>> {
    let store: Arc<dyn ObjectStore> = match cfg.backend {
        StoreBackend::S3 => {
            tracing::debug!("Connecting to S3 with {:?}", cfg.s3);
            Arc::new(S3Store::connect(&cfg.s3).await)
        }
        StoreBackend::Fs => Arc::new(
            FsStore::open(&cfg.storage_dir)
                .await
                .with_context(|| format!("opening storage directory {}", cfg.storage_dir))?,
        ),
        StoreBackend::Memory => {
            tracing::warn!("memory backend selected; objects are lost on exit");
            Arc::new(MemoryStore::default())
        }
    };
    Ok(store)
}
