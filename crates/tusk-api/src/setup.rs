//! Application wiring
//!
//! Builds the repository and chunk store selected by configuration, starts
//! the expiry sweeper, and assembles the router.

use axum::{
    extract::DefaultBodyLimit,
    routing::{head, options},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;

use tusk_core::{Config, NoOpCompletionHook, RepositoryBackend};
use tusk_db::{MemoryUploadRepository, PostgresUploadRepository, UploadRepository};
use tusk_services::{ExpirySweeper, UploadService};
use tusk_storage::{ChunkStore, LocalChunkStore};

use crate::handlers;
use crate::state::AppState;

/// Initialize repositories, storage, services and routes.
pub async fn initialize_app(config: Config) -> Result<(Arc<AppState>, Router), anyhow::Error> {
    let repository: Arc<dyn UploadRepository> = match config.repository_backend {
        RepositoryBackend::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("DATABASE_URL must be set for postgres backend"))?;
            let pool = PgPoolOptions::new()
                .max_connections(20)
                .acquire_timeout(Duration::from_secs(30))
                .connect(url)
                .await?;
            PostgresUploadRepository::migrate(&pool).await?;
            tracing::info!("Connected to Postgres upload repository");
            Arc::new(PostgresUploadRepository::new(pool))
        }
        RepositoryBackend::Memory => {
            tracing::info!("Using in-memory upload repository");
            Arc::new(MemoryUploadRepository::new())
        }
    };

    let chunk_store: Arc<dyn ChunkStore> =
        Arc::new(LocalChunkStore::new(&config.chunk_store_path).await?);

    let service = Arc::new(UploadService::new(
        repository.clone(),
        chunk_store.clone(),
        config.checksum_verifier(),
        config.expiry_policy(),
        Arc::new(NoOpCompletionHook),
        config.max_upload_size_bytes,
    ));

    if config.sweep_interval_secs > 0 {
        let sweeper = Arc::new(ExpirySweeper::new(
            repository,
            chunk_store,
            Duration::from_secs(config.sweep_interval_secs),
        ));
        sweeper.start();
    }

    let state = Arc::new(AppState {
        service,
        config: config.clone(),
    });
    let router = build_router(state.clone());

    Ok((state, router))
}

/// Assemble the protocol routes around shared state.
pub fn build_router(state: Arc<AppState>) -> Router {
    let max_body = state.config.max_upload_size_bytes.max(0) as usize;

    Router::new()
        .route(
            "/files",
            options(handlers::upload_capabilities).post(handlers::create_upload),
        )
        .route(
            "/files/{id}",
            head(handlers::upload_info)
                .patch(handlers::append_chunk)
                .delete(handlers::terminate_upload),
        )
        .layer(DefaultBodyLimit::max(max_body))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until the process is stopped.
pub async fn start_server(config: &Config, router: Router) -> Result<(), anyhow::Error> {
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "tusk listening");
    axum::serve(listener, router).await?;
    Ok(())
}
