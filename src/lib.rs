//! testdash -- backend for a test-results dashboard.
//!
//! Reporters post individual test outcomes tagged with a framework and a
//! run id. The crate stores them in SQLite, keeps only the most recent runs
//! per framework (screenshots included), and serves per-run summaries and
//! daily/weekly trend series over HTTP.

pub mod aggregate;
pub mod api;
pub mod config;
pub mod ingest;
pub mod model;
pub mod reporter;
pub mod retention;
pub mod storage;

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::aggregate::{Aggregator, Labeler};
use crate::config::Config;
use crate::ingest::ResultService;
use crate::storage::{FsArtifactStore, SqliteRecordStore};

/// Open both stores and wire up the ingestion service.
pub fn open_service(config: &Config) -> Result<ResultService> {
    let pool = storage::open_pool(&config.storage.db_path).with_context(|| {
        format!("failed to open database {}", config.storage.db_path.display())
    })?;

    let artifacts = FsArtifactStore::new(&config.storage.artifact_root);
    artifacts.ensure().with_context(|| {
        format!(
            "failed to create artifact root {}",
            config.storage.artifact_root.display()
        )
    })?;

    let labels = config.display.labeler().unwrap_or_else(Labeler::default);

    Ok(ResultService::new(
        Arc::new(SqliteRecordStore::new(pool)),
        Arc::new(artifacts),
        config.retention.policy(),
        Aggregator::new(labels),
    ))
}

/// Start the HTTP server and run until it fails.
pub async fn serve(config: Config) -> Result<()> {
    // 1. Initialize storage
    tracing::info!(db = %config.storage.db_path.display(), "Initializing database");
    let service = open_service(&config)?;

    // 2. Reap screenshot directories orphaned by an earlier crash
    let sweeper = service.clone();
    let sweep = tokio::task::spawn_blocking(move || sweeper.sweep_artifacts()).await?;
    if !sweep.deleted_artifacts.is_empty() {
        tracing::info!(
            deleted = sweep.deleted_artifacts.len(),
            "removed orphaned screenshot directories"
        );
    }

    // 3. Start API server
    let addr: std::net::SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("invalid bind address {}", config.server.bind))?;
    let state = api::state::AppState {
        service,
        artifact_root: config.storage.artifact_root.clone(),
    };
    let app = api::router(state, &config.server);

    tracing::info!(%addr, "testdash listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
