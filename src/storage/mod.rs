//! Storage layer -- SQLite record store, schema, and the screenshot
//! artifact tree on disk.

pub mod artifacts;
pub mod records;
pub mod schema;

pub use self::artifacts::{ArtifactStore, FsArtifactStore, RunDirectory, StoredArtifact};
pub use self::records::{DeletePredicate, RecordFilter, RecordStore, RunActivity, SqliteRecordStore};

use std::path::{Path, PathBuf};

use r2d2::Pool as R2D2Pool;
use r2d2_sqlite::SqliteConnectionManager;
use thiserror::Error;

use crate::model::ValidationError;

/// Connection Pool type
pub type Pool = R2D2Pool<SqliteConnectionManager>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("failed to encode {column} column: {source}")]
    Encode {
        column: &'static str,
        source: serde_json::Error,
    },

    #[error("corrupt row {id}: {reason}")]
    Corrupt { id: i64, reason: String },

    #[error("failed to create database directory {path}: {source}")]
    Directory {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("artifact io error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

/// Open (or create) the SQLite database and return a connection pool.
pub fn open_pool(path: &Path) -> Result<Pool, StoreError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| StoreError::Directory {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let manager = SqliteConnectionManager::file(path).with_init(|c| {
        c.execute_batch(
            "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA temp_store = MEMORY;
                 PRAGMA foreign_keys = ON;
                 PRAGMA busy_timeout = 5000;",
        )
    });

    let pool = R2D2Pool::new(manager)?;

    // Run migrations on a single connection
    let conn = pool.get()?;
    schema::migrate(&conn)?;

    tracing::debug!(path = %path.display(), "database ready");
    Ok(pool)
}
