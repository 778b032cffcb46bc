//! Screenshot artifacts on disk, one directory per run id.
//!
//! Layout: `<root>/<run_id>/<file>`. Directories are removed wholesale when a
//! run leaves every retention window; files are never edited in place.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::ArtifactError;
use crate::model::ValidationError;

pub const MAX_SCREENSHOT_BYTES: usize = 10 * 1024 * 1024;
pub const ALLOWED_EXTENSIONS: &[&str] = &["jpeg", "jpg", "png", "gif", "webp"];

/// URL prefix the HTTP layer serves `root` under.
pub const PUBLIC_PREFIX: &str = "/uploads/screenshots";

/// A run directory found under the artifact root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunDirectory {
    pub run_id: String,
    pub modified: Option<DateTime<Utc>>,
}

/// Where an uploaded file landed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredArtifact {
    pub filename: String,
    pub url: String,
    pub size: usize,
}

pub trait ArtifactStore: Send + Sync {
    fn list_run_directories(&self) -> Result<Vec<RunDirectory>, ArtifactError>;

    /// Idempotent: a missing directory is not an error.
    fn delete_run_directory(&self, run_id: &str) -> Result<(), ArtifactError>;

    fn store_file(
        &self,
        run_id: &str,
        original_name: &str,
        bytes: &[u8],
    ) -> Result<StoredArtifact, ArtifactError>;
}

#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create the root directory if needed.
    pub fn ensure(&self) -> Result<(), ArtifactError> {
        fs::create_dir_all(&self.root).map_err(|source| ArtifactError::Io {
            path: self.root.clone(),
            source,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn run_dir(&self, run_id: &str) -> Result<PathBuf, ValidationError> {
        check_segment(run_id)?;
        Ok(self.root.join(run_id))
    }
}

impl ArtifactStore for FsArtifactStore {
    fn list_run_directories(&self) -> Result<Vec<RunDirectory>, ArtifactError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(ArtifactError::Io {
                    path: self.root.clone(),
                    source,
                })
            }
        };

        let mut dirs = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| ArtifactError::Io {
                path: self.root.clone(),
                source,
            })?;
            let Ok(meta) = entry.metadata() else { continue };
            if !meta.is_dir() {
                continue;
            }
            let Some(run_id) = entry.file_name().to_str().map(str::to_string) else {
                tracing::debug!(path = %entry.path().display(), "skipping non-utf8 artifact dir");
                continue;
            };
            dirs.push(RunDirectory {
                run_id,
                modified: meta.modified().ok().map(DateTime::<Utc>::from),
            });
        }
        dirs.sort_by(|a, b| a.run_id.cmp(&b.run_id));
        Ok(dirs)
    }

    fn delete_run_directory(&self, run_id: &str) -> Result<(), ArtifactError> {
        let path = self.run_dir(run_id)?;
        match fs::remove_dir_all(&path) {
            Ok(()) => {
                tracing::info!(%run_id, "deleted screenshots for run");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(ArtifactError::Io { path, source }),
        }
    }

    fn store_file(
        &self,
        run_id: &str,
        original_name: &str,
        bytes: &[u8],
    ) -> Result<StoredArtifact, ArtifactError> {
        if bytes.is_empty() {
            return Err(ValidationError::EmptyUpload.into());
        }
        if bytes.len() > MAX_SCREENSHOT_BYTES {
            return Err(ValidationError::FileTooLarge {
                size: bytes.len(),
                limit: MAX_SCREENSHOT_BYTES,
            }
            .into());
        }

        let dir = self.run_dir(run_id)?;
        let filename = unique_file_name(original_name)?;

        fs::create_dir_all(&dir).map_err(|source| ArtifactError::Io {
            path: dir.clone(),
            source,
        })?;
        let path = dir.join(&filename);
        fs::write(&path, bytes).map_err(|source| ArtifactError::Io { path, source })?;

        Ok(StoredArtifact {
            url: format!("{PUBLIC_PREFIX}/{run_id}/{filename}"),
            filename,
            size: bytes.len(),
        })
    }
}

/// A run id must be a single, non-traversing path component.
fn check_segment(run_id: &str) -> Result<(), ValidationError> {
    let bad = run_id.is_empty()
        || run_id == "."
        || run_id == ".."
        || run_id.len() > 255
        || run_id
            .chars()
            .any(|c| matches!(c, '/' | '\\' | ':') || c.is_control());
    if bad {
        return Err(ValidationError::UnsafeRunId(run_id.to_string()));
    }
    Ok(())
}

/// `<sanitized stem>-<epoch ms>-<random>.<ext>`, keeping only allowed image
/// extensions.
fn unique_file_name(original: &str) -> Result<String, ValidationError> {
    let name = Path::new(original)
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| ValidationError::InvalidFileName(original.to_string()))?;
    let path = Path::new(name);

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .ok_or_else(|| ValidationError::UnsupportedFileType(original.to_string()))?;
    if !ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
        return Err(ValidationError::UnsupportedFileType(ext));
    }

    let stem: String = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("screenshot")
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .take(50)
        .collect();
    let stem = if stem.is_empty() { "screenshot".to_string() } else { stem };

    let suffix = Uuid::new_v4().simple().to_string();
    Ok(format!(
        "{stem}-{}-{}.{ext}",
        Utc::now().timestamp_millis(),
        &suffix[..8]
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, FsArtifactStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path().join("screenshots"));
        store.ensure().unwrap();
        (dir, store)
    }

    #[test]
    fn test_store_and_list() {
        let (_dir, store) = store();
        let saved = store
            .store_file("1700000000000", "login page.png", b"\x89PNG")
            .unwrap();
        assert!(saved.filename.starts_with("login_page-"));
        assert!(saved.filename.ends_with(".png"));
        assert!(saved
            .url
            .starts_with("/uploads/screenshots/1700000000000/login_page-"));
        assert_eq!(saved.size, 4);

        let dirs = store.list_run_directories().unwrap();
        assert_eq!(dirs.len(), 1);
        assert_eq!(dirs[0].run_id, "1700000000000");
        assert!(dirs[0].modified.is_some());
        assert!(store.root().join("1700000000000").join(&saved.filename).exists());
    }

    #[test]
    fn test_delete_is_idempotent() {
        let (_dir, store) = store();
        store.store_file("r1", "a.jpg", b"data").unwrap();
        store.delete_run_directory("r1").unwrap();
        store.delete_run_directory("r1").unwrap();
        assert!(store.list_run_directories().unwrap().is_empty());
    }

    #[test]
    fn test_missing_root_lists_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path().join("absent"));
        assert!(store.list_run_directories().unwrap().is_empty());
    }

    #[test]
    fn test_rejects_traversal_and_bad_types() {
        let (_dir, store) = store();
        assert!(matches!(
            store.store_file("../etc", "a.png", b"x"),
            Err(ArtifactError::Invalid(ValidationError::UnsafeRunId(_)))
        ));
        assert!(matches!(
            store.delete_run_directory(".."),
            Err(ArtifactError::Invalid(ValidationError::UnsafeRunId(_)))
        ));
        assert!(matches!(
            store.store_file("r1", "notes.txt", b"x"),
            Err(ArtifactError::Invalid(ValidationError::UnsupportedFileType(_)))
        ));
        assert!(matches!(
            store.store_file("r1", "a.png", b""),
            Err(ArtifactError::Invalid(ValidationError::EmptyUpload))
        ));
    }

    #[test]
    fn test_rejects_oversized_upload() {
        let (_dir, store) = store();
        let big = vec![0u8; MAX_SCREENSHOT_BYTES + 1];
        assert!(matches!(
            store.store_file("r1", "a.png", &big),
            Err(ArtifactError::Invalid(ValidationError::FileTooLarge { .. }))
        ));
    }

    #[test]
    fn test_plain_files_in_root_are_not_runs() {
        let (_dir, store) = store();
        fs::write(store.root().join("stray.txt"), b"x").unwrap();
        assert!(store.list_run_directories().unwrap().is_empty());
    }
}
