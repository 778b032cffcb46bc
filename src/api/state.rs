use std::path::PathBuf;

use crate::ingest::ResultService;

#[derive(Clone)]
pub struct AppState {
    pub service: ResultService,
    /// Directory served under `/uploads/screenshots`.
    pub artifact_root: PathBuf,
}
