//! Ingestion gateway: validates reporter payloads, stores them, and runs
//! retention for the affected framework before returning.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::aggregate::{self, Aggregator};
use crate::model::{ResultPayload, TestRecord, ValidationError};
use crate::retention::{ArtifactSweep, RetentionEngine, RetentionPolicy, RetentionReport};
use crate::storage::{
    ArtifactError, ArtifactStore, DeletePredicate, RecordFilter, RecordStore, StoreError,
    StoredArtifact,
};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}

/// A stored record plus what retention did afterwards. `retention` is
/// `None` when pruning failed; the record is stored regardless.
#[derive(Debug, Clone, Serialize)]
pub struct Submission {
    pub record: TestRecord,
    pub retention: Option<RetentionReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchSubmission {
    pub records: Vec<TestRecord>,
    pub retention: Vec<RetentionReport>,
}

#[derive(Clone)]
pub struct ResultService {
    records: Arc<dyn RecordStore>,
    artifacts: Arc<dyn ArtifactStore>,
    retention: RetentionEngine,
    aggregator: Aggregator,
}

impl ResultService {
    pub fn new(
        records: Arc<dyn RecordStore>,
        artifacts: Arc<dyn ArtifactStore>,
        policy: RetentionPolicy,
        aggregator: Aggregator,
    ) -> Self {
        let retention = RetentionEngine::new(records.clone(), artifacts.clone(), policy);
        Self {
            records,
            artifacts,
            retention,
            aggregator,
        }
    }

    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    pub fn retention(&self) -> &RetentionEngine {
        &self.retention
    }

    /// Store one result and prune its framework.
    pub fn submit_result(&self, payload: ResultPayload) -> Result<Submission, IngestError> {
        let record = payload.validate(Utc::now())?;
        let stored = self.records.insert(&record)?;
        info!(
            id = stored.id,
            run_id = %stored.run_id,
            framework = %stored.framework,
            status = %stored.status,
            "test result saved"
        );

        let retention = self.enforce_quietly(&stored.framework);
        Ok(Submission {
            record: stored,
            retention,
        })
    }

    /// Store a reporter batch. The whole batch is validated before anything
    /// is written and stored in one transaction. Retention then runs once per
    /// framework touched, which leaves the same window as pruning after every
    /// record.
    pub fn submit_batch(
        &self,
        payloads: Vec<ResultPayload>,
    ) -> Result<BatchSubmission, IngestError> {
        let now = Utc::now();
        let validated = payloads
            .into_iter()
            .enumerate()
            .map(|(index, p)| {
                p.validate(now).map_err(|e| ValidationError::BatchEntry {
                    index,
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let records = self.records.insert_many(&validated)?;
        info!(count = records.len(), "test result batch saved");

        let frameworks: BTreeSet<&str> = records.iter().map(|r| r.framework.as_str()).collect();
        let retention = frameworks
            .into_iter()
            .filter_map(|f| self.enforce_quietly(f))
            .collect();

        Ok(BatchSubmission { records, retention })
    }

    fn enforce_quietly(&self, framework: &str) -> Option<RetentionReport> {
        match self.retention.enforce(framework) {
            Ok(report) => Some(report),
            Err(e) => {
                warn!(%framework, error = %e, "retention failed after insert; result kept");
                None
            }
        }
    }

    /// Prune a framework on demand.
    pub fn prune(&self, framework: &str) -> Result<RetentionReport, IngestError> {
        if framework.trim().is_empty() {
            return Err(ValidationError::MissingField("framework").into());
        }
        Ok(self.retention.enforce(framework)?)
    }

    /// Remove screenshot directories no longer referenced by any record.
    pub fn sweep_artifacts(&self) -> ArtifactSweep {
        self.retention.sweep_artifacts()
    }

    /// Delete every record of a run regardless of the retention window.
    /// The run's screenshots go too, best-effort.
    pub fn delete_run(&self, run_id: &str) -> Result<usize, IngestError> {
        let run_id = run_id.trim();
        if run_id.is_empty() {
            return Err(ValidationError::MissingField("run_id").into());
        }

        let deleted = self.records.delete_where(&DeletePredicate::RunId(run_id))?;
        if let Err(e) = self.artifacts.delete_run_directory(run_id) {
            warn!(%run_id, error = %e, "failed to delete screenshots for purged run");
        }
        info!(%run_id, deleted, "purged run");
        Ok(deleted)
    }

    pub fn attach_screenshot(
        &self,
        run_id: &str,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<StoredArtifact, IngestError> {
        let stored = self.artifacts.store_file(run_id.trim(), file_name, bytes)?;
        info!(%run_id, file = %stored.filename, size = stored.size, "screenshot stored");
        Ok(stored)
    }

    /// Every stored record, optionally limited to one framework
    /// (`"Unknown"` selects records without one).
    pub fn list_all(&self, framework: Option<&str>) -> Result<Vec<TestRecord>, IngestError> {
        let records = self.records.query_all(&RecordFilter::default())?;
        Ok(aggregate::filter_framework(records, framework))
    }
}
