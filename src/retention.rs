//! Per-framework run retention.
//!
//! After every insert the engine keeps the `keep_runs` most recently active
//! runs of the inserted record's framework and deletes the records of every
//! other run of that framework. Screenshot directories are then reconciled
//! against the run ids that still have records anywhere: dropped runs lose
//! theirs at once, other unreferenced directories once past the grace period.
//!
//! The two stores are not transactional. A crash between the record delete
//! and the directory sweep leaves orphaned directories behind; the next sweep
//! (any framework's insert, or `testdash prune`) removes them.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::storage::{ArtifactStore, DeletePredicate, RecordStore, RunActivity, StoreError};

pub const DEFAULT_KEEP_RUNS: usize = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Distinct runs kept per framework.
    pub keep_runs: usize,
    /// Unreferenced screenshot directories younger than this survive the
    /// sweep, so uploads that precede their first record are not reaped.
    pub artifact_grace: Duration,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            keep_runs: DEFAULT_KEEP_RUNS,
            artifact_grace: Duration::minutes(10),
        }
    }
}

/// What one enforcement pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RetentionReport {
    pub framework: String,
    pub kept_runs: Vec<String>,
    pub dropped_runs: Vec<String>,
    pub deleted_records: usize,
    #[serde(flatten)]
    pub sweep: ArtifactSweep,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ArtifactSweep {
    pub deleted_artifacts: Vec<String>,
    pub artifact_errors: usize,
}

/// Split runs into (keep, drop): newest activity first, ties broken by run id
/// descending, first `keep` ids kept.
pub fn select_keep_set(mut runs: Vec<RunActivity>, keep: usize) -> (Vec<String>, Vec<String>) {
    runs.sort_by(|a, b| {
        b.last_activity
            .cmp(&a.last_activity)
            .then_with(|| b.run_id.cmp(&a.run_id))
    });
    let dropped = runs.split_off(keep.min(runs.len()));
    (
        runs.into_iter().map(|r| r.run_id).collect(),
        dropped.into_iter().map(|r| r.run_id).collect(),
    )
}

#[derive(Clone)]
pub struct RetentionEngine {
    records: Arc<dyn RecordStore>,
    artifacts: Arc<dyn ArtifactStore>,
    policy: RetentionPolicy,
}

impl RetentionEngine {
    pub fn new(
        records: Arc<dyn RecordStore>,
        artifacts: Arc<dyn ArtifactStore>,
        policy: RetentionPolicy,
    ) -> Self {
        Self {
            records,
            artifacts,
            policy,
        }
    }

    pub fn policy(&self) -> &RetentionPolicy {
        &self.policy
    }

    /// Prune `framework` down to its retention window, then reconcile artifacts.
    ///
    /// Only record-store failures are returned. Artifact failures are logged
    /// and counted in the report.
    pub fn enforce(&self, framework: &str) -> Result<RetentionReport, StoreError> {
        let framework = framework.trim();
        if framework.is_empty() {
            debug!("no framework on record, skipping retention");
            return Ok(RetentionReport::default());
        }

        let activity = self.records.grouped_latest_activity(framework)?;
        let (kept_runs, dropped_runs) = select_keep_set(activity, self.policy.keep_runs);

        // Delete by the explicit dropped set so a run that appears after the
        // read above is never caught by this pass.
        let deleted_records = self.records.delete_where(&DeletePredicate::FrameworkRuns {
            framework,
            run_ids: &dropped_runs,
        })?;

        if deleted_records > 0 {
            info!(
                %framework,
                runs = dropped_runs.len(),
                records = deleted_records,
                kept = kept_runs.len(),
                "pruned runs outside retention window"
            );
        }

        let dropped: HashSet<&str> = dropped_runs.iter().map(String::as_str).collect();
        let sweep = self.reconcile(&dropped);

        Ok(RetentionReport {
            framework: framework.to_string(),
            kept_runs,
            dropped_runs,
            deleted_records,
            sweep,
        })
    }

    /// Delete every run directory whose run id has no records left under any
    /// framework and that is older than the grace period. Never fails; safe
    /// to re-run at any time.
    pub fn sweep_artifacts(&self) -> ArtifactSweep {
        self.reconcile(&HashSet::new())
    }

    /// Remove unreferenced run directories. Runs in `dropped` just left a
    /// retention window and had records, so the grace period does not apply
    /// to them.
    fn reconcile(&self, dropped: &HashSet<&str>) -> ArtifactSweep {
        let mut sweep = ArtifactSweep::default();

        let live = match self.records.live_run_ids() {
            Ok(live) => live,
            Err(e) => {
                warn!(error = %e, "could not read live runs, skipping screenshot cleanup");
                sweep.artifact_errors += 1;
                return sweep;
            }
        };
        let dirs = match self.artifacts.list_run_directories() {
            Ok(dirs) => dirs,
            Err(e) => {
                warn!(error = %e, "could not list screenshot directories");
                sweep.artifact_errors += 1;
                return sweep;
            }
        };

        let now = Utc::now();
        for dir in dirs {
            if live.contains(&dir.run_id) {
                continue;
            }
            let fresh = !dropped.contains(dir.run_id.as_str())
                && dir
                    .modified
                    .is_some_and(|m| now.signed_duration_since(m) < self.policy.artifact_grace);
            if fresh {
                debug!(run_id = %dir.run_id, "unreferenced screenshots still within grace period");
                continue;
            }
            match self.artifacts.delete_run_directory(&dir.run_id) {
                Ok(()) => sweep.deleted_artifacts.push(dir.run_id),
                Err(e) => {
                    warn!(run_id = %dir.run_id, error = %e, "failed to delete old screenshots");
                    sweep.artifact_errors += 1;
                }
            }
        }
        sweep
    }
}
