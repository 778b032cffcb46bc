//! Dashboard views computed from raw records: per-run summaries, run
//! drill-downs and daily/weekly trend series. Everything here is pure and
//! total; malformed run ids degrade to string ordering instead of failing.

pub mod labels;
pub mod trend;

pub use self::labels::{BucketMode, Labeler};
pub use self::trend::{CountPoint, TrendPoint};

use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap};

use serde::Serialize;

use crate::model::{run_id, Status, TestRecord};

/// Display name for records posted without a framework.
pub const UNKNOWN_FRAMEWORK: &str = "Unknown";

/// Pass/fail/skip tallies shared by every view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counts {
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl Counts {
    pub fn add(&mut self, status: Status) {
        match status {
            Status::Passed => self.passed += 1,
            Status::Failed => self.failed += 1,
            Status::Skipped => self.skipped += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.passed + self.failed + self.skipped
    }

    /// Share of passed tests, 0.0 for an empty run.
    pub fn pass_percent(&self) -> f64 {
        match self.total() {
            0 => 0.0,
            total => self.passed as f64 * 100.0 / total as f64,
        }
    }
}

/// One row of the "latest executions" table.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    #[serde(rename = "run_id")]
    pub run_id: String,
    pub framework: String,
    pub label: String,
    #[serde(flatten)]
    pub counts: Counts,
    pub execution_time: String,
}

/// Everything recorded for one run, split by outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunDetail {
    pub run_key: String,
    pub framework: Option<String>,
    pub counts: Counts,
    pub passed: Vec<TestRecord>,
    pub failed: Vec<TestRecord>,
    pub skipped: Vec<TestRecord>,
}

pub fn framework_name(record: &TestRecord) -> &str {
    match record.framework.trim() {
        "" => UNKNOWN_FRAMEWORK,
        name => name,
    }
}

/// Keep records of one framework; `None` or `"All"` keeps everything.
pub fn filter_framework(mut records: Vec<TestRecord>, framework: Option<&str>) -> Vec<TestRecord> {
    match framework.map(str::trim) {
        None | Some("") | Some("All") => records,
        Some(wanted) => {
            records.retain(|r| framework_name(r) == wanted);
            records
        }
    }
}

/// Sorted distinct framework names.
pub fn frameworks(records: &[TestRecord]) -> Vec<String> {
    records
        .iter()
        .map(|r| framework_name(r).to_string())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Aggregator {
    labels: Labeler,
}

impl Aggregator {
    pub fn new(labels: Labeler) -> Self {
        Self { labels }
    }

    pub fn labels(&self) -> &Labeler {
        &self.labels
    }

    /// Summaries keyed by (run id, framework), most recent run first.
    pub fn group_by_run(&self, records: &[TestRecord]) -> Vec<RunSummary> {
        let mut index: HashMap<(&str, &str), usize> = HashMap::new();
        let mut summaries: Vec<RunSummary> = Vec::new();

        for record in records {
            let framework = framework_name(record);
            let slot = *index
                .entry((record.run_id.as_str(), framework))
                .or_insert_with(|| {
                    summaries.push(RunSummary {
                        run_id: record.run_id.clone(),
                        framework: framework.to_string(),
                        label: self.labels.run_label(&record.run_id),
                        counts: Counts::default(),
                        execution_time: String::new(),
                    });
                    summaries.len() - 1
                });

            let summary = &mut summaries[slot];
            summary.counts.add(record.status);
            if summary.execution_time.is_empty() {
                if let Some(t) = record.execution_time.as_deref().filter(|t| !t.is_empty()) {
                    summary.execution_time = t.to_string();
                }
            }
        }

        for summary in &mut summaries {
            if summary.execution_time.is_empty() {
                summary.execution_time = "N/A".to_string();
            }
        }

        let keys = run_id::SortKeys::for_ids(summaries.iter().map(|s| s.run_id.as_str()));
        summaries.sort_by_cached_key(|s| (Reverse(keys.key(&s.run_id)), s.framework.clone()));
        summaries
    }

    /// Records of one run. `run_key` may be the raw run id or its formatted
    /// label, as the table links use the label.
    pub fn run_detail(
        &self,
        records: &[TestRecord],
        run_key: &str,
        framework: Option<&str>,
    ) -> Option<RunDetail> {
        let framework = framework.map(str::trim).filter(|f| !f.is_empty());
        let mut detail = RunDetail {
            run_key: run_key.to_string(),
            framework: framework.map(str::to_string),
            counts: Counts::default(),
            passed: Vec::new(),
            failed: Vec::new(),
            skipped: Vec::new(),
        };

        let matching = records.iter().filter(|r| {
            (r.run_id == run_key || self.labels.run_label(&r.run_id) == run_key)
                && framework.map_or(true, |f| framework_name(r) == f)
        });
        for record in matching {
            detail.counts.add(record.status);
            let bucket = match record.status {
                Status::Passed => &mut detail.passed,
                Status::Failed => &mut detail.failed,
                Status::Skipped => &mut detail.skipped,
            };
            bucket.push(record.clone());
        }

        (detail.counts.total() > 0).then_some(detail)
    }
}
