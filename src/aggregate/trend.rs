//! Trend series for the two dashboard charts.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use super::labels::{compare_bucket_labels, BucketMode};
use super::{Aggregator, Counts};
use crate::model::TestRecord;

/// One bar of the pass/fail chart: a single run inside its bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrendPoint {
    #[serde(rename = "run_id")]
    pub run_id: String,
    pub label: String,
    #[serde(flatten)]
    pub counts: Counts,
}

/// One bar of the automation-count chart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CountPoint {
    pub label: String,
    pub count: usize,
}

impl Aggregator {
    /// Per-run pass/fail/skip counts labelled with the run's bucket, in
    /// bucket date order and then run id order.
    pub fn pass_fail_trend(&self, records: &[TestRecord], mode: BucketMode) -> Vec<TrendPoint> {
        let mut index: HashMap<&str, usize> = HashMap::new();
        let mut points: Vec<TrendPoint> = Vec::new();

        for record in records {
            let slot = *index.entry(record.run_id.as_str()).or_insert_with(|| {
                points.push(TrendPoint {
                    run_id: record.run_id.clone(),
                    label: self.labels().bucket_key(&record.run_id, mode),
                    counts: Counts::default(),
                });
                points.len() - 1
            });
            points[slot].counts.add(record.status);
        }

        points.sort_by(|a, b| {
            compare_bucket_labels(&a.label, &b.label).then_with(|| a.run_id.cmp(&b.run_id))
        });
        points
    }

    /// Largest single run per bucket.
    ///
    /// Retries and partial runs that land in the same bucket would inflate a
    /// sum, so each bucket reports the biggest run it contains.
    pub fn automation_count_trend(
        &self,
        records: &[TestRecord],
        mode: BucketMode,
    ) -> Vec<CountPoint> {
        let mut per_run: BTreeMap<&str, usize> = BTreeMap::new();
        for record in records {
            *per_run.entry(record.run_id.as_str()).or_default() += 1;
        }

        let mut buckets: HashMap<String, usize> = HashMap::new();
        for (run_id, count) in per_run {
            let max = buckets.entry(self.labels().bucket_key(run_id, mode)).or_default();
            *max = (*max).max(count);
        }

        let mut points: Vec<CountPoint> = buckets
            .into_iter()
            .map(|(label, count)| CountPoint { label, count })
            .collect();
        points.sort_by(|a, b| {
            compare_bucket_labels(&a.label, &b.label).then_with(|| a.label.cmp(&b.label))
        });
        points
    }
}
