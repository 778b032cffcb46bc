//! Client side of ingestion: reads reporter output from disk and posts it
//! to a running server, one entry at a time.

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::model::{ansi, run_id, ResultPayload, Status};

pub const DEFAULT_SERVER: &str = "http://localhost:5000";
pub const DEFAULT_FRAMEWORK: &str = "qa-playwright";

/// Read a JSON array of reporter entries.
pub fn load_entries(path: &Path) -> Result<Vec<ResultPayload>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read results file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("failed to parse results file: {}", path.display()))
}

/// Fill the gaps a reporter may leave before upload.
///
/// Entries without a run id share one, either `run_id` or a fresh
/// timestamp id. Known statuses are normalized and error messages lose
/// their terminal colour codes; unknown statuses pass through so the server
/// can reject them.
pub fn prepare_entries(
    entries: Vec<ResultPayload>,
    run: Option<&str>,
    framework: Option<&str>,
    now: DateTime<Utc>,
) -> Vec<ResultPayload> {
    let shared_run = run
        .map(str::to_string)
        .unwrap_or_else(|| run_id::from_instant(now));
    let framework = framework.unwrap_or(DEFAULT_FRAMEWORK);

    entries
        .into_iter()
        .map(|mut entry| {
            if entry.run_id.as_deref().map_or(true, |r| r.trim().is_empty()) {
                entry.run_id = Some(shared_run.clone());
            }
            if entry.framework.as_deref().map_or(true, |f| f.trim().is_empty()) {
                entry.framework = Some(framework.to_string());
            }
            if let Some(status) = entry.status.as_deref().and_then(Status::normalize) {
                entry.status = Some(status.as_str().to_string());
            }
            entry.error_message = entry.error_message.map(|m| ansi::strip_ansi(&m));
            entry.timestamp.get_or_insert(now);
            entry
        })
        .collect()
}

pub struct ReporterClient {
    client: reqwest::Client,
    base_url: String,
}

impl ReporterClient {
    pub fn new(server: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("testdash/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to create HTTP client")?;
        Ok(Self {
            client,
            base_url: server.trim_end_matches('/').to_string(),
        })
    }

    /// Post every entry in order, stopping at the first rejected one.
    /// Returns how many were accepted.
    pub async fn submit_all(&self, entries: &[ResultPayload]) -> Result<usize> {
        let url = format!("{}/api/results", self.base_url);
        for (index, entry) in entries.iter().enumerate() {
            let resp = self
                .client
                .post(&url)
                .json(entry)
                .send()
                .await
                .with_context(|| format!("failed to reach {url}"))?;

            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                bail!("entry {index} rejected with {status}: {body}");
            }
            debug!(index, "result submitted");
        }
        info!(count = entries.len(), server = %self.base_url, "results submitted");
        Ok(entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, status: &str) -> ResultPayload {
        ResultPayload {
            test_name: Some(name.into()),
            status: Some(status.into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_missing_run_ids_share_one_timestamp_id() {
        let now = DateTime::from_timestamp_millis(1_700_000_000_000).unwrap();
        let mut with_id = entry("b", "passed");
        with_id.run_id = Some("keep-me".into());

        let out = prepare_entries(vec![entry("a", "passed"), with_id, entry("c", "failed")], None, None, now);
        assert_eq!(out[0].run_id.as_deref(), Some("1700000000000"));
        assert_eq!(out[1].run_id.as_deref(), Some("keep-me"));
        assert_eq!(out[2].run_id.as_deref(), Some("1700000000000"));
        assert!(out.iter().all(|e| e.framework.as_deref() == Some(DEFAULT_FRAMEWORK)));
        assert!(out.iter().all(|e| e.timestamp == Some(now)));
    }

    #[test]
    fn test_explicit_run_and_framework() {
        let out = prepare_entries(vec![entry("a", "passed")], Some("nightly-7"), Some("cypress"), Utc::now());
        assert_eq!(out[0].run_id.as_deref(), Some("nightly-7"));
        assert_eq!(out[0].framework.as_deref(), Some("cypress"));
    }

    #[test]
    fn test_status_normalized_and_ansi_stripped() {
        let mut e = entry("a", "timedOut");
        e.error_message = Some("\u{1b}[31mboom\u{1b}[0m".into());
        let out = prepare_entries(vec![e, entry("b", "interrupted"), entry("c", "weird")], None, None, Utc::now());
        assert_eq!(out[0].status.as_deref(), Some("failed"));
        assert_eq!(out[0].error_message.as_deref(), Some("boom"));
        assert_eq!(out[1].status.as_deref(), Some("skipped"));
        assert_eq!(out[2].status.as_deref(), Some("weird"));
    }

    #[test]
    fn test_load_entries_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");
        std::fs::write(&path, r#"[{"testName":"a","status":"passed"}]"#).unwrap();
        let entries = load_entries(&path).unwrap();
        assert_eq!(entries.len(), 1);
        assert!(load_entries(&dir.path().join("missing.json")).is_err());
    }
}
