//! Test result records: the wire payload reporters send, the validated
//! record the store accepts, and the stored record the dashboard reads.

pub mod ansi;
pub mod run_id;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Rejections raised before anything is persisted.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("unknown test status '{0}' (expected passed, failed, skipped, timedOut or interrupted)")]
    UnknownStatus(String),

    #[error("duration must be non-negative, got {0}")]
    NegativeDuration(f64),

    #[error("entry {index} of batch rejected: {reason}")]
    BatchEntry { index: usize, reason: String },

    #[error("run_id '{0}' cannot be used as an artifact directory name")]
    UnsafeRunId(String),

    #[error("file name '{0}' is not usable")]
    InvalidFileName(String),

    #[error("file type '{0}' is not allowed; only jpeg, jpg, png, gif and webp images are accepted")]
    UnsupportedFileType(String),

    #[error("upload is {size} bytes, limit is {limit}")]
    FileTooLarge { size: usize, limit: usize },

    #[error("upload body is empty")]
    EmptyUpload,
}

/// Normalized outcome of a single test case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Passed,
    Failed,
    Skipped,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Passed => "passed",
            Status::Failed => "failed",
            Status::Skipped => "skipped",
        }
    }

    /// Map a reporter status onto the stored set. Playwright's `timedOut`
    /// counts as a failure and `interrupted` as a skip.
    pub fn normalize(raw: &str) -> Option<Status> {
        match raw.trim() {
            "passed" => Some(Status::Passed),
            "failed" | "timedOut" => Some(Status::Failed),
            "skipped" | "interrupted" => Some(Status::Skipped),
            _ => None,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Status::normalize(s).ok_or_else(|| ValidationError::UnknownStatus(s.to_string()))
    }
}

/// A captured screenshot reference attached to a failed test.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Screenshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// A result entry exactly as a reporter posts it. Every field is optional
/// here; [`ResultPayload::validate`] decides what is acceptable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub framework: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suite: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(rename = "run_id", default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html_report_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshots: Option<Vec<Screenshot>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
}

impl ResultPayload {
    /// Check required fields, normalize the status, strip ANSI from the
    /// error message and stamp the record with `now` if it carries no
    /// timestamp of its own.
    pub fn validate(self, now: DateTime<Utc>) -> Result<NewRecord, ValidationError> {
        let run_id = required(self.run_id, "run_id")?;
        let framework = required(self.framework, "framework")?;
        let test_name = required(self.test_name, "testName")?;
        let status: Status = required(self.status, "status")?.parse()?;

        if let Some(d) = self.duration {
            // NaN fails this comparison too
            if !(d >= 0.0) {
                return Err(ValidationError::NegativeDuration(d));
            }
        }

        let error_message = match status {
            Status::Failed => self
                .error_message
                .map(|m| ansi::strip_ansi(&m))
                .filter(|m| !m.is_empty()),
            _ => None,
        };

        Ok(NewRecord {
            framework,
            suite: non_empty(self.suite),
            test_name,
            status,
            duration: self.duration,
            error_message,
            run_id,
            timestamp: self.timestamp.unwrap_or(now),
            execution_time: non_empty(self.execution_time),
            html_report_path: non_empty(self.html_report_path),
            screenshots: self.screenshots.unwrap_or_default(),
            extra: self.extra.filter(|v| !v.is_null()),
        })
    }
}

fn required(value: Option<String>, field: &'static str) -> Result<String, ValidationError> {
    non_empty(value).ok_or(ValidationError::MissingField(field))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// A validated record ready to be inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRecord {
    pub framework: String,
    pub suite: Option<String>,
    pub test_name: String,
    pub status: Status,
    pub duration: Option<f64>,
    pub error_message: Option<String>,
    pub run_id: String,
    pub timestamp: DateTime<Utc>,
    pub execution_time: Option<String>,
    pub html_report_path: Option<String>,
    pub screenshots: Vec<Screenshot>,
    pub extra: Option<serde_json::Value>,
}

impl NewRecord {
    /// Attach the store-assigned id.
    pub fn into_stored(self, id: i64) -> TestRecord {
        TestRecord {
            id,
            framework: self.framework,
            suite: self.suite,
            test_name: self.test_name,
            status: self.status,
            duration: self.duration,
            error_message: self.error_message,
            run_id: self.run_id,
            timestamp: self.timestamp,
            execution_time: self.execution_time,
            html_report_path: self.html_report_path,
            screenshots: self.screenshots,
            extra: self.extra,
        }
    }
}

/// One stored test-case outcome. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRecord {
    pub id: i64,
    pub framework: String,
    pub suite: Option<String>,
    pub test_name: String,
    pub status: Status,
    pub duration: Option<f64>,
    pub error_message: Option<String>,
    #[serde(rename = "run_id")]
    pub run_id: String,
    pub timestamp: DateTime<Utc>,
    pub execution_time: Option<String>,
    pub html_report_path: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub screenshots: Vec<Screenshot>,
    pub extra: Option<serde_json::Value>,
}
