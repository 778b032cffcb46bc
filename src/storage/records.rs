//! Record store: append-only test results with bulk predicate deletion.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};

use super::{Pool, StoreError};
use crate::model::{NewRecord, Screenshot, Status, TestRecord};

/// Exact-match query filter. `None` fields match everything.
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    pub framework: Option<String>,
    pub run_id: Option<String>,
}

impl RecordFilter {
    pub fn framework(framework: impl Into<String>) -> Self {
        Self {
            framework: Some(framework.into()),
            run_id: None,
        }
    }
}

/// Rows to remove in one statement.
#[derive(Debug, Clone, Copy)]
pub enum DeletePredicate<'a> {
    /// Every record of a run, across frameworks.
    RunId(&'a str),
    /// Records of `framework` belonging to any of `run_ids`.
    FrameworkRuns {
        framework: &'a str,
        run_ids: &'a [String],
    },
}

/// A run's id with the newest record timestamp seen for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunActivity {
    pub run_id: String,
    pub last_activity: DateTime<Utc>,
}

pub trait RecordStore: Send + Sync {
    fn insert(&self, record: &NewRecord) -> Result<TestRecord, StoreError>;

    /// Insert all of `records` or none of them.
    fn insert_many(&self, records: &[NewRecord]) -> Result<Vec<TestRecord>, StoreError>;

    /// Records matching `filter`, in insertion order.
    fn query_all(&self, filter: &RecordFilter) -> Result<Vec<TestRecord>, StoreError>;

    /// Returns the number of records removed.
    fn delete_where(&self, predicate: &DeletePredicate<'_>) -> Result<usize, StoreError>;

    /// One entry per distinct run id under `framework`.
    fn grouped_latest_activity(&self, framework: &str) -> Result<Vec<RunActivity>, StoreError>;

    /// Every run id that still has at least one record, any framework.
    fn live_run_ids(&self) -> Result<HashSet<String>, StoreError>;
}

#[derive(Clone)]
pub struct SqliteRecordStore {
    pool: Pool,
}

impl SqliteRecordStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }
}

const SELECT_COLUMNS: &str = "SELECT id, framework, suite, test_name, status, duration_ms,
        error_message, run_id, timestamp_ms, execution_time, html_report_path,
        screenshots_json, extra_json
     FROM test_results";

fn insert_on(conn: &Connection, record: &NewRecord) -> Result<TestRecord, StoreError> {
    let screenshots_json = if record.screenshots.is_empty() {
        None
    } else {
        Some(
            serde_json::to_string(&record.screenshots).map_err(|source| StoreError::Encode {
                column: "screenshots_json",
                source,
            })?,
        )
    };
    let extra_json = record
        .extra
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|source| StoreError::Encode {
            column: "extra_json",
            source,
        })?;

    conn.execute(
        "INSERT INTO test_results (framework, suite, test_name, status, duration_ms,
            error_message, run_id, timestamp_ms, execution_time, html_report_path,
            screenshots_json, extra_json)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            record.framework,
            record.suite,
            record.test_name,
            record.status.as_str(),
            record.duration,
            record.error_message,
            record.run_id,
            record.timestamp.timestamp_millis(),
            record.execution_time,
            record.html_report_path,
            screenshots_json,
            extra_json,
        ],
    )?;
    let id = conn.last_insert_rowid();

    Ok(record.clone().into_stored(id))
}

impl RecordStore for SqliteRecordStore {
    fn insert(&self, record: &NewRecord) -> Result<TestRecord, StoreError> {
        let conn = self.pool.get()?;
        insert_on(&conn, record)
    }

    fn insert_many(&self, records: &[NewRecord]) -> Result<Vec<TestRecord>, StoreError> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;
        let stored = records
            .iter()
            .map(|record| insert_on(&tx, record))
            .collect::<Result<Vec<_>, _>>()?;
        tx.commit()?;
        Ok(stored)
    }

    fn query_all(&self, filter: &RecordFilter) -> Result<Vec<TestRecord>, StoreError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "{SELECT_COLUMNS}
             WHERE (?1 IS NULL OR framework = ?1)
               AND (?2 IS NULL OR run_id = ?2)
             ORDER BY id"
        ))?;

        let rows = stmt
            .query_map(params![filter.framework, filter.run_id], RawRecord::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(RawRecord::into_record).collect()
    }

    fn delete_where(&self, predicate: &DeletePredicate<'_>) -> Result<usize, StoreError> {
        let conn = self.pool.get()?;
        let deleted = match predicate {
            DeletePredicate::RunId(run_id) => {
                conn.execute("DELETE FROM test_results WHERE run_id = ?1", params![run_id])?
            }
            DeletePredicate::FrameworkRuns { run_ids, .. } if run_ids.is_empty() => 0,
            DeletePredicate::FrameworkRuns { framework, run_ids } => {
                let ids = serde_json::to_string(run_ids).map_err(|source| StoreError::Encode {
                    column: "run_id",
                    source,
                })?;
                conn.execute(
                    "DELETE FROM test_results
                     WHERE framework = ?1
                       AND run_id IN (SELECT value FROM json_each(?2))",
                    params![framework, ids],
                )?
            }
        };
        Ok(deleted)
    }

    fn grouped_latest_activity(&self, framework: &str) -> Result<Vec<RunActivity>, StoreError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT run_id, MAX(timestamp_ms) FROM test_results
             WHERE framework = ?1
             GROUP BY run_id",
        )?;

        let rows = stmt
            .query_map([framework], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(run_id, ms)| {
                let last_activity =
                    DateTime::from_timestamp_millis(ms).ok_or_else(|| StoreError::Corrupt {
                        id: 0,
                        reason: format!("run {run_id} has out-of-range timestamp {ms}"),
                    })?;
                Ok(RunActivity {
                    run_id,
                    last_activity,
                })
            })
            .collect()
    }

    fn live_run_ids(&self) -> Result<HashSet<String>, StoreError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare("SELECT DISTINCT run_id FROM test_results")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<HashSet<_>, _>>()?;
        Ok(ids)
    }
}

/// A row as SQLite hands it back, before JSON columns are decoded.
struct RawRecord {
    id: i64,
    framework: String,
    suite: Option<String>,
    test_name: String,
    status: String,
    duration: Option<f64>,
    error_message: Option<String>,
    run_id: String,
    timestamp_ms: i64,
    execution_time: Option<String>,
    html_report_path: Option<String>,
    screenshots_json: Option<String>,
    extra_json: Option<String>,
}

impl RawRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            framework: row.get(1)?,
            suite: row.get(2)?,
            test_name: row.get(3)?,
            status: row.get(4)?,
            duration: row.get(5)?,
            error_message: row.get(6)?,
            run_id: row.get(7)?,
            timestamp_ms: row.get(8)?,
            execution_time: row.get(9)?,
            html_report_path: row.get(10)?,
            screenshots_json: row.get(11)?,
            extra_json: row.get(12)?,
        })
    }

    fn into_record(self) -> Result<TestRecord, StoreError> {
        let id = self.id;
        let corrupt = |reason: String| StoreError::Corrupt { id, reason };

        let status = self
            .status
            .parse::<Status>()
            .map_err(|e| corrupt(e.to_string()))?;
        let timestamp = DateTime::from_timestamp_millis(self.timestamp_ms)
            .ok_or_else(|| corrupt(format!("timestamp {} out of range", self.timestamp_ms)))?;
        let screenshots: Vec<Screenshot> = match self.screenshots_json {
            Some(json) => serde_json::from_str(&json)
                .map_err(|e| corrupt(format!("screenshots_json: {e}")))?,
            None => Vec::new(),
        };
        let extra = self
            .extra_json
            .map(|json| serde_json::from_str(&json))
            .transpose()
            .map_err(|e| corrupt(format!("extra_json: {e}")))?;

        Ok(TestRecord {
            id,
            framework: self.framework,
            suite: self.suite,
            test_name: self.test_name,
            status,
            duration: self.duration,
            error_message: self.error_message,
            run_id: self.run_id,
            timestamp,
            execution_time: self.execution_time,
            html_report_path: self.html_report_path,
            screenshots,
            extra,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::open_pool;
    use chrono::TimeZone;

    fn store() -> (tempfile::TempDir, SqliteRecordStore) {
        let dir = tempfile::tempdir().unwrap();
        let pool = open_pool(&dir.path().join("results.db")).unwrap();
        (dir, SqliteRecordStore::new(pool))
    }

    fn record(framework: &str, run_id: &str, minute: u32) -> NewRecord {
        NewRecord {
            framework: framework.into(),
            suite: Some("suite".into()),
            test_name: format!("test {minute}"),
            status: Status::Passed,
            duration: Some(12.5),
            error_message: None,
            run_id: run_id.into(),
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 10, minute, 0).unwrap(),
            execution_time: None,
            html_report_path: None,
            screenshots: Vec::new(),
            extra: None,
        }
    }

    #[test]
    fn test_insert_and_query_round_trip_with_json_columns() {
        let (_dir, store) = store();
        let mut rec = record("web", "r1", 0);
        rec.status = Status::Failed;
        rec.error_message = Some("boom".into());
        rec.screenshots = vec![Screenshot {
            url: Some("/uploads/screenshots/r1/a.png".into()),
            name: Some("a".into()),
            ..Default::default()
        }];
        rec.extra = Some(serde_json::json!({"retry": 1}));

        let stored = store.insert(&rec).unwrap();
        assert!(stored.id > 0);

        let all = store.query_all(&RecordFilter::default()).unwrap();
        assert_eq!(all, vec![stored]);
    }

    #[test]
    fn test_query_filters() {
        let (_dir, store) = store();
        store.insert(&record("web", "r1", 0)).unwrap();
        store.insert(&record("api", "r2", 1)).unwrap();
        store.insert(&record("web", "r3", 2)).unwrap();

        let web = store.query_all(&RecordFilter::framework("web")).unwrap();
        assert_eq!(web.len(), 2);

        let r2 = store
            .query_all(&RecordFilter {
                framework: None,
                run_id: Some("r2".into()),
            })
            .unwrap();
        assert_eq!(r2.len(), 1);
        assert_eq!(r2[0].framework, "api");
    }

    #[test]
    fn test_grouped_latest_activity_takes_max() {
        let (_dir, store) = store();
        store.insert(&record("web", "r1", 5)).unwrap();
        store.insert(&record("web", "r1", 9)).unwrap();
        store.insert(&record("web", "r2", 7)).unwrap();
        store.insert(&record("api", "r3", 59)).unwrap();

        let mut activity = store.grouped_latest_activity("web").unwrap();
        activity.sort_by(|a, b| a.run_id.cmp(&b.run_id));
        assert_eq!(activity.len(), 2);
        assert_eq!(
            activity[0].last_activity,
            Utc.with_ymd_and_hms(2024, 3, 1, 10, 9, 0).unwrap()
        );
        assert_eq!(activity[1].run_id, "r2");
    }

    #[test]
    fn test_delete_framework_runs_scoped_to_framework() {
        let (_dir, store) = store();
        store.insert(&record("web", "shared", 0)).unwrap();
        store.insert(&record("api", "shared", 1)).unwrap();
        store.insert(&record("web", "r2", 2)).unwrap();

        let doomed = vec!["shared".to_string()];
        let n = store
            .delete_where(&DeletePredicate::FrameworkRuns {
                framework: "web",
                run_ids: &doomed,
            })
            .unwrap();
        assert_eq!(n, 1);

        let left = store.query_all(&RecordFilter::default()).unwrap();
        assert_eq!(left.len(), 2);
        assert!(left.iter().any(|r| r.framework == "api" && r.run_id == "shared"));
    }

    #[test]
    fn test_delete_by_run_id_spans_frameworks() {
        let (_dir, store) = store();
        store.insert(&record("web", "shared", 0)).unwrap();
        store.insert(&record("api", "shared", 1)).unwrap();
        store.insert(&record("web", "r2", 2)).unwrap();

        assert_eq!(store.delete_where(&DeletePredicate::RunId("shared")).unwrap(), 2);
        assert_eq!(store.delete_where(&DeletePredicate::RunId("shared")).unwrap(), 0);
        assert_eq!(
            store.live_run_ids().unwrap(),
            HashSet::from(["r2".to_string()])
        );
    }

    #[test]
    fn test_insert_many_is_all_or_nothing() {
        let (_dir, store) = store();
        store
            .pool()
            .get()
            .unwrap()
            .execute_batch(
                "CREATE TRIGGER reject_boom BEFORE INSERT ON test_results
                 WHEN NEW.test_name = 'boom'
                 BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
            )
            .unwrap();

        let mut bad = record("web", "r1", 1);
        bad.test_name = "boom".into();
        assert!(store.insert_many(&[record("web", "r1", 0), bad]).is_err());
        assert!(store.query_all(&RecordFilter::default()).unwrap().is_empty());

        let stored = store
            .insert_many(&[record("web", "r1", 0), record("web", "r1", 1)])
            .unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(store.query_all(&RecordFilter::default()).unwrap(), stored);
    }
}
