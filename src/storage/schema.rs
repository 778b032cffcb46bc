//! Database schema and migrations.

use rusqlite::Connection;

/// Run all pending migrations.
pub fn migrate(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS test_results (
            id INTEGER PRIMARY KEY,
            framework TEXT NOT NULL,
            suite TEXT,
            test_name TEXT NOT NULL,
            status TEXT NOT NULL CHECK (status IN ('passed', 'failed', 'skipped')),
            duration_ms REAL,
            error_message TEXT,
            run_id TEXT NOT NULL,
            timestamp_ms INTEGER NOT NULL,
            extra_json TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_test_results_framework_run
            ON test_results(framework, run_id);
        CREATE INDEX IF NOT EXISTS idx_test_results_run ON test_results(run_id);",
    )?;

    // Reporter-supplied columns added after the first schema.
    add_column_if_missing(conn, "test_results", "html_report_path", "TEXT")?;
    add_column_if_missing(conn, "test_results", "execution_time", "TEXT")?;
    add_column_if_missing(conn, "test_results", "screenshots_json", "TEXT")?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [SCHEMA_VERSION],
    )?;

    Ok(())
}

pub const SCHEMA_VERSION: i64 = 2;

fn add_column_if_missing(
    conn: &Connection,
    table: &str,
    column: &str,
    decl: &str,
) -> rusqlite::Result<()> {
    let present: i64 = conn.query_row(
        &format!("SELECT count(*) FROM pragma_table_info('{table}') WHERE name = ?1"),
        [column],
        |row| row.get(0),
    )?;

    if present == 0 {
        conn.execute(&format!("ALTER TABLE {table} ADD COLUMN {column} {decl}"), [])?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrate_creates_tables() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM test_results", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);

        let cols: i64 = conn
            .query_row(
                "SELECT count(*) FROM pragma_table_info('test_results')
                 WHERE name IN ('html_report_path', 'execution_time', 'screenshots_json')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(cols, 3);
    }

    #[test]
    fn test_migrate_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        migrate(&conn).unwrap(); // Should not error

        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn test_status_constraint() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();

        let res = conn.execute(
            "INSERT INTO test_results (framework, test_name, status, run_id, timestamp_ms)
             VALUES ('f', 't', 'timedOut', 'r', 0)",
            [],
        );
        assert!(res.is_err());
    }
}
