//! SQLite schema definition.

/// Current schema version. There are no migrations; a database written by a
/// different version is rejected on open.
pub const SCHEMA_VERSION: i64 = 1;

/// Complete database schema for labsheet.
pub const SCHEMA: &str = r#"
-- ============================================================================
-- Patient Records
-- ============================================================================

CREATE TABLE IF NOT EXISTS patient_records (
    patient_id TEXT PRIMARY KEY NOT NULL,
    name TEXT,
    age TEXT,
    gender TEXT,
    mobile TEXT,
    tests TEXT NOT NULL DEFAULT '[]',            -- JSON array of TestResult
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- ============================================================================
-- Schema Version
-- ============================================================================

CREATE TABLE IF NOT EXISTS schema_version (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    version INTEGER NOT NULL
);

INSERT OR IGNORE INTO schema_version (id, version) VALUES (1, 1);
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_schema_valid() {
        let conn = Connection::open_in_memory().unwrap();
        let result = conn.execute_batch(SCHEMA);
        assert!(result.is_ok(), "Schema should be valid SQL: {:?}", result);
    }

    #[test]
    fn test_schema_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        assert!(conn.execute_batch(SCHEMA).is_ok());

        let version: i64 = conn
            .query_row("SELECT version FROM schema_version WHERE id = 1", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn test_patient_id_is_unique() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();

        conn.execute("INSERT INTO patient_records (patient_id) VALUES ('P1')", [])
            .unwrap();
        let result = conn.execute("INSERT INTO patient_records (patient_id) VALUES ('P1')", []);
        assert!(result.is_err());
    }

    #[test]
    fn test_single_version_row() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();

        let result = conn.execute("INSERT INTO schema_version (id, version) VALUES (2, 1)", []);
        assert!(result.is_err());
    }
}
