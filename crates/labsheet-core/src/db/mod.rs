//! Database layer for labsheet.

mod records;
mod schema;

pub use records::*;
pub use schema::*;

use std::path::Path;
use std::time::Duration;

use rusqlite::{Connection, TransactionBehavior};
use thiserror::Error;

use crate::config::StoreConfig;

/// Database errors.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Constraint violation: {0}")]
    Constraint(String),
}

pub type DbResult<T> = Result<T, DbError>;

/// Database connection wrapper.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open database at path, creating if needed.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let config = StoreConfig {
            database_path: Some(path.as_ref().to_path_buf()),
            ..StoreConfig::default()
        };
        Self::open_with(&config)
    }

    /// Create in-memory database (for testing).
    pub fn open_in_memory() -> DbResult<Self> {
        Self::open_with(&StoreConfig::default())
    }

    /// Open the database described by `config`.
    pub fn open_with(config: &StoreConfig) -> DbResult<Self> {
        let conn = match &config.database_path {
            Some(path) => Connection::open(path)?,
            None => Connection::open_in_memory()?,
        };
        let db = Self { conn };
        db.initialize(config)?;
        tracing::info!(
            path = ?config.database_path,
            journal_mode = config.journal_mode.as_pragma(),
            "Record database opened"
        );
        Ok(db)
    }

    /// Configure the connection and initialize schema.
    fn initialize(&self, config: &StoreConfig) -> DbResult<()> {
        self.conn
            .busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
        self.conn.execute_batch(&format!(
            "PRAGMA journal_mode={};",
            config.journal_mode.as_pragma()
        ))?;
        self.conn.execute_batch(SCHEMA)?;

        let version = self.schema_version()?;
        if version != SCHEMA_VERSION {
            return Err(DbError::Constraint(format!(
                "Unsupported schema version {} (expected {})",
                version, SCHEMA_VERSION
            )));
        }
        Ok(())
    }

    /// Stored schema version.
    pub fn schema_version(&self) -> DbResult<i64> {
        Ok(self
            .conn
            .query_row("SELECT version FROM schema_version WHERE id = 1", [], |row| {
                row.get(0)
            })?)
    }

    /// Get raw connection (for advanced queries).
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Begin a write transaction that takes the database lock up front.
    pub fn transaction(&mut self) -> DbResult<rusqlite::Transaction<'_>> {
        Ok(self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JournalMode;

    #[test]
    fn test_open_in_memory() {
        let db = Database::open_in_memory();
        assert!(db.is_ok());
    }

    #[test]
    fn test_schema_initialized() {
        let db = Database::open_in_memory().unwrap();

        let tables: Vec<String> = db
            .conn()
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();

        assert!(tables.contains(&"patient_records".to_string()));
        assert!(tables.contains(&"schema_version".to_string()));
        assert_eq!(db.schema_version().unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_open_file_with_wal() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig {
            database_path: Some(dir.path().join("records.db")),
            journal_mode: JournalMode::Wal,
            ..StoreConfig::default()
        };
        let db = Database::open_with(&config).unwrap();

        let mode: String = db
            .conn()
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
    }

    #[test]
    fn test_rejects_foreign_schema_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.db");
        {
            let db = Database::open(&path).unwrap();
            db.conn()
                .execute("UPDATE schema_version SET version = 7 WHERE id = 1", [])
                .unwrap();
        }

        let result = Database::open(&path);
        assert!(matches!(result, Err(DbError::Constraint(_))));
    }
}
