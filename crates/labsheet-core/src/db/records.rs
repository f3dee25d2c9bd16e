//! Patient record database operations.
//!
//! The free functions take a plain `&Connection` so they run unchanged inside
//! a transaction; the `Database` methods are thin wrappers for one-shot use.

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{Database, DbError, DbResult};
use crate::models::{PatientRecord, TestResult};

const SELECT_COLUMNS: &str = r#"
    SELECT patient_id, name, age, gender, mobile, tests, created_at, updated_at
    FROM patient_records
"#;

/// Fetch one record by patient ID.
pub fn select_record(conn: &Connection, patient_id: &str) -> DbResult<Option<PatientRecord>> {
    conn.query_row(
        &format!("{SELECT_COLUMNS} WHERE patient_id = ?"),
        [patient_id],
        RecordRow::from_row,
    )
    .optional()?
    .map(|row| row.try_into())
    .transpose()
}

/// Fetch every record in creation order.
pub fn select_all_records(conn: &Connection) -> DbResult<Vec<PatientRecord>> {
    let mut stmt = conn.prepare(&format!("{SELECT_COLUMNS} ORDER BY rowid"))?;
    let rows = stmt.query_map([], RecordRow::from_row)?;

    let mut records = Vec::new();
    for row in rows {
        records.push(row?.try_into()?);
    }
    Ok(records)
}

/// Insert or replace one record.
///
/// Uses an upsert so an existing row keeps its rowid and therefore its
/// position in [`select_all_records`].
pub fn upsert_record(conn: &Connection, record: &PatientRecord) -> DbResult<()> {
    let tests_json = serde_json::to_string(&record.tests)?;
    conn.execute(
        r#"
        INSERT INTO patient_records (
            patient_id, name, age, gender, mobile, tests, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        ON CONFLICT(patient_id) DO UPDATE SET
            name = excluded.name,
            age = excluded.age,
            gender = excluded.gender,
            mobile = excluded.mobile,
            tests = excluded.tests,
            updated_at = excluded.updated_at
        "#,
        params![
            record.patient_id,
            record.name,
            record.age,
            record.gender,
            record.mobile,
            tests_json,
            record.created_at,
            record.updated_at,
        ],
    )?;
    Ok(())
}

/// Delete one record. Returns whether a row was removed.
pub fn delete_record(conn: &Connection, patient_id: &str) -> DbResult<bool> {
    let rows_affected = conn.execute(
        "DELETE FROM patient_records WHERE patient_id = ?",
        [patient_id],
    )?;
    Ok(rows_affected > 0)
}

/// Delete every record. Returns the number of rows removed.
pub fn clear_records(conn: &Connection) -> DbResult<usize> {
    Ok(conn.execute("DELETE FROM patient_records", [])?)
}

/// Number of stored records.
pub fn count_records(conn: &Connection) -> DbResult<usize> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM patient_records", [], |row| {
        row.get(0)
    })?;
    Ok(count as usize)
}

impl Database {
    /// Get a record by patient ID.
    pub fn get_record(&self, patient_id: &str) -> DbResult<Option<PatientRecord>> {
        select_record(&self.conn, patient_id)
    }

    /// List all records in creation order.
    pub fn list_records(&self) -> DbResult<Vec<PatientRecord>> {
        select_all_records(&self.conn)
    }

    /// Insert or replace a record.
    pub fn put_record(&self, record: &PatientRecord) -> DbResult<()> {
        upsert_record(&self.conn, record)
    }

    /// Delete a record.
    pub fn remove_record(&self, patient_id: &str) -> DbResult<bool> {
        delete_record(&self.conn, patient_id)
    }

    /// Delete all records.
    pub fn clear(&self) -> DbResult<usize> {
        clear_records(&self.conn)
    }

    /// Count records.
    pub fn record_count(&self) -> DbResult<usize> {
        count_records(&self.conn)
    }
}

/// Intermediate row struct for database mapping.
struct RecordRow {
    patient_id: String,
    name: Option<String>,
    age: Option<String>,
    gender: Option<String>,
    mobile: Option<String>,
    tests: String,
    created_at: String,
    updated_at: String,
}

impl RecordRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(RecordRow {
            patient_id: row.get(0)?,
            name: row.get(1)?,
            age: row.get(2)?,
            gender: row.get(3)?,
            mobile: row.get(4)?,
            tests: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }
}

impl TryFrom<RecordRow> for PatientRecord {
    type Error = DbError;

    fn try_from(row: RecordRow) -> Result<Self, Self::Error> {
        let tests: Vec<TestResult> = serde_json::from_str(&row.tests)?;

        Ok(PatientRecord {
            patient_id: row.patient_id,
            name: row.name,
            age: row.age,
            gender: row.gender,
            mobile: row.mobile,
            tests,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
