//! The record store: single owner of the patient/test dataset.
//!
//! Every mutation is a read-modify-write inside one immediate SQLite
//! transaction, taken while holding the connection mutex. Two writers for the
//! same patient therefore never interleave, and a failed write leaves the
//! previous row intact. Subscribers hear about committed changes only.

mod notify;

pub use notify::*;

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::Transaction;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::StoreConfig;
use crate::db::{self, Database, DbError};
use crate::models::{PatientRecord, ProfileInput, TestResult};
use crate::report::LongRow;

/// Store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Record not persisted: {0}")]
    NotPersisted(#[source] DbError),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(#[source] DbError),

    #[error("Patient not found: {0}")]
    PatientNotFound(String),

    #[error("Test index {index} out of range for {len} tests")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Result of appending a test result.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum AppendOutcome {
    Saved,
    /// Same name, value and approval date already stored; nothing changed
    Duplicate,
    /// The profile has to be saved before its tests
    PatientNotFound,
}

/// Result of a successful single-test deletion.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TestRemoval {
    /// The entry is gone and the patient keeps `remaining` tests
    Removed { remaining: usize },
    /// That was the last test; the patient record was deleted with it
    PatientRemoved,
}

/// Counts from a bulk import.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub profiles: usize,
    pub tests_saved: usize,
    pub duplicates: usize,
}

/// Owned, thread-safe patient record store.
pub struct RecordStore {
    db: Mutex<Database>,
    subscribers: Subscribers,
}

impl RecordStore {
    /// Wrap an already opened database.
    pub fn new(db: Database) -> Self {
        Self {
            db: Mutex::new(db),
            subscribers: Subscribers::new(),
        }
    }

    /// Open a file-backed store.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let db = Database::open(path).map_err(StoreError::StorageUnavailable)?;
        Ok(Self::new(db))
    }

    /// Open an in-memory store.
    pub fn open_in_memory() -> StoreResult<Self> {
        let db = Database::open_in_memory().map_err(StoreError::StorageUnavailable)?;
        Ok(Self::new(db))
    }

    /// Open the store described by `config`.
    pub fn open_with(config: &StoreConfig) -> StoreResult<Self> {
        let db = Database::open_with(config).map_err(StoreError::StorageUnavailable)?;
        Ok(Self::new(db))
    }

    // =========================================================================
    // Subscriptions
    // =========================================================================

    /// Register a change listener.
    pub fn subscribe(&self, listener: Arc<dyn ChangeListener>) -> SubscriptionId {
        self.subscribers.subscribe(listener)
    }

    /// Remove a change listener.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.subscribers.unsubscribe(id)
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Create or update a patient's demographics.
    ///
    /// Fields outside the stored demographic set are stripped first. An
    /// existing record keeps its tests.
    pub fn upsert_patient_profile(&self, mut profile: ProfileInput) -> StoreResult<PatientRecord> {
        require_patient_id(&profile.patient_id)?;

        let stripped = profile.sanitize();
        if !stripped.is_empty() {
            tracing::debug!(patient_id = %profile.patient_id, ?stripped, "Stripped disallowed profile fields");
        }

        let record = self.write(|tx| {
            let record = upsert_profile(tx, &profile)?;
            Ok(record)
        })?;

        tracing::debug!(patient_id = %record.patient_id, tests = record.tests.len(), "Profile saved");
        self.notify(ChangeKind::ProfileSaved, Some(&record.patient_id));
        Ok(record)
    }

    /// Append a test result unless the patient already has an identical one.
    pub fn append_test_result(&self, patient_id: &str, test: TestResult) -> StoreResult<AppendOutcome> {
        require_patient_id(patient_id)?;

        let outcome = self.write(|tx| {
            let Some(mut record) = db::select_record(tx, patient_id)? else {
                return Ok(AppendOutcome::PatientNotFound);
            };
            if record.has_duplicate(&test) {
                return Ok(AppendOutcome::Duplicate);
            }
            record.tests.push(test);
            record.touch();
            db::upsert_record(tx, &record)?;
            Ok(AppendOutcome::Saved)
        })?;

        tracing::debug!(patient_id, ?outcome, "Test result processed");
        if outcome == AppendOutcome::Saved {
            self.notify(ChangeKind::TestSaved, Some(patient_id));
        }
        Ok(outcome)
    }

    /// Delete a whole patient record. Deleting an unknown patient succeeds.
    ///
    /// Returns whether a record was removed.
    pub fn delete_patient(&self, patient_id: &str) -> StoreResult<bool> {
        let removed = self.write(|tx| Ok(db::delete_record(tx, patient_id)?))?;

        tracing::debug!(patient_id, removed, "Patient delete processed");
        if removed {
            self.notify(ChangeKind::PatientDeleted, Some(patient_id));
        }
        Ok(removed)
    }

    /// Delete one test by position. Removing the last test deletes the patient.
    pub fn delete_test(&self, patient_id: &str, index: usize) -> StoreResult<TestRemoval> {
        let removal = self.write_checked(|tx| {
            let mut record = db::select_record(tx, patient_id)
                .map_err(StoreError::NotPersisted)?
                .ok_or_else(|| StoreError::PatientNotFound(patient_id.to_string()))?;

            let len = record.tests.len();
            if index >= len {
                return Err(StoreError::IndexOutOfRange { index, len });
            }
            record.tests.remove(index);

            if record.tests.is_empty() {
                db::delete_record(tx, patient_id).map_err(StoreError::NotPersisted)?;
                Ok(TestRemoval::PatientRemoved)
            } else {
                record.touch();
                db::upsert_record(tx, &record).map_err(StoreError::NotPersisted)?;
                Ok(TestRemoval::Removed {
                    remaining: record.tests.len(),
                })
            }
        })?;

        tracing::debug!(patient_id, index, ?removal, "Test deleted");
        let kind = match removal {
            TestRemoval::Removed { .. } => ChangeKind::TestDeleted,
            TestRemoval::PatientRemoved => ChangeKind::PatientDeleted,
        };
        self.notify(kind, Some(patient_id));
        Ok(removal)
    }

    /// Remove every record in one statement. Returns how many were removed.
    pub fn clear_all(&self) -> StoreResult<usize> {
        let removed = self.write(|tx| Ok(db::clear_records(tx)?))?;

        tracing::info!(removed, "All patient records cleared");
        self.notify(ChangeKind::Cleared, None);
        Ok(removed)
    }

    /// Feed long-format rows through the profile and test paths in one batch.
    ///
    /// Each row upserts its patient's demographics; rows with a test name also
    /// append that test, skipping duplicates.
    pub fn import_long_rows(&self, rows: &[LongRow]) -> StoreResult<ImportSummary> {
        if let Some(row) = rows.iter().find(|row| row.patient_id.trim().is_empty()) {
            return Err(StoreError::InvalidInput(format!(
                "Import row without patient ID (test {:?})",
                row.test_name
            )));
        }

        let summary = self.write(|tx| {
            let mut summary = ImportSummary::default();
            let mut seen = std::collections::HashSet::new();
            for row in rows {
                let mut record = upsert_profile(tx, &row.profile())?;
                if seen.insert(row.patient_id.as_str()) {
                    summary.profiles += 1;
                }

                let Some(test) = row.test() else { continue };
                if record.has_duplicate(&test) {
                    summary.duplicates += 1;
                    continue;
                }
                record.tests.push(test);
                record.touch();
                db::upsert_record(tx, &record)?;
                summary.tests_saved += 1;
            }
            Ok(summary)
        })?;

        tracing::info!(
            profiles = summary.profiles,
            tests_saved = summary.tests_saved,
            duplicates = summary.duplicates,
            "Long-format rows imported"
        );
        if summary.profiles > 0 {
            self.notify(ChangeKind::Imported, None);
        }
        Ok(summary)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Snapshot of every record, in creation order.
    pub fn get_all_records(&self) -> StoreResult<Vec<PatientRecord>> {
        self.lock()
            .list_records()
            .map_err(StoreError::StorageUnavailable)
    }

    /// One record, or `None` if unknown.
    pub fn get_record(&self, patient_id: &str) -> StoreResult<Option<PatientRecord>> {
        self.lock()
            .get_record(patient_id)
            .map_err(StoreError::StorageUnavailable)
    }

    /// Number of stored records.
    pub fn record_count(&self) -> StoreResult<usize> {
        self.lock()
            .record_count()
            .map_err(StoreError::StorageUnavailable)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn lock(&self) -> MutexGuard<'_, Database> {
        // An interrupted transaction rolls back on drop, so the connection is
        // consistent even if a previous holder panicked.
        self.db.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run `f` in an immediate transaction, mapping storage errors to
    /// `NotPersisted`.
    fn write<T>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T, DbError>) -> StoreResult<T> {
        self.write_checked(|tx| f(tx).map_err(StoreError::NotPersisted))
    }

    /// Run `f` in an immediate transaction. Any error rolls the whole
    /// transaction back.
    fn write_checked<T>(
        &self,
        f: impl FnOnce(&Transaction<'_>) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let mut db = self.lock();
        let tx = db.transaction().map_err(StoreError::NotPersisted)?;
        let value = f(&tx)?;
        tx.commit()
            .map_err(|e| StoreError::NotPersisted(DbError::from(e)))?;
        Ok(value)
    }

    fn notify(&self, kind: ChangeKind, patient_id: Option<&str>) {
        self.subscribers.broadcast(&ChangeEvent::new(kind, patient_id));
    }
}

fn require_patient_id(patient_id: &str) -> StoreResult<()> {
    if patient_id.trim().is_empty() {
        return Err(StoreError::InvalidInput("patient ID is empty".into()));
    }
    Ok(())
}

/// Create or merge one profile inside an open transaction.
fn upsert_profile(tx: &Transaction<'_>, profile: &ProfileInput) -> Result<PatientRecord, DbError> {
    let record = match db::select_record(tx, &profile.patient_id)? {
        Some(mut existing) => {
            existing.merge_profile(profile);
            existing.touch();
            existing
        }
        None => PatientRecord::from_profile(profile),
    };
    db::upsert_record(tx, &record)?;
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn fbs(value: &str) -> TestResult {
        TestResult::new("FBS - Fasting Blood Sugar", value, "2024-01-01")
    }

    fn setup_store() -> RecordStore {
        let store = RecordStore::open_in_memory().unwrap();
        store
            .upsert_patient_profile(ProfileInput::new("P1").with_name("Asha"))
            .unwrap();
        store
    }

    #[test]
    fn test_upsert_creates_profile_only_record() {
        let store = setup_store();
        let record = store.get_record("P1").unwrap().unwrap();
        assert_eq!(record.name.as_deref(), Some("Asha"));
        assert!(record.tests.is_empty());
    }

    #[test]
    fn test_upsert_rejects_blank_id() {
        let store = RecordStore::open_in_memory().unwrap();
        let result = store.upsert_patient_profile(ProfileInput::new("  "));
        assert!(matches!(result, Err(StoreError::InvalidInput(_))));
        assert_eq!(store.record_count().unwrap(), 0);
    }

    #[test]
    fn test_append_then_duplicate() {
        let store = setup_store();
        assert_eq!(store.append_test_result("P1", fbs("95")).unwrap(), AppendOutcome::Saved);
        assert_eq!(store.append_test_result("P1", fbs("95")).unwrap(), AppendOutcome::Duplicate);
        assert_eq!(store.get_record("P1").unwrap().unwrap().tests.len(), 1);
    }

    #[test]
    fn test_append_unknown_patient() {
        let store = setup_store();
        assert_eq!(
            store.append_test_result("P2", fbs("95")).unwrap(),
            AppendOutcome::PatientNotFound
        );
        assert!(store.get_record("P2").unwrap().is_none());
    }

    #[test]
    fn test_delete_test_keeps_other_entries() {
        let store = setup_store();
        store.append_test_result("P1", fbs("95")).unwrap();
        store.append_test_result("P1", fbs("101")).unwrap();
        store.append_test_result("P1", fbs("110")).unwrap();

        assert_eq!(
            store.delete_test("P1", 1).unwrap(),
            TestRemoval::Removed { remaining: 2 }
        );
        let values: Vec<_> = store
            .get_record("P1")
            .unwrap()
            .unwrap()
            .tests
            .into_iter()
            .map(|t| t.result_value)
            .collect();
        assert_eq!(values, vec!["95", "110"]);
    }

    #[test]
    fn test_delete_test_errors() {
        let store = setup_store();
        store.append_test_result("P1", fbs("95")).unwrap();

        assert!(matches!(
            store.delete_test("P1", 1),
            Err(StoreError::IndexOutOfRange { index: 1, len: 1 })
        ));
        assert!(matches!(
            store.delete_test("P9", 0),
            Err(StoreError::PatientNotFound(id)) if id == "P9"
        ));
        assert_eq!(store.get_record("P1").unwrap().unwrap().tests.len(), 1);
    }

    #[test]
    fn test_delete_test_on_profile_only_record() {
        let store = setup_store();
        assert!(matches!(
            store.delete_test("P1", 0),
            Err(StoreError::IndexOutOfRange { index: 0, len: 0 })
        ));
        assert!(store.get_record("P1").unwrap().is_some());
    }

    #[test]
    fn test_delete_last_test_removes_patient() {
        let store = setup_store();
        store.append_test_result("P1", fbs("95")).unwrap();

        assert_eq!(store.delete_test("P1", 0).unwrap(), TestRemoval::PatientRemoved);
        assert!(store.get_record("P1").unwrap().is_none());
    }

    #[test]
    fn test_delete_patient_is_idempotent() {
        let store = setup_store();
        assert!(store.delete_patient("P1").unwrap());
        assert!(!store.delete_patient("P1").unwrap());
    }

    #[test]
    fn test_notifications() {
        let store = setup_store();
        let (tx, rx) = mpsc::channel();
        store.subscribe(Arc::new(tx));

        store.append_test_result("P1", fbs("95")).unwrap();
        store.append_test_result("P1", fbs("95")).unwrap(); // duplicate, silent
        store.delete_patient("P404").unwrap(); // no-op, silent
        store.delete_test("P1", 0).unwrap();
        store.clear_all().unwrap();

        let kinds: Vec<_> = rx.try_iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![ChangeKind::TestSaved, ChangeKind::PatientDeleted, ChangeKind::Cleared]
        );
    }

    #[test]
    fn test_failed_validation_does_not_notify() {
        let store = setup_store();
        let (tx, rx) = mpsc::channel();
        store.subscribe(Arc::new(tx));

        assert!(store.delete_test("P1", 3).is_err());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_import_long_rows() {
        let store = setup_store();
        let rows = vec![
            LongRow::new("P1", "FBS - Fasting Blood Sugar", "95", "2024-01-01"),
            LongRow::new("P1", "FBS - Fasting Blood Sugar", "95", "2024-01-01"),
            LongRow::new("P2", "RBS - Random Blood Sugar", "120", "2024-01-02"),
            LongRow::new("P3", "", "", ""),
        ];

        let summary = store.import_long_rows(&rows).unwrap();
        assert_eq!(
            summary,
            ImportSummary {
                profiles: 3,
                tests_saved: 2,
                duplicates: 1
            }
        );
        assert_eq!(store.get_record("P1").unwrap().unwrap().name.as_deref(), Some("Asha"));
        assert!(store.get_record("P3").unwrap().unwrap().tests.is_empty());
    }

    #[test]
    fn test_import_rejects_blank_id_without_writing() {
        let store = setup_store();
        let rows = vec![
            LongRow::new("P2", "FBS - Fasting Blood Sugar", "95", "2024-01-01"),
            LongRow::new(" ", "FBS - Fasting Blood Sugar", "95", "2024-01-01"),
        ];

        assert!(matches!(store.import_long_rows(&rows), Err(StoreError::InvalidInput(_))));
        assert!(store.get_record("P2").unwrap().is_none());
    }
}
