//! Labsheet Core Library
//!
//! Local store for patient demographics and lab results scraped from a
//! hospital portal, with a pivoted CSV report over the whole dataset.
//!
//! # Architecture
//!
//! ```text
//!  Scraper / UI surfaces
//!          │  {"type": ..., "data": ...}
//!          ▼
//!     MessageBus ──────────────► ReportBuilder
//!          │                    (pivot / long CSV)
//!          ▼                           ▲
//!     RecordStore ── get_all_records ──┘
//!          │
//!   ┌──────┴───────┐
//!   ▼              ▼
//! SQLite      Subscribers
//! (patient_records)  ("dataUpdated")
//! ```
//!
//! # Core Principle
//!
//! **The store is the only writer.** Every mutation is a read-modify-write in
//! one transaction; listeners hear about it only after commit.
//!
//! # Modules
//!
//! - [`db`]: SQLite persistence for patient records
//! - [`models`]: Domain types (PatientRecord, ProfileInput, TestResult)
//! - [`store`]: Record store with change notifications
//! - [`report`]: Pivoted and long-format reports, listing view
//! - [`bus`]: JSON message contract
//! - [`config`]: Store and report configuration

pub mod bus;
pub mod config;
pub mod db;
pub mod models;
pub mod report;
pub mod store;

// Re-export commonly used types
pub use bus::{MessageBus, Request, Response};
pub use config::{LabsheetConfig, ReportConfig, StoreConfig};
pub use db::Database;
pub use models::{PatientRecord, ProfileInput, TestResult};
pub use report::{AbbreviationTable, LongReport, PivotReport, ReportArtifact, ReportBuilder};
pub use store::{
    AppendOutcome, ChangeEvent, ChangeKind, ChangeListener, ImportSummary, RecordStore,
    SubscriptionId, TestRemoval,
};

// UniFFI setup - using proc macros
uniffi::setup_scaffolding!();

use std::sync::Arc;

use report::SortOrder;
use store::NotifyError;

// =========================================================================
// FFI Error Type
// =========================================================================

#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum LabsheetError {
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Index out of range: {0}")]
    IndexOutOfRange(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("No data available to export")]
    NoData,

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Config error: {0}")]
    ConfigError(String),
}

impl From<store::StoreError> for LabsheetError {
    fn from(e: store::StoreError) -> Self {
        use store::StoreError;
        match e {
            StoreError::NotPersisted(_) | StoreError::StorageUnavailable(_) => {
                LabsheetError::DatabaseError(e.to_string())
            }
            StoreError::PatientNotFound(id) => LabsheetError::NotFound(id),
            StoreError::IndexOutOfRange { .. } => LabsheetError::IndexOutOfRange(e.to_string()),
            StoreError::InvalidInput(msg) => LabsheetError::InvalidInput(msg),
        }
    }
}

impl From<report::ReportError> for LabsheetError {
    fn from(e: report::ReportError) -> Self {
        use report::ReportError;
        match e {
            ReportError::NoData => LabsheetError::NoData,
            ReportError::SerializationFailed(_) => LabsheetError::SerializationError(e.to_string()),
            ReportError::MalformedInput(msg) => LabsheetError::InvalidInput(msg),
        }
    }
}

impl From<config::ConfigError> for LabsheetError {
    fn from(e: config::ConfigError) -> Self {
        LabsheetError::ConfigError(e.to_string())
    }
}

// =========================================================================
// Factory Functions (exported to FFI)
// =========================================================================

/// Open or create a store at the given path.
#[uniffi::export]
pub fn open_store(path: String) -> Result<Arc<LabsheetCore>, LabsheetError> {
    let store = RecordStore::open(&path)?;
    Ok(LabsheetCore::new(store, ReportBuilder::default()))
}

/// Create an in-memory store (for testing).
#[uniffi::export]
pub fn open_store_in_memory() -> Result<Arc<LabsheetCore>, LabsheetError> {
    let store = RecordStore::open_in_memory()?;
    Ok(LabsheetCore::new(store, ReportBuilder::default()))
}

/// Open a store from a JSON configuration document.
#[uniffi::export]
pub fn open_store_with_config(config_json: String) -> Result<Arc<LabsheetCore>, LabsheetError> {
    let config = LabsheetConfig::from_json(&config_json)?;
    let store = RecordStore::open_with(&config.store)?;
    Ok(LabsheetCore::new(store, ReportBuilder::from_config(&config.report)))
}

// =========================================================================
// Callback Interface
// =========================================================================

/// Host-side listener for committed dataset changes.
#[uniffi::export(callback_interface)]
pub trait DataChangedCallback: Send + Sync {
    fn on_data_changed(&self, event: FfiChangeEvent);
}

struct CallbackListener(Box<dyn DataChangedCallback>);

impl ChangeListener for CallbackListener {
    fn notify(&self, event: &ChangeEvent) -> Result<(), NotifyError> {
        self.0.on_data_changed(event.clone().into());
        Ok(())
    }
}

// =========================================================================
// Main API Object
// =========================================================================

/// Thread-safe store and report handle for FFI.
#[derive(uniffi::Object)]
pub struct LabsheetCore {
    store: Arc<RecordStore>,
    bus: MessageBus,
}

impl LabsheetCore {
    fn new(store: RecordStore, builder: ReportBuilder) -> Arc<Self> {
        let store = Arc::new(store);
        Arc::new(Self {
            bus: MessageBus::new(Arc::clone(&store), builder),
            store,
        })
    }
}

#[uniffi::export]
impl LabsheetCore {
    // =========================================================================
    // Record Operations
    // =========================================================================

    /// Create or update a patient's demographics.
    pub fn upsert_patient_profile(
        &self,
        profile: FfiProfileInput,
    ) -> Result<FfiPatientRecord, LabsheetError> {
        let record = self.store.upsert_patient_profile(profile.into())?;
        Ok(record.into())
    }

    /// Append a test result to an existing patient.
    pub fn append_test_result(
        &self,
        patient_id: String,
        test: FfiTestResult,
    ) -> Result<FfiAppendOutcome, LabsheetError> {
        let outcome = self.store.append_test_result(&patient_id, test.into())?;
        Ok(outcome.into())
    }

    /// Get every record in creation order.
    pub fn get_all_records(&self) -> Result<Vec<FfiPatientRecord>, LabsheetError> {
        let records = self.store.get_all_records()?;
        Ok(records.into_iter().map(|r| r.into()).collect())
    }

    /// Get a record by patient ID.
    pub fn get_record(&self, patient_id: String) -> Result<Option<FfiPatientRecord>, LabsheetError> {
        let record = self.store.get_record(&patient_id)?;
        Ok(record.map(|r| r.into()))
    }

    /// Delete a patient and all their tests.
    pub fn delete_patient(&self, patient_id: String) -> Result<bool, LabsheetError> {
        Ok(self.store.delete_patient(&patient_id)?)
    }

    /// Delete one test by position.
    pub fn delete_test(&self, patient_id: String, index: u32) -> Result<FfiTestRemoval, LabsheetError> {
        let removal = self.store.delete_test(&patient_id, index as usize)?;
        Ok(removal.into())
    }

    /// Remove every record.
    pub fn clear_all(&self) -> Result<u32, LabsheetError> {
        Ok(saturating_u32(self.store.clear_all()?))
    }

    /// Number of stored patients.
    pub fn record_count(&self) -> Result<u32, LabsheetError> {
        Ok(saturating_u32(self.store.record_count()?))
    }

    // =========================================================================
    // Report Operations
    // =========================================================================

    /// Generate the pivoted CSV report.
    pub fn generate_report(&self) -> Result<FfiReportArtifact, LabsheetError> {
        let records = self.store.get_all_records()?;
        let builder = self.report_builder();
        Ok(builder.export(&records)?.into())
    }

    /// Generate the long-format CSV report.
    pub fn export_long_report(&self) -> Result<FfiReportArtifact, LabsheetError> {
        let records = self.store.get_all_records()?;
        let builder = self.report_builder();
        Ok(builder.export_long(&records)?.into())
    }

    /// Import long-format CSV through the profile and test paths.
    pub fn import_long_csv(&self, csv: String) -> Result<FfiImportSummary, LabsheetError> {
        let rows = report::parse_long_csv(&csv)?;
        let summary = self.store.import_long_rows(&rows)?;
        Ok(summary.into())
    }

    /// Flat listing for display.
    pub fn get_listing(&self, newest_first: bool) -> Result<Vec<FfiListingRow>, LabsheetError> {
        let order = if newest_first {
            SortOrder::NewestFirst
        } else {
            SortOrder::OldestFirst
        };
        let records = self.store.get_all_records()?;
        Ok(report::listing_rows(&records, order)
            .into_iter()
            .map(|r| r.into())
            .collect())
    }

    // =========================================================================
    // Messaging
    // =========================================================================

    /// Handle one JSON bus message and return the JSON reply.
    pub fn handle_message(&self, message_json: String) -> String {
        self.bus.handle_json(&message_json)
    }

    /// Register a change callback. Returns the subscription ID.
    pub fn subscribe(&self, callback: Box<dyn DataChangedCallback>) -> String {
        self.store
            .subscribe(Arc::new(CallbackListener(callback)))
            .to_string()
    }

    /// Remove a change callback. Unknown IDs return false.
    pub fn unsubscribe(&self, subscription_id: String) -> bool {
        SubscriptionId::parse(&subscription_id)
            .map(|id| self.store.unsubscribe(id))
            .unwrap_or(false)
    }
}

impl LabsheetCore {
    fn report_builder(&self) -> &ReportBuilder {
        self.bus.report_builder()
    }
}

// =========================================================================
// FFI Types
// =========================================================================

/// FFI-safe profile input.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiProfileInput {
    pub patient_id: String,
    pub name: Option<String>,
    pub age: Option<String>,
    pub gender: Option<String>,
    pub mobile: Option<String>,
}

impl From<FfiProfileInput> for ProfileInput {
    fn from(profile: FfiProfileInput) -> Self {
        ProfileInput {
            patient_id: profile.patient_id,
            name: profile.name,
            age: profile.age,
            gender: profile.gender,
            mobile: profile.mobile,
            ..ProfileInput::default()
        }
    }
}

/// FFI-safe test result.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiTestResult {
    pub test_name: String,
    pub result_value: String,
    pub approved_on: String,
}

impl From<TestResult> for FfiTestResult {
    fn from(test: TestResult) -> Self {
        Self {
            test_name: test.test_name,
            result_value: test.result_value,
            approved_on: test.approved_on,
        }
    }
}

impl From<FfiTestResult> for TestResult {
    fn from(test: FfiTestResult) -> Self {
        TestResult::new(test.test_name, test.result_value, test.approved_on)
    }
}

/// FFI-safe patient record.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPatientRecord {
    pub patient_id: String,
    pub name: Option<String>,
    pub age: Option<String>,
    pub gender: Option<String>,
    pub mobile: Option<String>,
    pub tests: Vec<FfiTestResult>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<PatientRecord> for FfiPatientRecord {
    fn from(record: PatientRecord) -> Self {
        Self {
            patient_id: record.patient_id,
            name: record.name,
            age: record.age,
            gender: record.gender,
            mobile: record.mobile,
            tests: record.tests.into_iter().map(|t| t.into()).collect(),
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

/// FFI-safe append outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum FfiAppendOutcome {
    Saved,
    Duplicate,
    PatientNotFound,
}

impl From<AppendOutcome> for FfiAppendOutcome {
    fn from(outcome: AppendOutcome) -> Self {
        match outcome {
            AppendOutcome::Saved => FfiAppendOutcome::Saved,
            AppendOutcome::Duplicate => FfiAppendOutcome::Duplicate,
            AppendOutcome::PatientNotFound => FfiAppendOutcome::PatientNotFound,
        }
    }
}

/// Counts cross the FFI as `u32`; anything larger is clamped.
fn saturating_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

/// FFI-safe test removal result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum FfiTestRemoval {
    Removed { remaining: u32 },
    PatientRemoved,
}

impl From<TestRemoval> for FfiTestRemoval {
    fn from(removal: TestRemoval) -> Self {
        match removal {
            TestRemoval::Removed { remaining } => FfiTestRemoval::Removed {
                remaining: saturating_u32(remaining),
            },
            TestRemoval::PatientRemoved => FfiTestRemoval::PatientRemoved,
        }
    }
}

/// FFI-safe report artifact.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiReportArtifact {
    pub file_name: String,
    pub content: String,
    pub columns: Vec<String>,
    pub row_count: u32,
    pub digest: String,
}

impl From<ReportArtifact> for FfiReportArtifact {
    fn from(artifact: ReportArtifact) -> Self {
        Self {
            file_name: artifact.file_name,
            content: artifact.content,
            columns: artifact.columns,
            row_count: saturating_u32(artifact.row_count),
            digest: artifact.digest,
        }
    }
}

/// FFI-safe import summary.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiImportSummary {
    pub profiles: u32,
    pub tests_saved: u32,
    pub duplicates: u32,
}

impl From<ImportSummary> for FfiImportSummary {
    fn from(summary: ImportSummary) -> Self {
        Self {
            profiles: saturating_u32(summary.profiles),
            tests_saved: saturating_u32(summary.tests_saved),
            duplicates: saturating_u32(summary.duplicates),
        }
    }
}

/// FFI-safe listing row.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiListingRow {
    pub serial: u32,
    pub patient_id: String,
    pub name: Option<String>,
    pub test_name: Option<String>,
    pub result_value: Option<String>,
    pub approved_on: Option<String>,
    pub test_index: Option<u32>,
}

impl From<report::ListingRow> for FfiListingRow {
    fn from(row: report::ListingRow) -> Self {
        Self {
            serial: saturating_u32(row.serial),
            patient_id: row.patient_id,
            name: row.name,
            test_name: row.test_name,
            result_value: row.result_value,
            approved_on: row.approved_on,
            test_index: row.test_index.map(saturating_u32),
        }
    }
}

/// FFI-safe change kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum FfiChangeKind {
    ProfileSaved,
    TestSaved,
    PatientDeleted,
    TestDeleted,
    Cleared,
    Imported,
}

impl From<ChangeKind> for FfiChangeKind {
    fn from(kind: ChangeKind) -> Self {
        match kind {
            ChangeKind::ProfileSaved => FfiChangeKind::ProfileSaved,
            ChangeKind::TestSaved => FfiChangeKind::TestSaved,
            ChangeKind::PatientDeleted => FfiChangeKind::PatientDeleted,
            ChangeKind::TestDeleted => FfiChangeKind::TestDeleted,
            ChangeKind::Cleared => FfiChangeKind::Cleared,
            ChangeKind::Imported => FfiChangeKind::Imported,
        }
    }
}

/// FFI-safe change event.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiChangeEvent {
    pub tag: String,
    pub kind: FfiChangeKind,
    pub patient_id: Option<String>,
    pub at: String,
}

impl From<ChangeEvent> for FfiChangeEvent {
    fn from(event: ChangeEvent) -> Self {
        Self {
            tag: event.tag,
            kind: event.kind.into(),
            patient_id: event.patient_id,
            at: event.at,
        }
    }
}
