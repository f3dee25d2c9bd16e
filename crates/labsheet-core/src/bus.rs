//! JSON message contract between UI surfaces and the core.
//!
//! Requests are `{"type": ..., "data": ...}` objects. Every request gets
//! exactly one response object tagged by `status`, including unknown and
//! malformed ones, so callers never wait on a reply that will not come.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::models::{PatientRecord, ProfileInput, TestResult};
use crate::report::{
    listing_rows, parse_long_csv, ListingRow, ReportArtifact, ReportBuilder, ReportError, SortOrder,
};
use crate::store::{AppendOutcome, ImportSummary, RecordStore, StoreError};

/// Request tags accepted by [`parse_request`], legacy names included.
const KNOWN_TYPES: &[&str] = &[
    "saveProfile",
    "savePatientData",
    "saveTest",
    "saveTestData",
    "getAllRecords",
    "getPatientRecords",
    "getRecord",
    "deletePatient",
    "deleteRecord",
    "deleteTest",
    "clearAll",
    "clearData",
    "generateReport",
    "exportLong",
    "importLong",
    "getListing",
];

/// Bus-level decode errors.
#[derive(Error, Debug)]
pub enum BusError {
    #[error("Unrecognized message type: {0}")]
    Unrecognized(String),

    #[error("Malformed message: {0}")]
    Malformed(String),
}

/// Inbound messages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum Request {
    #[serde(alias = "savePatientData")]
    SaveProfile(ProfileInput),
    #[serde(alias = "saveTestData")]
    SaveTest(SaveTestPayload),
    #[serde(alias = "getPatientRecords")]
    GetAllRecords,
    GetRecord(PatientRef),
    #[serde(alias = "deleteRecord")]
    DeletePatient(PatientRef),
    DeleteTest(TestRef),
    #[serde(alias = "clearData")]
    ClearAll,
    GenerateReport,
    ExportLong,
    ImportLong(ImportPayload),
    GetListing(ListingPayload),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SaveTestPayload {
    #[serde(alias = "PID")]
    pub patient_id: String,
    #[serde(flatten)]
    pub test: TestResult,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PatientRef {
    #[serde(alias = "pid", alias = "PID")]
    pub patient_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TestRef {
    #[serde(alias = "pid", alias = "PID")]
    pub patient_id: String,
    /// Signed so that a negative index is answered, not rejected as malformed
    pub index: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImportPayload {
    pub csv: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ListingPayload {
    #[serde(default)]
    pub order: SortOrder,
}

/// Outbound replies.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum Response {
    Ok,
    Saved,
    Duplicate,
    #[serde(rename_all = "camelCase")]
    PatientNotFound { patient_id: String },
    Records { records: Vec<PatientRecord> },
    Record { record: PatientRecord },
    #[serde(rename_all = "camelCase")]
    NotFound { patient_id: String },
    IndexOutOfRange { index: i64, len: usize },
    Report { artifact: ReportArtifact },
    NoData,
    Listing { rows: Vec<ListingRow> },
    Imported { summary: ImportSummary },
    #[serde(rename_all = "camelCase")]
    Unrecognized { message_type: String },
    Error { code: String, message: String },
}

impl Response {
    fn error(code: &str, message: impl ToString) -> Self {
        Response::Error {
            code: code.to_string(),
            message: message.to_string(),
        }
    }
}

impl From<StoreError> for Response {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::PatientNotFound(patient_id) => Response::PatientNotFound { patient_id },
            StoreError::IndexOutOfRange { index, len } => Response::IndexOutOfRange {
                index: i64::try_from(index).unwrap_or(i64::MAX),
                len,
            },
            StoreError::NotPersisted(_) => Response::error("notPersisted", e),
            StoreError::StorageUnavailable(_) => Response::error("storageUnavailable", e),
            StoreError::InvalidInput(_) => Response::error("invalidInput", e),
        }
    }
}

impl From<ReportError> for Response {
    fn from(e: ReportError) -> Self {
        match e {
            ReportError::NoData => Response::NoData,
            ReportError::SerializationFailed(_) => Response::error("serializationFailed", e),
            ReportError::MalformedInput(_) => Response::error("malformedInput", e),
        }
    }
}

impl From<BusError> for Response {
    fn from(e: BusError) -> Self {
        match e {
            BusError::Unrecognized(message_type) => Response::Unrecognized { message_type },
            BusError::Malformed(_) => Response::error("malformed", e),
        }
    }
}

/// Decode a request, telling unknown tags apart from bad payloads.
pub fn parse_request(json: &str) -> Result<Request, BusError> {
    let value: Value = serde_json::from_str(json).map_err(|e| BusError::Malformed(e.to_string()))?;
    let tag = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| BusError::Malformed("missing string field `type`".into()))?;
    if !KNOWN_TYPES.contains(&tag) {
        return Err(BusError::Unrecognized(tag.to_string()));
    }
    serde_json::from_value(value).map_err(|e| BusError::Malformed(e.to_string()))
}

/// Routes requests to the store and the report builder.
pub struct MessageBus {
    store: Arc<RecordStore>,
    builder: ReportBuilder,
}

impl MessageBus {
    pub fn new(store: Arc<RecordStore>, builder: ReportBuilder) -> Self {
        Self { store, builder }
    }

    pub fn store(&self) -> &Arc<RecordStore> {
        &self.store
    }

    pub fn report_builder(&self) -> &ReportBuilder {
        &self.builder
    }

    /// Handle one decoded request.
    pub fn dispatch(&self, request: Request) -> Response {
        match request {
            Request::SaveProfile(profile) => match self.store.upsert_patient_profile(profile) {
                Ok(_) => Response::Ok,
                Err(e) => e.into(),
            },
            Request::SaveTest(SaveTestPayload { patient_id, test }) => {
                match self.store.append_test_result(&patient_id, test) {
                    Ok(AppendOutcome::Saved) => Response::Saved,
                    Ok(AppendOutcome::Duplicate) => Response::Duplicate,
                    Ok(AppendOutcome::PatientNotFound) => Response::PatientNotFound { patient_id },
                    Err(e) => e.into(),
                }
            }
            Request::GetAllRecords => match self.store.get_all_records() {
                Ok(records) => Response::Records { records },
                Err(e) => e.into(),
            },
            Request::GetRecord(PatientRef { patient_id }) => match self.store.get_record(&patient_id) {
                Ok(Some(record)) => Response::Record { record },
                Ok(None) => Response::NotFound { patient_id },
                Err(e) => e.into(),
            },
            Request::DeletePatient(PatientRef { patient_id }) => {
                match self.store.delete_patient(&patient_id) {
                    Ok(_) => Response::Ok,
                    Err(e) => e.into(),
                }
            }
            Request::DeleteTest(test_ref) => self.delete_test(test_ref),
            Request::ClearAll => match self.store.clear_all() {
                Ok(_) => Response::Ok,
                Err(e) => e.into(),
            },
            Request::GenerateReport => self.report(|builder, records| builder.export(records)),
            Request::ExportLong => self.report(|builder, records| builder.export_long(records)),
            Request::ImportLong(ImportPayload { csv }) => {
                let rows = match parse_long_csv(&csv) {
                    Ok(rows) => rows,
                    Err(e) => return e.into(),
                };
                match self.store.import_long_rows(&rows) {
                    Ok(summary) => Response::Imported { summary },
                    Err(e) => e.into(),
                }
            }
            Request::GetListing(ListingPayload { order }) => match self.store.get_all_records() {
                Ok(records) => Response::Listing {
                    rows: listing_rows(&records, order),
                },
                Err(e) => e.into(),
            },
        }
    }

    /// Decode, handle and encode one message.
    pub fn handle_json(&self, json: &str) -> String {
        let response = match parse_request(json) {
            Ok(request) => self.dispatch(request),
            Err(e) => {
                tracing::warn!(error = %e, "Rejected bus message");
                e.into()
            }
        };
        serde_json::to_string(&response).unwrap_or_else(|e| {
            json!({ "status": "error", "code": "serializationFailed", "message": e.to_string() })
                .to_string()
        })
    }

    fn delete_test(&self, TestRef { patient_id, index }: TestRef) -> Response {
        match usize::try_from(index) {
            Ok(index) => match self.store.delete_test(&patient_id, index) {
                Ok(_) => Response::Ok,
                Err(e) => e.into(),
            },
            // Negative positions never exist; answer like any other bad index.
            Err(_) => match self.store.get_record(&patient_id) {
                Ok(Some(record)) => Response::IndexOutOfRange {
                    index,
                    len: record.tests.len(),
                },
                Ok(None) => Response::PatientNotFound { patient_id },
                Err(e) => e.into(),
            },
        }
    }

    fn report(
        &self,
        export: impl FnOnce(&ReportBuilder, &[PatientRecord]) -> Result<ReportArtifact, ReportError>,
    ) -> Response {
        let records = match self.store.get_all_records() {
            Ok(records) => records,
            Err(e) => return e.into(),
        };
        match export(&self.builder, &records) {
            Ok(artifact) => Response::Report { artifact },
            Err(e) => e.into(),
        }
    }
}
