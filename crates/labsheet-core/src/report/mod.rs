//! Report generation: pivoted and long-format CSV, plus the listing view.
//!
//! Reports are pure functions of a record snapshot. The builder never touches
//! storage; callers pass `RecordStore::get_all_records()` output.

mod csv;
mod listing;
mod long;
mod lookup;
mod pivot;

pub use csv::*;
pub use listing::*;
pub use long::*;
pub use lookup::*;
pub use pivot::*;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::config::ReportConfig;
use crate::models::PatientRecord;

/// Report errors.
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("No data available to export")]
    NoData,

    #[error("Report serialization failed: {0}")]
    SerializationFailed(#[from] std::io::Error),

    #[error("Malformed input: {0}")]
    MalformedInput(String),
}

pub type ReportResult<T> = Result<T, ReportError>;

/// A serialized report ready to hand to a download or save dialog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReportArtifact {
    /// Suggested file name, e.g. `Patient_Biochemical_Report_2024-03-01.csv`
    pub file_name: String,
    pub content: String,
    pub columns: Vec<String>,
    pub row_count: usize,
    /// SHA-256 of `content`, hex encoded
    pub digest: String,
}

impl ReportArtifact {
    fn new(file_name: String, content: String, columns: Vec<String>, row_count: usize) -> Self {
        let digest = content_digest(&content);
        Self {
            file_name,
            content,
            columns,
            row_count,
            digest,
        }
    }
}

/// Builds reports with a configured abbreviation table and file naming.
#[derive(Debug, Clone)]
pub struct ReportBuilder {
    table: AbbreviationTable,
    file_prefix: String,
}

impl Default for ReportBuilder {
    fn default() -> Self {
        Self::from_config(&ReportConfig::default())
    }
}

impl ReportBuilder {
    pub fn new(table: AbbreviationTable, file_prefix: impl Into<String>) -> Self {
        Self {
            table,
            file_prefix: file_prefix.into(),
        }
    }

    /// Built-in table extended with the configured entries.
    pub fn from_config(config: &ReportConfig) -> Self {
        Self::new(
            AbbreviationTable::with_extra(&config.extra_abbreviations),
            config.file_prefix.clone(),
        )
    }

    pub fn table(&self) -> &AbbreviationTable {
        &self.table
    }

    /// Pivot `records` into one row per patient.
    pub fn build_report(&self, records: &[PatientRecord]) -> ReportResult<PivotReport> {
        let report = PivotReport::build(records, &self.table)?;
        if !report.unmapped.is_empty() {
            tracing::debug!(
                unmapped = report.unmapped.len(),
                "Test names without a report column"
            );
        }
        Ok(report)
    }

    /// Flatten `records` into one row per test.
    pub fn build_long_report(&self, records: &[PatientRecord]) -> ReportResult<LongReport> {
        LongReport::build(records)
    }

    /// Pivoted CSV named with today's date.
    pub fn export(&self, records: &[PatientRecord]) -> ReportResult<ReportArtifact> {
        self.export_dated(records, Utc::now().date_naive())
    }

    /// Pivoted CSV named with `date`.
    pub fn export_dated(&self, records: &[PatientRecord], date: NaiveDate) -> ReportResult<ReportArtifact> {
        let report = self.build_report(records)?;
        let content = report.to_csv()?;
        let artifact = ReportArtifact::new(
            self.file_name(date, None),
            content,
            report.header.clone(),
            report.rows.len(),
        );
        tracing::info!(
            file_name = %artifact.file_name,
            rows = artifact.row_count,
            columns = artifact.columns.len(),
            "Report generated"
        );
        Ok(artifact)
    }

    /// Long-format CSV named with `date`.
    pub fn export_long_dated(&self, records: &[PatientRecord], date: NaiveDate) -> ReportResult<ReportArtifact> {
        let report = self.build_long_report(records)?;
        let content = report.to_csv()?;
        let artifact = ReportArtifact::new(
            self.file_name(date, Some("Long")),
            content,
            LONG_HEADER.iter().map(|c| c.to_string()).collect(),
            report.rows.len(),
        );
        tracing::info!(file_name = %artifact.file_name, rows = artifact.row_count, "Long report generated");
        Ok(artifact)
    }

    /// Long-format CSV named with today's date.
    pub fn export_long(&self, records: &[PatientRecord]) -> ReportResult<ReportArtifact> {
        self.export_long_dated(records, Utc::now().date_naive())
    }

    fn file_name(&self, date: NaiveDate, variant: Option<&str>) -> String {
        match variant {
            Some(variant) => format!("{}_{}_{}.csv", self.file_prefix, variant, date.format("%Y-%m-%d")),
            None => format!("{}_{}.csv", self.file_prefix, date.format("%Y-%m-%d")),
        }
    }
}

/// SHA-256 hex digest of report content.
pub fn content_digest(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}
