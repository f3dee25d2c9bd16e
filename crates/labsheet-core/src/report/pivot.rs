//! Pivoted report: one row per patient, one column per test type.

use std::collections::{BTreeSet, HashMap};
use std::io::Write;

use serde::{Deserialize, Serialize};

use super::csv::write_csv_row;
use super::lookup::{AbbreviationTable, DEMOGRAPHIC_COLUMNS};
use super::{ReportError, ReportResult};
use crate::models::PatientRecord;

/// A scraped test name with no column, kept for diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UnmappedTest {
    pub test_name: String,
    /// Closest known abbreviation, if any is close enough
    pub suggestion: Option<String>,
}

/// Tabular pivot of the whole dataset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PivotReport {
    /// Demographic columns followed by test columns
    pub header: Vec<String>,
    /// One row per patient, same width as `header`
    pub rows: Vec<Vec<String>>,
    /// Test names left out of the report
    pub unmapped: Vec<UnmappedTest>,
}

impl PivotReport {
    /// Pivot `records` through `table`.
    pub fn build(records: &[PatientRecord], table: &AbbreviationTable) -> ReportResult<Self> {
        if records.is_empty() {
            return Err(ReportError::NoData);
        }

        let test_columns = test_columns(records, table);
        let mut header: Vec<String> = DEMOGRAPHIC_COLUMNS.iter().map(|c| c.to_string()).collect();
        header.extend(test_columns.iter().cloned());

        let rows = records
            .iter()
            .map(|record| pivot_row(record, &test_columns, table))
            .collect();

        Ok(Self {
            header,
            rows,
            unmapped: unmapped_tests(records, table),
        })
    }

    /// The dynamic test columns, in output order.
    pub fn test_columns(&self) -> &[String] {
        &self.header[DEMOGRAPHIC_COLUMNS.len()..]
    }

    /// Position of a column by label.
    pub fn column(&self, label: &str) -> Option<usize> {
        self.header.iter().position(|h| h == label)
    }

    /// Cell value for a patient row and column label.
    pub fn cell(&self, row: usize, label: &str) -> Option<&str> {
        let col = self.column(label)?;
        self.rows.get(row).map(|r| r[col].as_str())
    }

    /// Write the report as CSV.
    pub fn write_csv<W: Write>(&self, mut out: W) -> ReportResult<()> {
        write_csv_row(&mut out, &self.header)?;
        for row in &self.rows {
            write_csv_row(&mut out, row)?;
        }
        out.flush()?;
        Ok(())
    }

    /// Render the report as a CSV string.
    pub fn to_csv(&self) -> ReportResult<String> {
        let mut buf = Vec::new();
        self.write_csv(&mut buf)?;
        String::from_utf8(buf)
            .map_err(|e| ReportError::SerializationFailed(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))
    }

    /// Export to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Distinct test columns present in `records`, in table order.
fn test_columns(records: &[PatientRecord], table: &AbbreviationTable) -> Vec<String> {
    // Each abbreviation has exactly one rank, so the set is keyed by position.
    let present: BTreeSet<(usize, &str)> = records
        .iter()
        .flat_map(|record| record.tests.iter())
        .filter_map(|test| table.test_column(&test.test_name))
        .filter_map(|abbr| table.rank(abbr).map(|rank| (rank, abbr)))
        .collect();
    present.into_iter().map(|(_, abbr)| abbr.to_string()).collect()
}

fn pivot_row(record: &PatientRecord, test_columns: &[String], table: &AbbreviationTable) -> Vec<String> {
    // Later tests overwrite earlier ones under the same label.
    let mut latest: HashMap<&str, &str> = HashMap::new();
    for test in &record.tests {
        if let Some(abbr) = table.test_column(&test.test_name) {
            latest.insert(abbr, test.result_value.as_str());
        }
    }

    let demographics = [
        Some(record.patient_id.as_str()),
        record.name.as_deref(),
        record.age.as_deref(),
        record.gender.as_deref(),
        record.mobile.as_deref(),
    ];

    demographics
        .into_iter()
        .map(|value| value.unwrap_or_default().to_string())
        .chain(
            test_columns
                .iter()
                .map(|column| latest.get(column.as_str()).copied().unwrap_or_default().to_string()),
        )
        .collect()
}

fn unmapped_tests(records: &[PatientRecord], table: &AbbreviationTable) -> Vec<UnmappedTest> {
    let names: BTreeSet<&str> = records
        .iter()
        .flat_map(|record| record.tests.iter())
        .map(|test| test.test_name.as_str())
        .filter(|name| table.abbreviation(name).is_none())
        .collect();

    names
        .into_iter()
        .map(|name| UnmappedTest {
            test_name: name.to_string(),
            suggestion: table.suggest(name).map(|entry| entry.abbreviation.clone()),
        })
        .collect()
}
