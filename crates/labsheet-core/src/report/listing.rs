//! Flat listing of stored entries for display.

use serde::{Deserialize, Serialize};

use crate::models::PatientRecord;

/// Listing order by entry position.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SortOrder {
    #[default]
    NewestFirst,
    OldestFirst,
}

/// One displayed line: a test entry, or a placeholder for a patient with no
/// tests.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ListingRow {
    /// 1-based position after sorting
    pub serial: usize,
    /// Position in flattening order, stable across sort orders
    pub entry_index: usize,
    pub patient_id: String,
    pub name: Option<String>,
    pub test_name: Option<String>,
    pub result_value: Option<String>,
    pub approved_on: Option<String>,
    /// Index into the patient's tests; `None` on a placeholder row, which
    /// maps to deleting the whole patient
    pub test_index: Option<usize>,
}

impl ListingRow {
    pub fn is_placeholder(&self) -> bool {
        self.test_index.is_none()
    }
}

/// Flatten `records` into listing rows.
pub fn listing_rows(records: &[PatientRecord], order: SortOrder) -> Vec<ListingRow> {
    let mut rows = Vec::new();
    for record in records {
        if record.tests.is_empty() {
            rows.push(ListingRow {
                serial: 0,
                entry_index: rows.len(),
                patient_id: record.patient_id.clone(),
                name: record.name.clone(),
                test_name: None,
                result_value: None,
                approved_on: None,
                test_index: None,
            });
            continue;
        }
        for (i, test) in record.tests.iter().enumerate() {
            rows.push(ListingRow {
                serial: 0,
                entry_index: rows.len(),
                patient_id: record.patient_id.clone(),
                name: record.name.clone(),
                test_name: Some(test.test_name.clone()),
                result_value: Some(test.result_value.clone()),
                approved_on: Some(test.approved_on.clone()).filter(|d| !d.is_empty()),
                test_index: Some(i),
            });
        }
    }

    if order == SortOrder::NewestFirst {
        rows.reverse();
    }
    for (serial, row) in rows.iter_mut().enumerate() {
        row.serial = serial + 1;
    }
    rows
}
