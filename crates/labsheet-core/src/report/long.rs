//! Long-format export and import: one row per test event.
//!
//! This is the flat shape spreadsheet users pivot by hand, and the format
//! accepted back by `RecordStore::import_long_rows`.

use std::collections::HashMap;
use std::io::Write;

use serde::{Deserialize, Serialize};

use super::csv::{parse_csv, write_csv_row};
use super::{ReportError, ReportResult};
use crate::models::{PatientRecord, ProfileInput, TestResult};

/// Long-format header, in output order.
pub const LONG_HEADER: [&str; 8] = [
    "Age",
    "Gender",
    "Mobile",
    "Name",
    "PID",
    "TestName",
    "ResultValue",
    "ApprovedOn",
];

const REQUIRED_COLUMNS: [&str; 3] = ["PID", "TestName", "ResultValue"];

/// One test event with its patient's demographics.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LongRow {
    pub patient_id: String,
    pub name: Option<String>,
    pub age: Option<String>,
    pub gender: Option<String>,
    pub mobile: Option<String>,
    /// Empty for a profile-only row
    pub test_name: String,
    pub result_value: String,
    pub approved_on: String,
}

impl LongRow {
    pub fn new(
        patient_id: impl Into<String>,
        test_name: impl Into<String>,
        result_value: impl Into<String>,
        approved_on: impl Into<String>,
    ) -> Self {
        Self {
            patient_id: patient_id.into(),
            test_name: test_name.into(),
            result_value: result_value.into(),
            approved_on: approved_on.into(),
            ..Self::default()
        }
    }

    /// Demographics of this row. Blank cells count as absent so they never
    /// overwrite stored values.
    pub fn profile(&self) -> ProfileInput {
        fn present(value: &Option<String>) -> Option<String> {
            value.as_ref().filter(|v| !v.trim().is_empty()).cloned()
        }

        ProfileInput {
            patient_id: self.patient_id.clone(),
            name: present(&self.name),
            age: present(&self.age),
            gender: present(&self.gender),
            mobile: present(&self.mobile),
            ..ProfileInput::default()
        }
    }

    /// The test on this row, if it names one.
    pub fn test(&self) -> Option<TestResult> {
        if self.test_name.trim().is_empty() {
            return None;
        }
        Some(TestResult::new(
            self.test_name.clone(),
            self.result_value.clone(),
            self.approved_on.clone(),
        ))
    }

    fn fields(&self) -> [&str; 8] {
        [
            self.age.as_deref().unwrap_or_default(),
            self.gender.as_deref().unwrap_or_default(),
            self.mobile.as_deref().unwrap_or_default(),
            self.name.as_deref().unwrap_or_default(),
            &self.patient_id,
            &self.test_name,
            &self.result_value,
            &self.approved_on,
        ]
    }
}

/// Every test of every record as long rows, in record then test order.
/// Profile-only records produce no rows.
pub fn long_rows(records: &[PatientRecord]) -> Vec<LongRow> {
    records
        .iter()
        .flat_map(|record| {
            record.tests.iter().map(move |test| LongRow {
                patient_id: record.patient_id.clone(),
                name: record.name.clone(),
                age: record.age.clone(),
                gender: record.gender.clone(),
                mobile: record.mobile.clone(),
                test_name: test.test_name.clone(),
                result_value: test.result_value.clone(),
                approved_on: test.approved_on.clone(),
            })
        })
        .collect()
}

/// Long-format export.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LongReport {
    pub rows: Vec<LongRow>,
}

impl LongReport {
    /// Flatten `records`. Fails with `NoData` when there is no test at all.
    pub fn build(records: &[PatientRecord]) -> ReportResult<Self> {
        let rows = long_rows(records);
        if rows.is_empty() {
            return Err(ReportError::NoData);
        }
        Ok(Self { rows })
    }

    /// Write the report as CSV.
    pub fn write_csv<W: Write>(&self, mut out: W) -> ReportResult<()> {
        write_csv_row(&mut out, &LONG_HEADER)?;
        for row in &self.rows {
            write_csv_row(&mut out, &row.fields())?;
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
}

/// Parse long-format CSV. Columns are matched by header name, so extra or
/// reordered columns are fine; `PID`, `TestName` and `ResultValue` must exist.
/// A leading byte order mark, as spreadsheet tools write, is ignored.
pub fn parse_long_csv(text: &str) -> ReportResult<Vec<LongRow>> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut records = parse_csv(text)?.into_iter();
    let header = records
        .next()
        .ok_or_else(|| ReportError::MalformedInput("missing header row".into()))?;

    let columns: HashMap<&str, usize> = header
        .iter()
        .enumerate()
        .map(|(i, name)| (name.trim(), i))
        .collect();
    if let Some(missing) = REQUIRED_COLUMNS.iter().find(|c| !columns.contains_key(*c)) {
        return Err(ReportError::MalformedInput(format!("missing column {missing}")));
    }

    let cell = |record: &[String], name: &str| -> Option<String> {
        columns
            .get(name)
            .and_then(|&i| record.get(i))
            .map(|v| v.trim().to_string())
    };

    let mut rows = Vec::new();
    for (n, record) in records.enumerate() {
        let patient_id = cell(&record, "PID").unwrap_or_default();
        if patient_id.is_empty() {
            return Err(ReportError::MalformedInput(format!(
                "data row {}: empty PID",
                n + 1
            )));
        }
        rows.push(LongRow {
            patient_id,
            name: cell(&record, "Name"),
            age: cell(&record, "Age"),
            gender: cell(&record, "Gender"),
            mobile: cell(&record, "Mobile"),
            test_name: cell(&record, "TestName").unwrap_or_default(),
            result_value: cell(&record, "ResultValue").unwrap_or_default(),
            approved_on: cell(&record, "ApprovedOn").unwrap_or_default(),
        });
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, tests: &[(&str, &str, &str)]) -> PatientRecord {
        let mut record =
            PatientRecord::from_profile(&ProfileInput::new(id).with_name("Asha").with_age("42"));
        for (name, value, date) in tests {
            record.tests.push(TestResult::new(*name, *value, *date));
        }
        record
    }

    #[test]
    fn test_long_rows_skip_profile_only() {
        let records = vec![
            record("P1", &[("FBS - Fasting Blood Sugar", "95", "2024-01-01"), ("Urea", "30", "")]),
            record("P2", &[]),
        ];
        let rows = long_rows(&records);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].test_name, "Urea");
        assert_eq!(rows[1].age.as_deref(), Some("42"));
    }

    #[test]
    fn test_no_tests_is_no_data() {
        assert!(matches!(LongReport::build(&[record("P1", &[])]), Err(ReportError::NoData)));
    }

    #[test]
    fn test_csv_layout() {
        let report = LongReport::build(&[record("P1", &[("FBS - Fasting Blood Sugar", "95", "2024-01-01")])]).unwrap();
        assert_eq!(
            report.to_csv().unwrap(),
            "Age,Gender,Mobile,Name,PID,TestName,ResultValue,ApprovedOn\n42,,,Asha,P1,FBS - Fasting Blood Sugar,95,2024-01-01\n"
        );
    }

    #[test]
    fn test_export_parses_back() {
        let report = LongReport::build(&[record(
            "P1",
            &[("Free T3, T4 & TSH - (F-T3) FREE TRIIODOTHYRONINE", "3.1", "01/02/2024")],
        )])
        .unwrap();
        let rows = parse_long_csv(&report.to_csv().unwrap()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].test_name, "Free T3, T4 & TSH - (F-T3) FREE TRIIODOTHYRONINE");
        assert_eq!(rows[0].name.as_deref(), Some("Asha"));
        assert_eq!(rows[0].gender.as_deref(), Some(""));
        assert_eq!(rows[0].profile().gender, None);
    }

    #[test]
    fn test_parse_reordered_columns() {
        let rows = parse_long_csv("ResultValue,PID,TestName\n95,P1,FBS - Fasting Blood Sugar\n").unwrap();
        assert_eq!(rows[0].patient_id, "P1");
        assert_eq!(rows[0].name, None);
        assert_eq!(rows[0].approved_on, "");
    }

    #[test]
    fn test_parse_strips_byte_order_mark() {
        let rows = parse_long_csv("\u{feff}PID,TestName,ResultValue\r\nP1,FBS - Fasting Blood Sugar,95\r\n").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].patient_id, "P1");
        assert_eq!(rows[0].result_value, "95");
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(matches!(parse_long_csv(""), Err(ReportError::MalformedInput(_))));
        assert!(matches!(
            parse_long_csv("PID,TestName\nP1,FBS\n"),
            Err(ReportError::MalformedInput(msg)) if msg.contains("ResultValue")
        ));
        assert!(matches!(
            parse_long_csv("PID,TestName,ResultValue\n,FBS,95\n"),
            Err(ReportError::MalformedInput(msg)) if msg.contains("row 1")
        ));
        assert!(matches!(
            parse_long_csv("PID,TestName,ResultValue\nP1,\"FBS\"x,95\n"),
            Err(ReportError::MalformedInput(msg)) if msg.contains("closing quote")
        ));
    }
}
