//! Lab test result models.

use serde::{Deserialize, Serialize};

/// One lab measurement attached to a patient.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    /// Test name exactly as scraped
    #[serde(alias = "TestName")]
    pub test_name: String,
    /// Result value as displayed on the portal
    #[serde(alias = "ResultValue")]
    pub result_value: String,
    /// Approval date text (not parsed)
    #[serde(default, alias = "ApprovedOn")]
    pub approved_on: String,
}

impl TestResult {
    pub fn new(
        test_name: impl Into<String>,
        result_value: impl Into<String>,
        approved_on: impl Into<String>,
    ) -> Self {
        Self {
            test_name: test_name.into(),
            result_value: result_value.into(),
            approved_on: approved_on.into(),
        }
    }

    /// Exact match on name, value and approval date.
    pub fn is_duplicate_of(&self, other: &TestResult) -> bool {
        self.test_name == other.test_name
            && self.result_value == other.result_value
            && self.approved_on == other.approved_on
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_needs_all_three_fields() {
        let a = TestResult::new("FBS - Fasting Blood Sugar", "95", "2024-01-01");
        assert!(a.is_duplicate_of(&a.clone()));
        assert!(!a.is_duplicate_of(&TestResult::new("FBS - Fasting Blood Sugar", "95", "2024-01-02")));
        assert!(!a.is_duplicate_of(&TestResult::new("FBS - Fasting Blood Sugar", "96", "2024-01-01")));
        assert!(!a.is_duplicate_of(&TestResult::new("RBS - Random Blood Sugar", "95", "2024-01-01")));
    }

    #[test]
    fn test_duplicate_is_case_sensitive() {
        let a = TestResult::new("Serum Calcium - Serum Calcium", "9.1", "01/02/2024");
        let b = TestResult::new("serum calcium - serum calcium", "9.1", "01/02/2024");
        assert!(!a.is_duplicate_of(&b));
    }

    #[test]
    fn test_accepts_legacy_field_names() {
        let test: TestResult = serde_json::from_str(
            r#"{"TestName":"Lipid Profile - Triglycerides","ResultValue":"150","ApprovedOn":"2024-03-04"}"#,
        )
        .unwrap();
        assert_eq!(test.test_name, "Lipid Profile - Triglycerides");
        assert_eq!(test.approved_on, "2024-03-04");
    }
}
