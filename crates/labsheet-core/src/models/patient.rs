//! Patient models.

use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use super::TestResult;

/// Profile fields the store never keeps, even when the scraper sends them.
pub const DISALLOWED_PROFILE_FIELDS: &[&str] = &[
    "ShortPID",
    "shortPid",
    "City",
    "city",
    "Address",
    "address",
    "Pincode",
    "pincode",
    "Insurance",
    "insurance",
    "insuranceType",
    "billingAddress",
    "billingType",
];

/// A stored patient: demographics plus the discovered test history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PatientRecord {
    /// Portal patient identifier, primary key of the store
    pub patient_id: String,
    pub name: Option<String>,
    pub age: Option<String>,
    pub gender: Option<String>,
    pub mobile: Option<String>,
    /// Test results, oldest first
    #[serde(default)]
    pub tests: Vec<TestResult>,
    /// Creation timestamp
    pub created_at: String,
    /// Last update timestamp
    pub updated_at: String,
}

impl PatientRecord {
    /// Create a profile-only record from an incoming profile.
    pub fn from_profile(profile: &ProfileInput) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            patient_id: profile.patient_id.clone(),
            name: profile.name.clone(),
            age: profile.age.clone(),
            gender: profile.gender.clone(),
            mobile: profile.mobile.clone(),
            tests: Vec::new(),
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Merge incoming demographics. Absent fields keep their stored value,
    /// `tests` is never touched.
    pub fn merge_profile(&mut self, profile: &ProfileInput) {
        if let Some(name) = &profile.name {
            self.name = Some(name.clone());
        }
        if let Some(age) = &profile.age {
            self.age = Some(age.clone());
        }
        if let Some(gender) = &profile.gender {
            self.gender = Some(gender.clone());
        }
        if let Some(mobile) = &profile.mobile {
            self.mobile = Some(mobile.clone());
        }
    }

    /// Whether `test` duplicates an entry already on this record.
    pub fn has_duplicate(&self, test: &TestResult) -> bool {
        self.tests.iter().any(|existing| existing.is_duplicate_of(test))
    }

    /// Whether this record carries demographics only.
    pub fn is_profile_only(&self) -> bool {
        self.tests.is_empty()
    }

    /// Touch the updated_at timestamp.
    pub fn touch(&mut self) {
        self.updated_at = chrono::Utc::now().to_rfc3339();
    }
}

/// Incoming patient profile as sent by the scraper.
///
/// Anything besides the identifier and the four demographic fields lands in
/// `extra` and is dropped by [`ProfileInput::sanitize`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProfileInput {
    #[serde(alias = "PID")]
    pub patient_id: String,
    #[serde(default, alias = "Name", deserialize_with = "scalar_as_string")]
    pub name: Option<String>,
    #[serde(default, alias = "Age", deserialize_with = "scalar_as_string")]
    pub age: Option<String>,
    #[serde(default, alias = "Gender", deserialize_with = "scalar_as_string")]
    pub gender: Option<String>,
    #[serde(default, alias = "Mobile", deserialize_with = "scalar_as_string")]
    pub mobile: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Accept a demographic value sent as a string, number or bool.
///
/// The portal API hands out ages and phone numbers as JSON numbers. `null`
/// counts as absent.
fn scalar_as_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(Value::Bool(b)) => Ok(Some(b.to_string())),
        Some(other) => Err(de::Error::custom(format!(
            "expected a string, number or bool, found {other}"
        ))),
    }
}

impl ProfileInput {
    /// Create a profile carrying only the identifier.
    pub fn new(patient_id: impl Into<String>) -> Self {
        Self {
            patient_id: patient_id.into(),
            ..Self::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_age(mut self, age: impl Into<String>) -> Self {
        self.age = Some(age.into());
        self
    }

    pub fn with_gender(mut self, gender: impl Into<String>) -> Self {
        self.gender = Some(gender.into());
        self
    }

    pub fn with_mobile(mut self, mobile: impl Into<String>) -> Self {
        self.mobile = Some(mobile.into());
        self
    }

    /// Drop every field the store does not keep.
    ///
    /// Returns the names of the stripped fields that are on the known
    /// disallowed list (address, billing and insurance data).
    pub fn sanitize(&mut self) -> Vec<String> {
        let stripped = self
            .extra
            .keys()
            .filter(|key| DISALLOWED_PROFILE_FIELDS.contains(&key.as_str()))
            .cloned()
            .collect();
        self.extra.clear();
        stripped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_profile_starts_without_tests() {
        let profile = ProfileInput::new("P1").with_name("Asha").with_age("42");
        let record = PatientRecord::from_profile(&profile);
        assert_eq!(record.patient_id, "P1");
        assert_eq!(record.name.as_deref(), Some("Asha"));
        assert_eq!(record.age.as_deref(), Some("42"));
        assert!(record.is_profile_only());
    }

    #[test]
    fn test_merge_keeps_absent_fields() {
        let mut record =
            PatientRecord::from_profile(&ProfileInput::new("P1").with_name("Asha").with_mobile("99"));
        record.tests.push(TestResult::new("RBS - Random Blood Sugar", "110", "2024-01-01"));

        record.merge_profile(&ProfileInput::new("P1").with_name("Asha K").with_gender(""));

        assert_eq!(record.name.as_deref(), Some("Asha K"));
        assert_eq!(record.mobile.as_deref(), Some("99"));
        assert_eq!(record.gender.as_deref(), Some(""));
        assert_eq!(record.tests.len(), 1);
    }

    #[test]
    fn test_sanitize_strips_extra_fields() {
        let mut profile: ProfileInput = serde_json::from_str(
            r#"{"PID":"P9","Name":"Ravi","City":"Chennai","Pincode":"600001","Insurance":"X","Ward":"3"}"#,
        )
        .unwrap();
        assert_eq!(profile.patient_id, "P9");
        assert_eq!(profile.extra.len(), 4);

        let mut stripped = profile.sanitize();
        stripped.sort();
        assert_eq!(stripped, vec!["City", "Insurance", "Pincode"]);
        assert!(profile.extra.is_empty());
    }

    #[test]
    fn test_numeric_demographics_become_strings() {
        let profile: ProfileInput = serde_json::from_str(
            r#"{"PID":"P1","Name":null,"Age":42,"Gender":"M","Mobile":9845012345}"#,
        )
        .unwrap();
        assert_eq!(profile.name, None);
        assert_eq!(profile.age.as_deref(), Some("42"));
        assert_eq!(profile.gender.as_deref(), Some("M"));
        assert_eq!(profile.mobile.as_deref(), Some("9845012345"));
        assert!(profile.extra.is_empty());

        let nested = serde_json::from_str::<ProfileInput>(r#"{"PID":"P1","Age":[42]}"#);
        assert!(nested.is_err());
    }

    #[test]
    fn test_record_json_is_camel_case() {
        let record = PatientRecord::from_profile(&ProfileInput::new("P1"));
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"patientId\":\"P1\""));
        assert!(json.contains("\"tests\":[]"));
    }
}
