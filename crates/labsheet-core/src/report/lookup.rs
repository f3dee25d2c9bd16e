//! Test name → column abbreviation lookup.
//!
//! The declaration order of the table is the column order of the pivoted
//! report, independent of the order tests were scraped in.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use strsim::{jaro_winkler, normalized_levenshtein};

/// Fixed leading report columns, in output order.
pub const DEMOGRAPHIC_COLUMNS: [&str; 5] = ["PID", "Name", "Age", "Gender", "Mobile"];

/// Minimum similarity for an unmapped-name suggestion.
const SUGGESTION_THRESHOLD: f64 = 0.85;

/// Built-in table, in column order. Demographic self-mappings come first and
/// never produce test columns.
const BUILTIN_ABBREVIATIONS: &[(&str, &str)] = &[
    ("Age", "Age"),
    ("Gender", "Gender"),
    ("Mobile", "Mobile"),
    ("Name", "Name"),
    ("PID", "PID"),
    ("Electrolytes - Serum Bi-carbonate", "B.CARB"),
    ("Electrolytes - Serum Chloride", "CHLORIDE"),
    ("Electrolytes - Serum Potassium", "POTASSIUM"),
    ("Electrolytes - Serum Sodium", "SODIUM"),
    ("FBS - Fasting Blood Sugar", "FBS"),
    ("Free T3, T4 & TSH - (F-T3) FREE TRIIODOTHYRONINE", "FT3"),
    ("Free T3, T4 & TSH - (F-T4) FREE THYROXINE", "FT4"),
    ("Free T3, T4 & TSH - (TSH)THYROID STIMULATING", "TSH"),
    ("Glyco HB (HBA1C) - Glyco Hb (HBA1C)", "HBA1C"),
    ("Lipid Profile - Cholesterol (Total)", "T.CHOL"),
    ("Lipid Profile - HDL Cholesterol (Direct)", "HDL"),
    ("Lipid Profile - LDL Cholesterol (Direct)", "LDL"),
    ("Lipid Profile - Total Cholesterol /HDL Ratio", "TCHOLDRATIO"),
    ("Lipid Profile - Triglycerides", "TGL"),
    ("Lipid Profile - VLDL Cholesterol", "VLDL"),
    ("Liver Function Test - ALKP", "ALKP"),
    ("Liver Function Test - ALTV", "ALTV"),
    ("Liver Function Test - AST", "AST"),
    ("Liver Function Test - Albumin", "ALB"),
    ("Liver Function Test - Direct Bilirubin", "D.BIL"),
    ("Liver Function Test - Gamma-glutamy Transferase (GGT)", "GGT"),
    ("Liver Function Test - Total Bilirubin", "T.BIL"),
    ("Liver Function Test - Total Protein", "T.PRO"),
    ("PPBS - Post Prandial Blood Sugar", "PPBS"),
    ("RBS - Random Blood Sugar", "RBS"),
    ("RENAL FUNCTION TEST (RFT) - Creatinine", "CREA"),
    ("RENAL FUNCTION TEST (RFT) - Urea", "UREA"),
    ("RENAL FUNCTION TEST (RFT) - Uric acid", "U.ACID"),
    ("Serum Calcium - Serum Calcium", "CALCIUM"),
];

/// One lookup entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AbbreviationEntry {
    pub test_name: String,
    pub abbreviation: String,
}

impl AbbreviationEntry {
    pub fn new(test_name: impl Into<String>, abbreviation: impl Into<String>) -> Self {
        Self {
            test_name: test_name.into(),
            abbreviation: abbreviation.into(),
        }
    }
}

/// Ordered, exact-match lookup table.
#[derive(Debug, Clone)]
pub struct AbbreviationTable {
    entries: Vec<AbbreviationEntry>,
    /// test name → entry position
    by_name: HashMap<String, usize>,
    /// abbreviation → first declaring position
    rank: HashMap<String, usize>,
}

impl Default for AbbreviationTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl AbbreviationTable {
    /// The built-in table.
    pub fn builtin() -> Self {
        Self::from_entries(
            BUILTIN_ABBREVIATIONS
                .iter()
                .map(|(name, abbr)| AbbreviationEntry::new(*name, *abbr)),
        )
    }

    /// Built-in table followed by `extra`.
    pub fn with_extra(extra: &[AbbreviationEntry]) -> Self {
        let mut table = Self::builtin();
        for entry in extra {
            table.push(entry.clone());
        }
        table
    }

    /// Build a table from entries in declaration order. A repeated test
    /// name keeps its first mapping.
    pub fn from_entries(entries: impl IntoIterator<Item = AbbreviationEntry>) -> Self {
        let mut table = Self {
            entries: Vec::new(),
            by_name: HashMap::new(),
            rank: HashMap::new(),
        };
        for entry in entries {
            table.push(entry);
        }
        table
    }

    fn push(&mut self, entry: AbbreviationEntry) {
        if self.by_name.contains_key(&entry.test_name) {
            tracing::debug!(test_name = %entry.test_name, "Ignoring repeated abbreviation entry");
            return;
        }
        let position = self.entries.len();
        self.by_name.insert(entry.test_name.clone(), position);
        self.rank.entry(entry.abbreviation.clone()).or_insert(position);
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[AbbreviationEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Column label for a scraped test name. Exact match only.
    pub fn abbreviation(&self, test_name: &str) -> Option<&str> {
        self.by_name
            .get(test_name)
            .map(|&i| self.entries[i].abbreviation.as_str())
    }

    /// Column label for a test name, excluding labels that name one of the
    /// fixed demographic columns.
    pub fn test_column(&self, test_name: &str) -> Option<&str> {
        self.abbreviation(test_name)
            .filter(|abbr| !is_demographic_column(abbr))
    }

    /// Column position of an abbreviation.
    pub fn rank(&self, abbreviation: &str) -> Option<usize> {
        self.rank.get(abbreviation).copied()
    }

    /// Closest known entry for a name that has no exact mapping.
    pub fn suggest(&self, test_name: &str) -> Option<&AbbreviationEntry> {
        let needle = test_name.to_lowercase();
        self.entries
            .iter()
            .filter(|entry| !is_demographic_column(&entry.abbreviation))
            .map(|entry| (entry, similarity(&needle, &entry.test_name.to_lowercase())))
            .filter(|(_, score)| *score >= SUGGESTION_THRESHOLD)
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(entry, _)| entry)
    }
}

/// Whether `label` is one of the fixed leading columns.
pub fn is_demographic_column(label: &str) -> bool {
    DEMOGRAPHIC_COLUMNS.contains(&label)
}

fn similarity(a: &str, b: &str) -> f64 {
    // Jaro-Winkler catches typos near the prefix, Levenshtein overall drift.
    jaro_winkler(a, b) * 0.6 + normalized_levenshtein(a, b) * 0.4
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_lookup() {
        let table = AbbreviationTable::builtin();
        assert_eq!(table.abbreviation("FBS - Fasting Blood Sugar"), Some("FBS"));
        assert_eq!(table.abbreviation("fbs - fasting blood sugar"), None);
        assert_eq!(table.abbreviation("Serum Calcium - Serum Calcium"), Some("CALCIUM"));
    }

    #[test]
    fn test_demographics_are_not_test_columns() {
        let table = AbbreviationTable::builtin();
        assert_eq!(table.abbreviation("Age"), Some("Age"));
        assert_eq!(table.test_column("Age"), None);
        assert_eq!(table.test_column("RBS - Random Blood Sugar"), Some("RBS"));
    }

    #[test]
    fn test_rank_follows_declaration_order() {
        let table = AbbreviationTable::builtin();
        let sodium = table.rank("SODIUM").unwrap();
        let fbs = table.rank("FBS").unwrap();
        let calcium = table.rank("CALCIUM").unwrap();
        assert!(sodium < fbs && fbs < calcium);
        assert_eq!(table.rank("NOPE"), None);
    }

    #[test]
    fn test_extra_entries_append() {
        let table = AbbreviationTable::with_extra(&[
            AbbreviationEntry::new("HB - Haemoglobin", "HB"),
            AbbreviationEntry::new("FBS - Fasting Blood Sugar", "GLU"),
        ]);
        assert_eq!(table.abbreviation("HB - Haemoglobin"), Some("HB"));
        assert!(table.rank("HB").unwrap() > table.rank("CALCIUM").unwrap());
        // Built-in mapping wins over a repeated name.
        assert_eq!(table.abbreviation("FBS - Fasting Blood Sugar"), Some("FBS"));
        assert_eq!(table.len(), AbbreviationTable::builtin().len() + 1);
    }

    #[test]
    fn test_shared_abbreviation_ranks_first_declaration() {
        let table = AbbreviationTable::from_entries(vec![
            AbbreviationEntry::new("Glucose (F)", "GLU"),
            AbbreviationEntry::new("Urea", "UREA"),
            AbbreviationEntry::new("Glucose fasting", "GLU"),
        ]);
        assert_eq!(table.rank("GLU"), Some(0));
        assert_eq!(table.rank("UREA"), Some(1));
    }

    #[test]
    fn test_suggest_close_name() {
        let table = AbbreviationTable::builtin();
        let suggestion = table.suggest("FBS - Fasting Blood Sugar ").unwrap();
        assert_eq!(suggestion.abbreviation, "FBS");
        assert!(table.suggest("Complete Haemogram").is_none());
    }
}
