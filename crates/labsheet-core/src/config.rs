//! Configuration for the record store and report builder.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::report::AbbreviationEntry;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct LabsheetConfig {
    pub store: StoreConfig,
    pub report: ReportConfig,
}

impl LabsheetConfig {
    /// Parse configuration from a JSON string. Missing keys take defaults.
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load configuration from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }
}

/// SQLite journal mode.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JournalMode {
    #[default]
    Delete,
    Wal,
}

impl JournalMode {
    pub fn as_pragma(&self) -> &'static str {
        match self {
            JournalMode::Delete => "DELETE",
            JournalMode::Wal => "WAL",
        }
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct StoreConfig {
    /// Database file; `None` keeps everything in memory
    pub database_path: Option<PathBuf>,
    /// How long a writer waits on a locked database file
    pub busy_timeout_ms: u64,
    pub journal_mode: JournalMode,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            busy_timeout_ms: 5000,
            journal_mode: JournalMode::Delete,
        }
    }
}

/// Report configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ReportConfig {
    /// Prefix of the suggested export file name
    pub file_prefix: String,
    /// Lookup entries appended after the built-in table
    pub extra_abbreviations: Vec<AbbreviationEntry>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            file_prefix: "Patient_Biochemical_Report".to_string(),
            extra_abbreviations: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LabsheetConfig::default();
        assert_eq!(config.store.database_path, None);
        assert_eq!(config.store.busy_timeout_ms, 5000);
        assert_eq!(config.store.journal_mode, JournalMode::Delete);
        assert_eq!(config.report.file_prefix, "Patient_Biochemical_Report");
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config = LabsheetConfig::from_json(
            r#"{"store":{"journalMode":"wal"},"report":{"extraAbbreviations":[{"testName":"HB - Haemoglobin","abbreviation":"HB"}]}}"#,
        )
        .unwrap();
        assert_eq!(config.store.journal_mode, JournalMode::Wal);
        assert_eq!(config.store.busy_timeout_ms, 5000);
        assert_eq!(config.report.extra_abbreviations.len(), 1);
        assert_eq!(config.report.extra_abbreviations[0].abbreviation, "HB");
    }

    #[test]
    fn test_from_missing_file() {
        let result = LabsheetConfig::from_json_file("/nonexistent/labsheet.json");
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labsheet.json");
        std::fs::write(&path, r#"{"store":{"busyTimeoutMs":250}}"#).unwrap();

        let config = LabsheetConfig::from_json_file(&path).unwrap();
        assert_eq!(config.store.busy_timeout_ms, 250);
    }
}
