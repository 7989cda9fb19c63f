//! Read-only lookup of what was generated for a project before.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::Error;

/// Earlier output for a project, keyed by project identifier.
pub trait ProjectHistory: Send + Sync {
    /// The design-token description recorded when the project was generated.
    fn design_description(&self, project_id: &str) -> Option<String>;

    /// Files produced by the original generation.
    fn generated_files(&self, project_id: &str) -> Vec<(PathBuf, String)>;
}

/// No history available.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProjectHistory;

impl ProjectHistory for NoProjectHistory {
    fn design_description(&self, _project_id: &str) -> Option<String> {
        return None;
    }

    fn generated_files(&self, _project_id: &str) -> Vec<(PathBuf, String)> {
        return Vec::new();
    }
}

/// A single recorded project.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct Record {
    /// Design description.
    #[serde(default)]
    design: Option<String>,
    /// Generated files by path.
    #[serde(default)]
    files: BTreeMap<PathBuf, String>,
}

/// History read from a JSON document of the form
/// `{"<project id>": {"design": "...", "files": {"<path>": "<content>"}}}`.
#[derive(Debug, Default)]
pub struct JsonProjectHistory {
    /// Records by project id.
    records: HashMap<String, Record>,
}

impl JsonProjectHistory {
    /// Parse a history document.
    ///
    /// # Errors
    ///
    /// Returns `Error::Json` if the document does not match the layout above.
    pub fn parse(document: &str) -> Result<Self, Error> {
        return Ok(Self {
            records: serde_json::from_str(document)?,
        });
    }

    /// Read and parse a history file.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the file cannot be read, or `Error::Json`.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let history = Self::parse(&std::fs::read_to_string(path)?)?;
        tracing::debug!(file = %path.display(), projects = history.records.len(), "project history loaded");
        return Ok(history);
    }
}

impl ProjectHistory for JsonProjectHistory {
    fn design_description(&self, project_id: &str) -> Option<String> {
        return self.records.get(project_id).and_then(|r| return r.design.clone());
    }

    fn generated_files(&self, project_id: &str) -> Vec<(PathBuf, String)> {
        return self
            .records
            .get(project_id)
            .map(|r| return r.files.iter().map(|(p, c)| return (p.clone(), c.clone())).collect())
            .unwrap_or_default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"{
        "p1": {"design": "dark, indigo accents", "files": {"src/App.tsx": "x"}},
        "p2": {"files": {}}
    }"#;

    #[test]
    fn records_are_per_project() {
        let history = JsonProjectHistory::parse(DOC).unwrap();
        assert_eq!(history.design_description("p1").as_deref(), Some("dark, indigo accents"));
        assert_eq!(history.generated_files("p1"), vec![(PathBuf::from("src/App.tsx"), "x".to_string())]);
        assert!(history.design_description("p2").is_none());
        assert!(history.generated_files("p3").is_empty());
        assert!(NoProjectHistory.generated_files("p1").is_empty());
    }

    #[test]
    fn unknown_record_keys_are_rejected() {
        assert!(JsonProjectHistory::parse(r#"{"p1": {"palette": "red"}}"#).is_err());
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = JsonProjectHistory::load(&dir.path().join("history.json")).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
