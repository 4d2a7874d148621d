//! # Marker Metadata
//!
//! Reader and writer for the self-describing metadata documents found in an
//! archive: project and operation marker files, and image sidecars.
//!
//! A document is a JSON object. Scalar values are read as strings; nested
//! arrays and objects are kept as their compact JSON text so that entity
//! fields such as operation parameters survive unchanged. `null` values are
//! treated as absent.

use crate::primitives::MAX_DOCUMENT_SIZE;
use crate::{ImportError, Result};
use chrono::{DateTime, NaiveDateTime};
use std::collections::BTreeMap;
use std::path::Path;

/// Timestamp layouts accepted in metadata, tried in order.
const TIMESTAMP_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d,%H-%M-%S%.f",
    "%Y-%m-%d,%H-%M-%S",
];

/// Canonical layout used when writing timestamps back.
const CANONICAL_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Key/value metadata read from one document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    /// Where the values came from, used in error messages.
    source: String,
    values: BTreeMap<String, String>,
}

impl Metadata {
    /// Create an empty metadata map attributed to `source`.
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            values: BTreeMap::new(),
        }
    }

    /// Create a metadata map from existing values.
    pub fn from_values(source: impl Into<String>, values: BTreeMap<String, String>) -> Self {
        Self {
            source: source.into(),
            values,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn values(&self) -> &BTreeMap<String, String> {
        &self.values
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.values.remove(key)
    }

    /// Get a value, treating empty strings and `"None"` as absent.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty() && *v != "None")
    }

    /// Get a value or fail with `MissingMetadata`.
    pub fn require(&self, key: &str) -> Result<&str> {
        self.get(key).ok_or_else(|| ImportError::MissingMetadata {
            file: self.source.clone(),
            key: key.to_string(),
        })
    }

    /// Parse an optional timestamp value.
    pub fn timestamp(&self, key: &str) -> Result<Option<NaiveDateTime>> {
        match self.get(key) {
            None => Ok(None),
            Some(raw) => parse_timestamp(raw)
                .map(Some)
                .ok_or_else(|| ImportError::InvalidMetadata {
                    file: self.source.clone(),
                    reason: format!("'{}' is not a timestamp: {}", key, raw),
                }),
        }
    }

    /// Parse an optional boolean value, falling back to `default`.
    pub fn flag(&self, key: &str, default: bool) -> Result<bool> {
        match self.get(key) {
            None => Ok(default),
            Some(raw) => match raw.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => Ok(true),
                "false" | "0" | "no" => Ok(false),
                _ => Err(ImportError::InvalidMetadata {
                    file: self.source.clone(),
                    reason: format!("'{}' is not a boolean: {}", key, raw),
                }),
            },
        }
    }
}

/// Parse a timestamp in any of the accepted layouts (RFC 3339 included).
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
}

/// Render a timestamp in the canonical layout.
pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(CANONICAL_TIMESTAMP_FORMAT).to_string()
}

/// Read a JSON document from disk, refusing oversized files.
pub(crate) fn read_document(path: &Path) -> Result<serde_json::Value> {
    let size = std::fs::metadata(path)
        .map_err(|e| ImportError::io(path, e))?
        .len();
    if size > MAX_DOCUMENT_SIZE {
        return Err(ImportError::InvalidMetadata {
            file: path.display().to_string(),
            reason: format!(
                "document size {} bytes exceeds maximum allowed {} bytes",
                size, MAX_DOCUMENT_SIZE
            ),
        });
    }
    let bytes = std::fs::read(path).map_err(|e| ImportError::io(path, e))?;
    serde_json::from_slice(&bytes).map_err(|e| ImportError::InvalidMetadata {
        file: path.display().to_string(),
        reason: e.to_string(),
    })
}

/// Flatten a JSON object into metadata values.
pub(crate) fn metadata_from_value(source: &str, value: serde_json::Value) -> Result<Metadata> {
    let serde_json::Value::Object(object) = value else {
        return Err(ImportError::InvalidMetadata {
            file: source.to_string(),
            reason: "expected a JSON object".to_string(),
        });
    };

    let mut metadata = Metadata::new(source);
    for (key, value) in object {
        let text = match value {
            serde_json::Value::Null => continue,
            serde_json::Value::String(s) => s,
            serde_json::Value::Bool(b) => b.to_string(),
            serde_json::Value::Number(n) => n.to_string(),
            nested => nested.to_string(),
        };
        metadata.insert(key, text);
    }
    Ok(metadata)
}

/// Read a metadata document (marker file or sidecar).
pub fn read_metadata(path: &Path) -> Result<Metadata> {
    let value = read_document(path)?;
    metadata_from_value(&path.display().to_string(), value)
}

/// Write metadata back as a JSON object of strings.
pub fn write_metadata(path: &Path, metadata: &Metadata) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(metadata.values())
        .map_err(|e| ImportError::Serialization(e.to_string()))?;
    std::fs::write(path, bytes).map_err(|e| ImportError::io(path, e))
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn scalars_and_nested_values_become_strings() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("operation.json");
        std::fs::write(
            &path,
            r#"{"gid": "op-1", "visible": true, "count": 3, "parameters": {"a": 1}, "group": null}"#,
        )
        .expect("write");

        let meta = read_metadata(&path).expect("read");
        assert_eq!(meta.get("gid"), Some("op-1"));
        assert_eq!(meta.get("visible"), Some("true"));
        assert_eq!(meta.get("count"), Some("3"));
        assert_eq!(meta.get("parameters"), Some(r#"{"a":1}"#));
        assert_eq!(meta.get("group"), None);
    }

    #[test]
    fn non_object_document_rejected() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("project.json");
        std::fs::write(&path, "[1, 2, 3]").expect("write");

        assert!(matches!(
            read_metadata(&path),
            Err(ImportError::InvalidMetadata { .. })
        ));
    }

    #[test]
    fn require_reports_key_and_file() {
        let meta = Metadata::new("project.json");
        match meta.require("name") {
            Err(ImportError::MissingMetadata { file, key }) => {
                assert_eq!(file, "project.json");
                assert_eq!(key, "name");
            }
            other => unreachable!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn none_literal_treated_as_absent() {
        let mut meta = Metadata::new("x");
        meta.insert("start_date", "None");
        assert_eq!(meta.timestamp("start_date").expect("parse"), None);
    }

    #[test]
    fn timestamp_layouts_accepted() {
        for raw in [
            "2013-05-02 10:11:12.000123",
            "2013-05-02T10:11:12",
            "2013-05-02,10-11-12.000123",
            "2013-05-02T10:11:12+00:00",
        ] {
            assert!(parse_timestamp(raw).is_some(), "failed to parse {raw}");
        }
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn invalid_timestamp_is_an_error() {
        let mut meta = Metadata::new("x");
        meta.insert("create_date", "not a date");
        assert!(meta.timestamp("create_date").is_err());
    }

    #[test]
    fn write_then_read_preserves_values() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("figure.json");
        let mut meta = Metadata::new("figure");
        meta.insert("file_path", "plot.png");
        meta.insert("fk_op_id", "4");
        write_metadata(&path, &meta).expect("write");

        let restored = read_metadata(&path).expect("read");
        assert_eq!(restored.values(), meta.values());
    }
}
