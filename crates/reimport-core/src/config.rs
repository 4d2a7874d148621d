//! # Import Configuration
//!
//! Settings of an [`crate::ImportService`]. Every field has a default, so a
//! partial configuration document deserializes into a usable value.

use crate::model::{Algorithm, Portlet};
use crate::primitives::DEFAULT_DATA_STATE;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One algorithm catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlgorithmEntry {
    pub module: String,
    pub class_name: String,
    #[serde(default)]
    pub name: String,
}

impl AlgorithmEntry {
    pub fn to_algorithm(&self) -> Algorithm {
        let name = if self.name.is_empty() {
            self.class_name.clone()
        } else {
            self.name.clone()
        };
        Algorithm {
            id: None,
            module: self.module.clone(),
            class_name: self.class_name.clone(),
            name,
        }
    }
}

/// One portlet catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortletEntry {
    pub identifier: String,
    #[serde(default)]
    pub name: String,
}

impl PortletEntry {
    pub fn to_portlet(&self) -> Portlet {
        let name = if self.name.is_empty() {
            self.identifier.clone()
        } else {
            self.name.clone()
        };
        Portlet {
            id: None,
            identifier: self.identifier.clone(),
            name,
        }
    }
}

/// Algorithms and portlets that workflow steps may reference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub algorithms: Vec<AlgorithmEntry>,
    #[serde(default)]
    pub portlets: Vec<PortletEntry>,
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("storage")
}

fn default_data_state() -> String {
    DEFAULT_DATA_STATE.to_string()
}

/// Configuration of the import pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportConfig {
    /// Root of canonical storage; projects live under `<root>/PROJECTS`.
    #[serde(default = "default_storage_root")]
    pub storage_root: PathBuf,
    /// Parent of staging directories. Defaults to the system temp dir.
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,
    /// State of lazily created datatype groups.
    #[serde(default = "default_data_state")]
    pub default_data_state: String,
    #[serde(default)]
    pub catalog: Catalog,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            storage_root: default_storage_root(),
            temp_dir: None,
            default_data_state: default_data_state(),
            catalog: Catalog::default(),
        }
    }
}

impl ImportConfig {
    /// Effective staging parent directory.
    pub fn staging_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_document_uses_defaults() {
        let config: ImportConfig =
            serde_json::from_str(r#"{"storage_root": "/srv/data"}"#).expect("parse");
        assert_eq!(config.storage_root, PathBuf::from("/srv/data"));
        assert_eq!(config.default_data_state, "INTERMEDIATE");
        assert!(config.catalog.algorithms.is_empty());
        assert_eq!(config.staging_dir(), std::env::temp_dir());
    }

    #[test]
    fn catalog_entries_fall_back_to_identity_names() {
        let entry = AlgorithmEntry {
            module: "adapters.simulator".to_string(),
            class_name: "SimulatorAdapter".to_string(),
            name: String::new(),
        };
        assert_eq!(entry.to_algorithm().name, "SimulatorAdapter");

        let portlet = PortletEntry {
            identifier: "TimeSeries".to_string(),
            name: "Time series".to_string(),
        };
        assert_eq!(portlet.to_portlet().name, "Time series");
    }
}
