//! # Burst Descriptor
//!
//! The optional `bursts.json` document at a project root. It has two
//! top-level fields:
//! - `bursts_dict`: old burst id -> burst payload (with its workflows)
//! - `dt_mapping`: datatype gid -> old burst id (or `null`)
//!
//! Old ids are exported either as JSON numbers or as strings; both are
//! normalised to [`OldBurstId`].

use crate::formats::metadata::read_document;
use crate::primitives::{BURSTS_KEY, DATATYPE_BURST_MAP_KEY};
use crate::{ImportError, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// A burst identifier as it was at export time.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct OldBurstId(pub String);

impl OldBurstId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for OldBurstId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawBurstId {
    Number(u64),
    Text(String),
}

impl<'de> Deserialize<'de> for OldBurstId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Ok(match RawBurstId::deserialize(deserializer)? {
            RawBurstId::Number(n) => Self(n.to_string()),
            RawBurstId::Text(s) => Self(s.trim().to_string()),
        })
    }
}

/// Reference to an algorithm by its implementing module and class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlgorithmRef {
    pub module: String,
    pub class_name: String,
}

impl std::fmt::Display for AlgorithmRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.module, self.class_name)
    }
}

/// One workflow step as exported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepPayload {
    /// Ordinal shared with the paired view step. Defaults to list position.
    #[serde(default)]
    pub index: Option<usize>,
    pub algorithm: AlgorithmRef,
    /// Gid of the operation this step launched.
    pub operation_gid: String,
    #[serde(default)]
    pub tab_index: i64,
    #[serde(default)]
    pub step_index: i64,
    #[serde(default)]
    pub static_param: serde_json::Value,
    #[serde(default)]
    pub dynamic_param: serde_json::Value,
    #[serde(default)]
    pub user_dependent: serde_json::Value,
}

/// One workflow view step (visual representation of a step) as exported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewStepPayload {
    /// Ordinal shared with the paired step. Defaults to list position.
    #[serde(default)]
    pub index: Option<usize>,
    pub algorithm: AlgorithmRef,
    pub portlet_identifier: String,
    #[serde(default)]
    pub ui_name: String,
    #[serde(default)]
    pub tab_index: i64,
    #[serde(default)]
    pub index_in_tab: i64,
    #[serde(default)]
    pub static_param: serde_json::Value,
    #[serde(default)]
    pub dynamic_param: serde_json::Value,
}

/// Ordinal of an entry given its position in the exported list.
pub(crate) fn ordinal(index: Option<usize>, position: usize) -> usize {
    index.unwrap_or(position)
}

/// A workflow with its parallel step and view-step lists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowPayload {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub workflow_steps: Vec<StepPayload>,
    #[serde(default)]
    pub view_steps: Vec<ViewStepPayload>,
}

/// A burst configuration and its workflows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BurstPayload {
    pub name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub simulator_configuration: serde_json::Value,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub finish_time: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub workflows: Vec<WorkflowPayload>,
}

/// The parsed burst descriptor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BurstDescriptor {
    #[serde(rename = "bursts_dict", default)]
    pub bursts: BTreeMap<OldBurstId, BurstPayload>,
    #[serde(rename = "dt_mapping", default)]
    pub datatype_bursts: BTreeMap<String, Option<OldBurstId>>,
}

impl BurstDescriptor {
    /// Read the descriptor at `path`.
    pub fn read(path: &Path) -> Result<Self> {
        let value = read_document(path)?;
        let has_keys = value
            .as_object()
            .is_some_and(|o| o.contains_key(BURSTS_KEY) && o.contains_key(DATATYPE_BURST_MAP_KEY));
        if !has_keys {
            return Err(ImportError::InvalidMetadata {
                file: path.display().to_string(),
                reason: format!(
                    "burst descriptor must contain '{}' and '{}'",
                    BURSTS_KEY, DATATYPE_BURST_MAP_KEY
                ),
            });
        }
        serde_json::from_value(value).map_err(|e| ImportError::InvalidMetadata {
            file: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    /// `datatype gid -> old burst id`, with `null` entries dropped.
    pub fn datatype_burst_map(&self) -> BTreeMap<String, OldBurstId> {
        self.datatype_bursts
            .iter()
            .filter_map(|(gid, old)| old.clone().map(|old| (gid.clone(), old)))
            .collect()
    }
}

// =============================================================================
// TESTS
// =============================================================================
