//! # Datatype File Format
//!
//! On-disk format of typed datatype files.
//!
//! Format: Header (5 bytes) + JSON body.
//! - 4 bytes: Magic ("RCDT")
//! - 1 byte: Version
//! - JSON: `{"metadata": {key: value}, "datasets": {name: data}}`
//!
//! The metadata names the concrete kind through its `type` and `module` keys.
//! Version 1 files used `class` and `module_name` instead; [`upgrade_file`]
//! rewrites them in place.

use crate::formats::metadata::Metadata;
use crate::primitives::{DATATYPE_FORMAT_VERSION, DATATYPE_MAGIC, MAX_DOCUMENT_SIZE};
use crate::{ImportError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Size of the fixed file header.
const HEADER_SIZE: usize = 5;

/// Key renames applied when upgrading a version 1 file.
const V1_KEY_RENAMES: [(&str, &str); 2] = [("class", "type"), ("module_name", "module")];

// =============================================================================
// FILE HEADER
// =============================================================================

/// The header preceding every datatype document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArtifactHeader {
    pub magic: [u8; 4],
    pub version: u8,
}

impl ArtifactHeader {
    /// Create a header for the given format version.
    #[must_use]
    pub fn new(version: u8) -> Self {
        Self {
            magic: *DATATYPE_MAGIC,
            version,
        }
    }

    /// Validate magic bytes and version range.
    pub fn validate(&self) -> Result<()> {
        if &self.magic != DATATYPE_MAGIC {
            return Err(ImportError::Serialization(
                "Invalid datatype file magic".to_string(),
            ));
        }
        if self.version == 0 || self.version > DATATYPE_FORMAT_VERSION {
            return Err(ImportError::Serialization(format!(
                "Unsupported datatype file version: {} (max {})",
                self.version, DATATYPE_FORMAT_VERSION
            )));
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[0..4].copy_from_slice(&self.magic);
        bytes[4] = self.version;
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(ImportError::Serialization(
                "Datatype file header too short".to_string(),
            ));
        }
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[0..4]);
        Ok(Self {
            magic,
            version: bytes[4],
        })
    }
}

impl Default for ArtifactHeader {
    fn default() -> Self {
        Self::new(DATATYPE_FORMAT_VERSION)
    }
}

// =============================================================================
// DOCUMENT
// =============================================================================

/// Body of a datatype file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtifactDocument {
    /// Descriptive metadata, including the kind's `type`/`module` tag.
    pub metadata: BTreeMap<String, String>,
    /// Named datasets. Only their presence is inspected during import.
    #[serde(default)]
    pub datasets: BTreeMap<String, serde_json::Value>,
}

/// Serialize a document with the given header version.
pub fn artifact_to_bytes(version: u8, document: &ArtifactDocument) -> Result<Vec<u8>> {
    let body =
        serde_json::to_vec(document).map_err(|e| ImportError::Serialization(e.to_string()))?;
    let mut result = Vec::with_capacity(HEADER_SIZE + body.len());
    result.extend_from_slice(&ArtifactHeader::new(version).to_bytes());
    result.extend_from_slice(&body);
    Ok(result)
}

/// Deserialize a document, validating the header first.
pub fn artifact_from_bytes(bytes: &[u8]) -> Result<(ArtifactHeader, ArtifactDocument)> {
    let header = ArtifactHeader::from_bytes(bytes)?;
    header.validate()?;
    let document = serde_json::from_slice(&bytes[HEADER_SIZE..]).map_err(|e| {
        ImportError::Serialization(format!("Failed to parse datatype document: {}", e))
    })?;
    Ok((header, document))
}

/// Write a datatype file in the current format version.
pub fn write_artifact_file(path: &Path, document: &ArtifactDocument) -> Result<()> {
    let bytes = artifact_to_bytes(DATATYPE_FORMAT_VERSION, document)?;
    std::fs::write(path, bytes).map_err(|e| ImportError::io(path, e))
}

/// Read and validate a datatype file.
pub fn read_artifact_file(path: &Path) -> Result<(ArtifactHeader, ArtifactDocument)> {
    let size = std::fs::metadata(path)
        .map_err(|e| ImportError::io(path, e))?
        .len();
    if size > MAX_DOCUMENT_SIZE {
        return Err(ImportError::Serialization(format!(
            "{}: size {} bytes exceeds maximum allowed {} bytes",
            path.display(),
            size,
            MAX_DOCUMENT_SIZE
        )));
    }
    let bytes = std::fs::read(path).map_err(|e| ImportError::io(path, e))?;
    artifact_from_bytes(&bytes)
        .map_err(|e| ImportError::Serialization(format!("{}: {}", path.display(), e)))
}

/// Read the embedded metadata of a current-version datatype file.
pub fn read_artifact_metadata(path: &Path) -> Result<Metadata> {
    let (header, document) = read_artifact_file(path)?;
    if header.version != DATATYPE_FORMAT_VERSION {
        return Err(ImportError::Serialization(format!(
            "{}: version {} must be upgraded before loading",
            path.display(),
            header.version
        )));
    }
    Ok(Metadata::from_values(
        path.display().to_string(),
        document.metadata,
    ))
}

/// Names of the datasets present in a datatype file.
pub fn dataset_names(path: &Path) -> Result<BTreeSet<String>> {
    let (_, document) = read_artifact_file(path)?;
    Ok(document.datasets.into_keys().collect())
}

/// Bring a datatype file to the current format version, in place.
///
/// Returns `true` when the file was rewritten. Files already at the current
/// version are left untouched, so repeated calls are harmless.
pub fn upgrade_file(path: &Path) -> Result<bool> {
    let (header, mut document) = read_artifact_file(path)?;
    if header.version == DATATYPE_FORMAT_VERSION {
        return Ok(false);
    }

    for (old_key, new_key) in V1_KEY_RENAMES {
        if let Some(value) = document.metadata.remove(old_key) {
            document.metadata.entry(new_key.to_string()).or_insert(value);
        }
    }
    write_artifact_file(path, &document)?;
    tracing::debug!(
        "Upgraded datatype file {} from version {}",
        path.display(),
        header.version
    );
    Ok(true)
}

// =============================================================================
// TESTS
// =============================================================================
