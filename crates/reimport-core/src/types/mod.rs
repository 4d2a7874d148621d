//! # Core Type Definitions
//!
//! This module contains the identifier and error types shared by every stage
//! of the reconstruction pipeline:
//! - Store-assigned identifiers (`ProjectId`, `OperationId`, `BurstId`, ...)
//! - The caller identity (`UserId`)
//! - Error types (`ImportError`)
//!
//! Identifiers are plain `u64` newtypes. They implement `Ord` so that every
//! collection keyed by them iterates deterministically.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

// =============================================================================
// IDENTIFIERS
// =============================================================================

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        pub struct $name(pub u64);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

entity_id!(
    /// Identity of the user on whose behalf an import runs.
    UserId
);
entity_id!(
    /// Store-assigned project identifier.
    ProjectId
);
entity_id!(
    /// Store-assigned operation identifier. Also names the operation folder.
    OperationId
);
entity_id!(OperationGroupId);
entity_id!(DataTypeGroupId);
entity_id!(DataTypeId);
entity_id!(
    /// Store-assigned burst identifier.
    ///
    /// Bursts are the only entities whose export-time identifiers are
    /// referenced from elsewhere in an archive, see [`crate::IdentifierRemapper`].
    BurstId
);
entity_id!(WorkflowId);
entity_id!(WorkflowStepId);
entity_id!(WorkflowStepViewId);
entity_id!(FigureId);
entity_id!(AlgorithmId);
entity_id!(PortletId);

/// Unwrap an identifier the store was expected to assign.
pub(crate) fn assigned<T: Copy>(id: Option<T>, entity: &str) -> Result<T> {
    id.ok_or_else(|| ImportError::Store(format!("{} was not assigned an id", entity)))
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors raised while staging or reconstructing an archive.
///
/// Only `Structural` and `ImportFailure` cross the top-level boundary of
/// [`crate::ImportService`]; everything else is wrapped into `ImportFailure`
/// once the compensating rollback has run.
#[derive(Debug, Error)]
pub enum ImportError {
    /// The bundle cannot be unpacked or is not a recognizable export.
    #[error("Structural failure: {0}")]
    Structural(String),

    /// Reconstruction failed; every project created by the invocation was removed.
    #[error("{message}")]
    ImportFailure {
        message: String,
        #[source]
        cause: Box<ImportError>,
    },

    /// A project or datatype collides with an existing gid or name.
    #[error("Duplicate entity: {0}")]
    DuplicateEntity(String),

    /// A datatype's backing file lacks the datasets its kind requires.
    #[error("Incomplete data for datatype {gid}: {reason}")]
    IncompleteData { gid: String, reason: String },

    /// The embedded type tag of a datatype file is not registered.
    #[error("Unknown artifact type: {0}")]
    UnknownArtifactType(String),

    /// An export-time identifier was resolved before being recorded.
    #[error("Identifier {0} was resolved before it was recorded")]
    UnmappedIdentifier(String),

    /// A metadata document lacks a required key.
    #[error("Missing metadata key '{key}' in {file}")]
    MissingMetadata { file: String, key: String },

    /// A metadata document has a value that cannot be interpreted.
    #[error("Invalid metadata in {file}: {reason}")]
    InvalidMetadata { file: String, reason: String },

    /// A reference (operation, portlet) does not resolve in the store.
    #[error("Missing reference: {0}")]
    MissingReference(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(String),

    /// A serialization or deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The persistence store reported an error.
    #[error("Store error: {0}")]
    Store(String),
}

impl ImportError {
    /// Wrap `cause` into an `ImportFailure` carrying the cause's message.
    pub fn failure(cause: ImportError) -> Self {
        match cause {
            already @ Self::ImportFailure { .. } => already,
            cause => Self::ImportFailure {
                message: cause.to_string(),
                cause: Box::new(cause),
            },
        }
    }

    /// The innermost error, looking through `ImportFailure` wrappers.
    pub fn root_cause(&self) -> &ImportError {
        match self {
            Self::ImportFailure { cause, .. } => cause.root_cause(),
            other => other,
        }
    }

    /// Build an I/O error annotated with the path it concerns.
    pub fn io(path: &Path, err: std::io::Error) -> Self {
        Self::Io(format!("{}: {}", path.display(), err))
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ImportError>;

// =============================================================================
// TESTS
// =============================================================================
