//! # Archive Formats
//!
//! Readers for the documents found inside an exported archive:
//! - `metadata`: project/operation marker files and image sidecars
//! - `artifact_file`: typed datatype files and their version upgrade
//! - `bursts`: the burst descriptor at a project root
//!
//! These are pure format translations. Moving files around is the job of
//! [`crate::layout`].

pub mod artifact_file;
pub mod bursts;
pub mod metadata;

pub use artifact_file::{
    ArtifactDocument, ArtifactHeader, dataset_names, read_artifact_metadata, upgrade_file,
    write_artifact_file,
};
pub use bursts::{
    AlgorithmRef, BurstDescriptor, BurstPayload, OldBurstId, StepPayload, ViewStepPayload,
    WorkflowPayload,
};
pub use metadata::{Metadata, format_timestamp, parse_timestamp, read_metadata, write_metadata};
