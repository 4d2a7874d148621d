//! # Archive Primitives
//!
//! Fixed names and constants of the exported archive layout and of the
//! canonical storage layout. These are compiled in and immutable at runtime.

/// Marker file identifying a project root inside a staged archive.
pub const PROJECT_MARKER_FILE: &str = "project.json";

/// Marker file identifying an operation folder.
pub const OPERATION_MARKER_FILE: &str = "operation.json";

/// Optional burst descriptor at a project root.
pub const BURST_DESCRIPTOR_FILE: &str = "bursts.json";

/// Top-level key of the burst descriptor holding `old burst id -> payload`.
pub const BURSTS_KEY: &str = "bursts_dict";

/// Top-level key of the burst descriptor holding `datatype gid -> old burst id`.
pub const DATATYPE_BURST_MAP_KEY: &str = "dt_mapping";

/// Extension of typed datatype files (without the dot).
pub const DATATYPE_FILE_EXTENSION: &str = "dt";

/// Extension of image sidecar metadata files (without the dot).
pub const IMAGE_METADATA_EXTENSION: &str = "json";

/// Folder, inside an operation folder, holding result figures.
pub const IMAGES_FOLDER: &str = "IMAGES";

/// Folder, under the storage root, holding one folder per project.
pub const PROJECTS_FOLDER: &str = "PROJECTS";

/// Suffix appended to operation folders while an import scan is in progress.
pub const STAGED_OPERATION_SUFFIX: &str = "tmp";

/// Suffix of the staging directory and archive copy names.
pub const STAGING_SUFFIX: &str = "ImportProject";

/// Magic bytes at the start of every datatype file.
pub const DATATYPE_MAGIC: &[u8; 4] = b"RCDT";

/// Current datatype file format version.
///
/// Version 1 files are upgraded in place before loading.
pub const DATATYPE_FORMAT_VERSION: u8 = 2;

/// State given to lazily created datatype groups when no configuration says otherwise.
pub const DEFAULT_DATA_STATE: &str = "INTERMEDIATE";

/// Maximum size accepted for a single metadata or descriptor document (16 MB).
pub const MAX_DOCUMENT_SIZE: u64 = 16 * 1024 * 1024;
