//! # reimport-core
//!
//! Archive-to-store reconstruction of exported research projects - THE LOGIC.
//!
//! An exported bundle describes one or more project graphs:
//! projects own operations, operations own typed datatypes and figures, and
//! bursts own workflows made of steps and view steps. This crate rebuilds
//! those graphs in a fresh store, assigning new identifiers, translating
//! burst references from the old identifier space, and replaying operations
//! in their original creation order.
//!
//! ## Recovery Model
//!
//! Two mechanisms cooperate:
//! - Store rows are written through one redb write transaction per import,
//!   committed only on success (`storage`).
//! - File moves are not transactional. They are recorded in a compensation
//!   journal and undone explicitly on failure (`rollback`).
//!
//! The one deliberate exception is a datatype whose file lacks required
//! datasets: it is dropped with a warning and the import carries on.
//!
//! ## Architectural Constraints
//!
//! - Pure Rust: no async, no network dependencies
//! - Deterministic: BTreeMap ordering, stable sorts on timestamps
//! - One import at a time per store; callers serialize

// =============================================================================
// MODULES
// =============================================================================

pub mod config;
pub mod formats;
pub mod layout;
pub mod loader;
pub mod model;
pub mod operations;
pub mod primitives;
pub mod reconstruct;
pub mod registry;
pub mod remap;
pub mod rollback;
pub mod service;
pub mod staging;
pub mod storage;
pub mod types;
pub mod workflows;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    AlgorithmId, BurstId, DataTypeGroupId, DataTypeId, FigureId, ImportError, OperationGroupId,
    OperationId, PortletId, ProjectId, Result, UserId, WorkflowId, WorkflowStepId,
    WorkflowStepViewId,
};

// =============================================================================
// RE-EXPORTS: Model & Storage
// =============================================================================

pub use model::{
    Algorithm, Burst, DataType, DataTypeGroup, Operation, OperationGroup, Portlet, Project,
    ResultFigure, Workflow, WorkflowStep, WorkflowStepView,
};
pub use storage::{EntityStore, MemoryStore, RedbStore, RedbTransaction, StoreCounts};

// =============================================================================
// RE-EXPORTS: Pipeline
// =============================================================================

pub use config::{AlgorithmEntry, Catalog, ImportConfig, PortletEntry};
pub use layout::StorageLayout;
pub use loader::DataTypeLoader;
pub use operations::{ImportedOperation, OperationImporter};
pub use reconstruct::ProjectReconstructor;
pub use registry::DataTypeRegistry;
pub use remap::IdentifierRemapper;
pub use rollback::{Compensation, RollbackJournal, with_rollback, with_rollback_journal};
pub use service::ImportService;
pub use staging::ArchiveStaging;
pub use workflows::{BurstWorkflowImporter, WorkflowImportSummary};
