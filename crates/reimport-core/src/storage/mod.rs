//! # Entity Storage
//!
//! The `EntityStore` trait is the persistence seam of the pipeline. It is
//! implemented by:
//! - [`MemoryStore`]: BTreeMap-backed, volatile
//! - [`RedbTransaction`]: one redb write transaction of a [`RedbStore`]
//!
//! Every `store_*` call assigns the entity's id and returns the persisted
//! entity. Uniqueness of project gid/name and of operation and datatype gids
//! is enforced here and reported as `ImportError::DuplicateEntity`.

mod memory;
pub mod redb_store;

pub use memory::MemoryStore;
pub use redb_store::{RedbStore, RedbTransaction};

use crate::Result;
use crate::model::{
    Algorithm, Burst, DataType, DataTypeGroup, Operation, OperationGroup, Portlet, Project,
    ResultFigure, Workflow, WorkflowStep, WorkflowStepView,
};
use crate::types::{OperationGroupId, ProjectId};
use serde::Serialize;

// =============================================================================
// ENTITYSTORE TRAIT
// =============================================================================

/// Persistence primitives required by the reconstruction pipeline.
pub trait EntityStore {
    /// Persist a project. Fails with `DuplicateEntity` on a gid or name clash.
    fn store_project(&mut self, project: Project) -> Result<Project>;

    /// Delete a project and every row that belongs to it.
    fn remove_project(&mut self, id: ProjectId) -> Result<()>;

    fn store_operation_group(&mut self, group: OperationGroup) -> Result<OperationGroup>;

    fn operation_group(&self, id: OperationGroupId) -> Result<Option<OperationGroup>>;

    fn operation_group_by_gid(&self, gid: &str) -> Result<Option<OperationGroup>>;

    /// Persist an operation. Fails with `DuplicateEntity` on a gid clash.
    fn store_operation(&mut self, operation: Operation) -> Result<Operation>;

    fn operation_by_gid(&self, gid: &str) -> Result<Option<Operation>>;

    /// The datatype group of an operation group.
    ///
    /// `Ok(None)` means definitely absent; any other failure is an error.
    fn datatype_group_for_operation_group(
        &self,
        group: OperationGroupId,
    ) -> Result<Option<DataTypeGroup>>;

    /// Persist a datatype group. At most one exists per operation group.
    fn store_datatype_group(&mut self, group: DataTypeGroup) -> Result<DataTypeGroup>;

    /// Persist a datatype. Fails with `DuplicateEntity` on a gid clash.
    fn store_datatype(&mut self, datatype: DataType) -> Result<DataType>;

    fn store_burst(&mut self, burst: Burst) -> Result<Burst>;

    fn store_workflow(&mut self, workflow: Workflow) -> Result<Workflow>;

    fn store_workflow_step(&mut self, step: WorkflowStep) -> Result<WorkflowStep>;

    fn store_workflow_step_view(&mut self, view: WorkflowStepView) -> Result<WorkflowStepView>;

    fn store_figure(&mut self, figure: ResultFigure) -> Result<ResultFigure>;

    /// Add an algorithm to the catalog (idempotent on `module.class_name`).
    fn register_algorithm(&mut self, algorithm: Algorithm) -> Result<Algorithm>;

    /// Add a portlet to the catalog (idempotent on its identifier).
    fn register_portlet(&mut self, portlet: Portlet) -> Result<Portlet>;

    fn algorithm_by_identity(&self, module: &str, class_name: &str) -> Result<Option<Algorithm>>;

    fn portlet_by_identifier(&self, identifier: &str) -> Result<Option<Portlet>>;
}

/// Catalog key of an algorithm.
pub(crate) fn algorithm_key(module: &str, class_name: &str) -> String {
    format!("{}.{}", module, class_name)
}

/// Message used for project gid/name collisions.
pub(crate) fn duplicate_project_message(project: &Project) -> String {
    format!(
        "Could not import project: {} with gid: {}. There is already a project with the same name or gid.",
        project.name, project.gid
    )
}

/// Message used for datatype gid collisions.
pub(crate) fn duplicate_datatype_message(gid: &str) -> String {
    format!(
        "Could not import data with gid: {}. There is already one with the same name or gid.",
        gid
    )
}

// =============================================================================
// COUNTS
// =============================================================================

/// Row counts per entity, for status reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreCounts {
    pub projects: usize,
    pub operation_groups: usize,
    pub operations: usize,
    pub datatype_groups: usize,
    pub datatypes: usize,
    pub bursts: usize,
    pub workflows: usize,
    pub workflow_steps: usize,
    pub workflow_step_views: usize,
    pub figures: usize,
    pub algorithms: usize,
    pub portlets: usize,
}
