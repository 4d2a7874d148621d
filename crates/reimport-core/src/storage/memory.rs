//! In-memory `EntityStore`.
//!
//! Uses `BTreeMap` throughout so listings come back in id order.

use super::{
    EntityStore, StoreCounts, algorithm_key, duplicate_datatype_message,
    duplicate_project_message,
};
use crate::model::{
    Algorithm, Burst, DataType, DataTypeGroup, Operation, OperationGroup, Portlet, Project,
    ResultFigure, Workflow, WorkflowStep, WorkflowStepView,
};
use crate::types::{
    AlgorithmId, BurstId, DataTypeGroupId, DataTypeId, FigureId, OperationGroupId, OperationId,
    PortletId, ProjectId, WorkflowId, WorkflowStepId, WorkflowStepViewId,
};
use crate::{ImportError, Result};
use std::collections::{BTreeMap, BTreeSet};

/// A volatile store. Cloning it takes a full snapshot.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    /// Last id handed out; ids start at 1 and are shared by all entities.
    last_id: u64,
    projects: BTreeMap<ProjectId, Project>,
    operation_groups: BTreeMap<OperationGroupId, OperationGroup>,
    operations: BTreeMap<OperationId, Operation>,
    datatype_groups: BTreeMap<DataTypeGroupId, DataTypeGroup>,
    datatypes: BTreeMap<DataTypeId, DataType>,
    bursts: BTreeMap<BurstId, Burst>,
    workflows: BTreeMap<WorkflowId, Workflow>,
    workflow_steps: BTreeMap<WorkflowStepId, WorkflowStep>,
    workflow_step_views: BTreeMap<WorkflowStepViewId, WorkflowStepView>,
    figures: BTreeMap<FigureId, ResultFigure>,
    algorithms: BTreeMap<AlgorithmId, Algorithm>,
    portlets: BTreeMap<PortletId, Portlet>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate(&mut self) -> u64 {
        self.last_id = self.last_id.saturating_add(1);
        self.last_id
    }

    pub fn projects(&self) -> Vec<Project> {
        self.projects.values().cloned().collect()
    }

    pub fn operations(&self) -> Vec<Operation> {
        self.operations.values().cloned().collect()
    }

    pub fn datatype_groups(&self) -> Vec<DataTypeGroup> {
        self.datatype_groups.values().cloned().collect()
    }

    pub fn datatypes(&self) -> Vec<DataType> {
        self.datatypes.values().cloned().collect()
    }

    pub fn bursts(&self) -> Vec<Burst> {
        self.bursts.values().cloned().collect()
    }

    pub fn workflows(&self) -> Vec<Workflow> {
        self.workflows.values().cloned().collect()
    }

    pub fn workflow_steps(&self) -> Vec<WorkflowStep> {
        self.workflow_steps.values().cloned().collect()
    }

    pub fn workflow_step_views(&self) -> Vec<WorkflowStepView> {
        self.workflow_step_views.values().cloned().collect()
    }

    pub fn figures(&self) -> Vec<ResultFigure> {
        self.figures.values().cloned().collect()
    }

    pub fn counts(&self) -> StoreCounts {
        StoreCounts {
            projects: self.projects.len(),
            operation_groups: self.operation_groups.len(),
            operations: self.operations.len(),
            datatype_groups: self.datatype_groups.len(),
            datatypes: self.datatypes.len(),
            bursts: self.bursts.len(),
            workflows: self.workflows.len(),
            workflow_steps: self.workflow_steps.len(),
            workflow_step_views: self.workflow_step_views.len(),
            figures: self.figures.len(),
            algorithms: self.algorithms.len(),
            portlets: self.portlets.len(),
        }
    }
}

impl EntityStore for MemoryStore {
    fn store_project(&mut self, mut project: Project) -> Result<Project> {
        let clash = self
            .projects
            .values()
            .any(|p| p.gid == project.gid || p.name == project.name);
        if clash {
            return Err(ImportError::DuplicateEntity(duplicate_project_message(
                &project,
            )));
        }
        let id = ProjectId(self.allocate());
        project.id = Some(id);
        self.projects.insert(id, project.clone());
        Ok(project)
    }

    fn remove_project(&mut self, id: ProjectId) -> Result<()> {
        self.projects.remove(&id);

        let operations: BTreeSet<OperationId> = self
            .operations
            .iter()
            .filter(|(_, op)| op.fk_project == id)
            .map(|(op_id, _)| *op_id)
            .collect();
        let groups: BTreeSet<OperationGroupId> = self
            .operation_groups
            .iter()
            .filter(|(_, g)| g.fk_project == id)
            .map(|(g_id, _)| *g_id)
            .collect();
        let workflows: BTreeSet<WorkflowId> = self
            .workflows
            .iter()
            .filter(|(_, wf)| wf.fk_project == id)
            .map(|(wf_id, _)| *wf_id)
            .collect();

        self.operations.retain(|op_id, _| !operations.contains(op_id));
        self.operation_groups.retain(|g_id, _| !groups.contains(g_id));
        self.datatype_groups
            .retain(|_, g| !groups.contains(&g.fk_operation_group));
        self.datatypes.retain(|_, dt| {
            dt.fk_from_operation
                .is_none_or(|op_id| !operations.contains(&op_id))
        });
        self.bursts.retain(|_, b| b.fk_project != id);
        self.workflows.retain(|wf_id, _| !workflows.contains(wf_id));
        self.workflow_steps
            .retain(|_, s| !workflows.contains(&s.fk_workflow));
        self.workflow_step_views
            .retain(|_, v| !workflows.contains(&v.fk_workflow));
        self.figures.retain(|_, f| f.fk_project != id);
        Ok(())
    }

    fn store_operation_group(&mut self, mut group: OperationGroup) -> Result<OperationGroup> {
        let id = OperationGroupId(self.allocate());
        group.id = Some(id);
        self.operation_groups.insert(id, group.clone());
        Ok(group)
    }

    fn operation_group(&self, id: OperationGroupId) -> Result<Option<OperationGroup>> {
        Ok(self.operation_groups.get(&id).cloned())
    }

    fn operation_group_by_gid(&self, gid: &str) -> Result<Option<OperationGroup>> {
        Ok(self
            .operation_groups
            .values()
            .find(|g| g.gid == gid)
            .cloned())
    }

    fn store_operation(&mut self, mut operation: Operation) -> Result<Operation> {
        if self.operations.values().any(|op| op.gid == operation.gid) {
            return Err(ImportError::DuplicateEntity(format!(
                "Operation with gid {} already exists",
                operation.gid
            )));
        }
        let id = OperationId(self.allocate());
        operation.id = Some(id);
        self.operations.insert(id, operation.clone());
        Ok(operation)
    }

    fn operation_by_gid(&self, gid: &str) -> Result<Option<Operation>> {
        Ok(self.operations.values().find(|op| op.gid == gid).cloned())
    }

    fn datatype_group_for_operation_group(
        &self,
        group: OperationGroupId,
    ) -> Result<Option<DataTypeGroup>> {
        Ok(self
            .datatype_groups
            .values()
            .find(|g| g.fk_operation_group == group)
            .cloned())
    }

    fn store_datatype_group(&mut self, mut group: DataTypeGroup) -> Result<DataTypeGroup> {
        if self
            .datatype_groups
            .values()
            .any(|g| g.fk_operation_group == group.fk_operation_group)
        {
            return Err(ImportError::DuplicateEntity(format!(
                "Operation group {} already has a datatype group",
                group.fk_operation_group
            )));
        }
        let id = DataTypeGroupId(self.allocate());
        group.id = Some(id);
        self.datatype_groups.insert(id, group.clone());
        Ok(group)
    }

    fn store_datatype(&mut self, mut datatype: DataType) -> Result<DataType> {
        if self.datatypes.values().any(|dt| dt.gid == datatype.gid) {
            return Err(ImportError::DuplicateEntity(duplicate_datatype_message(
                &datatype.gid,
            )));
        }
        let id = DataTypeId(self.allocate());
        datatype.id = Some(id);
        self.datatypes.insert(id, datatype.clone());
        Ok(datatype)
    }

    fn store_burst(&mut self, mut burst: Burst) -> Result<Burst> {
        let id = BurstId(self.allocate());
        burst.id = Some(id);
        self.bursts.insert(id, burst.clone());
        Ok(burst)
    }

    fn store_workflow(&mut self, mut workflow: Workflow) -> Result<Workflow> {
        let id = WorkflowId(self.allocate());
        workflow.id = Some(id);
        self.workflows.insert(id, workflow.clone());
        Ok(workflow)
    }

    fn store_workflow_step(&mut self, mut step: WorkflowStep) -> Result<WorkflowStep> {
        let id = WorkflowStepId(self.allocate());
        step.id = Some(id);
        self.workflow_steps.insert(id, step.clone());
        Ok(step)
    }

    fn store_workflow_step_view(&mut self, mut view: WorkflowStepView) -> Result<WorkflowStepView> {
        let id = WorkflowStepViewId(self.allocate());
        view.id = Some(id);
        self.workflow_step_views.insert(id, view.clone());
        Ok(view)
    }

    fn store_figure(&mut self, mut figure: ResultFigure) -> Result<ResultFigure> {
        let id = FigureId(self.allocate());
        figure.id = Some(id);
        self.figures.insert(id, figure.clone());
        Ok(figure)
    }

    fn register_algorithm(&mut self, mut algorithm: Algorithm) -> Result<Algorithm> {
        if let Some(existing) =
            self.algorithm_by_identity(&algorithm.module, &algorithm.class_name)?
        {
            return Ok(existing);
        }
        let id = AlgorithmId(self.allocate());
        algorithm.id = Some(id);
        self.algorithms.insert(id, algorithm.clone());
        Ok(algorithm)
    }

    fn register_portlet(&mut self, mut portlet: Portlet) -> Result<Portlet> {
        if let Some(existing) = self.portlet_by_identifier(&portlet.identifier)? {
            return Ok(existing);
        }
        let id = PortletId(self.allocate());
        portlet.id = Some(id);
        self.portlets.insert(id, portlet.clone());
        Ok(portlet)
    }

    fn algorithm_by_identity(&self, module: &str, class_name: &str) -> Result<Option<Algorithm>> {
        let key = algorithm_key(module, class_name);
        Ok(self
            .algorithms
            .values()
            .find(|a| algorithm_key(&a.module, &a.class_name) == key)
            .cloned())
    }

    fn portlet_by_identifier(&self, identifier: &str) -> Result<Option<Portlet>> {
        Ok(self
            .portlets
            .values()
            .find(|p| p.identifier == identifier)
            .cloned())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UserId;

    fn project(gid: &str, name: &str) -> Project {
        Project {
            id: None,
            gid: gid.to_string(),
            name: name.to_string(),
            description: String::new(),
            owner: UserId(1),
        }
    }

    #[test]
    fn ids_assigned_on_store() {
        let mut store = MemoryStore::new();
        let stored = store.store_project(project("p-1", "one")).expect("store");
        assert!(stored.id.is_some());
        assert_eq!(store.counts().projects, 1);
    }

    #[test]
    fn duplicate_project_gid_or_name_rejected() {
        let mut store = MemoryStore::new();
        store.store_project(project("p-1", "one")).expect("store");

        assert!(matches!(
            store.store_project(project("p-1", "other")),
            Err(ImportError::DuplicateEntity(_))
        ));
        assert!(matches!(
            store.store_project(project("p-2", "one")),
            Err(ImportError::DuplicateEntity(_))
        ));
    }

    #[test]
    fn remove_project_cascades() {
        let mut store = MemoryStore::new();
        let p = store.store_project(project("p-1", "one")).expect("store");
        let project_id = p.id.expect("id");
        store
            .store_burst(Burst {
                id: None,
                fk_project: project_id,
                name: "b".to_string(),
                status: String::new(),
                simulator_configuration: String::new(),
                start_time: None,
                finish_time: None,
                error_message: None,
            })
            .expect("burst");

        store.remove_project(project_id).expect("remove");
        assert_eq!(store.counts(), StoreCounts::default());
    }

    #[test]
    fn catalog_registration_idempotent() {
        let mut store = MemoryStore::new();
        let algorithm = Algorithm {
            id: None,
            module: "sim.adapters".to_string(),
            class_name: "SimulatorAdapter".to_string(),
            name: "Simulator".to_string(),
        };
        let first = store.register_algorithm(algorithm.clone()).expect("first");
        let second = store.register_algorithm(algorithm).expect("second");
        assert_eq!(first.id, second.id);
        assert!(
            store
                .algorithm_by_identity("sim.adapters", "SimulatorAdapter")
                .expect("lookup")
                .is_some()
        );
    }
}
