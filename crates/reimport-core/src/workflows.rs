//! # Burst Workflow Import
//!
//! Rebuilds the workflows of re-created bursts, with their steps and view
//! steps.
//!
//! Steps and view steps are two parallel lists paired by ordinal. When a
//! step's algorithm is not in the catalog, the step is skipped and so is the
//! view step with the same ordinal, even if the view's own algorithm
//! resolves. A view step whose algorithm is not in the catalog is skipped on
//! its own.

use crate::formats::bursts::ordinal;
use crate::formats::{BurstPayload, OldBurstId, ViewStepPayload, WorkflowPayload};
use crate::model::{Project, Workflow, WorkflowStep, WorkflowStepView};
use crate::remap::IdentifierRemapper;
use crate::storage::EntityStore;
use crate::types::{ProjectId, WorkflowId, assigned};
use crate::{ImportError, Result};
use std::collections::BTreeMap;

/// Counts of what a workflow import persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkflowImportSummary {
    pub workflows: usize,
    pub steps: usize,
    pub view_steps: usize,
}

/// Imports workflows, steps and view steps for already re-created bursts.
#[derive(Debug, Clone, Copy, Default)]
pub struct BurstWorkflowImporter;

impl BurstWorkflowImporter {
    /// Import the workflows of every burst in `bursts`.
    ///
    /// Each old burst id must already be recorded in `remap`.
    pub fn import_workflows<S: EntityStore + ?Sized>(
        &self,
        store: &mut S,
        project: &Project,
        bursts: &BTreeMap<OldBurstId, BurstPayload>,
        remap: &IdentifierRemapper,
    ) -> Result<WorkflowImportSummary> {
        let project_id = assigned(project.id, "project")?;
        let mut summary = WorkflowImportSummary::default();

        for (old_id, payload) in bursts {
            let burst = remap.resolve(old_id)?;
            for workflow_payload in &payload.workflows {
                let workflow = store.store_workflow(Workflow {
                    id: None,
                    fk_project: project_id,
                    fk_burst: burst,
                    status: workflow_payload.status.clone(),
                })?;
                let workflow_id = assigned(workflow.id, "workflow")?;
                summary.workflows += 1;
                self.import_steps(store, project_id, workflow_id, workflow_payload, &mut summary)?;
            }
        }

        tracing::debug!(
            project = %project.name,
            workflows = summary.workflows,
            steps = summary.steps,
            view_steps = summary.view_steps,
            "workflows imported"
        );
        Ok(summary)
    }

    fn import_steps<S: EntityStore + ?Sized>(
        &self,
        store: &mut S,
        project: ProjectId,
        workflow: WorkflowId,
        payload: &WorkflowPayload,
        summary: &mut WorkflowImportSummary,
    ) -> Result<()> {
        let mut views: Vec<(usize, &ViewStepPayload)> = payload
            .view_steps
            .iter()
            .enumerate()
            .map(|(position, view)| (ordinal(view.index, position), view))
            .collect();

        for (position, step) in payload.workflow_steps.iter().enumerate() {
            let step_ordinal = ordinal(step.index, position);
            let algorithm = store
                .algorithm_by_identity(&step.algorithm.module, &step.algorithm.class_name)?;
            let Some(algorithm) = algorithm else {
                tracing::debug!(
                    algorithm = %step.algorithm,
                    ordinal = step_ordinal,
                    "unknown algorithm, dropping step and its view"
                );
                views.retain(|(view_ordinal, _)| *view_ordinal != step_ordinal);
                continue;
            };
            let operation = store
                .operation_by_gid(&step.operation_gid)?
                .filter(|op| op.fk_project == project)
                .ok_or_else(|| {
                    ImportError::MissingReference(format!(
                        "operation {} of workflow step {}",
                        step.operation_gid, step_ordinal
                    ))
                })?;

            store.store_workflow_step(WorkflowStep::from_payload(
                step,
                step_ordinal,
                workflow,
                assigned(operation.id, "operation")?,
                assigned(algorithm.id, "algorithm")?,
            ))?;
            summary.steps += 1;
        }

        for (view_ordinal, view) in views {
            let algorithm = store
                .algorithm_by_identity(&view.algorithm.module, &view.algorithm.class_name)?;
            let Some(algorithm) = algorithm else {
                tracing::debug!(
                    algorithm = %view.algorithm,
                    ordinal = view_ordinal,
                    "unknown algorithm, dropping view step"
                );
                continue;
            };
            let portlet = store
                .portlet_by_identifier(&view.portlet_identifier)?
                .ok_or_else(|| {
                    ImportError::MissingReference(format!(
                        "portlet {} of view step {}",
                        view.portlet_identifier, view_ordinal
                    ))
                })?;

            store.store_workflow_step_view(WorkflowStepView::from_payload(
                view,
                view_ordinal,
                workflow,
                assigned(portlet.id, "portlet")?,
                assigned(algorithm.id, "algorithm")?,
            ))?;
            summary.view_steps += 1;
        }
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
