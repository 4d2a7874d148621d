//! # Entity Model
//!
//! The entities rebuilt by an import, in ownership order:
//!
//! ```text
//! Project ─┬─ Operation ──── DataType
//!          │     └─ OperationGroup ── DataTypeGroup
//!          │     └─ ResultFigure
//!          └─ Burst ── Workflow ─┬─ WorkflowStep
//!                                └─ WorkflowStepView
//! ```
//!
//! Every entity carries `id: None` until the store assigns one. Entities are
//! built once from parsed descriptors and persisted exactly once.
//! `Algorithm` and `Portlet` are catalog entries that exist before an import.

use crate::formats::bursts::{BurstPayload, StepPayload, ViewStepPayload};
use crate::formats::metadata::{Metadata, parse_timestamp};
use crate::types::{
    AlgorithmId, BurstId, DataTypeGroupId, DataTypeId, FigureId, OperationGroupId, OperationId,
    PortletId, ProjectId, UserId, WorkflowId, WorkflowStepId, WorkflowStepViewId,
};
use crate::{ImportError, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

// =============================================================================
// PROJECT
// =============================================================================

/// Top-level container of operations and bursts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: Option<ProjectId>,
    pub gid: String,
    pub name: String,
    pub description: String,
    pub owner: UserId,
}

impl Project {
    /// Populate a project from its marker metadata, owned by `owner`.
    pub fn from_metadata(meta: &Metadata, owner: UserId) -> Result<Self> {
        Ok(Self {
            id: None,
            gid: meta.require("gid")?.to_string(),
            name: meta.require("name")?.to_string(),
            description: meta.get("description").unwrap_or_default().to_string(),
            owner,
        })
    }
}

// =============================================================================
// OPERATIONS
// =============================================================================

/// A group of operations launched together (a parameter-space exploration).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationGroup {
    pub id: Option<OperationGroupId>,
    pub gid: String,
    pub name: String,
    pub fk_project: ProjectId,
}

/// One unit of computation whose outputs are datatypes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub id: Option<OperationId>,
    pub gid: String,
    pub fk_project: ProjectId,
    pub fk_launched_by: UserId,
    pub fk_operation_group: Option<OperationGroupId>,
    pub algorithm: Option<String>,
    pub parameters: String,
    pub status: String,
    pub user_group: Option<String>,
    pub visible: bool,
    pub start_date: Option<NaiveDateTime>,
    pub create_date: Option<NaiveDateTime>,
    pub completion_date: Option<NaiveDateTime>,
    /// Marker file the operation was read from. Only meaningful during import.
    #[serde(skip)]
    pub import_file: Option<PathBuf>,
}

impl Operation {
    /// Populate an operation from its marker metadata.
    ///
    /// The operation group, if any, is resolved separately by the importer.
    pub fn from_metadata(meta: &Metadata, project: ProjectId, launched_by: UserId) -> Result<Self> {
        Ok(Self {
            id: None,
            gid: meta.require("gid")?.to_string(),
            fk_project: project,
            fk_launched_by: launched_by,
            fk_operation_group: None,
            algorithm: meta.get("algorithm").map(str::to_string),
            parameters: meta.get("parameters").unwrap_or("{}").to_string(),
            status: meta.get("status").unwrap_or("FINISHED").to_string(),
            user_group: meta.get("user_group").map(str::to_string),
            visible: meta.flag("visible", true)?,
            start_date: meta.timestamp("start_date")?,
            create_date: meta.timestamp("create_date")?,
            completion_date: meta.timestamp("completion_date")?,
            import_file: None,
        })
    }

    /// Replay ordering key: start date, else create date, else `now`.
    pub fn replay_key(&self, now: NaiveDateTime) -> NaiveDateTime {
        self.start_date.or(self.create_date).unwrap_or(now)
    }
}

// =============================================================================
// DATATYPES
// =============================================================================

/// Groups the datatypes produced by the operations of one operation group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataTypeGroup {
    pub id: Option<DataTypeGroupId>,
    pub gid: String,
    pub fk_operation_group: OperationGroupId,
    pub fk_from_operation: OperationId,
    pub state: String,
}

/// A typed, persisted result of an operation.
///
/// The concrete kind is named by `type_name`/`module`; instances are created
/// through [`crate::DataTypeRegistry`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataType {
    pub id: Option<DataTypeId>,
    pub gid: String,
    pub type_name: String,
    pub module: String,
    pub subject: String,
    pub state: String,
    pub user_tag: Option<String>,
    pub visible: bool,
    pub create_date: Option<NaiveDateTime>,
    pub fk_from_operation: Option<OperationId>,
    pub fk_datatype_group: Option<DataTypeGroupId>,
    pub fk_parent_burst: Option<BurstId>,
    /// Datasets the backing file must contain for the datatype to be usable.
    pub required_datasets: Vec<String>,
    /// Metadata values not mapped onto a field above.
    pub attributes: BTreeMap<String, String>,
    /// Backing file location.
    pub storage_path: PathBuf,
}

/// Metadata keys consumed by [`DataType::populate_from_metadata`].
const DATATYPE_FIELD_KEYS: [&str; 8] = [
    "gid",
    "type",
    "module",
    "subject",
    "state",
    "user_tag_1",
    "visible",
    "create_date",
];

impl DataType {
    /// A blank instance of the given kind.
    pub fn blank(type_name: &str, module: &str, required_datasets: &[&str]) -> Self {
        Self {
            id: None,
            gid: String::new(),
            type_name: type_name.to_string(),
            module: module.to_string(),
            subject: String::new(),
            state: String::new(),
            user_tag: None,
            visible: true,
            create_date: None,
            fk_from_operation: None,
            fk_datatype_group: None,
            fk_parent_burst: None,
            required_datasets: required_datasets.iter().map(|s| s.to_string()).collect(),
            attributes: BTreeMap::new(),
            storage_path: PathBuf::new(),
        }
    }

    /// Stable tag of the kind: `module.TypeName`.
    pub fn type_tag(&self) -> String {
        format!("{}.{}", self.module, self.type_name)
    }

    /// Fill common fields from embedded file metadata.
    pub fn populate_from_metadata(&mut self, meta: &Metadata) -> Result<()> {
        self.gid = meta.require("gid")?.to_string();
        self.subject = meta.get("subject").unwrap_or_default().to_string();
        self.state = meta.get("state").unwrap_or_default().to_string();
        self.user_tag = meta.get("user_tag_1").map(str::to_string);
        self.visible = meta.flag("visible", true)?;
        self.create_date = meta.timestamp("create_date")?;
        self.attributes = meta
            .values()
            .iter()
            .filter(|(k, _)| !DATATYPE_FIELD_KEYS.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Ok(())
    }

    /// File name this datatype is stored under inside its operation folder.
    pub fn storage_file_name(&self) -> String {
        format!(
            "{}_{}.{}",
            self.type_name,
            self.gid,
            crate::primitives::DATATYPE_FILE_EXTENSION
        )
    }
}

// =============================================================================
// BURSTS & WORKFLOWS
// =============================================================================

/// A named grouping of workflows within a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Burst {
    pub id: Option<BurstId>,
    pub fk_project: ProjectId,
    pub name: String,
    pub status: String,
    pub simulator_configuration: String,
    pub start_time: Option<NaiveDateTime>,
    pub finish_time: Option<NaiveDateTime>,
    pub error_message: Option<String>,
}

fn payload_timestamp(raw: Option<&str>, field: &str) -> Result<Option<NaiveDateTime>> {
    match raw.map(str::trim).filter(|r| !r.is_empty() && *r != "None") {
        None => Ok(None),
        Some(raw) => parse_timestamp(raw)
            .map(Some)
            .ok_or_else(|| ImportError::InvalidMetadata {
                file: crate::primitives::BURST_DESCRIPTOR_FILE.to_string(),
                reason: format!("'{}' is not a timestamp: {}", field, raw),
            }),
    }
}

impl Burst {
    /// Build a burst bound to `project` from its exported payload.
    pub fn from_payload(payload: &BurstPayload, project: ProjectId) -> Result<Self> {
        Ok(Self {
            id: None,
            fk_project: project,
            name: payload.name.clone(),
            status: payload.status.clone(),
            simulator_configuration: payload.simulator_configuration.to_string(),
            start_time: payload_timestamp(payload.start_time.as_deref(), "start_time")?,
            finish_time: payload_timestamp(payload.finish_time.as_deref(), "finish_time")?,
            error_message: payload.error_message.clone(),
        })
    }
}

/// A reconstructable pipeline of algorithm invocations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: Option<WorkflowId>,
    pub fk_project: ProjectId,
    pub fk_burst: BurstId,
    pub status: String,
}

/// One algorithm invocation of a workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub id: Option<WorkflowStepId>,
    pub fk_workflow: WorkflowId,
    pub fk_operation: OperationId,
    pub fk_algorithm: AlgorithmId,
    pub ordinal: usize,
    pub tab_index: i64,
    pub step_index: i64,
    pub static_param: String,
    pub dynamic_param: String,
    pub user_dependent: String,
}

impl WorkflowStep {
    pub fn from_payload(
        payload: &StepPayload,
        ordinal: usize,
        workflow: WorkflowId,
        operation: OperationId,
        algorithm: AlgorithmId,
    ) -> Self {
        Self {
            id: None,
            fk_workflow: workflow,
            fk_operation: operation,
            fk_algorithm: algorithm,
            ordinal,
            tab_index: payload.tab_index,
            step_index: payload.step_index,
            static_param: payload.static_param.to_string(),
            dynamic_param: payload.dynamic_param.to_string(),
            user_dependent: payload.user_dependent.to_string(),
        }
    }
}

/// Visual representation of a workflow step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowStepView {
    pub id: Option<WorkflowStepViewId>,
    pub fk_workflow: WorkflowId,
    pub fk_portlet: PortletId,
    pub fk_algorithm: AlgorithmId,
    pub ordinal: usize,
    pub ui_name: String,
    pub tab_index: i64,
    pub index_in_tab: i64,
    pub static_param: String,
    pub dynamic_param: String,
}

impl WorkflowStepView {
    pub fn from_payload(
        payload: &ViewStepPayload,
        ordinal: usize,
        workflow: WorkflowId,
        portlet: PortletId,
        algorithm: AlgorithmId,
    ) -> Self {
        Self {
            id: None,
            fk_workflow: workflow,
            fk_portlet: portlet,
            fk_algorithm: algorithm,
            ordinal,
            ui_name: payload.ui_name.clone(),
            tab_index: payload.tab_index,
            index_in_tab: payload.index_in_tab,
            static_param: payload.static_param.to_string(),
            dynamic_param: payload.dynamic_param.to_string(),
        }
    }
}

// =============================================================================
// FIGURES
// =============================================================================

/// An image produced by an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultFigure {
    pub id: Option<FigureId>,
    pub fk_operation: OperationId,
    pub fk_project: ProjectId,
    pub fk_user: UserId,
    pub name: String,
    pub session_name: String,
    pub image_format: String,
    pub file_path: PathBuf,
}

impl ResultFigure {
    /// Populate a figure from its sidecar metadata.
    pub fn from_metadata(
        meta: &Metadata,
        file_path: PathBuf,
        operation: OperationId,
        project: ProjectId,
        user: UserId,
    ) -> Self {
        let image_format = file_path
            .extension()
            .map(|e| e.to_string_lossy().to_string())
            .unwrap_or_default();
        Self {
            id: None,
            fk_operation: operation,
            fk_project: project,
            fk_user: user,
            name: meta.get("name").unwrap_or_default().to_string(),
            session_name: meta.get("session_name").unwrap_or_default().to_string(),
            image_format: meta
                .get("image_format")
                .map(str::to_string)
                .unwrap_or(image_format),
            file_path,
        }
    }
}

// =============================================================================
// CATALOG
// =============================================================================

/// A registered algorithm, referenced by workflow steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Algorithm {
    pub id: Option<AlgorithmId>,
    pub module: String,
    pub class_name: String,
    pub name: String,
}

/// A registered visualizer slot, referenced by workflow view steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Portlet {
    pub id: Option<PortletId>,
    pub identifier: String,
    pub name: String,
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2014, 3, 1)
            .and_then(|d| d.and_hms_opt(hour, 0, 0))
            .expect("valid date")
    }

    #[test]
    fn project_requires_name_and_gid() {
        let mut meta = Metadata::new("project.json");
        meta.insert("gid", "p-1");
        assert!(Project::from_metadata(&meta, UserId(1)).is_err());

        meta.insert("name", "demo");
        let project = Project::from_metadata(&meta, UserId(1)).expect("project");
        assert_eq!(project.name, "demo");
        assert_eq!(project.owner, UserId(1));
        assert!(project.id.is_none());
    }

    #[test]
    fn replay_key_prefers_start_then_create_then_now() {
        let mut meta = Metadata::new("operation.json");
        meta.insert("gid", "op");
        let mut op = Operation::from_metadata(&meta, ProjectId(1), UserId(1)).expect("op");
        assert_eq!(op.replay_key(at(23)), at(23));

        op.create_date = Some(at(5));
        assert_eq!(op.replay_key(at(23)), at(5));

        op.start_date = Some(at(3));
        assert_eq!(op.replay_key(at(23)), at(3));
    }

    #[test]
    fn datatype_metadata_split_into_fields_and_attributes() {
        let mut meta = Metadata::new("a.dt");
        meta.insert("gid", "dt-1");
        meta.insert("type", "TimeSeries");
        meta.insert("subject", "John Doe");
        meta.insert("create_date", "2014-03-01 05:00:00");
        meta.insert("sample_period", "0.5");

        let mut datatype = DataType::blank("TimeSeries", "datatypes.time_series", &["data"]);
        datatype.populate_from_metadata(&meta).expect("populate");

        assert_eq!(datatype.gid, "dt-1");
        assert_eq!(datatype.create_date, Some(at(5)));
        assert_eq!(datatype.attributes.get("sample_period").map(String::as_str), Some("0.5"));
        assert!(!datatype.attributes.contains_key("type"));
        assert_eq!(datatype.storage_file_name(), "TimeSeries_dt-1.dt");
        assert_eq!(datatype.type_tag(), "datatypes.time_series.TimeSeries");
    }

    #[test]
    fn burst_payload_times_parsed() {
        let payload = BurstPayload {
            name: "b".to_string(),
            start_time: Some("2014-03-01 05:00:00".to_string()),
            finish_time: Some("None".to_string()),
            ..BurstPayload::default()
        };
        let burst = Burst::from_payload(&payload, ProjectId(2)).expect("burst");
        assert_eq!(burst.start_time, Some(at(5)));
        assert_eq!(burst.finish_time, None);
        assert_eq!(burst.fk_project, ProjectId(2));
    }
}
