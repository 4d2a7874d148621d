//! # redb-backed Entity Storage
//!
//! A disk-backed entity store using the redb embedded database.
//!
//! Every entity kind lives in its own `id -> postcard bytes` table. Unique
//! keys (gids, project names, catalog identities) are kept in side index
//! tables that map the key to the row id.
//!
//! ## Transactions
//!
//! All writes of one import go through a single [`RedbTransaction`]. It is
//! committed only when the whole reconstruction succeeded; dropping or
//! aborting it discards every row written through it.

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
use redb::{
    Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition,
    WriteTransaction,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeSet;
use std::path::Path;

type RowTable = TableDefinition<'static, u64, &'static [u8]>;
type IndexTable = TableDefinition<'static, &'static str, u64>;

const PROJECTS: RowTable = TableDefinition::new("projects");
const OPERATION_GROUPS: RowTable = TableDefinition::new("operation_groups");
const OPERATIONS: RowTable = TableDefinition::new("operations");
const DATATYPE_GROUPS: RowTable = TableDefinition::new("datatype_groups");
const DATATYPES: RowTable = TableDefinition::new("datatypes");
const BURSTS: RowTable = TableDefinition::new("bursts");
const WORKFLOWS: RowTable = TableDefinition::new("workflows");
const WORKFLOW_STEPS: RowTable = TableDefinition::new("workflow_steps");
const WORKFLOW_STEP_VIEWS: RowTable = TableDefinition::new("workflow_step_views");
const FIGURES: RowTable = TableDefinition::new("figures");
const ALGORITHMS: RowTable = TableDefinition::new("algorithms");
const PORTLETS: RowTable = TableDefinition::new("portlets");

const ROW_TABLES: [RowTable; 12] = [
    PROJECTS,
    OPERATION_GROUPS,
    OPERATIONS,
    DATATYPE_GROUPS,
    DATATYPES,
    BURSTS,
    WORKFLOWS,
    WORKFLOW_STEPS,
    WORKFLOW_STEP_VIEWS,
    FIGURES,
    ALGORITHMS,
    PORTLETS,
];

const PROJECT_GIDS: IndexTable = TableDefinition::new("project_gids");
const PROJECT_NAMES: IndexTable = TableDefinition::new("project_names");
const OPERATION_GROUP_GIDS: IndexTable = TableDefinition::new("operation_group_gids");
const OPERATION_GIDS: IndexTable = TableDefinition::new("operation_gids");
const DATATYPE_GIDS: IndexTable = TableDefinition::new("datatype_gids");
const ALGORITHM_KEYS: IndexTable = TableDefinition::new("algorithm_keys");
const PORTLET_KEYS: IndexTable = TableDefinition::new("portlet_keys");

const INDEX_TABLES: [IndexTable; 7] = [
    PROJECT_GIDS,
    PROJECT_NAMES,
    OPERATION_GROUP_GIDS,
    OPERATION_GIDS,
    DATATYPE_GIDS,
    ALGORITHM_KEYS,
    PORTLET_KEYS,
];

/// Datatype group per operation group: operation group id -> datatype group id.
const DATATYPE_GROUP_INDEX: TableDefinition<u64, u64> =
    TableDefinition::new("datatype_group_index");

/// Table for metadata: key string -> value u64
const METADATA: TableDefinition<&str, u64> = TableDefinition::new("metadata");

const LAST_ID_KEY: &str = "last_id";

fn store_err<E: std::fmt::Display>(e: E) -> ImportError {
    ImportError::Store(e.to_string())
}

fn encode<T: Serialize>(row: &T) -> Result<Vec<u8>> {
    postcard::to_allocvec(row).map_err(|e| ImportError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    postcard::from_bytes(bytes).map_err(|e| ImportError::Serialization(e.to_string()))
}

/// Decode every row of a table, in id order.
fn decode_rows<T, Tab>(table: &Tab) -> Result<Vec<(u64, T)>>
where
    T: DeserializeOwned,
    Tab: ReadableTable<u64, &'static [u8]>,
{
    let mut rows = Vec::new();
    for entry in table.iter().map_err(store_err)? {
        let (key, value) = entry.map_err(store_err)?;
        rows.push((key.value(), decode(value.value())?));
    }
    Ok(rows)
}

// =============================================================================
// REDBSTORE
// =============================================================================

/// A disk-backed entity database.
pub struct RedbStore {
    db: Database,
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore").finish_non_exhaustive()
    }
}

impl RedbStore {
    /// Open or create an entity database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = Database::create(path.as_ref()).map_err(store_err)?;

        // Initialize tables if they don't exist
        {
            let write_txn = db.begin_write().map_err(store_err)?;
            for def in ROW_TABLES {
                write_txn.open_table(def).map_err(store_err)?;
            }
            for def in INDEX_TABLES {
                write_txn.open_table(def).map_err(store_err)?;
            }
            write_txn
                .open_table(DATATYPE_GROUP_INDEX)
                .map_err(store_err)?;
            write_txn.open_table(METADATA).map_err(store_err)?;
            write_txn.commit().map_err(store_err)?;
        }

        Ok(Self { db })
    }

    /// Start a write transaction.
    pub fn begin(&self) -> Result<RedbTransaction> {
        let txn = self.db.begin_write().map_err(store_err)?;
        Ok(RedbTransaction { txn })
    }

    /// Run `action` inside one write transaction.
    ///
    /// The transaction is committed if `action` returns `Ok` and aborted
    /// otherwise.
    pub fn transaction<T>(
        &self,
        action: impl FnOnce(&mut RedbTransaction) -> Result<T>,
    ) -> Result<T> {
        let mut txn = self.begin()?;
        match action(&mut txn) {
            Ok(value) => {
                txn.commit()?;
                Ok(value)
            }
            Err(err) => {
                txn.abort()?;
                Err(err)
            }
        }
    }

    fn read_rows<T: DeserializeOwned>(&self, def: RowTable) -> Result<Vec<T>> {
        let read_txn = self.db.begin_read().map_err(store_err)?;
        let table = read_txn.open_table(def).map_err(store_err)?;
        Ok(decode_rows(&table)?.into_iter().map(|(_, row)| row).collect())
    }

    /// All committed projects, in id order.
    pub fn projects(&self) -> Result<Vec<Project>> {
        self.read_rows(PROJECTS)
    }

    pub fn operation_groups(&self) -> Result<Vec<OperationGroup>> {
        self.read_rows(OPERATION_GROUPS)
    }

    pub fn operations(&self) -> Result<Vec<Operation>> {
        self.read_rows(OPERATIONS)
    }

    pub fn datatype_groups(&self) -> Result<Vec<DataTypeGroup>> {
        self.read_rows(DATATYPE_GROUPS)
    }

    pub fn datatypes(&self) -> Result<Vec<DataType>> {
        self.read_rows(DATATYPES)
    }

    pub fn bursts(&self) -> Result<Vec<Burst>> {
        self.read_rows(BURSTS)
    }

    pub fn workflows(&self) -> Result<Vec<Workflow>> {
        self.read_rows(WORKFLOWS)
    }

    pub fn workflow_steps(&self) -> Result<Vec<WorkflowStep>> {
        self.read_rows(WORKFLOW_STEPS)
    }

    pub fn workflow_step_views(&self) -> Result<Vec<WorkflowStepView>> {
        self.read_rows(WORKFLOW_STEP_VIEWS)
    }

    pub fn figures(&self) -> Result<Vec<ResultFigure>> {
        self.read_rows(FIGURES)
    }

    /// Committed row counts per entity.
    pub fn counts(&self) -> Result<StoreCounts> {
        let read_txn = self.db.begin_read().map_err(store_err)?;
        let len = |def: RowTable| -> Result<usize> {
            let table = read_txn.open_table(def).map_err(store_err)?;
            Ok(table.len().map_err(store_err)? as usize)
        };
        Ok(StoreCounts {
            projects: len(PROJECTS)?,
            operation_groups: len(OPERATION_GROUPS)?,
            operations: len(OPERATIONS)?,
            datatype_groups: len(DATATYPE_GROUPS)?,
            datatypes: len(DATATYPES)?,
            bursts: len(BURSTS)?,
            workflows: len(WORKFLOWS)?,
            workflow_steps: len(WORKFLOW_STEPS)?,
            workflow_step_views: len(WORKFLOW_STEP_VIEWS)?,
            figures: len(FIGURES)?,
            algorithms: len(ALGORITHMS)?,
            portlets: len(PORTLETS)?,
        })
    }
}

// =============================================================================
// REDBTRANSACTION
// =============================================================================

/// One write transaction of a [`RedbStore`].
///
/// Reads through this handle observe the transaction's own uncommitted
/// writes.
pub struct RedbTransaction {
    txn: WriteTransaction,
}

impl std::fmt::Debug for RedbTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbTransaction").finish_non_exhaustive()
    }
}

impl RedbTransaction {
    /// Make every write of this transaction durable.
    pub fn commit(self) -> Result<()> {
        self.txn.commit().map_err(store_err)
    }

    /// Discard every write of this transaction.
    pub fn abort(self) -> Result<()> {
        self.txn.abort().map_err(store_err)
    }

    /// Hand out the next id; ids are shared by all entity kinds.
    fn allocate(&self) -> Result<u64> {
        let mut table = self.txn.open_table(METADATA).map_err(store_err)?;
        let last = table
            .get(LAST_ID_KEY)
            .map_err(store_err)?
            .map(|v| v.value())
            .unwrap_or(0);
        let next = last.saturating_add(1);
        table.insert(LAST_ID_KEY, next).map_err(store_err)?;
        Ok(next)
    }

    fn put<T: Serialize>(&self, def: RowTable, id: u64, row: &T) -> Result<()> {
        let bytes = encode(row)?;
        let mut table = self.txn.open_table(def).map_err(store_err)?;
        table.insert(id, bytes.as_slice()).map_err(store_err)?;
        Ok(())
    }

    fn get<T: DeserializeOwned>(&self, def: RowTable, id: u64) -> Result<Option<T>> {
        let table = self.txn.open_table(def).map_err(store_err)?;
        let guard = table.get(id).map_err(store_err)?;
        match guard {
            Some(bytes) => Ok(Some(decode(bytes.value())?)),
            None => Ok(None),
        }
    }

    fn delete(&self, def: RowTable, id: u64) -> Result<()> {
        let mut table = self.txn.open_table(def).map_err(store_err)?;
        table.remove(id).map_err(store_err)?;
        Ok(())
    }

    fn scan<T: DeserializeOwned>(&self, def: RowTable) -> Result<Vec<(u64, T)>> {
        let table = self.txn.open_table(def).map_err(store_err)?;
        decode_rows(&table)
    }

    fn indexed(&self, def: IndexTable, key: &str) -> Result<Option<u64>> {
        let table = self.txn.open_table(def).map_err(store_err)?;
        let id = table.get(key).map_err(store_err)?.map(|v| v.value());
        Ok(id)
    }

    fn index(&self, def: IndexTable, key: &str, id: u64) -> Result<()> {
        let mut table = self.txn.open_table(def).map_err(store_err)?;
        table.insert(key, id).map_err(store_err)?;
        Ok(())
    }

    fn unindex(&self, def: IndexTable, key: &str) -> Result<()> {
        let mut table = self.txn.open_table(def).map_err(store_err)?;
        table.remove(key).map_err(store_err)?;
        Ok(())
    }

    /// Look up a row through a unique-key index.
    fn by_key<T: DeserializeOwned>(
        &self,
        index: IndexTable,
        rows: RowTable,
        key: &str,
    ) -> Result<Option<T>> {
        match self.indexed(index, key)? {
            Some(id) => self.get(rows, id),
            None => Ok(None),
        }
    }
}

impl EntityStore for RedbTransaction {
    fn store_project(&mut self, mut project: Project) -> Result<Project> {
        if self.indexed(PROJECT_GIDS, &project.gid)?.is_some()
            || self.indexed(PROJECT_NAMES, &project.name)?.is_some()
        {
            return Err(ImportError::DuplicateEntity(duplicate_project_message(
                &project,
            )));
        }
        let id = self.allocate()?;
        project.id = Some(ProjectId(id));
        self.put(PROJECTS, id, &project)?;
        self.index(PROJECT_GIDS, &project.gid, id)?;
        self.index(PROJECT_NAMES, &project.name, id)?;
        Ok(project)
    }

    fn remove_project(&mut self, id: ProjectId) -> Result<()> {
        if let Some(project) = self.get::<Project>(PROJECTS, id.0)? {
            self.delete(PROJECTS, id.0)?;
            self.unindex(PROJECT_GIDS, &project.gid)?;
            self.unindex(PROJECT_NAMES, &project.name)?;
        }

        let mut operations = BTreeSet::new();
        for (row_id, op) in self.scan::<Operation>(OPERATIONS)? {
            if op.fk_project == id {
                self.delete(OPERATIONS, row_id)?;
                self.unindex(OPERATION_GIDS, &op.gid)?;
                operations.insert(OperationId(row_id));
            }
        }

        let mut groups = BTreeSet::new();
        for (row_id, group) in self.scan::<OperationGroup>(OPERATION_GROUPS)? {
            if group.fk_project == id {
                self.delete(OPERATION_GROUPS, row_id)?;
                self.unindex(OPERATION_GROUP_GIDS, &group.gid)?;
                groups.insert(OperationGroupId(row_id));
            }
        }

        for (row_id, group) in self.scan::<DataTypeGroup>(DATATYPE_GROUPS)? {
            if groups.contains(&group.fk_operation_group) {
                self.delete(DATATYPE_GROUPS, row_id)?;
                let mut index = self
                    .txn
                    .open_table(DATATYPE_GROUP_INDEX)
                    .map_err(store_err)?;
                index.remove(group.fk_operation_group.0).map_err(store_err)?;
            }
        }

        for (row_id, datatype) in self.scan::<DataType>(DATATYPES)? {
            let owned = datatype
                .fk_from_operation
                .is_some_and(|op| operations.contains(&op));
            if owned {
                self.delete(DATATYPES, row_id)?;
                self.unindex(DATATYPE_GIDS, &datatype.gid)?;
            }
        }

        for (row_id, burst) in self.scan::<Burst>(BURSTS)? {
            if burst.fk_project == id {
                self.delete(BURSTS, row_id)?;
            }
        }

        let mut workflows = BTreeSet::new();
        for (row_id, workflow) in self.scan::<Workflow>(WORKFLOWS)? {
            if workflow.fk_project == id {
                self.delete(WORKFLOWS, row_id)?;
                workflows.insert(WorkflowId(row_id));
            }
        }
        for (row_id, step) in self.scan::<WorkflowStep>(WORKFLOW_STEPS)? {
            if workflows.contains(&step.fk_workflow) {
                self.delete(WORKFLOW_STEPS, row_id)?;
            }
        }
        for (row_id, view) in self.scan::<WorkflowStepView>(WORKFLOW_STEP_VIEWS)? {
            if workflows.contains(&view.fk_workflow) {
                self.delete(WORKFLOW_STEP_VIEWS, row_id)?;
            }
        }

        for (row_id, figure) in self.scan::<ResultFigure>(FIGURES)? {
            if figure.fk_project == id {
                self.delete(FIGURES, row_id)?;
            }
        }
        Ok(())
    }

    fn store_operation_group(&mut self, mut group: OperationGroup) -> Result<OperationGroup> {
        let id = self.allocate()?;
        group.id = Some(OperationGroupId(id));
        self.put(OPERATION_GROUPS, id, &group)?;
        self.index(OPERATION_GROUP_GIDS, &group.gid, id)?;
        Ok(group)
    }

    fn operation_group(&self, id: OperationGroupId) -> Result<Option<OperationGroup>> {
        self.get(OPERATION_GROUPS, id.0)
    }

    fn operation_group_by_gid(&self, gid: &str) -> Result<Option<OperationGroup>> {
        self.by_key(OPERATION_GROUP_GIDS, OPERATION_GROUPS, gid)
    }

    fn store_operation(&mut self, mut operation: Operation) -> Result<Operation> {
        if self.indexed(OPERATION_GIDS, &operation.gid)?.is_some() {
            return Err(ImportError::DuplicateEntity(format!(
                "Operation with gid {} already exists",
                operation.gid
            )));
        }
        let id = self.allocate()?;
        operation.id = Some(OperationId(id));
        self.put(OPERATIONS, id, &operation)?;
        self.index(OPERATION_GIDS, &operation.gid, id)?;
        Ok(operation)
    }

    fn operation_by_gid(&self, gid: &str) -> Result<Option<Operation>> {
        self.by_key(OPERATION_GIDS, OPERATIONS, gid)
    }

    fn datatype_group_for_operation_group(
        &self,
        group: OperationGroupId,
    ) -> Result<Option<DataTypeGroup>> {
        let id = {
            let index = self
                .txn
                .open_table(DATATYPE_GROUP_INDEX)
                .map_err(store_err)?;
            index.get(group.0).map_err(store_err)?.map(|v| v.value())
        };
        match id {
            Some(id) => self.get(DATATYPE_GROUPS, id),
            None => Ok(None),
        }
    }

    fn store_datatype_group(&mut self, mut group: DataTypeGroup) -> Result<DataTypeGroup> {
        if self
            .datatype_group_for_operation_group(group.fk_operation_group)?
            .is_some()
        {
            return Err(ImportError::DuplicateEntity(format!(
                "Operation group {} already has a datatype group",
                group.fk_operation_group
            )));
        }
        let id = self.allocate()?;
        group.id = Some(DataTypeGroupId(id));
        self.put(DATATYPE_GROUPS, id, &group)?;
        let mut index = self
            .txn
            .open_table(DATATYPE_GROUP_INDEX)
            .map_err(store_err)?;
        index
            .insert(group.fk_operation_group.0, id)
            .map_err(store_err)?;
        Ok(group)
    }

    fn store_datatype(&mut self, mut datatype: DataType) -> Result<DataType> {
        if self.indexed(DATATYPE_GIDS, &datatype.gid)?.is_some() {
            return Err(ImportError::DuplicateEntity(duplicate_datatype_message(
                &datatype.gid,
            )));
        }
        let id = self.allocate()?;
        datatype.id = Some(DataTypeId(id));
        self.put(DATATYPES, id, &datatype)?;
        self.index(DATATYPE_GIDS, &datatype.gid, id)?;
        Ok(datatype)
    }

    fn store_burst(&mut self, mut burst: Burst) -> Result<Burst> {
        let id = self.allocate()?;
        burst.id = Some(BurstId(id));
        self.put(BURSTS, id, &burst)?;
        Ok(burst)
    }

    fn store_workflow(&mut self, mut workflow: Workflow) -> Result<Workflow> {
        let id = self.allocate()?;
        workflow.id = Some(WorkflowId(id));
        self.put(WORKFLOWS, id, &workflow)?;
        Ok(workflow)
    }

    fn store_workflow_step(&mut self, mut step: WorkflowStep) -> Result<WorkflowStep> {
        let id = self.allocate()?;
        step.id = Some(WorkflowStepId(id));
        self.put(WORKFLOW_STEPS, id, &step)?;
        Ok(step)
    }

    fn store_workflow_step_view(&mut self, mut view: WorkflowStepView) -> Result<WorkflowStepView> {
        let id = self.allocate()?;
        view.id = Some(WorkflowStepViewId(id));
        self.put(WORKFLOW_STEP_VIEWS, id, &view)?;
        Ok(view)
    }

    fn store_figure(&mut self, mut figure: ResultFigure) -> Result<ResultFigure> {
        let id = self.allocate()?;
        figure.id = Some(FigureId(id));
        self.put(FIGURES, id, &figure)?;
        Ok(figure)
    }

    fn register_algorithm(&mut self, mut algorithm: Algorithm) -> Result<Algorithm> {
        if let Some(existing) =
            self.algorithm_by_identity(&algorithm.module, &algorithm.class_name)?
        {
            return Ok(existing);
        }
        let id = self.allocate()?;
        algorithm.id = Some(AlgorithmId(id));
        self.put(ALGORITHMS, id, &algorithm)?;
        self.index(
            ALGORITHM_KEYS,
            &algorithm_key(&algorithm.module, &algorithm.class_name),
            id,
        )?;
        Ok(algorithm)
    }

    fn register_portlet(&mut self, mut portlet: Portlet) -> Result<Portlet> {
        if let Some(existing) = self.portlet_by_identifier(&portlet.identifier)? {
            return Ok(existing);
        }
        let id = self.allocate()?;
        portlet.id = Some(PortletId(id));
        self.put(PORTLETS, id, &portlet)?;
        self.index(PORTLET_KEYS, &portlet.identifier, id)?;
        Ok(portlet)
    }

    fn algorithm_by_identity(&self, module: &str, class_name: &str) -> Result<Option<Algorithm>> {
        self.by_key(ALGORITHM_KEYS, ALGORITHMS, &algorithm_key(module, class_name))
    }

    fn portlet_by_identifier(&self, identifier: &str) -> Result<Option<Portlet>> {
        self.by_key(PORTLET_KEYS, PORTLETS, identifier)
    }
}

// =============================================================================
// TESTS
// =============================================================================
