//! # Operation Import
//!
//! Discovers the operation folders of a relocated project, replays them in
//! their original creation order, and drives datatype and figure import for
//! each one.
//!
//! ## Replay order
//!
//! Later operations may consume datatypes produced by earlier ones, so
//! operations are stored sorted by `(start date, create date, now)` (first
//! present value wins). Inside one operation, datatypes are stored sorted by
//! their creation date. Both sorts are stable: ties keep discovery order.

use crate::formats::{OldBurstId, read_metadata, write_metadata};
use crate::layout::{StorageLayout, move_path, remove_dir_if_exists};
use crate::loader::DataTypeLoader;
use crate::model::{DataType, DataTypeGroup, Operation, OperationGroup, Project, ResultFigure};
use crate::primitives::{
    DATATYPE_FILE_EXTENSION, IMAGE_METADATA_EXTENSION, OPERATION_MARKER_FILE,
    STAGED_OPERATION_SUFFIX,
};
use crate::remap::IdentifierRemapper;
use crate::rollback::RollbackJournal;
use crate::storage::EntityStore;
use crate::types::{OperationId, ProjectId, UserId, assigned};
use crate::{ImportError, Result};
use chrono::NaiveDateTime;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Result of importing one operation.
#[derive(Debug, Clone)]
pub struct ImportedOperation {
    pub operation: Operation,
    /// Datatypes stored for the operation, in store order.
    pub datatypes: Vec<DataType>,
    pub figures: Vec<ResultFigure>,
}

/// Sort operations into replay order.
///
/// `now` stands in for operations with neither a start nor a create date;
/// it is captured once per import so all such operations compare equal.
pub fn sort_for_replay(operations: &mut [Operation], now: NaiveDateTime) {
    operations.sort_by_key(|operation| operation.replay_key(now));
}

/// Sort datatypes by creation date. Undated datatypes come first.
pub fn sort_datatypes(datatypes: &mut [DataType]) {
    datatypes.sort_by_key(|datatype| datatype.create_date);
}

/// Imports the operations of one project.
#[derive(Debug, Clone, Copy)]
pub struct OperationImporter<'a> {
    layout: &'a StorageLayout,
    loader: DataTypeLoader<'a>,
    default_data_state: &'a str,
    caller: UserId,
}

impl<'a> OperationImporter<'a> {
    pub fn new(
        layout: &'a StorageLayout,
        loader: DataTypeLoader<'a>,
        default_data_state: &'a str,
        caller: UserId,
    ) -> Self {
        Self {
            layout,
            loader,
            default_data_state,
            caller,
        }
    }

    /// Import every operation found under `root`.
    ///
    /// `datatype_bursts` maps datatype gids to the export-time id of their
    /// burst; those ids are translated through `remap`.
    pub fn import_operations<S: EntityStore + ?Sized>(
        &self,
        store: &mut S,
        journal: &mut RollbackJournal,
        project: &Project,
        root: &Path,
        datatype_bursts: &BTreeMap<String, OldBurstId>,
        remap: &IdentifierRemapper,
    ) -> Result<Vec<ImportedOperation>> {
        let project_id = assigned(project.id, "project")?;
        let mut operations = self.discover(store, project_id, root)?;
        sort_for_replay(&mut operations, chrono::Local::now().naive_local());

        let mut imported = Vec::with_capacity(operations.len());
        for operation in operations {
            imported.push(self.import_operation(
                store,
                journal,
                project,
                operation,
                datatype_bursts,
                remap,
            )?);
        }
        tracing::info!(
            project = %project.name,
            operations = imported.len(),
            "operations imported"
        );
        Ok(imported)
    }

    /// Find operation folders under `root`, rename each with the staging
    /// suffix, and build its operation from the marker file.
    fn discover<S: EntityStore + ?Sized>(
        &self,
        store: &mut S,
        project: ProjectId,
        root: &Path,
    ) -> Result<Vec<Operation>> {
        // A folder nested in an operation folder is part of that operation.
        let mut folders = Vec::new();
        let mut walker = WalkDir::new(root).sort_by_file_name().into_iter();
        while let Some(entry) = walker.next() {
            let entry = entry.map_err(|e| ImportError::Io(e.to_string()))?;
            if entry.file_type().is_dir() && entry.path().join(OPERATION_MARKER_FILE).is_file() {
                folders.push(entry.into_path());
                walker.skip_current_dir();
            }
        }

        let mut operations = Vec::with_capacity(folders.len());
        for folder in folders {
            let staged = staged_name(&folder);
            fs::rename(&folder, &staged).map_err(|e| ImportError::io(&folder, e))?;
            let marker = staged.join(OPERATION_MARKER_FILE);
            let mut operation = self.build_operation(store, project, &marker)?;
            operation.import_file = Some(marker);
            operations.push(operation);
        }
        Ok(operations)
    }

    fn build_operation<S: EntityStore + ?Sized>(
        &self,
        store: &mut S,
        project: ProjectId,
        marker: &Path,
    ) -> Result<Operation> {
        let metadata = read_metadata(marker)?;
        let mut operation = Operation::from_metadata(&metadata, project, self.caller)?;

        if let Some(group_gid) = metadata.get("operation_group") {
            let group = match store.operation_group_by_gid(group_gid)? {
                Some(group) => group,
                None => store.store_operation_group(OperationGroup {
                    id: None,
                    gid: group_gid.to_string(),
                    name: metadata
                        .get("operation_group_name")
                        .unwrap_or(group_gid)
                        .to_string(),
                    fk_project: project,
                })?,
            };
            operation.fk_operation_group = group.id;
        }
        Ok(operation)
    }

    fn import_operation<S: EntityStore + ?Sized>(
        &self,
        store: &mut S,
        journal: &mut RollbackJournal,
        project: &Project,
        operation: Operation,
        datatype_bursts: &BTreeMap<String, OldBurstId>,
        remap: &IdentifierRemapper,
    ) -> Result<ImportedOperation> {
        let staged = operation
            .import_file
            .as_deref()
            .and_then(Path::parent)
            .map(Path::to_path_buf)
            .ok_or_else(|| {
                ImportError::Io(format!("operation {} has no staged folder", operation.gid))
            })?;

        let operation = store.store_operation(operation)?;
        let operation_id = assigned(operation.id, "operation")?;
        tracing::debug!(gid = %operation.gid, id = %operation_id, "operation stored");
        let datatype_group = self.datatype_group(store, &operation, operation_id)?;

        let canonical = self.layout.operation_dir(&project.name, operation_id)?;
        if staged != canonical {
            remove_dir_if_exists(&canonical)?;
            move_path(&staged, &canonical)?;
            journal.relocated(&canonical);
        }

        let mut loaded = Vec::new();
        for file_name in datatype_files(&canonical)? {
            let path = canonical.join(&file_name);
            crate::formats::upgrade_file(&path)?;
            loaded.push(self.loader.load(
                &canonical,
                &file_name,
                operation_id,
                datatype_group.as_ref(),
            )?);
        }
        sort_datatypes(&mut loaded);

        let mut datatypes = Vec::with_capacity(loaded.len());
        for mut datatype in loaded {
            if let Some(old_burst) = datatype_bursts.get(&datatype.gid) {
                datatype.fk_parent_burst = Some(remap.resolve(old_burst)?);
            }
            match self.loader.store(store, datatype) {
                Ok(stored) => datatypes.push(stored),
                Err(ImportError::IncompleteData { gid, reason }) => {
                    tracing::warn!(
                        gid = %gid,
                        reason = %reason,
                        "datatype has missing data and was not imported"
                    );
                }
                Err(err) => return Err(err),
            }
        }

        let figures = self.import_figures(
            store,
            &self.layout.images_dir(&project.name, operation_id)?,
            &operation,
            project,
        )?;

        Ok(ImportedOperation {
            operation,
            datatypes,
            figures,
        })
    }

    /// The datatype group of a grouped operation, created on first use.
    fn datatype_group<S: EntityStore + ?Sized>(
        &self,
        store: &mut S,
        operation: &Operation,
        operation_id: OperationId,
    ) -> Result<Option<DataTypeGroup>> {
        let Some(group_id) = operation.fk_operation_group else {
            return Ok(None);
        };
        if let Some(existing) = store.datatype_group_for_operation_group(group_id)? {
            return Ok(Some(existing));
        }
        let operation_group = store.operation_group(group_id)?.ok_or_else(|| {
            ImportError::MissingReference(format!("operation group {}", group_id))
        })?;
        let group = store.store_datatype_group(DataTypeGroup {
            id: None,
            gid: operation_group.gid,
            fk_operation_group: group_id,
            fk_from_operation: operation_id,
            state: self.default_data_state.to_string(),
        })?;
        tracing::debug!(operation_group = %group_id, "datatype group created");
        Ok(Some(group))
    }

    /// Store the figures described by the sidecars under `images_dir` and
    /// rewrite each sidecar with the new ids.
    fn import_figures<S: EntityStore + ?Sized>(
        &self,
        store: &mut S,
        images_dir: &Path,
        operation: &Operation,
        project: &Project,
    ) -> Result<Vec<ResultFigure>> {
        if !images_dir.is_dir() {
            return Ok(Vec::new());
        }
        let operation_id = assigned(operation.id, "operation")?;
        let project_id = assigned(project.id, "project")?;

        let mut figures = Vec::new();
        for entry in WalkDir::new(images_dir).sort_by_file_name() {
            let entry = entry.map_err(|e| ImportError::Io(e.to_string()))?;
            let sidecar = entry.path();
            let is_sidecar = entry.file_type().is_file()
                && sidecar
                    .extension()
                    .is_some_and(|ext| ext == IMAGE_METADATA_EXTENSION);
            if !is_sidecar {
                continue;
            }

            let mut metadata = read_metadata(sidecar)?;
            let image = sidecar_image_path(sidecar, metadata.require("file_path")?);
            let Some(image) = image.filter(|p| p.exists()) else {
                tracing::debug!(sidecar = %sidecar.display(), "figure image missing, skipped");
                continue;
            };

            let figure = store.store_figure(ResultFigure::from_metadata(
                &metadata,
                image,
                operation_id,
                project_id,
                self.caller,
            ))?;
            let figure_id = assigned(figure.id, "figure")?;

            metadata.insert("id", figure_id.to_string());
            metadata.insert("fk_op_id", operation_id.to_string());
            metadata.insert("fk_user_id", self.caller.to_string());
            metadata.insert("fk_project_id", project_id.to_string());
            metadata.insert("file_path", figure.file_path.display().to_string());
            write_metadata(sidecar, &metadata)?;
            tracing::debug!(figure = %figure_id, "figure stored");
            figures.push(figure);
        }
        Ok(figures)
    }
}

/// `<folder><suffix>` next to `folder`.
fn staged_name(folder: &Path) -> PathBuf {
    let mut name = folder
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(STAGED_OPERATION_SUFFIX);
    folder.with_file_name(name)
}

/// The image next to `sidecar` named like the last component of `file_path`.
fn sidecar_image_path(sidecar: &Path, file_path: &str) -> Option<PathBuf> {
    let file_name = Path::new(file_path).file_name()?;
    Some(sidecar.parent()?.join(file_name))
}

/// Datatype file names directly inside `dir`, sorted.
fn datatype_files(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| ImportError::io(dir, e))? {
        let entry = entry.map_err(|e| ImportError::io(dir, e))?;
        let path = entry.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == DATATYPE_FILE_EXTENSION) {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
    }
    names.sort();
    Ok(names)
}

// =============================================================================
// TESTS
// =============================================================================
