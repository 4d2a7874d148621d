//! # Project Reconstruction
//!
//! Top-level orchestration of one import: finds the project roots of a
//! staged tree and rebuilds each project in turn.
//!
//! ## Per project
//!
//! 1. Store the project from its marker file.
//! 2. Read the burst descriptor, if present.
//! 3. Relocate the project folder to canonical storage.
//! 4. Re-create its bursts and record `old id -> new id`.
//! 5. Import its operations, datatypes and figures.
//! 6. Import the workflows of its bursts.
//!
//! Everything runs under [`with_rollback`]: on failure, every project created
//! by this invocation is removed together with its relocated files, and the
//! error is reported as `ImportError::ImportFailure`.

use crate::formats::{BurstDescriptor, read_metadata};
use crate::layout::{StorageLayout, relocate_tree};
use crate::loader::DataTypeLoader;
use crate::model::{Burst, Project};
use crate::operations::OperationImporter;
use crate::primitives::{BURST_DESCRIPTOR_FILE, PROJECT_MARKER_FILE};
use crate::registry::DataTypeRegistry;
use crate::remap::IdentifierRemapper;
use crate::rollback::{RollbackJournal, with_rollback_journal};
use crate::storage::EntityStore;
use crate::types::{UserId, assigned};
use crate::workflows::BurstWorkflowImporter;
use crate::{ImportError, Result};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Directories under `staged_root` holding a project marker file, in
/// discovery order.
pub fn find_project_roots(staged_root: &Path) -> Result<Vec<PathBuf>> {
    let mut roots = Vec::new();
    for entry in WalkDir::new(staged_root).sort_by_file_name() {
        let entry = entry.map_err(|e| ImportError::Io(e.to_string()))?;
        if entry.file_type().is_dir() && entry.path().join(PROJECT_MARKER_FILE).is_file() {
            roots.push(entry.into_path());
        }
    }
    Ok(roots)
}

/// Rebuilds the projects of a staged tree inside a store.
#[derive(Debug, Clone, Copy)]
pub struct ProjectReconstructor<'a> {
    layout: &'a StorageLayout,
    registry: &'a DataTypeRegistry,
    default_data_state: &'a str,
}

impl<'a> ProjectReconstructor<'a> {
    pub fn new(
        layout: &'a StorageLayout,
        registry: &'a DataTypeRegistry,
        default_data_state: &'a str,
    ) -> Self {
        Self {
            layout,
            registry,
            default_data_state,
        }
    }

    /// Reconstruct every project found under `staged_root` on behalf of
    /// `caller`.
    pub fn reconstruct<S: EntityStore + ?Sized>(
        &self,
        store: &mut S,
        staged_root: &Path,
        caller: UserId,
    ) -> Result<Vec<Project>> {
        self.reconstruct_journaled(store, staged_root, caller)
            .map(|(projects, _)| projects)
    }

    /// [`Self::reconstruct`], also returning the journal of file moves so a
    /// failed commit can still be compensated.
    pub fn reconstruct_journaled<S: EntityStore + ?Sized>(
        &self,
        store: &mut S,
        staged_root: &Path,
        caller: UserId,
    ) -> Result<(Vec<Project>, RollbackJournal)> {
        let roots = find_project_roots(staged_root).map_err(ImportError::failure)?;
        if roots.is_empty() {
            return Err(ImportError::failure(ImportError::Structural(format!(
                "no {} found under {}",
                PROJECT_MARKER_FILE,
                staged_root.display()
            ))));
        }

        with_rollback_journal(store, |store, journal| {
            let mut projects = Vec::with_capacity(roots.len());
            for root in &roots {
                projects.push(self.reconstruct_project(store, journal, root, caller)?);
            }
            Ok(projects)
        })
    }

    fn reconstruct_project<S: EntityStore + ?Sized>(
        &self,
        store: &mut S,
        journal: &mut RollbackJournal,
        root: &Path,
        caller: UserId,
    ) -> Result<Project> {
        tracing::debug!(path = %root.display(), "creating project");
        let metadata = read_metadata(&root.join(PROJECT_MARKER_FILE))?;
        let project = store.store_project(Project::from_metadata(&metadata, caller)?)?;
        let project_id = assigned(project.id, "project")?;
        journal.project_created(project_id, &project.name);

        let descriptor_file = root.join(BURST_DESCRIPTOR_FILE);
        let descriptor = if descriptor_file.is_file() {
            BurstDescriptor::read(&descriptor_file)?
        } else {
            BurstDescriptor::default()
        };

        let project_dir = self.layout.project_dir(&project.name)?;
        if relocate_tree(root, &project_dir)? {
            journal.relocated(&project_dir);
        }

        let mut remap = IdentifierRemapper::new();
        for (old_id, payload) in &descriptor.bursts {
            let burst = store.store_burst(Burst::from_payload(payload, project_id)?)?;
            remap.record(old_id.clone(), assigned(burst.id, "burst")?)?;
        }

        let operations = OperationImporter::new(
            self.layout,
            DataTypeLoader::new(self.registry),
            self.default_data_state,
            caller,
        )
        .import_operations(
            store,
            journal,
            &project,
            &project_dir,
            &descriptor.datatype_burst_map(),
            &remap,
        )?;

        let workflows =
            BurstWorkflowImporter.import_workflows(store, &project, &descriptor.bursts, &remap)?;

        tracing::info!(
            project = %project.name,
            gid = %project.gid,
            id = %project_id,
            bursts = remap.len(),
            operations = operations.len(),
            workflows = workflows.workflows,
            "project imported"
        );
        Ok(project)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::{Metadata, write_metadata};
    use crate::storage::MemoryStore;
    use tempfile::TempDir;

    fn write_project(root: &Path, gid: &str, name: &str) {
        std::fs::create_dir_all(root).expect("mkdir");
        let mut meta = Metadata::new(PROJECT_MARKER_FILE);
        meta.insert("gid", gid);
        meta.insert("name", name);
        write_metadata(&root.join(PROJECT_MARKER_FILE), &meta).expect("marker");
    }

    #[test]
    fn roots_found_in_name_order() {
        let dir = TempDir::new().expect("tempdir");
        write_project(&dir.path().join("b"), "p-b", "b");
        write_project(&dir.path().join("a/nested"), "p-a", "a");

        let roots = find_project_roots(dir.path()).expect("roots");
        assert_eq!(
            roots,
            vec![dir.path().join("a/nested"), dir.path().join("b")]
        );
    }

    #[test]
    fn empty_tree_is_import_failure() {
        let staged = TempDir::new().expect("tempdir");
        let storage = TempDir::new().expect("tempdir");
        let layout = StorageLayout::new(storage.path());
        let registry = DataTypeRegistry::with_builtin_kinds();
        let mut store = MemoryStore::new();

        let err = ProjectReconstructor::new(&layout, &registry, "INTERMEDIATE")
            .reconstruct(&mut store, staged.path(), UserId(1))
            .expect_err("nothing to import");
        assert!(matches!(err, ImportError::ImportFailure { .. }));
        assert!(matches!(err.root_cause(), ImportError::Structural(_)));
    }

    #[test]
    fn project_relocated_and_owned_by_caller() {
        let staged = TempDir::new().expect("tempdir");
        let storage = TempDir::new().expect("tempdir");
        write_project(&staged.path().join("export"), "p-1", "demo");

        let layout = StorageLayout::new(storage.path());
        let registry = DataTypeRegistry::with_builtin_kinds();
        let mut store = MemoryStore::new();
        let projects = ProjectReconstructor::new(&layout, &registry, "INTERMEDIATE")
            .reconstruct(&mut store, staged.path(), UserId(8))
            .expect("reconstruct");

        assert_eq!(projects.len(), 1);
        assert_eq!(projects[0].owner, UserId(8));
        let project_dir = layout.project_dir("demo").expect("dir");
        assert!(project_dir.join(PROJECT_MARKER_FILE).exists());
        assert!(!staged.path().join("export").exists());
    }

    #[test]
    fn second_project_failure_rolls_back_first() {
        let staged = TempDir::new().expect("tempdir");
        let storage = TempDir::new().expect("tempdir");
        write_project(&staged.path().join("a"), "p-1", "first");
        // Same gid as the first project.
        write_project(&staged.path().join("b"), "p-1", "second");

        let layout = StorageLayout::new(storage.path());
        let registry = DataTypeRegistry::with_builtin_kinds();
        let mut store = MemoryStore::new();
        let err = ProjectReconstructor::new(&layout, &registry, "INTERMEDIATE")
            .reconstruct(&mut store, staged.path(), UserId(1))
            .expect_err("duplicate");

        assert!(matches!(err.root_cause(), ImportError::DuplicateEntity(_)));
        assert_eq!(store.counts().projects, 0);
        assert!(!layout.project_dir("first").expect("dir").exists());
    }
}
