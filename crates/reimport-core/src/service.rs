//! # Import Service
//!
//! Entry point tying staging, the store transaction and reconstruction
//! together.
//!
//! ```text
//! bundle ──► ArchiveStaging ──► RedbStore::transaction ──► ProjectReconstructor
//!                 │                    │ commit / abort          │ with_rollback
//!                 └── removed on drop ─┴─────────────────────────┘
//! ```
//!
//! Only `ImportError::Structural` (bundle unusable) and
//! `ImportError::ImportFailure` (reconstruction failed, nothing kept) leave
//! this module.

use crate::config::ImportConfig;
use crate::layout::StorageLayout;
use crate::model::Project;
use crate::reconstruct::ProjectReconstructor;
use crate::registry::DataTypeRegistry;
use crate::staging::ArchiveStaging;
use crate::storage::{EntityStore, RedbStore, RedbTransaction};
use crate::types::UserId;
use crate::{ImportError, Result};
use std::path::Path;

/// Imports exported bundles into one store.
#[derive(Debug)]
pub struct ImportService {
    store: RedbStore,
    config: ImportConfig,
    layout: StorageLayout,
    registry: DataTypeRegistry,
}

impl ImportService {
    /// A service over `store` that knows the built-in datatype kinds.
    pub fn new(store: RedbStore, config: ImportConfig) -> Self {
        let layout = StorageLayout::new(config.storage_root.clone());
        Self {
            store,
            config,
            layout,
            registry: DataTypeRegistry::with_builtin_kinds(),
        }
    }

    /// Replace the datatype registry.
    #[must_use]
    pub fn with_registry(mut self, registry: DataTypeRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn store(&self) -> &RedbStore {
        &self.store
    }

    pub fn config(&self) -> &ImportConfig {
        &self.config
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    /// Register the configured algorithm and portlet catalog.
    ///
    /// Returns `(algorithms, portlets)` entry counts. Safe to repeat.
    pub fn register_catalog(&self) -> Result<(usize, usize)> {
        let catalog = &self.config.catalog;
        self.store.transaction(|txn| {
            for entry in &catalog.algorithms {
                txn.register_algorithm(entry.to_algorithm())?;
            }
            for entry in &catalog.portlets {
                txn.register_portlet(entry.to_portlet())?;
            }
            Ok((catalog.algorithms.len(), catalog.portlets.len()))
        })
    }

    /// Unpack `bundle` and import every project it contains for `caller`.
    pub fn import_project_structure(&self, bundle: &Path, caller: UserId) -> Result<Vec<Project>> {
        let staging = ArchiveStaging::unpack(bundle, &self.config.staging_dir())?;
        let result = self.import_directory(staging.directory(), caller);
        drop(staging);
        result
    }

    /// Import every project found in an already unpacked tree.
    ///
    /// Projects are moved out of `staged_root` into canonical storage.
    pub fn import_directory(&self, staged_root: &Path, caller: UserId) -> Result<Vec<Project>> {
        if !staged_root.is_dir() {
            return Err(ImportError::Structural(format!(
                "{} is not a directory",
                staged_root.display()
            )));
        }
        self.import_and_commit(staged_root, caller, RedbTransaction::commit)
    }

    /// Reconstruct inside one transaction and finish it with `commit`.
    ///
    /// File moves stay journaled until `commit` succeeds, so a failed commit
    /// still removes the relocated project folders.
    fn import_and_commit(
        &self,
        staged_root: &Path,
        caller: UserId,
        commit: impl FnOnce(RedbTransaction) -> Result<()>,
    ) -> Result<Vec<Project>> {
        let reconstructor = ProjectReconstructor::new(
            &self.layout,
            &self.registry,
            &self.config.default_data_state,
        );
        let mut txn = self.store.begin().map_err(ImportError::failure)?;
        let (projects, mut journal) =
            match reconstructor.reconstruct_journaled(&mut txn, staged_root, caller) {
                Ok(done) => done,
                Err(err) => {
                    if let Err(abort_err) = txn.abort() {
                        tracing::warn!(error = %abort_err, "failed to abort import transaction");
                    }
                    return Err(ImportError::failure(err));
                }
            };

        if let Err(err) = commit(txn) {
            tracing::error!(error = %err, side_effects = journal.len(), "commit failed, rolling back");
            let failures = journal.unwind_files();
            if failures > 0 {
                tracing::warn!(failures, "rollback left residual state behind");
            }
            return Err(ImportError::failure(err));
        }

        tracing::info!(
            projects = projects.len(),
            caller = %caller,
            "import committed"
        );
        Ok(projects)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AlgorithmEntry, PortletEntry};
    use tempfile::TempDir;

    fn service(dir: &TempDir) -> ImportService {
        let config = ImportConfig {
            storage_root: dir.path().join("storage"),
            temp_dir: Some(dir.path().join("tmp")),
            ..ImportConfig::default()
        };
        let store = RedbStore::open(dir.path().join("store.redb")).expect("open store");
        ImportService::new(store, config)
    }

    #[test]
    fn catalog_registration_is_repeatable() {
        let dir = TempDir::new().expect("tempdir");
        let mut config = ImportConfig {
            storage_root: dir.path().join("storage"),
            ..ImportConfig::default()
        };
        config.catalog.algorithms.push(AlgorithmEntry {
            module: "adapters".to_string(),
            class_name: "Simulator".to_string(),
            name: String::new(),
        });
        config.catalog.portlets.push(PortletEntry {
            identifier: "viewer".to_string(),
            name: String::new(),
        });
        let store = RedbStore::open(dir.path().join("store.redb")).expect("open store");
        let service = ImportService::new(store, config);

        assert_eq!(service.register_catalog().expect("first"), (1, 1));
        service.register_catalog().expect("second");
        let counts = service.store().counts().expect("counts");
        assert_eq!(counts.algorithms, 1);
        assert_eq!(counts.portlets, 1);
    }

    #[test]
    fn missing_directory_is_structural() {
        let dir = TempDir::new().expect("tempdir");
        let service = service(&dir);
        assert!(matches!(
            service.import_directory(&dir.path().join("absent"), UserId(1)),
            Err(ImportError::Structural(_))
        ));
    }

    fn write_project(root: &Path) {
        use crate::formats::{Metadata, write_metadata};
        let project = root.join("demo");
        let operation = project.join("op");
        std::fs::create_dir_all(&operation).expect("mkdir");
        let mut meta = Metadata::new("project.json");
        meta.insert("gid", "p-demo");
        meta.insert("name", "demo");
        write_metadata(&project.join("project.json"), &meta).expect("project marker");
        let mut meta = Metadata::new("operation.json");
        meta.insert("gid", "op-1");
        write_metadata(&operation.join("operation.json"), &meta).expect("operation marker");
    }

    #[test]
    fn failed_commit_removes_relocated_folders() {
        let dir = TempDir::new().expect("tempdir");
        let staged = dir.path().join("staged");
        write_project(&staged);
        let service = service(&dir);

        let err = service
            .import_and_commit(&staged, UserId(1), |txn| {
                txn.abort()?;
                Err(ImportError::Store("disk full".to_string()))
            })
            .expect_err("commit fails");

        assert!(matches!(err, ImportError::ImportFailure { .. }));
        assert!(matches!(err.root_cause(), ImportError::Store(_)));
        assert!(!service.layout().project_dir("demo").expect("dir").exists());
        assert_eq!(service.store().counts().expect("counts").projects, 0);
    }

    #[test]
    fn committed_import_keeps_folders() {
        let dir = TempDir::new().expect("tempdir");
        let staged = dir.path().join("staged");
        write_project(&staged);
        let service = service(&dir);

        let projects = service.import_directory(&staged, UserId(1)).expect("import");
        assert_eq!(projects.len(), 1);
        let project_dir = service.layout().project_dir("demo").expect("dir");
        assert!(project_dir.join("project.json").exists());
        assert_eq!(service.store().counts().expect("counts").operations, 1);
    }

    #[test]
    fn unreadable_bundle_is_structural() {
        let dir = TempDir::new().expect("tempdir");
        let bundle = dir.path().join("bundle.zip");
        std::fs::write(&bundle, b"nope").expect("write");
        let service = service(&dir);

        assert!(matches!(
            service.import_project_structure(&bundle, UserId(1)),
            Err(ImportError::Structural(_))
        ));
        assert_eq!(service.store().counts().expect("counts").projects, 0);
    }
}
