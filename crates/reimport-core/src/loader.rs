//! # DataType Loader
//!
//! Turns one datatype file inside an operation folder into a typed, bound
//! [`DataType`], and persists it.
//!
//! Loading and storing are separate steps: the operation importer loads all
//! datatypes of an operation first, sorts them by creation date, then stores
//! them one by one.
//!
//! `store` has two failure modes that both delete the backing file:
//! - `IncompleteData`: the file lacks datasets its kind requires. The caller
//!   drops this one datatype and carries on.
//! - `DuplicateEntity`: the gid is already taken. This aborts the import.

use crate::formats::{dataset_names, read_artifact_metadata};
use crate::layout::{move_path, remove_file_if_exists, require_plain_name};
use crate::model::{DataType, DataTypeGroup};
use crate::registry::DataTypeRegistry;
use crate::storage::EntityStore;
use crate::types::OperationId;
use crate::{ImportError, Result};
use std::collections::BTreeSet;
use std::path::Path;

/// Loads and stores datatypes using the kinds of a [`DataTypeRegistry`].
#[derive(Debug, Clone, Copy)]
pub struct DataTypeLoader<'a> {
    registry: &'a DataTypeRegistry,
}

impl<'a> DataTypeLoader<'a> {
    pub fn new(registry: &'a DataTypeRegistry) -> Self {
        Self { registry }
    }

    /// Build the datatype stored in `storage_dir/file_name`.
    ///
    /// The datatype is bound to `operation` and, if given, to `group`. Its
    /// backing file is moved to `storage_dir/<Type>_<gid>.dt` unless it is
    /// already there.
    pub fn load(
        &self,
        storage_dir: &Path,
        file_name: &str,
        operation: OperationId,
        group: Option<&DataTypeGroup>,
    ) -> Result<DataType> {
        let current = storage_dir.join(file_name);
        tracing::debug!(file = %current.display(), "loading datatype");

        let metadata = read_artifact_metadata(&current)?;
        let mut datatype = self
            .registry
            .create(metadata.require("module")?, metadata.require("type")?)?;
        datatype.populate_from_metadata(&metadata)?;
        datatype.fk_from_operation = Some(operation);
        if let Some(group) = group {
            datatype.fk_datatype_group = group.id;
        }

        require_plain_name(&datatype.gid, &current.display().to_string(), "datatype gid")?;
        let canonical = storage_dir.join(datatype.storage_file_name());
        if canonical.parent() != Some(storage_dir) {
            return Err(ImportError::InvalidMetadata {
                file: current.display().to_string(),
                reason: format!(
                    "datatype file name '{}' leaves its operation folder",
                    datatype.storage_file_name()
                ),
            });
        }
        if canonical != current {
            move_path(&current, &canonical)?;
        }
        datatype.storage_path = canonical;
        Ok(datatype)
    }

    /// Persist a loaded datatype.
    pub fn store<S: EntityStore + ?Sized>(&self, store: &mut S, datatype: DataType) -> Result<DataType> {
        let present = dataset_names(&datatype.storage_path)?;
        let missing: BTreeSet<&str> = datatype
            .required_datasets
            .iter()
            .map(String::as_str)
            .filter(|name| !present.contains(*name))
            .collect();
        if !missing.is_empty() {
            remove_file_if_exists(&datatype.storage_path)?;
            return Err(ImportError::IncompleteData {
                gid: datatype.gid.clone(),
                reason: format!(
                    "{} is missing datasets {:?}",
                    datatype.type_tag(),
                    missing
                ),
            });
        }

        let path = datatype.storage_path.clone();
        tracing::debug!(kind = %datatype.type_tag(), gid = %datatype.gid, "storing datatype");
        match store.store_datatype(datatype) {
            Ok(stored) => Ok(stored),
            Err(err @ ImportError::DuplicateEntity(_)) => {
                remove_file_if_exists(&path)?;
                Err(err)
            }
            Err(err) => Err(err),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::{ArtifactDocument, write_artifact_file};
    use crate::storage::MemoryStore;
    use tempfile::TempDir;

    fn write_series(dir: &Path, file_name: &str, gid: &str, datasets: &[&str]) {
        let mut document = ArtifactDocument::default();
        for (key, value) in [
            ("gid", gid),
            ("type", "TimeSeries"),
            ("module", "datatypes.time_series"),
            ("create_date", "2014-03-01 05:00:00"),
        ] {
            document.metadata.insert(key.to_string(), value.to_string());
        }
        for name in datasets {
            document
                .datasets
                .insert((*name).to_string(), serde_json::json!([0, 1]));
        }
        write_artifact_file(&dir.join(file_name), &document).expect("write datatype");
    }

    #[test]
    fn load_binds_and_relocates() {
        let dir = TempDir::new().expect("tempdir");
        write_series(dir.path(), "export.dt", "dt-1", &["data", "time"]);
        let registry = DataTypeRegistry::with_builtin_kinds();
        let loader = DataTypeLoader::new(&registry);

        let group = DataTypeGroup {
            id: Some(crate::types::DataTypeGroupId(4)),
            gid: "og-1".to_string(),
            fk_operation_group: crate::types::OperationGroupId(3),
            fk_from_operation: OperationId(7),
            state: "INTERMEDIATE".to_string(),
        };
        let datatype = loader
            .load(dir.path(), "export.dt", OperationId(7), Some(&group))
            .expect("load");

        assert_eq!(datatype.fk_from_operation, Some(OperationId(7)));
        assert_eq!(datatype.fk_datatype_group, group.id);
        assert_eq!(datatype.storage_path, dir.path().join("TimeSeries_dt-1.dt"));
        assert!(datatype.storage_path.exists());
        assert!(!dir.path().join("export.dt").exists());
    }

    #[test]
    fn load_rejects_gid_escaping_operation_folder() {
        let dir = TempDir::new().expect("tempdir");
        let op_dir = dir.path().join("PROJECTS/demo/5");
        std::fs::create_dir_all(&op_dir).expect("mkdir");
        let registry = DataTypeRegistry::with_builtin_kinds();
        let loader = DataTypeLoader::new(&registry);

        for gid in ["x/../../../../escaped", "..", "a/b"] {
            write_series(&op_dir, "export.dt", gid, &["data", "time"]);
            assert!(matches!(
                loader.load(&op_dir, "export.dt", OperationId(5), None),
                Err(ImportError::InvalidMetadata { .. })
            ));
            assert!(op_dir.join("export.dt").exists());
        }
        assert!(!dir.path().join("escaped.dt").exists());
        let entries = std::fs::read_dir(&op_dir).expect("read op dir").count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn load_unknown_kind_fails() {
        let dir = TempDir::new().expect("tempdir");
        write_series(dir.path(), "a.dt", "dt-1", &[]);
        let registry = DataTypeRegistry::new();
        let loader = DataTypeLoader::new(&registry);

        assert!(matches!(
            loader.load(dir.path(), "a.dt", OperationId(1), None),
            Err(ImportError::UnknownArtifactType(_))
        ));
    }

    #[test]
    fn store_incomplete_removes_file() {
        let dir = TempDir::new().expect("tempdir");
        write_series(dir.path(), "a.dt", "dt-1", &["data"]);
        let registry = DataTypeRegistry::with_builtin_kinds();
        let loader = DataTypeLoader::new(&registry);
        let mut store = MemoryStore::new();

        let datatype = loader
            .load(dir.path(), "a.dt", OperationId(1), None)
            .expect("load");
        let path = datatype.storage_path.clone();

        assert!(matches!(
            loader.store(&mut store, datatype),
            Err(ImportError::IncompleteData { gid, .. }) if gid == "dt-1"
        ));
        assert!(!path.exists());
        assert_eq!(store.counts().datatypes, 0);
    }

    #[test]
    fn store_duplicate_removes_file_and_propagates() {
        let dir = TempDir::new().expect("tempdir");
        let registry = DataTypeRegistry::with_builtin_kinds();
        let loader = DataTypeLoader::new(&registry);
        let mut store = MemoryStore::new();

        write_series(dir.path(), "a.dt", "dt-1", &["data", "time"]);
        let first = loader
            .load(dir.path(), "a.dt", OperationId(1), None)
            .expect("load");
        loader.store(&mut store, first).expect("first store");

        let other = TempDir::new().expect("tempdir");
        write_series(other.path(), "b.dt", "dt-1", &["data", "time"]);
        let second = loader
            .load(other.path(), "b.dt", OperationId(2), None)
            .expect("load");
        let path = second.storage_path.clone();

        assert!(matches!(
            loader.store(&mut store, second),
            Err(ImportError::DuplicateEntity(_))
        ));
        assert!(!path.exists());
        assert_eq!(store.counts().datatypes, 1);
    }
}
