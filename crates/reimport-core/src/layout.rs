//! # Storage Layout
//!
//! Canonical on-disk locations of imported projects, and the file moves used
//! to get staged content there.
//!
//! ```text
//! <storage_root>/PROJECTS/<project name>/<operation id>/
//!                                                     ├── operation.json
//!                                                     ├── <Type>_<gid>.dt
//!                                                     └── IMAGES/
//! ```
//!
//! None of these moves are transactional. Callers record every successful
//! relocation in a [`crate::rollback::RollbackJournal`].

use crate::primitives::{IMAGES_FOLDER, PROJECTS_FOLDER};
use crate::types::OperationId;
use crate::{ImportError, Result};
use std::fs;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

/// Resolves canonical paths under one storage root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLayout {
    root: PathBuf,
}

impl StorageLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn projects_dir(&self) -> PathBuf {
        self.root.join(PROJECTS_FOLDER)
    }

    /// Folder of a project, keyed by its name.
    ///
    /// The name must be a single plain path component.
    pub fn project_dir(&self, project_name: &str) -> Result<PathBuf> {
        require_plain_name(
            project_name,
            crate::primitives::PROJECT_MARKER_FILE,
            "project name",
        )?;
        Ok(self.projects_dir().join(project_name))
    }

    /// Folder of an operation, keyed by its store-assigned id.
    pub fn operation_dir(&self, project_name: &str, operation: OperationId) -> Result<PathBuf> {
        Ok(self.project_dir(project_name)?.join(operation.to_string()))
    }

    pub fn images_dir(&self, project_name: &str, operation: OperationId) -> Result<PathBuf> {
        Ok(self.operation_dir(project_name, operation)?.join(IMAGES_FOLDER))
    }
}

/// Fail with `InvalidMetadata` unless `name` is a single plain path component.
///
/// Archive-supplied names end up in paths; `file` names the document the
/// value came from and `what` the value itself.
pub fn require_plain_name(name: &str, file: &str, what: &str) -> Result<()> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(part)), None) if part == name => Ok(()),
        _ => Err(ImportError::InvalidMetadata {
            file: file.to_string(),
            reason: format!("{} '{}' is not a valid file name", what, name),
        }),
    }
}

// =============================================================================
// FILE MOVES
// =============================================================================

/// Recursively copy `from` into the not yet existing directory `to`.
fn copy_tree(from: &Path, to: &Path) -> Result<()> {
    for entry in WalkDir::new(from).sort_by_file_name() {
        let entry = entry.map_err(|e| ImportError::Io(e.to_string()))?;
        let relative = entry
            .path()
            .strip_prefix(from)
            .map_err(|e| ImportError::Io(e.to_string()))?;
        let target = to.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(|e| ImportError::io(&target, e))?;
        } else {
            fs::copy(entry.path(), &target).map_err(|e| ImportError::io(&target, e))?;
        }
    }
    Ok(())
}

/// Copy the tree at `from` to `to`, then delete `from`.
///
/// Returns `false` without touching anything when both paths are equal.
/// Fails if `to` already exists.
pub fn relocate_tree(from: &Path, to: &Path) -> Result<bool> {
    if from == to {
        return Ok(false);
    }
    if to.exists() {
        return Err(ImportError::Io(format!(
            "{}: destination already exists",
            to.display()
        )));
    }
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent).map_err(|e| ImportError::io(parent, e))?;
    }
    copy_tree(from, to)?;
    fs::remove_dir_all(from).map_err(|e| ImportError::io(from, e))?;
    tracing::debug!(from = %from.display(), to = %to.display(), "tree relocated");
    Ok(true)
}

/// Move a file or directory, falling back to copy and delete when a plain
/// rename is not possible (for example across filesystems).
pub fn move_path(from: &Path, to: &Path) -> Result<()> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent).map_err(|e| ImportError::io(parent, e))?;
    }
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    if from.is_dir() {
        copy_tree(from, to)?;
        fs::remove_dir_all(from).map_err(|e| ImportError::io(from, e))
    } else {
        fs::copy(from, to).map_err(|e| ImportError::io(to, e))?;
        fs::remove_file(from).map_err(|e| ImportError::io(from, e))
    }
}

/// Delete a directory tree if present. Returns whether anything was removed.
pub fn remove_dir_if_exists(path: &Path) -> Result<bool> {
    if !path.exists() {
        return Ok(false);
    }
    fs::remove_dir_all(path).map_err(|e| ImportError::io(path, e))?;
    Ok(true)
}

/// Delete a file if present.
pub fn remove_file_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ImportError::io(path, e)),
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn canonical_paths() {
        let layout = StorageLayout::new("/data");
        assert_eq!(
            layout.project_dir("demo").expect("dir"),
            PathBuf::from("/data/PROJECTS/demo")
        );
        assert_eq!(
            layout.operation_dir("demo", OperationId(12)).expect("dir"),
            PathBuf::from("/data/PROJECTS/demo/12")
        );
        assert_eq!(
            layout.images_dir("demo", OperationId(12)).expect("dir"),
            PathBuf::from("/data/PROJECTS/demo/12/IMAGES")
        );
    }

    #[test]
    fn project_name_must_be_one_component() {
        let layout = StorageLayout::new("/data");
        assert!(layout.project_dir("../escape").is_err());
        assert!(layout.project_dir("a/b").is_err());
        assert!(layout.project_dir("").is_err());
    }

    #[test]
    fn plain_names_only() {
        assert!(require_plain_name("dt-1", "a.dt", "gid").is_ok());
        for bad in ["", ".", "..", "a/b", "a/", "x/../../escaped", "/abs"] {
            assert!(
                matches!(
                    require_plain_name(bad, "a.dt", "gid"),
                    Err(ImportError::InvalidMetadata { .. })
                ),
                "accepted {:?}",
                bad
            );
        }
    }

    #[test]
    fn relocate_copies_then_deletes_source() {
        let dir = TempDir::new().expect("tempdir");
        let from = dir.path().join("staged");
        fs::create_dir_all(from.join("op")).expect("mkdir");
        fs::write(from.join("op/a.dt"), b"x").expect("write");

        let to = dir.path().join("store/PROJECTS/demo");
        assert!(relocate_tree(&from, &to).expect("relocate"));
        assert!(!from.exists());
        assert_eq!(fs::read(to.join("op/a.dt")).expect("read"), b"x");

        assert!(!relocate_tree(&to, &to).expect("same path"));
    }

    #[test]
    fn relocate_refuses_existing_destination() {
        let dir = TempDir::new().expect("tempdir");
        let from = dir.path().join("staged");
        let to = dir.path().join("existing");
        fs::create_dir_all(&from).expect("mkdir");
        fs::create_dir_all(&to).expect("mkdir");

        assert!(relocate_tree(&from, &to).is_err());
        assert!(from.exists());
    }

    #[test]
    fn move_and_remove() {
        let dir = TempDir::new().expect("tempdir");
        let from = dir.path().join("5tmp");
        fs::create_dir_all(&from).expect("mkdir");
        fs::write(from.join("operation.json"), b"{}").expect("write");

        let to = dir.path().join("17");
        move_path(&from, &to).expect("move");
        assert!(to.join("operation.json").exists());

        assert!(remove_dir_if_exists(&to).expect("remove"));
        assert!(!remove_dir_if_exists(&to).expect("remove again"));
        remove_file_if_exists(&to.join("missing")).expect("missing file is fine");
    }
}
