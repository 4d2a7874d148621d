//! # Compensating Rollback
//!
//! The store transaction undoes rows; it cannot undo file moves. Every side
//! effect of an import that outlives an aborted transaction is recorded in a
//! [`RollbackJournal`], and [`with_rollback`] replays the inverse actions in
//! reverse order when the import fails.
//!
//! A failure while compensating is logged and does not stop the remaining
//! compensations.

use crate::layout::remove_dir_if_exists;
use crate::storage::EntityStore;
use crate::types::ProjectId;
use crate::{ImportError, Result};
use std::path::PathBuf;

/// One recorded side effect and what undoing it means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Compensation {
    /// A project row was created; undo deletes it with everything it owns.
    ProjectCreated { id: ProjectId, name: String },
    /// A directory was moved into canonical storage; undo deletes it.
    Relocated { to: PathBuf },
}

/// Side effects of one import invocation, in the order they happened.
#[derive(Debug, Clone, Default)]
pub struct RollbackJournal {
    entries: Vec<Compensation>,
}

impl RollbackJournal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn project_created(&mut self, id: ProjectId, name: impl Into<String>) {
        self.entries.push(Compensation::ProjectCreated {
            id,
            name: name.into(),
        });
    }

    pub fn relocated(&mut self, to: impl Into<PathBuf>) {
        self.entries.push(Compensation::Relocated { to: to.into() });
    }

    pub fn entries(&self) -> &[Compensation] {
        &self.entries
    }

    /// Projects created so far by this invocation.
    pub fn created_projects(&self) -> Vec<ProjectId> {
        self.entries
            .iter()
            .filter_map(|entry| match entry {
                Compensation::ProjectCreated { id, .. } => Some(*id),
                Compensation::Relocated { .. } => None,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Undo every recorded side effect, newest first. Empties the journal.
    ///
    /// Returns the number of compensations that failed.
    pub fn unwind<S: EntityStore + ?Sized>(&mut self, store: &mut S) -> usize {
        let mut failures = 0;
        while let Some(entry) = self.entries.pop() {
            let outcome = match &entry {
                Compensation::ProjectCreated { id, name } => {
                    tracing::info!(project = %name, id = %id, "removing partially imported project");
                    store.remove_project(*id)
                }
                Compensation::Relocated { to } => remove_dir_if_exists(to).map(|_| ()),
            };
            if let Err(e) = outcome {
                failures += 1;
                tracing::warn!(?entry, error = %e, "compensation failed");
            }
        }
        failures
    }

    /// Undo only the recorded file moves, newest first. Empties the journal.
    ///
    /// For use once the store transaction is already gone, e.g. after a
    /// failed commit: the rows vanished with it, the files did not.
    pub fn unwind_files(&mut self) -> usize {
        let mut failures = 0;
        while let Some(entry) = self.entries.pop() {
            let Compensation::Relocated { to } = &entry else {
                continue;
            };
            if let Err(e) = remove_dir_if_exists(to) {
                failures += 1;
                tracing::warn!(?entry, error = %e, "compensation failed");
            }
        }
        failures
    }
}

/// Run `action` with a fresh journal; on failure undo what it recorded.
///
/// Any error is returned as `ImportError::ImportFailure` carrying the
/// original message.
pub fn with_rollback<S, T>(
    store: &mut S,
    action: impl FnOnce(&mut S, &mut RollbackJournal) -> Result<T>,
) -> Result<T>
where
    S: EntityStore + ?Sized,
{
    with_rollback_journal(store, action).map(|(value, _)| value)
}

/// [`with_rollback`] that hands the journal back on success.
///
/// Side effects stay compensable until the caller has made the store writes
/// durable; see [`RollbackJournal::unwind_files`].
pub fn with_rollback_journal<S, T>(
    store: &mut S,
    action: impl FnOnce(&mut S, &mut RollbackJournal) -> Result<T>,
) -> Result<(T, RollbackJournal)>
where
    S: EntityStore + ?Sized,
{
    let mut journal = RollbackJournal::new();
    match action(store, &mut journal) {
        Ok(value) => Ok((value, journal)),
        Err(err) => {
            tracing::error!(error = %err, side_effects = journal.len(), "import failed, rolling back");
            let failures = journal.unwind(store);
            if failures > 0 {
                tracing::warn!(failures, "rollback left residual state behind");
            }
            Err(ImportError::failure(err))
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Project;
    use crate::storage::MemoryStore;
    use crate::types::{UserId, assigned};
    use tempfile::TempDir;

    fn project(gid: &str) -> Project {
        Project {
            id: None,
            gid: gid.to_string(),
            name: gid.to_string(),
            description: String::new(),
            owner: UserId(1),
        }
    }

    #[test]
    fn success_keeps_side_effects() {
        let mut store = MemoryStore::new();
        let created = with_rollback(&mut store, |store, journal| {
            let p = store.store_project(project("p-1"))?;
            journal.project_created(assigned(p.id, "project")?, &p.name);
            Ok(p)
        })
        .expect("import");

        assert!(created.id.is_some());
        assert_eq!(store.counts().projects, 1);
    }

    #[test]
    fn failure_removes_projects_and_directories() {
        let dir = TempDir::new().expect("tempdir");
        let relocated = dir.path().join("PROJECTS/p-1");
        std::fs::create_dir_all(&relocated).expect("mkdir");

        let mut store = MemoryStore::new();
        let result: Result<()> = with_rollback(&mut store, |store, journal| {
            let p = store.store_project(project("p-1"))?;
            journal.project_created(assigned(p.id, "project")?, &p.name);
            journal.relocated(&relocated);
            let q = store.store_project(project("p-2"))?;
            journal.project_created(assigned(q.id, "project")?, &q.name);
            Err(ImportError::DuplicateEntity("dt-9".to_string()))
        });

        let err = result.expect_err("must fail");
        assert!(matches!(err, ImportError::ImportFailure { .. }));
        assert_eq!(err.to_string(), "Duplicate entity: dt-9");
        assert_eq!(store.counts().projects, 0);
        assert!(!relocated.exists());
    }

    #[test]
    fn journal_returned_on_success_can_undo_file_moves() {
        let dir = TempDir::new().expect("tempdir");
        let relocated = dir.path().join("PROJECTS/p-1");
        std::fs::create_dir_all(relocated.join("12")).expect("mkdir");

        let mut store = MemoryStore::new();
        let (created, mut journal) = with_rollback_journal(&mut store, |store, journal| {
            let p = store.store_project(project("p-1"))?;
            journal.project_created(assigned(p.id, "project")?, &p.name);
            journal.relocated(&relocated);
            Ok(p)
        })
        .expect("import");
        assert_eq!(journal.len(), 2);
        assert!(relocated.exists());

        assert_eq!(journal.unwind_files(), 0);
        assert!(journal.is_empty());
        assert!(!relocated.exists());
        // Rows are left to the store transaction.
        assert_eq!(store.counts().projects, 1);
        assert!(created.id.is_some());
    }

    #[test]
    fn journal_lists_created_projects_in_order() {
        let mut journal = RollbackJournal::new();
        journal.project_created(ProjectId(3), "a");
        journal.relocated("/tmp/a");
        journal.project_created(ProjectId(9), "b");
        assert_eq!(journal.created_projects(), vec![ProjectId(3), ProjectId(9)]);
        assert_eq!(journal.len(), 3);

        let mut store = MemoryStore::new();
        assert_eq!(journal.unwind(&mut store), 0);
        assert!(journal.is_empty());
    }
}
