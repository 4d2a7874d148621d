//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use crate::config::AppConfig;
use reimport_core::layout::remove_dir_if_exists;
use reimport_core::{ImportError, ImportService, Project, RedbStore, StorageLayout, UserId};
use std::path::{Path, PathBuf};

// =============================================================================
// PATH VALIDATION
// =============================================================================

/// Canonicalize an input path and check it is of the expected kind.
fn validate_input_path(path: &Path, want_dir: bool) -> Result<PathBuf, ImportError> {
    let canonical = path.canonicalize().map_err(|e| {
        ImportError::Io(format!("Invalid path '{}': {}", path.display(), e))
    })?;
    let matches_kind = if want_dir {
        canonical.is_dir()
    } else {
        canonical.is_file()
    };
    if !matches_kind {
        return Err(ImportError::Io(format!(
            "Path '{}' is not a {}",
            path.display(),
            if want_dir { "directory" } else { "regular file" }
        )));
    }
    Ok(canonical)
}

/// Open the store and wrap it in a service.
pub fn open_service(db_path: &Path, config: &AppConfig) -> Result<ImportService, ImportError> {
    let store = RedbStore::open(db_path)?;
    Ok(ImportService::new(store, config.import.clone()))
}

fn print_json(value: &serde_json::Value) {
    println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
}

fn print_projects(projects: &[Project]) {
    for project in projects {
        let id = project
            .id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:>6}  {:<36}  {}  (owner {})",
            id, project.gid, project.name, project.owner
        );
    }
}

// =============================================================================
// INIT COMMAND
// =============================================================================

/// Create the store and register the configured catalog.
///
/// `--force` also empties the canonical projects folder, whose contents
/// belong to the database being replaced.
pub fn cmd_init(
    db_path: &Path,
    config: &AppConfig,
    force: bool,
    json_mode: bool,
) -> Result<(), ImportError> {
    if db_path.exists() {
        if !force {
            return Err(ImportError::Store(
                "Database already exists. Use --force to overwrite.".to_string(),
            ));
        }
        std::fs::remove_file(db_path).map_err(|e| ImportError::io(db_path, e))?;
        let projects_dir = StorageLayout::new(config.import.storage_root.clone()).projects_dir();
        if remove_dir_if_exists(&projects_dir)? {
            tracing::info!(path = %projects_dir.display(), "removed previously imported projects");
        }
    }

    let service = open_service(db_path, config)?;
    let (algorithms, portlets) = service.register_catalog()?;

    if json_mode {
        print_json(&serde_json::json!({
            "database": db_path.to_string_lossy(),
            "algorithms": algorithms,
            "portlets": portlets
        }));
        return Ok(());
    }

    println!("Initialized new store at {:?}", db_path);
    println!("Registered {} algorithms and {} portlets", algorithms, portlets);
    Ok(())
}

// =============================================================================
// IMPORT COMMANDS
// =============================================================================

/// Import an exported zip bundle.
pub fn cmd_import(
    db_path: &Path,
    config: &AppConfig,
    archive: &Path,
    user: u64,
    json_mode: bool,
) -> Result<(), ImportError> {
    let archive = validate_input_path(archive, false)?;
    let service = open_service(db_path, config)?;
    let projects = service.import_project_structure(&archive, UserId(user))?;
    report_import(&archive, &projects, json_mode);
    Ok(())
}

/// Import an unpacked export tree. The tree is consumed.
pub fn cmd_import_dir(
    db_path: &Path,
    config: &AppConfig,
    path: &Path,
    user: u64,
    json_mode: bool,
) -> Result<(), ImportError> {
    let path = validate_input_path(path, true)?;
    let service = open_service(db_path, config)?;
    let projects = service.import_directory(&path, UserId(user))?;
    report_import(&path, &projects, json_mode);
    Ok(())
}

fn report_import(source: &Path, projects: &[Project], json_mode: bool) {
    if json_mode {
        print_json(&serde_json::json!({
            "source": source.to_string_lossy(),
            "projects": projects
        }));
        return;
    }

    println!("Imported {} project(s) from {:?}", projects.len(), source);
    print_projects(projects);
}

// =============================================================================
// STATUS COMMAND
// =============================================================================

/// Show row counts per entity.
pub fn cmd_status(db_path: &Path, config: &AppConfig, json_mode: bool) -> Result<(), ImportError> {
    let service = open_service(db_path, config)?;
    let counts = service.store().counts()?;

    if json_mode {
        print_json(&serde_json::json!({
            "database": db_path.to_string_lossy(),
            "storage_root": config.import.storage_root.to_string_lossy(),
            "counts": counts
        }));
        return Ok(());
    }

    println!("reimport Store Status");
    println!("=====================");
    println!("Database: {:?}", db_path);
    println!("Storage:  {:?}", config.import.storage_root);
    println!();
    println!("Projects:            {}", counts.projects);
    println!("Operation groups:    {}", counts.operation_groups);
    println!("Operations:          {}", counts.operations);
    println!("Datatype groups:     {}", counts.datatype_groups);
    println!("Datatypes:           {}", counts.datatypes);
    println!("Bursts:              {}", counts.bursts);
    println!("Workflows:           {}", counts.workflows);
    println!("Workflow steps:      {}", counts.workflow_steps);
    println!("Workflow step views: {}", counts.workflow_step_views);
    println!("Figures:             {}", counts.figures);
    println!("Algorithms:          {}", counts.algorithms);
    println!("Portlets:            {}", counts.portlets);

    Ok(())
}

// =============================================================================
// PROJECTS COMMAND
// =============================================================================

/// List imported projects.
pub fn cmd_projects(db_path: &Path, config: &AppConfig, json_mode: bool) -> Result<(), ImportError> {
    let service = open_service(db_path, config)?;
    let projects = service.store().projects()?;

    if json_mode {
        print_json(&serde_json::json!({ "projects": projects }));
        return Ok(());
    }

    if projects.is_empty() {
        println!("No projects imported yet.");
        return Ok(());
    }
    println!("{} project(s):", projects.len());
    print_projects(&projects);
    Ok(())
}
