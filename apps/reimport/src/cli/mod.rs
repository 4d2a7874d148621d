//! # reimport CLI Module
//!
//! ## Available Commands
//!
//! - `init` - Create the store and register the configured catalog
//! - `import` - Import an exported archive
//! - `import-dir` - Import an already unpacked export tree
//! - `status` - Show row counts per entity
//! - `projects` - List imported projects

mod commands;

use crate::config::AppConfig;
use clap::{Parser, Subcommand};
use reimport_core::ImportError;
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// reimport - rebuild exported research projects inside a store.
#[derive(Parser, Debug)]
#[command(name = "reimport")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the TOML configuration file
    #[arg(short, long, global = true, default_value = "reimport.toml")]
    pub config: PathBuf,

    /// Path to the store database (overrides the configuration file)
    #[arg(short = 'D', long, global = true)]
    pub database: Option<PathBuf>,

    /// Canonical storage root (overrides the configuration file)
    #[arg(short = 'S', long, global = true)]
    pub storage: Option<PathBuf>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the store and register the configured catalog
    Init {
        /// Recreate the database even if it exists
        #[arg(short, long)]
        force: bool,
    },

    /// Import an exported archive
    Import {
        /// Path to the zip bundle
        #[arg(short, long)]
        archive: PathBuf,

        /// Id of the user who will own the imported projects
        #[arg(short, long)]
        user: u64,
    },

    /// Import an already unpacked export tree
    ImportDir {
        /// Root of the unpacked tree
        #[arg(short, long)]
        path: PathBuf,

        /// Id of the user who will own the imported projects
        #[arg(short, long)]
        user: u64,
    },

    /// Show row counts per entity
    Status,

    /// List imported projects
    Projects,
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub fn execute(cli: Cli) -> Result<(), ImportError> {
    let mut config = AppConfig::from_file(&cli.config)?;
    if let Some(storage) = cli.storage {
        config.import.storage_root = storage;
    }
    let database = config.database_path(cli.database.as_deref());
    let json_mode = cli.json_mode;

    match cli.command {
        Some(Commands::Init { force }) => cmd_init(&database, &config, force, json_mode),
        Some(Commands::Import { archive, user }) => {
            cmd_import(&database, &config, &archive, user, json_mode)
        }
        Some(Commands::ImportDir { path, user }) => {
            cmd_import_dir(&database, &config, &path, user, json_mode)
        }
        Some(Commands::Projects) => cmd_projects(&database, &config, json_mode),
        Some(Commands::Status) | None => cmd_status(&database, &config, json_mode),
    }
}
