//! # Configuration File
//!
//! The TOML document read by the binary. Import settings sit at the top
//! level next to the database path:
//!
//! ```toml
//! database = "reimport.redb"
//! storage_root = "/srv/reimport"
//! default_data_state = "INTERMEDIATE"
//!
//! [[catalog.algorithms]]
//! module = "adapters.simulator"
//! class_name = "SimulatorAdapter"
//!
//! [[catalog.portlets]]
//! identifier = "TimeSeries"
//! ```

use reimport_core::{ImportConfig, ImportError};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Database used when neither the command line nor the file names one.
pub const DEFAULT_DATABASE: &str = "reimport.redb";

/// Maximum configuration file size (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

/// Contents of the configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AppConfig {
    /// Store location.
    #[serde(default)]
    pub database: Option<PathBuf>,
    #[serde(flatten)]
    pub import: ImportConfig,
}

impl AppConfig {
    /// Load `path`. A missing file yields the defaults.
    pub fn from_file(path: &Path) -> Result<Self, ImportError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no configuration file, using defaults");
            return Ok(Self::default());
        }
        let size = std::fs::metadata(path)
            .map_err(|e| ImportError::io(path, e))?
            .len();
        if size > MAX_CONFIG_FILE_SIZE {
            return Err(ImportError::Serialization(format!(
                "Config file size {} bytes exceeds maximum allowed {} bytes",
                size, MAX_CONFIG_FILE_SIZE
            )));
        }
        let text = std::fs::read_to_string(path).map_err(|e| ImportError::io(path, e))?;
        Self::parse(&text).map_err(|e| match e {
            ImportError::Serialization(reason) => {
                ImportError::Serialization(format!("{}: {}", path.display(), reason))
            }
            other => other,
        })
    }

    /// Parse a TOML document.
    pub fn parse(text: &str) -> Result<Self, ImportError> {
        toml::from_str(text).map_err(|e| ImportError::Serialization(e.to_string()))
    }

    /// Database path: `cli` wins over the file, the file over the default.
    pub fn database_path(&self, cli: Option<&Path>) -> PathBuf {
        cli.map(Path::to_path_buf)
            .or_else(|| self.database.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE))
    }
}
