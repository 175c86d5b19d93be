//! Engine configuration
//!
//! All knobs live in one serde-backed struct so an operator can point the
//! engine at the two stores and the file endpoint from a single YAML file.
//! Every field has a sensible default; `EngineConfig::default()` is a valid
//! configuration apart from the store paths.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::MigrateError;

/// Default timeout for file payload fetches, in seconds.
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

/// Default cap on simultaneously in-flight batch items.
const DEFAULT_MAX_CONCURRENT: usize = 4;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub source: SourceConfig,
    pub target: TargetConfig,
    pub batch: BatchConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            source: SourceConfig::default(),
            target: TargetConfig::default(),
            batch: BatchConfig::default(),
        }
    }
}

/// Connection settings for the read-only legacy store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Connectivity gate: when false every source read fails fast.
    pub enabled: bool,
    /// Path to the legacy SQLite database.
    pub db_path: PathBuf,
    /// Base endpoint that serves legacy file payloads.
    pub file_endpoint: String,
    /// Timeout for a single payload fetch.
    pub fetch_timeout_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            db_path: PathBuf::from("legacy.db"),
            file_endpoint: String::from("http://localhost:8080/files"),
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
        }
    }
}

impl SourceConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

/// Settings for the local canonical store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    /// Path to the target SQLite database.
    pub db_path: PathBuf,
    /// Root directory for migrated file payloads.
    pub content_dir: PathBuf,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("ticketport.db"),
            content_dir: PathBuf::from("content"),
        }
    }
}

/// Fan-out settings shared by every "migrate many" operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Maximum concurrent item migrations. Sized to the store's
    /// connection budget; clamped to at least 1 at the point of use.
    pub max_concurrent: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self, MigrateError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&raw)
            .map_err(|e| MigrateError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<(), MigrateError> {
        url::Url::parse(&self.source.file_endpoint).map_err(|e| {
            MigrateError::Config(format!(
                "invalid file endpoint '{}': {}",
                self.source.file_endpoint, e
            ))
        })?;
        if self.source.fetch_timeout_secs == 0 {
            return Err(MigrateError::Config(
                "fetch_timeout_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
