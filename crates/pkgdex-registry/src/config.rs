//! `pkgdex.toml` registry configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level registry configuration. Every field has a default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub publish: PublishConfig,
    #[serde(default)]
    pub reconcile: ReconcileConfig,
}

/// Where the local store and blobs live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_root")]
    pub root: PathBuf,
}

/// Publish transaction settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishConfig {
    /// Transaction attempts per publish before giving up on conflicts.
    #[serde(default = "default_attempts", rename = "max-attempts")]
    pub max_attempts: u32,
}

/// Background sort-order reconciliation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Worker threads running deferred tasks.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Attempts per deferred task, and per reconcile transaction.
    #[serde(default = "default_attempts", rename = "max-attempts")]
    pub max_attempts: u32,
    /// Pause between attempts of a failed task.
    #[serde(default = "default_backoff_ms", rename = "retry-backoff-ms")]
    pub retry_backoff_ms: u64,
}

impl ReconcileConfig {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

fn default_root() -> PathBuf {
    PathBuf::from(".pkgdex")
}

fn default_attempts() -> u32 {
    5
}

fn default_workers() -> usize {
    2
}

fn default_backoff_ms() -> u64 {
    50
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            root: default_root(),
        }
    }
}

impl Default for PublishConfig {
    fn default() -> Self {
        PublishConfig {
            max_attempts: default_attempts(),
        }
    }
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        ReconcileConfig {
            workers: default_workers(),
            max_attempts: default_attempts(),
            retry_backoff_ms: default_backoff_ms(),
        }
    }
}

impl RegistryConfig {
    /// Parse configuration from a TOML string.
    pub fn parse(input: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(input)
    }

    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Failure to load a configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}
