//! Package metadata carried by every uploaded version.
//!
//! The registry core only reads `name` and `version`; the rest is stored
//! verbatim and handed back to listing and download callers.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::PublishError;
use crate::version::Version;

/// Metadata describing one uploaded package version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageMetadata {
    /// Package name; must match the package being published to.
    pub name: String,
    /// Version string, validated at publish time.
    pub version: String,
    /// Short description.
    #[serde(default)]
    pub description: Option<String>,
    /// Author list.
    #[serde(default)]
    pub authors: Vec<String>,
    /// Project homepage.
    #[serde(default)]
    pub homepage: Option<String>,
    /// Dependency constraints by package name.
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
    /// Dev-only dependency constraints.
    #[serde(default, rename = "dev-dependencies")]
    pub dev_dependencies: BTreeMap<String, String>,
}

impl PackageMetadata {
    /// Minimal metadata with only name and version set.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        PackageMetadata {
            name: name.into(),
            version: version.into(),
            description: None,
            authors: Vec::new(),
            homepage: None,
            dependencies: BTreeMap::new(),
            dev_dependencies: BTreeMap::new(),
        }
    }

    /// Parse metadata from a TOML document.
    ///
    /// The version string is not validated here; see [`version`](Self::version).
    pub fn parse(input: &str) -> Result<Self, PublishError> {
        let metadata: PackageMetadata =
            toml::from_str(input).map_err(|e| PublishError::InvalidMetadata {
                detail: e.to_string(),
            })?;

        if metadata.name.is_empty() {
            return Err(PublishError::InvalidMetadata {
                detail: "name is required".to_string(),
            });
        }

        Ok(metadata)
    }

    /// Load metadata from a file path.
    pub fn load(path: &Path) -> Result<Self, PublishError> {
        let content = std::fs::read_to_string(path).map_err(|e| PublishError::InvalidMetadata {
            detail: format!("reading {}: {e}", path.display()),
        })?;
        Self::parse(&content)
    }

    /// Derive the version identifier.
    pub fn version(&self) -> Result<Version, PublishError> {
        Version::parse(&self.version).map_err(|source| PublishError::InvalidVersion {
            version: self.version.clone(),
            source,
        })
    }

    /// Serialize this metadata to a TOML string.
    pub fn to_toml(&self) -> Result<String, PublishError> {
        toml::to_string_pretty(self).map_err(|e| PublishError::InvalidMetadata {
            detail: format!("failed to serialize: {e}"),
        })
    }
}
