//! Registry entities: packages, their versions, and publisher identities.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::integrity::ContentHash;
use crate::metadata::PackageMetadata;
use crate::version::Version;

/// An authenticated principal, resolved by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn new(id: impl Into<String>) -> Self {
        Identity(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A package: the aggregate root owning all of its versions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    /// Unique package name.
    pub name: String,
    /// Identity allowed to publish new versions.
    pub owner: Identity,
    /// Key of the version shown as canonical, if any version exists.
    ///
    /// Always names a version that belongs to this package.
    #[serde(default)]
    pub latest_version: Option<Version>,
}

impl Package {
    /// A package with no versions yet.
    pub fn new(name: impl Into<String>, owner: Identity) -> Self {
        Package {
            name: name.into(),
            owner,
            latest_version: None,
        }
    }
}

/// One immutable published version of a package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageVersion {
    /// Name of the owning package.
    pub package: String,
    /// Version identifier, unique within the package.
    pub version: Version,
    /// Dense ascending rank among the package's versions. `None` until the
    /// first reconciliation that sees this version.
    #[serde(default)]
    pub sort_order: Option<u32>,
    /// Archive blob reference.
    pub contents: ContentHash,
    /// Metadata uploaded with the archive.
    pub metadata: PackageMetadata,
}

impl PackageVersion {
    pub fn is_prerelease(&self) -> bool {
        self.version.is_prerelease()
    }
}
