//! Registry facade over the datastore, blob store, and scheduler.
//!
//! Publishing lives in [`crate::publish`]; this module covers package
//! creation and the read side.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::blob::BlobStore;
use crate::config::RegistryConfig;
use crate::error::{RegistryError, Result, StoreError};
use crate::model::{Identity, Package, PackageVersion};
use crate::reconcile::{self, ReconcileReport};
use crate::schedule::TaskScheduler;
use crate::store::{Datastore, TransactionGuard};
use crate::version::{self, Version};

/// A package registry.
pub struct Registry {
    pub(crate) store: Arc<dyn Datastore>,
    pub(crate) blobs: Arc<dyn BlobStore>,
    pub(crate) scheduler: Arc<dyn TaskScheduler>,
    pub(crate) config: RegistryConfig,
}

impl Registry {
    pub fn new(
        store: Arc<dyn Datastore>,
        blobs: Arc<dyn BlobStore>,
        scheduler: Arc<dyn TaskScheduler>,
        config: RegistryConfig,
    ) -> Self {
        Registry {
            store,
            blobs,
            scheduler,
            config,
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Create a package with no versions.
    pub fn create_package(&self, name: &str, owner: &Identity) -> Result<Package> {
        let attempts = self.config.publish.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.create_package_once(name, owner) {
                Err(RegistryError::Store(e)) if e.is_conflict() && attempt < attempts => {
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    fn create_package_once(&self, name: &str, owner: &Identity) -> Result<Package> {
        let mut txn = TransactionGuard::begin(self.store.as_ref())?;
        if txn.get_package(name)?.is_some() {
            return Err(RegistryError::PackageExists {
                name: name.to_string(),
            });
        }

        let package = Package::new(name, owner.clone());
        txn.put_package(package.clone())?;
        txn.commit()?;
        tracing::info!(package = name, %owner, "package created");
        Ok(package)
    }

    /// Look up a package.
    pub fn package(&self, name: &str) -> Result<Package> {
        self.store
            .package(name)?
            .ok_or_else(|| RegistryError::PackageNotFound {
                name: name.to_string(),
            })
    }

    /// Look up one version of a package.
    pub fn version(&self, package: &str, version: &Version) -> Result<PackageVersion> {
        self.store
            .version(package, version)?
            .ok_or_else(|| RegistryError::VersionNotFound {
                name: package.to_string(),
                version: version.to_string(),
            })
    }

    /// The version the package's latest pointer names, if any.
    pub fn latest_version(&self, package: &str) -> Result<Option<PackageVersion>> {
        let package = self.package(package)?;
        match package.latest_version {
            Some(v) => self.version(&package.name, &v).map(Some),
            None => Ok(None),
        }
    }

    /// All versions of a package, highest `sort_order` first.
    ///
    /// Versions not yet ranked by reconciliation come first, ordered by
    /// version, so a fresh upload is visible before its rank is assigned.
    pub fn list_versions(&self, package: &str) -> Result<Vec<PackageVersion>> {
        self.package(package)?;
        let mut versions = self.store.versions(package)?;
        versions.sort_by(|a, b| match (a.sort_order, b.sort_order) {
            (None, None) => version::compare(&b.version, &a.version),
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(x), Some(y)) => y.cmp(&x),
        });
        Ok(versions)
    }

    /// Archive bytes of one version.
    pub fn contents(&self, package: &str, version: &Version) -> Result<Vec<u8>> {
        let pv = self.version(package, version)?;
        self.blobs
            .get(&pv.contents)?
            .ok_or_else(|| {
                RegistryError::Store(StoreError::Integrity {
                    hash: pv.contents.to_string(),
                })
            })
    }

    /// Recompute `sort_order` for a package right away.
    ///
    /// Normally invoked by the scheduler after a publish.
    pub fn reconcile(&self, package: &str) -> Result<ReconcileReport> {
        self.package(package)?;
        let report = reconcile::reconcile(
            self.store.as_ref(),
            package,
            self.config.reconcile.max_attempts,
        )?;
        Ok(report)
    }
}
