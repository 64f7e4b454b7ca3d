//! Package version publishing.
//!
//! A publish validates the upload, checks ownership and uniqueness against
//! the stored state, decides whether the latest-version pointer moves, and
//! commits the new version together with the package row in one
//! transaction. Sort-order reconciliation is scheduled after the commit and
//! never fails the publish.
//!
//! The package row is written on every publish, even when its pointer does
//! not move. Two concurrent publishes to one package therefore always
//! conflict, and the loser re-runs its checks and pointer decision against
//! the winner's committed state.

use crate::error::PublishError;
use crate::integrity::ContentHash;
use crate::latest;
use crate::metadata::PackageMetadata;
use crate::model::{Identity, PackageVersion};
use crate::registry::Registry;
use crate::schedule::DeferredTask;
use crate::store::TransactionGuard;

/// An uploaded archive together with its metadata.
#[derive(Debug, Clone)]
pub struct Upload {
    /// Raw archive bytes.
    pub contents: Vec<u8>,
    /// Metadata parsed from the archive by the caller.
    pub metadata: PackageMetadata,
}

/// Options for the publish operation.
#[derive(Debug, Clone, Default)]
pub struct PublishOptions {
    /// Perform all checks but write nothing.
    pub dry_run: bool,
}

impl Registry {
    /// Publish a new version of `package` on behalf of `publisher`.
    ///
    /// Returns the stored version (or, for a dry run, the version that would
    /// have been stored). A failed publish leaves the package and its version
    /// set untouched.
    pub fn publish(
        &self,
        publisher: &Identity,
        package: &str,
        upload: Upload,
        options: &PublishOptions,
    ) -> Result<PackageVersion, PublishError> {
        let version = upload.metadata.version()?;
        if upload.metadata.name != package {
            return Err(PublishError::NameMismatch {
                expected: package.to_string(),
                found: upload.metadata.name.clone(),
            });
        }
        if upload.contents.is_empty() {
            return Err(PublishError::EmptyUpload);
        }

        let candidate = PackageVersion {
            package: package.to_string(),
            version,
            sort_order: None,
            contents: ContentHash::compute(&upload.contents),
            metadata: upload.metadata,
        };

        let max_attempts = self.config.publish.max_attempts.max(1);
        let mut attempt = 1;
        let became_latest = loop {
            match self.publish_once(publisher, &candidate, &upload.contents, options.dry_run) {
                Ok(moved) => break moved,
                Err(PublishError::Store(e)) if e.is_conflict() => {
                    if attempt >= max_attempts {
                        tracing::warn!(package, version = %candidate.version, attempt, "publish abandoned after conflicts");
                        return Err(PublishError::TransactionConflict {
                            name: package.to_string(),
                            attempts: attempt,
                        });
                    }
                    tracing::debug!(package, version = %candidate.version, attempt, "publish conflicted; retrying");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        };

        if options.dry_run {
            tracing::info!(package, version = %candidate.version, became_latest, "dry run passed");
            return Ok(candidate);
        }

        tracing::info!(package, version = %candidate.version, became_latest, "version published");

        let task = DeferredTask::ReconcileVersionOrder {
            package: package.to_string(),
        };
        if let Err(e) = self.scheduler.schedule(task) {
            tracing::warn!(package, error = %e, "could not schedule sort-order reconciliation");
        }

        Ok(candidate)
    }

    /// One transaction attempt. Returns whether the latest pointer moved.
    fn publish_once(
        &self,
        publisher: &Identity,
        candidate: &PackageVersion,
        contents: &[u8],
        dry_run: bool,
    ) -> Result<bool, PublishError> {
        let mut txn = TransactionGuard::begin(self.store.as_ref())?;

        let mut package = txn
            .get_package(&candidate.package)?
            .ok_or_else(|| PublishError::PackageNotFound {
                name: candidate.package.clone(),
            })?;
        if package.owner != *publisher {
            return Err(PublishError::NotOwner {
                name: package.name,
                publisher: publisher.to_string(),
            });
        }

        if txn
            .get_version(&candidate.package, &candidate.version)?
            .is_some()
        {
            return Err(PublishError::DuplicateVersion {
                name: candidate.package.clone(),
                version: candidate.version.to_string(),
            });
        }

        let moves = latest::select_version(package.latest_version.as_ref(), &candidate.version);
        tracing::debug!(
            package = %package.name,
            current = ?package.latest_version,
            candidate = %candidate.version,
            moves,
            "latest version decision"
        );

        if dry_run {
            txn.rollback();
            return Ok(moves);
        }

        self.blobs.put(contents)?;

        if moves {
            package.latest_version = Some(candidate.version.clone());
        }
        txn.put_version(candidate.clone())?;
        txn.put_package(package)?;
        txn.commit()?;
        Ok(moves)
    }
}
