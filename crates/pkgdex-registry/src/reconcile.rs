//! Sort-order reconciliation.
//!
//! After any change to a package's version set, every version of that
//! package is renumbered `0..n` in ascending version order. The result is a
//! pure function of the (immutable) version set, so running it again, or
//! racing another run for the same package, converges on the same
//! assignment. All renumbering for one run lands in a single transaction
//! scoped to that package.

use std::sync::Arc;

use crate::error::StoreError;
use crate::model::PackageVersion;
use crate::schedule::{DeferredTask, TaskRunner};
use crate::store::{Datastore, TransactionGuard};
use crate::version;

/// Outcome of one reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub package: String,
    /// Versions in the package.
    pub versions: usize,
    /// Versions whose `sort_order` was rewritten.
    pub renumbered: usize,
    /// Transaction attempts used.
    pub attempts: u32,
}

/// Sort `versions` ascending and set each `sort_order` to its index.
///
/// Returns the indices (after sorting) whose `sort_order` changed.
pub fn assign_sort_order(versions: &mut [PackageVersion]) -> Vec<usize> {
    versions.sort_by(|a, b| version::compare(&a.version, &b.version));
    let mut changed = Vec::new();
    for (i, pv) in versions.iter_mut().enumerate() {
        let rank = rank_of(i);
        if pv.sort_order != rank {
            pv.sort_order = rank;
            changed.push(i);
        }
    }
    changed
}

/// The `sort_order` for position `i`, or `None` past the representable range.
fn rank_of(i: usize) -> Option<u32> {
    u32::try_from(i).ok()
}

/// Recompute and store `sort_order` for every version of `package`.
///
/// Retries on transaction conflicts up to `max_attempts` times.
pub fn reconcile(
    store: &dyn Datastore,
    package: &str,
    max_attempts: u32,
) -> Result<ReconcileReport, StoreError> {
    let mut attempt = 1;
    loop {
        match reconcile_once(store, package) {
            Ok((versions, renumbered)) => {
                tracing::debug!(package, versions, renumbered, attempt, "sort order reconciled");
                return Ok(ReconcileReport {
                    package: package.to_string(),
                    versions,
                    renumbered,
                    attempts: attempt,
                });
            }
            Err(e) if e.is_conflict() && attempt < max_attempts => {
                tracing::debug!(package, attempt, "reconcile conflicted; retrying");
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

fn reconcile_once(store: &dyn Datastore, package: &str) -> Result<(usize, usize), StoreError> {
    let mut txn = TransactionGuard::begin(store)?;
    let mut versions = txn.versions(package)?;
    if rank_of(versions.len().saturating_sub(1)).is_none() {
        return Err(StoreError::TooManyVersions {
            package: package.to_string(),
            count: versions.len(),
        });
    }
    let changed = assign_sort_order(&mut versions);
    if changed.is_empty() {
        txn.rollback();
        return Ok((versions.len(), 0));
    }

    let total = versions.len();
    let renumbered = changed.len();
    for i in changed {
        txn.put_version(versions[i].clone())?;
    }
    txn.commit()?;
    Ok((total, renumbered))
}

/// Runs [`DeferredTask::ReconcileVersionOrder`] against a datastore.
pub struct Reconciler {
    store: Arc<dyn Datastore>,
    max_attempts: u32,
}

impl Reconciler {
    pub fn new(store: Arc<dyn Datastore>, max_attempts: u32) -> Self {
        Reconciler {
            store,
            max_attempts: max_attempts.max(1),
        }
    }
}

impl TaskRunner for Reconciler {
    fn run(&self, task: &DeferredTask) -> Result<(), StoreError> {
        match task {
            DeferredTask::ReconcileVersionOrder { package } => {
                reconcile(self.store.as_ref(), package, self.max_attempts).map(|_| ())
            }
        }
    }
}
