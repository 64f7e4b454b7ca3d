//! Persistence collaborator.
//!
//! The registry needs a datastore with per-package transactions: reads and
//! writes inside one [`Transaction`] are committed atomically or not at all,
//! and a commit fails with [`StoreError::Conflict`] when a concurrent
//! transaction touching the same package committed first.
//!
//! [`TransactionGuard`] is the only way registry code opens a transaction. It
//! rolls back on every exit path that does not end in an explicit commit.

use crate::error::StoreError;
use crate::model::{Package, PackageVersion};
use crate::version::Version;

/// A transactional store of packages and package versions.
///
/// The non-transactional readers must never expose a partially applied
/// commit.
pub trait Datastore: Send + Sync {
    /// Open a new transaction.
    fn begin(&self) -> Result<Box<dyn Transaction + '_>, StoreError>;

    /// Read a package by name.
    fn package(&self, name: &str) -> Result<Option<Package>, StoreError>;

    /// Read one version of a package.
    fn version(&self, package: &str, version: &Version)
        -> Result<Option<PackageVersion>, StoreError>;

    /// Read every version of a package, in no particular order.
    fn versions(&self, package: &str) -> Result<Vec<PackageVersion>, StoreError>;
}

/// One open transaction. Writes are buffered until [`commit`](Self::commit).
pub trait Transaction {
    fn get_package(&mut self, name: &str) -> Result<Option<Package>, StoreError>;

    fn get_version(
        &mut self,
        package: &str,
        version: &Version,
    ) -> Result<Option<PackageVersion>, StoreError>;

    /// All versions of a package as seen by this transaction, including its
    /// own buffered writes.
    fn versions(&mut self, package: &str) -> Result<Vec<PackageVersion>, StoreError>;

    fn put_package(&mut self, package: Package) -> Result<(), StoreError>;

    fn put_version(&mut self, version: PackageVersion) -> Result<(), StoreError>;

    /// Apply all buffered writes atomically. The transaction is finished
    /// afterwards whatever the outcome.
    fn commit(&mut self) -> Result<(), StoreError>;

    /// Discard all buffered writes.
    fn rollback(&mut self);
}

/// Scoped transaction that rolls back unless committed.
pub struct TransactionGuard<'a> {
    txn: Box<dyn Transaction + 'a>,
    finished: bool,
}

impl<'a> TransactionGuard<'a> {
    /// Begin a transaction on `store`.
    pub fn begin(store: &'a dyn Datastore) -> Result<Self, StoreError> {
        Ok(TransactionGuard {
            txn: store.begin()?,
            finished: false,
        })
    }

    pub fn get_package(&mut self, name: &str) -> Result<Option<Package>, StoreError> {
        self.txn.get_package(name)
    }

    pub fn get_version(
        &mut self,
        package: &str,
        version: &Version,
    ) -> Result<Option<PackageVersion>, StoreError> {
        self.txn.get_version(package, version)
    }

    pub fn versions(&mut self, package: &str) -> Result<Vec<PackageVersion>, StoreError> {
        self.txn.versions(package)
    }

    pub fn put_package(&mut self, package: Package) -> Result<(), StoreError> {
        self.txn.put_package(package)
    }

    pub fn put_version(&mut self, version: PackageVersion) -> Result<(), StoreError> {
        self.txn.put_version(version)
    }

    /// Commit the transaction, consuming the guard.
    pub fn commit(mut self) -> Result<(), StoreError> {
        self.finished = true;
        self.txn.commit()
    }

    /// Roll back explicitly. Dropping the guard has the same effect.
    pub fn rollback(mut self) {
        self.finished = true;
        self.txn.rollback();
    }
}

impl Drop for TransactionGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            tracing::debug!("rolling back uncommitted transaction");
            self.txn.rollback();
        }
    }
}
