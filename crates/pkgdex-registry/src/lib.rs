//! Package registry core.
//!
//! Decides how the versions of a package are ordered and which of them is
//! the package's "latest", and publishes new versions transactionally.
//!
//! # Architecture
//!
//! - **Version ordering** ([`version`]): total order over version
//!   identifiers with prerelease semantics.
//! - **Latest selection** ([`latest`]): pure policy deciding whether a new
//!   version replaces the latest pointer.
//! - **Reconciliation** ([`reconcile`]): background renumbering of every
//!   version's `sort_order` after the version set changes.
//! - **Publishing** ([`publish`]): validate, decide, commit atomically, then
//!   schedule reconciliation.
//!
//! Storage, blobs, and deferred work are collaborators behind the
//! [`Datastore`], [`BlobStore`], and [`TaskScheduler`] traits. Local
//! implementations of each ship with the crate.

pub mod blob;
pub mod config;
pub mod error;
pub mod integrity;
pub mod latest;
pub mod local_store;
pub mod metadata;
pub mod model;
pub mod publish;
pub mod reconcile;
pub mod registry;
pub mod schedule;
pub mod store;
pub mod version;

// Re-exports for convenience.
pub use blob::{BlobStore, FsBlobStore, MemoryBlobStore};
pub use config::{ConfigError, RegistryConfig};
pub use error::{PublishError, RegistryError, Result, ScheduleError, StoreError};
pub use integrity::ContentHash;
pub use latest::{select, select_version};
pub use local_store::LocalStore;
pub use metadata::PackageMetadata;
pub use model::{Identity, Package, PackageVersion};
pub use publish::{PublishOptions, Upload};
pub use reconcile::{reconcile, ReconcileReport, Reconciler};
pub use registry::Registry;
pub use schedule::{DeferredTask, ManualScheduler, TaskRunner, TaskScheduler, WorkerPool};
pub use store::{Datastore, Transaction, TransactionGuard};
pub use version::Version;
