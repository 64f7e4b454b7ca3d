//! CLI command implementations.

pub mod package;

use std::sync::Arc;

use anyhow::{Context, Result};
use pkgdex_registry::{
    FsBlobStore, LocalStore, Reconciler, Registry, RegistryConfig, WorkerPool,
};

/// A registry opened from disk, with its background reconciliation pool.
///
/// Layout under the storage root:
/// ```text
/// <root>/
///   db/       : package and version records
///   blobs/    : archive contents by SHA-256
/// ```
pub struct LocalRegistry {
    pub registry: Registry,
    pool: Arc<WorkerPool>,
}

impl LocalRegistry {
    pub fn open(config: &RegistryConfig) -> Result<Self> {
        let root = &config.storage.root;
        let store = Arc::new(
            LocalStore::open(&root.join("db"))
                .with_context(|| format!("opening registry at {}", root.display()))?,
        );
        let blobs = Arc::new(FsBlobStore::new(root.join("blobs")));

        let reconciler = Arc::new(Reconciler::new(
            store.clone(),
            config.reconcile.max_attempts,
        ));
        let pool = Arc::new(
            WorkerPool::new(
                reconciler,
                config.reconcile.workers,
                config.reconcile.max_attempts,
                config.reconcile.retry_backoff(),
            )
            .context("starting reconciliation workers")?,
        );

        let registry = Registry::new(store, blobs, pool.clone(), config.clone());
        tracing::debug!(root = %root.display(), "registry opened");
        Ok(LocalRegistry { registry, pool })
    }

    /// Wait for scheduled reconciliation to finish.
    pub fn close(self) {
        self.pool.wait_idle();
    }
}
