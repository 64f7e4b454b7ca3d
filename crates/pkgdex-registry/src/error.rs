//! Registry error types.

/// Errors raised by the persistence and blob collaborators.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A concurrent transaction committed to the same package first.
    #[error("transaction conflict on package '{package}'")]
    Conflict { package: String },

    /// Stored blob no longer matches its content hash.
    #[error("blob {hash} failed integrity check")]
    Integrity { hash: String },

    /// A package holds more versions than `sort_order` can rank.
    #[error("package '{package}' has {count} versions, too many to rank")]
    TooManyVersions { package: String, count: usize },

    /// Snapshot (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Whether retrying the whole transaction may succeed.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

/// Errors returned by [`Registry::publish`](crate::Registry::publish).
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// The metadata's version string is not a valid identifier.
    #[error("invalid version '{version}': {source}")]
    InvalidVersion {
        version: String,
        #[source]
        source: semver::Error,
    },

    /// The uploaded metadata is unusable.
    #[error("invalid package metadata: {detail}")]
    InvalidMetadata { detail: String },

    /// The upload carried no archive bytes.
    #[error("no package uploaded")]
    EmptyUpload,

    /// Target package does not exist.
    #[error("package '{name}' not found")]
    PackageNotFound { name: String },

    /// The publisher does not own the package.
    #[error("{publisher} does not own package '{name}'")]
    NotOwner { name: String, publisher: String },

    /// Metadata names a different package than the publish target.
    #[error("metadata names package '{found}', expected '{expected}'")]
    NameMismatch { expected: String, found: String },

    /// This version was already published.
    #[error("package '{name}' already has version '{version}'")]
    DuplicateVersion { name: String, version: String },

    /// Every transaction attempt lost to a concurrent writer.
    #[error("publish of '{name}' gave up after {attempts} conflicting attempts")]
    TransactionConflict { name: String, attempts: u32 },

    /// Persistence failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors returned by the registry's non-publish operations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// A package with this name already exists.
    #[error("package '{name}' already exists")]
    PackageExists { name: String },

    /// Package not found.
    #[error("package '{name}' not found")]
    PackageNotFound { name: String },

    /// Requested version not found.
    #[error("version {version} not found for package '{name}'")]
    VersionNotFound { name: String, version: String },

    /// A version argument could not be parsed.
    #[error("invalid version: {0}")]
    InvalidVersion(#[from] semver::Error),

    /// Persistence failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors from the deferred-task scheduler.
#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    /// The scheduler has been shut down and accepts no more work.
    #[error("scheduler is shut down")]
    ShutDown,

    /// A worker thread could not be started.
    #[error("failed to spawn worker: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Result type alias for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;
