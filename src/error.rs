use std::path::PathBuf;
use thiserror::Error;

/// Invalid domain targets or option values. Fatal to registry load.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("no domains configured")]
    NoDomains,

    #[error("domain name must not be blank (entry {index})")]
    BlankName { index: usize },

    #[error("domain '{0}' is configured more than once")]
    DuplicateDomain(String),

    #[error("domain '{0}' has no letters or digits to name its directory")]
    EmptySlug(String),

    #[error("domains '{first}' and '{second}' share the directory name '{slug}'")]
    SlugCollision {
        first: String,
        second: String,
        slug: String,
    },

    #[error("domain '{domain}' has a negative target ({target})")]
    NegativeTarget { domain: String, target: f64 },

    #[error("target allocations sum to {sum:.4}, expected 1.0 (tolerance {tolerance})")]
    AllocationSum { sum: f64, tolerance: f64 },

    #[error("quality threshold {0} is outside 0..=100")]
    QualityThreshold(u32),

    #[error("confidence floor {0} is outside 0.0..=1.0")]
    ConfidenceFloor(f32),

    #[error("failed to read config {path:?}: {message}")]
    Read { path: PathBuf, message: String },

    #[error("failed to write config {path:?}: {message}")]
    Write { path: PathBuf, message: String },

    #[error("failed to parse config {path:?}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Errors raised by a storage backend (snapshot reads and mutations).
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("document '{0}' not found")]
    DocumentNotFound(String),

    #[error("document '{id}' is in '{actual}', not '{expected}'")]
    WrongDomain {
        id: String,
        expected: String,
        actual: String,
    },

    #[error("unknown domain '{0}'")]
    UnknownDomain(String),

    #[error("destination {0:?} already exists")]
    DestinationExists(PathBuf),

    #[error("invalid metadata in {path:?}: {message}")]
    Metadata { path: PathBuf, message: String },

    #[error("storage lock poisoned")]
    Poisoned,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Raised by a classification oracle that cannot answer.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OracleError {
    #[error("classifier unavailable: {0}")]
    Unavailable(String),
}

/// Planning aborts; previously produced plans are untouched.
#[derive(Error, Debug)]
pub enum PlanningError {
    #[error("classification oracle unavailable: {0}")]
    OracleUnavailable(#[from] OracleError),

    #[error("classification requested but no oracle is configured")]
    NoOracle,

    #[error("no document count target configured for domain '{0}'")]
    MissingCountTarget(String),

    #[error("failed to read corpus: {0}")]
    Snapshot(#[from] StorageError),
}

/// A single plan item that could not be applied. Recorded, never fatal.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutionItemError {
    #[error("failed to move '{document_id}' from '{from}' to '{to}': {message}")]
    Move {
        document_id: String,
        from: String,
        to: String,
        message: String,
    },

    #[error("failed to classify '{document_id}' as '{domain}': {message}")]
    Classify {
        document_id: String,
        domain: String,
        message: String,
    },
}
