//! Error types for the Theseus entity store.

use thiserror::Error;

/// Result type alias for store and repository operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors raised by the entity store and the repositories built on it.
///
/// The first two variants come from the storage layer, the next two from the
/// repository layer. None of them are retried internally.
#[derive(Debug, Error)]
pub enum StateError {
    /// The database file could not be opened, was locked by another process
    /// past the lock timeout, or a transaction could not be started.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// A write transaction failed to apply or commit. The store is unchanged.
    #[error("transaction failed: {0}")]
    TransactionFailed(String),

    #[error("{kind} not found: {key}")]
    NotFound { kind: &'static str, key: String },

    /// The stored bytes exist but do not decode into the entity's shape.
    #[error("corrupt {kind} record {key}: {reason}")]
    CorruptRecord {
        kind: &'static str,
        key: String,
        reason: String,
    },

    #[error("failed to encode {kind} {key}: {reason}")]
    Serialize {
        kind: &'static str,
        key: String,
        reason: String,
    },
}

impl StateError {
    /// True for the repository-level "no such key" case.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StateError::NotFound { .. })
    }
}
