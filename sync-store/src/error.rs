//! Error types for tasksync-store.

use thiserror::Error;

/// Local storage errors.
///
/// Fatal to the attempted operation and surfaced synchronously to the
/// caller; never retried automatically.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Task not found.
    #[error("task not found: {id}")]
    TaskNotFound {
        /// The task id that was not found.
        id: String,
    },

    /// A stored row failed to decode.
    #[error("corrupt record {id}: {reason}")]
    Corrupt {
        /// Id of the corrupt row.
        id: String,
        /// What failed to decode.
        reason: String,
    },

    /// Input failed schema validation.
    #[error(transparent)]
    Invalid(#[from] sync_types::SyncError),
}

/// Result type alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
