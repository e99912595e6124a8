//! Repository Error Types
//!
//! A single error enum shared by the store adapter, the operation queue, the
//! locking manager and the search index. Errors are `Clone` because a finished
//! operation hands the same terminal error to every listener and waiter.

/// Result type alias used across the crate.
pub type Result<T> = std::result::Result<T, RepositoryError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    /// The requested resource (or revision) does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A concurrent structural mutation collided with this one (path taken, move race).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Durable storage failed. State is unchanged from before the attempt.
    #[error("I/O failure: {0}")]
    Io(String),

    /// The logical resource is locked by a different user.
    #[error("Resource {identifier} is already locked by {owner}")]
    AlreadyLocked { identifier: String, owner: String },

    /// Other resources still reference the identifier that was about to be removed.
    #[error("Resource {identifier} is still referenced by {} resource(s)", referrers.len())]
    ReferentialIntegrity {
        identifier: String,
        referrers: Vec<String>,
    },

    /// The search index could not be written or queried.
    #[error("Search index unavailable: {0}")]
    IndexUnavailable(String),

    /// The call is not valid in the current state (programming error).
    #[error("Illegal state: {0}")]
    IllegalState(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The operation was cancelled before it started executing.
    #[error("Operation cancelled")]
    Cancelled,

    #[error("Operation timed out: {0}")]
    Timeout(String),
}

impl RepositoryError {
    pub fn not_found(what: impl std::fmt::Display) -> Self {
        Self::NotFound(what.to_string())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Index errors never fail the store mutation that triggered the index update.
    pub fn is_index_error(&self) -> bool {
        matches!(self, Self::IndexUnavailable(_))
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Io(format!("serialization: {}", err))
    }
}

impl From<tokio::time::error::Elapsed> for RepositoryError {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        RepositoryError::Timeout(err.to_string())
    }
}
