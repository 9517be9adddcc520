// Error taxonomy shared by the match core, the persistence layer and the API.

use thiserror::Error;

/// Outcome of a rejected core command.
///
/// The core never panics on user input: every command either succeeds with a
/// list of notifications or fails with one of these, leaving state untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// The state machine forbids the command right now (locked controls,
    /// nothing staged, match already decided, ...).
    #[error("invalid command: {0}")]
    InvalidCommand(String),
    /// Malformed duration label, empty competitor list, and the like.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// The persistent log store could not be reached.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
}

impl CoreError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        CoreError::InvalidCommand(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        CoreError::Configuration(msg.into())
    }

    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::InvalidCommand(_) => "invalid_command",
            CoreError::Configuration(_) => "configuration",
            CoreError::StorageUnavailable(_) => "storage_unavailable",
        }
    }
}

/// Errors from the key-value log store.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error(transparent)]
    Sql(#[from] sqlx::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl From<StorageError> for CoreError {
    fn from(e: StorageError) -> Self {
        CoreError::StorageUnavailable(e.to_string())
    }
}
