use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// The DKV operation a failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Get,
    Set,
    Delete,
    Keys,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Get => "get",
            Operation::Set => "set",
            Operation::Delete => "delete",
            Operation::Keys => "keys",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of a single attempt against a storage provider.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProviderError {
    #[error("io error: {0}")]
    Io(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("attempt timed out after {0:?}")]
    Timeout(Duration),
    #[error("backend error: {0}")]
    Backend(String),
}

impl From<serde_json::Error> for ProviderError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<std::io::Error> for ProviderError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

/// Errors surfaced by [`crate::storage::DurableKv`].
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
    #[error("storage {operation} failed for key `{key}` after {attempts} attempts: {cause}")]
    Exhausted {
        operation: Operation,
        key: String,
        attempts: u32,
        #[source]
        cause: ProviderError,
    },
}

impl StorageError {
    pub fn validation(msg: impl Into<String>) -> Self { Self::Validation(msg.into()) }

    /// Number of attempts made before giving up, when the error came from retries.
    pub fn attempts(&self) -> Option<u32> {
        match self {
            StorageError::Exhausted { attempts, .. } => Some(*attempts),
            _ => None,
        }
    }
}
