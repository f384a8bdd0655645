//! Error taxonomy shared by every stream backend.

use std::error::Error;
use std::time::Duration;

use thiserror::Error;

/// Boxed backend fault carried as the cause of a [`StreamError::Backend`].
pub type BoxError = Box<dyn Error + Send + Sync + 'static>;

/// Error type for stream operations.
///
/// Backends translate their client-specific faults into this type at the
/// adapter boundary; the core never swallows or retries them.
#[derive(Debug, Error)]
pub enum StreamError {
    /// Operational failure (connectivity, timeout, rejected payload) reported
    /// by the backend. The original fault is preserved as `source`.
    #[error("{message}")]
    Backend {
        message: String,
        #[source]
        source: BoxError,
    },

    /// No backend is registered under the requested name.
    #[error("stream name {name:?} not found in {known:?}")]
    NotFound { name: String, known: Vec<String> },

    /// A receive window elapsed without a message.
    #[error("topics {topics:?} were empty for {timeout:?}")]
    Empty {
        topics: Vec<String>,
        timeout: Option<Duration>,
    },

    /// The message cannot be sent as-is.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// The connection has already been closed.
    #[error("connection closed")]
    Closed,

    /// The worker running a dispatched operation panicked or was cancelled.
    #[error("dispatched operation failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

impl StreamError {
    /// Wrap a backend fault, keeping it as the error source.
    pub fn backend<E>(message: impl Into<String>, source: E) -> Self
    where
        E: Into<BoxError>,
    {
        StreamError::Backend {
            message: message.into(),
            source: source.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StreamError::NotFound { .. })
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, StreamError::Empty { .. })
    }
}

pub type Result<T> = std::result::Result<T, StreamError>;
