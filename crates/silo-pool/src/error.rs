//! Pool error types and the per-pool error log.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors surfaced by the pool and its borrowed connections.
#[derive(Debug, Error)]
pub enum PoolError {
    /// Invalid pool construction arguments.
    #[error("invalid pool configuration: {0}")]
    Configuration(String),

    /// Creating a connection failed, after retries if they were enabled.
    #[error("failed to create a connection: {message}")]
    CreateConnection {
        /// The driver's failure message.
        message: String,
    },

    /// Closing a connection failed, after retries if they were enabled.
    #[error("failed to close a connection: {message}")]
    CloseConnection {
        /// The driver's failure message.
        message: String,
    },

    /// The pool is at capacity and queueing is disabled.
    #[error("pool is at maximum capacity and queueing is disabled")]
    MaxConnection,

    /// The pending-request queue is full.
    #[error("connection request queue is full")]
    MaxQueueSize,

    /// A queued connection request waited past the configured deadline.
    #[error("connection request timed out in the queue")]
    MaxQueueTime,

    /// A query on a borrowed connection failed.
    #[error("{message}")]
    QueryFail {
        /// The driver's failure message.
        message: String,
    },

    /// The pool has been shut down; no further operations are possible.
    #[error("cannot perform any further operations after shutdown")]
    Closed,

    /// The borrowed connection was already released.
    #[error("cannot perform any further operations after releasing the connection")]
    ConnectionReleased,

    /// The released connection was not issued by this pool.
    #[error("the connection was not issued by this pool")]
    ForeignConnection,

    /// An error offered to the log was malformed.
    #[error("invalid error: {0}")]
    InvalidError(String),

    /// Shutdown could not close every connection; the pool is still
    /// operable and shutdown may be retried.
    #[error("shutdown failed: {} connection(s) could not be closed", failures.len())]
    ShutdownFailed {
        /// One failure message per connection that could not be closed.
        failures: Vec<String>,
    },
}

impl PoolError {
    /// Stable error-kind name, used as the `kind` of log records.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            PoolError::Configuration(_) => "ConfigurationError",
            PoolError::CreateConnection { .. } => "CreateConnectionError",
            PoolError::CloseConnection { .. } => "CloseConnectionError",
            PoolError::MaxConnection => "MaxConnectionError",
            PoolError::MaxQueueSize => "MaxQueueSizeError",
            PoolError::MaxQueueTime => "MaxQueueTimeError",
            PoolError::QueryFail { .. } => "QueryFailError",
            PoolError::Closed
            | PoolError::ForeignConnection
            | PoolError::InvalidError(_)
            | PoolError::ShutdownFailed { .. } => "PoolError",
            PoolError::ConnectionReleased => "PoolConnectionError",
        }
    }

    /// The message stored when this error is recorded in the log.
    #[must_use]
    pub fn detail(&self) -> String {
        match self {
            PoolError::CreateConnection { message }
            | PoolError::CloseConnection { message }
            | PoolError::QueryFail { message } => message.clone(),
            other => other.to_string(),
        }
    }
}

/// One entry of the pool's append-only error log.
///
/// The log is a diagnostic trail; nothing in the pool reads it back for
/// control flow.
#[derive(Debug, Clone)]
pub struct ErrorRecord {
    /// Identifier of the pool that recorded the error.
    pub pool_id: u64,
    /// Error-kind name, e.g. `"MaxQueueSizeError"`.
    pub kind: &'static str,
    /// Failure message.
    pub message: String,
    /// Wall-clock time the error was recorded.
    pub timestamp: DateTime<Utc>,
}
