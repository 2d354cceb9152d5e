//! Driver error types.

use thiserror::Error;

/// Errors a driver can report to the pool.
#[derive(Debug, Error)]
pub enum DriverError {
    /// Establishing a connection failed.
    #[error("connect failed: {0}")]
    Connect(String),

    /// Executing a query failed.
    #[error("query failed: {0}")]
    Query(String),

    /// A liveness probe determined the connection is dead.
    #[error("connection is not alive: {0}")]
    Ping(String),

    /// The connection was already closed.
    #[error("connection closed")]
    Closed,

    /// Invalid connection settings.
    #[error("invalid connection options: {0}")]
    Config(String),

    /// Underlying IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DriverError {
    /// The error's message, normalized for reporting.
    ///
    /// Drivers are third-party code; an empty or whitespace-only message
    /// is replaced with `fallback` so pool diagnostics never carry blank
    /// reasons.
    #[must_use]
    pub fn message_or(&self, fallback: &str) -> String {
        let message = self.to_string();
        if message.trim().is_empty() {
            fallback.to_string()
        } else {
            message
        }
    }
}
