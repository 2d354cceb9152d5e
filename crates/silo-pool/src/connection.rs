//! Borrowed connection handle.

use std::sync::Arc;

use silo_driver::{Connection, QueryResult, SqlValue};

use crate::error::PoolError;
use crate::events::PoolEvent;
use crate::pool::PoolShared;

/// A connection on loan from a [`Pool`](crate::Pool).
///
/// The handle is single-use per loan: after [`release`](Self::release)
/// every method fails with [`PoolError::ConnectionReleased`]. Dropping
/// the handle without releasing returns the connection to the pool on a
/// best-effort basis; call `release` to observe the outcome.
pub struct PoolConnection {
    connection: Option<Arc<dyn Connection>>,
    pool: Option<Arc<PoolShared>>,
    id: u64,
}

impl PoolConnection {
    pub(crate) fn new(connection: Arc<dyn Connection>, pool: Arc<PoolShared>) -> Self {
        let id = connection.id();
        Self {
            connection: Some(connection),
            pool: Some(pool),
            id,
        }
    }

    /// Identifier of the underlying connection.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether the connection has already been returned to the pool.
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.connection.is_none()
    }

    /// Execute a query on this connection.
    ///
    /// # Errors
    /// [`PoolError::QueryFail`] if the driver reports a failure and
    /// [`PoolError::ConnectionReleased`] after release.
    pub async fn query(&self, sql: &str, params: &[SqlValue]) -> Result<QueryResult, PoolError> {
        let (connection, pool) = match (&self.connection, &self.pool) {
            (Some(connection), Some(pool)) => (connection, pool),
            _ => return Err(PoolError::ConnectionReleased),
        };

        match connection.query(sql, params).await {
            Ok(result) => {
                pool.emit(&PoolEvent::QuerySuccess { rows: result.len() });
                Ok(result)
            }
            Err(error) => {
                let message = error.message_or("query execution failed");
                pool.emit(&PoolEvent::QueryFail {
                    message: message.clone(),
                });
                pool.record("QueryFailError", &message);
                Err(PoolError::QueryFail { message })
            }
        }
    }

    /// Return the connection to the pool.
    ///
    /// The pool hands it to the oldest queued request if one is waiting,
    /// otherwise parks it in the idle queue.
    ///
    /// # Errors
    /// [`PoolError::ConnectionReleased`] if already released and
    /// [`PoolError::Closed`] after shutdown.
    pub fn release(&mut self) -> Result<(), PoolError> {
        let (connection, pool) = match (self.connection.take(), self.pool.take()) {
            (Some(connection), Some(pool)) => (connection, pool),
            _ => return Err(PoolError::ConnectionReleased),
        };
        pool.release(connection)
    }
}

impl Drop for PoolConnection {
    fn drop(&mut self) {
        if let (Some(connection), Some(pool)) = (self.connection.take(), self.pool.take()) {
            let _ = pool.release(connection);
        }
    }
}

impl std::fmt::Debug for PoolConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolConnection")
            .field("id", &self.id)
            .field("released", &self.is_released())
            .finish()
    }
}
