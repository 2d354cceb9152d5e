//! Pool lifecycle events.

/// Events emitted by a [`Pool`](crate::Pool) during its lifecycle.
///
/// Listeners registered with [`Pool::on_event`](crate::Pool::on_event)
/// are invoked synchronously at the emission site, so an event is always
/// observed before the operation that caused it settles. There are no
/// delivery guarantees beyond that.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolEvent {
    /// A connection was created and handed to a caller.
    CreateSuccess {
        /// Identity of the created connection.
        connection_id: u64,
    },
    /// Connection creation failed after retries were exhausted.
    CreateFail {
        /// The driver's failure message.
        message: String,
    },
    /// A connection was closed.
    CloseSuccess,
    /// Closing a connection failed after retries were exhausted.
    CloseFail {
        /// Identity of the connection that could not be closed.
        connection_id: u64,
        /// The driver's failure message.
        message: String,
    },
    /// A query on a borrowed connection succeeded.
    QuerySuccess {
        /// Number of rows in the result.
        rows: usize,
    },
    /// A query on a borrowed connection failed.
    QueryFail {
        /// The driver's failure message.
        message: String,
    },
    /// A queued connection request waited past its deadline.
    MaxQueueTime,
    /// A request was rejected because the pending queue is full.
    MaxQueueSize,
    /// A request was rejected because the pool is at capacity and
    /// queueing is disabled.
    MaxConnection,
}

/// A registered event listener.
pub(crate) type EventListener = Box<dyn Fn(&PoolEvent) + Send + Sync + 'static>;
