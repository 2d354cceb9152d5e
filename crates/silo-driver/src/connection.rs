//! Driver and connection traits.

use async_trait::async_trait;

use crate::error::DriverError;
use crate::options::ConnectOptions;
use crate::value::{QueryResult, SqlValue};

/// A live, stateful backend connection.
///
/// Connections are shared between the pool's bookkeeping and the handle
/// lent to a caller, so every operation takes `&self`; implementations
/// guard their internal state themselves (a mutex around the socket, an
/// atomic closed flag, and so on).
#[async_trait]
pub trait Connection: Send + Sync {
    /// Stable identity of this connection, unique within its driver.
    ///
    /// The pool uses it to match a returned connection against its
    /// accounting and to tag lifecycle events.
    fn id(&self) -> u64;

    /// Execute `sql` with the given parameters.
    async fn query(&self, sql: &str, params: &[SqlValue]) -> Result<QueryResult, DriverError>;

    /// Close the connection. After a successful close every other
    /// operation fails with [`DriverError::Closed`].
    async fn close(&self) -> Result<(), DriverError>;

    /// Liveness probe: `Ok` means the connection is usable, `Err` means
    /// it is dead and should be discarded.
    async fn ping(&self) -> Result<(), DriverError>;
}

/// Factory for [`Connection`]s.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Short human-readable driver name, used in logs.
    fn name(&self) -> &'static str;

    /// Open a new connection with the given settings.
    async fn connect(&self, options: &ConnectOptions) -> Result<Box<dyn Connection>, DriverError>;
}
