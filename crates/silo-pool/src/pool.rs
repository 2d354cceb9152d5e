//! Connection pool implementation.
//!
//! The pool decides, for every request, whether to reuse an idle
//! connection, create a new one, queue the request, or reject it, while
//! tracking acquired/idle/queued connections, expiring idle connections,
//! and retrying transient create/close failures.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::future::join_all;
use parking_lot::{Mutex, RwLock};
use tokio::sync::oneshot;

use silo_driver::{ConnectOptions, Connection, Driver, QueryResult, SqlValue};
use silo_queue::DelayQueue;
use silo_retry::RetryPolicy;

use crate::config::PoolOptions;
use crate::connection::PoolConnection;
use crate::error::{ErrorRecord, PoolError};
use crate::events::{EventListener, PoolEvent};

/// Source of unique pool identifiers.
static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

/// Mutable accounting guarded by one lock.
///
/// A connection is in exactly one place: `acquired` here, the idle
/// queue, or (briefly) counted in `creating` while the driver works.
#[derive(Default)]
struct Accounting {
    /// Connections currently lent out.
    acquired: Vec<Arc<dyn Connection>>,
    /// Number of in-flight creation attempts, reserved against
    /// `max_connections` so the bound holds across the connect await.
    creating: usize,
}

/// Shared pool state, referenced by the pool handle, borrowed
/// connections, and queue timeout tasks.
pub(crate) struct PoolShared {
    id: u64,
    driver: Arc<dyn Driver>,
    connect_options: ConnectOptions,
    options: PoolOptions,
    closed: AtomicBool,
    state: Mutex<Accounting>,
    /// Idle connections, oldest first, expiring after `max_idle_time`.
    idle: DelayQueue<Arc<dyn Connection>>,
    /// Waiting requests, oldest first, expiring after `max_queue_time`.
    pending: DelayQueue<oneshot::Sender<Arc<dyn Connection>>>,
    errors: Mutex<Vec<ErrorRecord>>,
    listeners: RwLock<Vec<EventListener>>,
}

/// A bounded asynchronous connection pool.
///
/// The pool lends connections out as [`PoolConnection`] handles and
/// applies a strict admission order to every request: reuse an idle
/// connection, create a new one while under capacity, queue the request
/// if queueing is enabled and the queue has room, otherwise reject.
///
/// # Example
///
/// ```rust,ignore
/// use silo_pool::{Pool, PoolOptions};
///
/// let pool = Pool::builder()
///     .driver(driver)
///     .max_connections(20)
///     .build()?;
///
/// let conn = pool.request().await?;
/// let result = conn.query("SELECT * FROM users", &[]).await?;
/// ```
pub struct Pool {
    shared: Arc<PoolShared>,
}

impl Clone for Pool {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("id", &self.shared.id)
            .field("driver", &self.shared.driver.name())
            .field("closed", &self.shared.closed.load(Ordering::Acquire))
            .finish()
    }
}

impl Pool {
    /// Create a new pool builder.
    #[must_use]
    pub fn builder() -> PoolBuilder {
        PoolBuilder::new()
    }

    /// Create a new pool.
    ///
    /// `pool_options` is normalized field by field: invalid values fall
    /// back to their documented defaults. `connect_options` is forwarded
    /// verbatim to the driver.
    ///
    /// Must be called from within a Tokio runtime: idle and queue
    /// deadlines run as timer tasks.
    ///
    /// # Errors
    /// Returns [`PoolError::Configuration`] if internal queue
    /// construction fails.
    pub fn new(
        connect_options: ConnectOptions,
        pool_options: PoolOptions,
        driver: Arc<dyn Driver>,
    ) -> Result<Self, PoolError> {
        let options = pool_options.normalized();

        let idle = DelayQueue::new(options.max_idle_time, None)
            .map_err(|error| PoolError::Configuration(error.to_string()))?;
        let pending = DelayQueue::new(options.max_queue_time, options.max_queue_size)
            .map_err(|error| PoolError::Configuration(error.to_string()))?;

        let shared = Arc::new(PoolShared {
            id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
            driver,
            connect_options,
            options,
            closed: AtomicBool::new(false),
            state: Mutex::new(Accounting::default()),
            idle,
            pending,
            errors: Mutex::new(Vec::new()),
            listeners: RwLock::new(Vec::new()),
        });

        // Close idle connections that outlived max_idle_time. Failures
        // are recorded but never surfaced: nobody is waiting on them.
        let weak = Arc::downgrade(&shared);
        shared.idle.on_timeout(move |connection: Arc<dyn Connection>| {
            let Some(pool) = weak.upgrade() else { return };
            tokio::spawn(async move {
                tracing::debug!(
                    pool_id = pool.id,
                    connection_id = connection.id(),
                    "closing idle connection past max_idle_time"
                );
                let _ = pool.close_connection(&connection).await;
            });
        });

        // Fail requests that waited past max_queue_time. Dropping the
        // sender wakes the requester with the timeout error.
        let weak = Arc::downgrade(&shared);
        shared.pending.on_timeout(move |waiter| {
            let Some(pool) = weak.upgrade() else { return };
            pool.emit(&PoolEvent::MaxQueueTime);
            let error = PoolError::MaxQueueTime;
            pool.record(error.kind(), &error.detail());
            drop(waiter);
        });

        tracing::info!(
            pool_id = shared.id,
            driver = shared.driver.name(),
            max_connections = shared.options.max_connections,
            should_queue = shared.options.should_queue,
            "pool created"
        );

        Ok(Self { shared })
    }

    /// Unique identifier of this pool.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    /// Request a connection from the pool.
    ///
    /// Admission order, strictly: reuse the oldest alive idle connection
    /// (dead idles are closed and drained transparently), create a new
    /// connection while under `max_connections`, queue the request if
    /// queueing is enabled and the queue has room, otherwise fail.
    ///
    /// # Errors
    /// [`PoolError::CreateConnection`] if creation failed,
    /// [`PoolError::CloseConnection`] if a dead idle connection could not
    /// be closed, [`PoolError::MaxQueueSize`] / [`PoolError::MaxQueueTime`]
    /// / [`PoolError::MaxConnection`] on admission failure, and
    /// [`PoolError::Closed`] after shutdown.
    pub async fn request(&self) -> Result<PoolConnection, PoolError> {
        self.shared.ensure_open()?;
        let connection = self.shared.admit().await?;
        Ok(PoolConnection::new(connection, Arc::clone(&self.shared)))
    }

    /// Execute one query on a pooled connection.
    ///
    /// Sugar for request → query → release; the connection is returned to
    /// the pool on both the success and the failure path.
    pub async fn query(&self, sql: &str, params: &[SqlValue]) -> Result<QueryResult, PoolError> {
        let mut connection = self.request().await?;
        match connection.query(sql, params).await {
            Ok(result) => {
                connection.release()?;
                Ok(result)
            }
            Err(error) => {
                // The query failure is the caller's error; the release
                // cannot fail here short of a concurrent shutdown.
                let _ = connection.release();
                Err(error)
            }
        }
    }

    /// Shut the pool down.
    ///
    /// Every acquired and idle connection is closed, each close an
    /// independent outcome. If any close fails the shutdown fails as a
    /// whole with [`PoolError::ShutdownFailed`] and the pool remains
    /// operable so the problem can be fixed and shutdown retried. Once
    /// every close succeeds the pool becomes terminally closed: all
    /// further operations fail with [`PoolError::Closed`].
    pub async fn shutdown(&self) -> Result<(), PoolError> {
        self.shared.ensure_open()?;

        let connections: Vec<Arc<dyn Connection>> = {
            let acquired = self.shared.state.lock().acquired.clone();
            acquired.into_iter().chain(self.shared.idle.batch()).collect()
        };

        tracing::info!(
            pool_id = self.shared.id,
            connections = connections.len(),
            "shutting down pool"
        );

        let outcomes = join_all(
            connections
                .iter()
                .map(|connection| self.shared.close_connection(connection)),
        )
        .await;

        let failures: Vec<String> = outcomes
            .into_iter()
            .filter_map(Result::err)
            .map(|error| error.to_string())
            .collect();
        if !failures.is_empty() {
            tracing::warn!(
                pool_id = self.shared.id,
                failed = failures.len(),
                "shutdown failed, pool remains operable"
            );
            return Err(PoolError::ShutdownFailed { failures });
        }

        // Terminal from here on: release state, detach listeners and
        // timeout handlers, and wake any queued waiters with an error.
        self.shared.closed.store(true, Ordering::Release);
        {
            let mut state = self.shared.state.lock();
            state.acquired.clear();
            state.creating = 0;
        }
        self.shared.errors.lock().clear();
        self.shared.listeners.write().clear();
        self.shared.idle.clear_timeout_handler();
        self.shared.pending.clear_timeout_handler();
        drop(self.shared.pending.batch());

        tracing::info!(pool_id = self.shared.id, "pool shut down");
        Ok(())
    }

    /// Register a lifecycle event listener.
    ///
    /// Listeners are invoked synchronously at the emission site and are
    /// removed when the pool shuts down. A listener must not call back
    /// into the pool.
    pub fn on_event<F>(&self, listener: F)
    where
        F: Fn(&PoolEvent) + Send + Sync + 'static,
    {
        self.shared.listeners.write().push(Box::new(listener));
    }

    /// Append a well-formed error to the pool's error log.
    ///
    /// # Errors
    /// [`PoolError::InvalidError`] if the error's message is empty, and
    /// [`PoolError::Closed`] after shutdown.
    pub fn record_error(&self, error: &PoolError) -> Result<(), PoolError> {
        self.shared.ensure_open()?;
        let message = error.detail();
        if message.trim().is_empty() {
            return Err(PoolError::InvalidError(
                "the error message must be a non-empty string".into(),
            ));
        }
        self.shared.record(error.kind(), &message);
        Ok(())
    }

    /// All errors recorded by the pool, oldest first.
    pub fn errors(&self) -> Result<Vec<ErrorRecord>, PoolError> {
        self.shared.ensure_open()?;
        Ok(self.shared.errors.lock().clone())
    }

    /// Number of connections currently lent out.
    pub fn acquired_count(&self) -> Result<usize, PoolError> {
        self.shared.ensure_open()?;
        Ok(self.shared.state.lock().acquired.len())
    }

    /// Number of idle connections held for reuse.
    pub fn idle_count(&self) -> Result<usize, PoolError> {
        self.shared.ensure_open()?;
        Ok(self.shared.idle.len())
    }

    /// Number of requests currently waiting in the queue.
    pub fn request_count(&self) -> Result<usize, PoolError> {
        self.shared.ensure_open()?;
        Ok(self.shared.pending.len())
    }

    /// Whether any connections are currently lent out.
    pub fn has_acquired(&self) -> Result<bool, PoolError> {
        Ok(self.acquired_count()? > 0)
    }

    /// Whether any idle connections are held for reuse.
    pub fn has_idle(&self) -> Result<bool, PoolError> {
        Ok(self.idle_count()? > 0)
    }

    /// Whether any requests are waiting in the queue.
    pub fn has_requests(&self) -> Result<bool, PoolError> {
        Ok(self.request_count()? > 0)
    }

    /// The pool's normalized configuration.
    pub fn pool_options(&self) -> Result<&PoolOptions, PoolError> {
        self.shared.ensure_open()?;
        Ok(&self.shared.options)
    }

    /// The connection settings forwarded to the driver.
    pub fn connect_options(&self) -> Result<&ConnectOptions, PoolError> {
        self.shared.ensure_open()?;
        Ok(&self.shared.connect_options)
    }

    /// The driver used to create connections.
    pub fn driver(&self) -> Result<Arc<dyn Driver>, PoolError> {
        self.shared.ensure_open()?;
        Ok(Arc::clone(&self.shared.driver))
    }

    /// Whether the pool has been shut down.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }
}

impl PoolShared {
    fn ensure_open(&self) -> Result<(), PoolError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(PoolError::Closed);
        }
        Ok(())
    }

    /// Admission control: reuse → create → queue → reject.
    async fn admit(self: &Arc<Self>) -> Result<Arc<dyn Connection>, PoolError> {
        // 1. Reuse the oldest alive idle connection. Dead ones are closed
        // and drained; the loop is bounded by the idle count at entry so
        // concurrent releases cannot extend it.
        let drain_budget = self.idle.len();
        for _ in 0..drain_budget {
            let Some(connection) = self.idle.pull() else { break };

            match connection.ping().await {
                Ok(()) => {
                    self.state.lock().acquired.push(Arc::clone(&connection));
                    tracing::debug!(
                        pool_id = self.id,
                        connection_id = connection.id(),
                        "reusing idle connection"
                    );
                    return Ok(connection);
                }
                Err(error) => {
                    tracing::debug!(
                        pool_id = self.id,
                        connection_id = connection.id(),
                        error = %error,
                        "idle connection is dead, closing"
                    );
                    self.close_connection(&connection).await?;
                }
            }
        }

        // 2. Create while under capacity.
        if self.reserve_slot() {
            let result = self.create_connection().await;
            let mut state = self.state.lock();
            state.creating -= 1;
            return match result {
                Ok(connection) => {
                    state.acquired.push(Arc::clone(&connection));
                    drop(state);
                    tracing::debug!(
                        pool_id = self.id,
                        connection_id = connection.id(),
                        "created connection"
                    );
                    self.emit(&PoolEvent::CreateSuccess {
                        connection_id: connection.id(),
                    });
                    Ok(connection)
                }
                Err(error) => Err(error),
            };
        }

        // 3. Queue the request.
        if self.options.should_queue {
            let has_room = self
                .options
                .max_queue_size
                .is_none_or(|max| self.pending.len() < max);
            if has_room {
                let (sender, receiver) = oneshot::channel();
                if self.pending.put(sender).is_ok() {
                    tracing::debug!(
                        pool_id = self.id,
                        queued = self.pending.len(),
                        "queued connection request"
                    );
                    return match receiver.await {
                        Ok(connection) => Ok(connection),
                        // Sender dropped: the request expired in the
                        // queue (event and record already emitted by the
                        // timeout handler) or the pool shut down.
                        Err(_) => Err(PoolError::MaxQueueTime),
                    };
                }
                // Lost the race for the last queue slot.
            }

            self.emit(&PoolEvent::MaxQueueSize);
            let error = PoolError::MaxQueueSize;
            self.record(error.kind(), &error.detail());
            return Err(error);
        }

        // 4. Reject.
        self.emit(&PoolEvent::MaxConnection);
        let error = PoolError::MaxConnection;
        self.record(error.kind(), &error.detail());
        Err(error)
    }

    /// Reserve a creation slot against `max_connections`.
    fn reserve_slot(&self) -> bool {
        let mut state = self.state.lock();
        let total = state.acquired.len() + state.creating + self.idle.len();
        if total < self.options.max_connections {
            state.creating += 1;
            true
        } else {
            false
        }
    }

    /// Create a connection, retrying per the pool options.
    ///
    /// The first attempt runs immediately; with retries enabled a
    /// persistent failure results in exactly `max_retry` driver calls.
    async fn create_connection(&self) -> Result<Arc<dyn Connection>, PoolError> {
        let attempt = || self.driver.connect(&self.connect_options);

        let result = match attempt().await {
            Ok(connection) => Ok(connection),
            Err(_) if self.options.should_retry && self.options.max_retry > 1 => {
                self.retry_policy(self.options.max_retry - 1)
                    .run(attempt)
                    .await
            }
            Err(error) => Err(error),
        };

        match result {
            Ok(connection) => Ok(Arc::from(connection)),
            Err(error) => {
                let message = error.message_or("failed to create the connection");
                self.emit(&PoolEvent::CreateFail {
                    message: message.clone(),
                });
                self.record("CreateConnectionError", &message);
                Err(PoolError::CreateConnection { message })
            }
        }
    }

    /// Close a connection, retrying per the pool options.
    ///
    /// Emits `CloseSuccess`/`CloseFail` and records close failures; the
    /// caller decides whether the failure is surfaced or only logged.
    pub(crate) async fn close_connection(
        &self,
        connection: &Arc<dyn Connection>,
    ) -> Result<(), PoolError> {
        let result = match connection.close().await {
            Ok(()) => Ok(()),
            Err(_) if self.options.should_retry && self.options.max_retry > 1 => {
                self.retry_policy(self.options.max_retry - 1)
                    .run(|| connection.close())
                    .await
            }
            Err(error) => Err(error),
        };

        match result {
            Ok(()) => {
                self.emit(&PoolEvent::CloseSuccess);
                Ok(())
            }
            Err(error) => {
                let message = error.message_or("failed to close the connection");
                self.emit(&PoolEvent::CloseFail {
                    connection_id: connection.id(),
                    message: message.clone(),
                });
                self.record("CloseConnectionError", &message);
                Err(PoolError::CloseConnection { message })
            }
        }
    }

    fn retry_policy(&self, attempts: u32) -> RetryPolicy {
        RetryPolicy::new(attempts, self.options.retry_delay, self.options.extra_delay)
            .unwrap_or_default()
    }

    /// Take a connection back from a borrowed handle.
    ///
    /// The oldest queued request, if any, gets the connection directly
    /// and it stays in acquired accounting; otherwise it moves from
    /// acquired into the idle queue, subject to idle expiry.
    pub(crate) fn release(&self, connection: Arc<dyn Connection>) -> Result<(), PoolError> {
        self.ensure_open()?;

        {
            let state = self.state.lock();
            if !state
                .acquired
                .iter()
                .any(|held| held.id() == connection.id())
            {
                return Err(PoolError::ForeignConnection);
            }
        }

        let mut connection = connection;
        while let Some(waiter) = self.pending.pull() {
            match waiter.send(connection) {
                Ok(()) => {
                    tracing::debug!(
                        pool_id = self.id,
                        "handed released connection to queued request"
                    );
                    return Ok(());
                }
                // The waiter gave up (request future dropped); try the
                // next one.
                Err(returned) => connection = returned,
            }
        }

        {
            let mut state = self.state.lock();
            state.acquired.retain(|held| held.id() != connection.id());
        }
        tracing::debug!(
            pool_id = self.id,
            connection_id = connection.id(),
            "returned connection to idle queue"
        );
        self.idle
            .put(connection)
            .map_err(|error| PoolError::Configuration(error.to_string()))
    }

    /// Invoke every registered listener with `event`.
    pub(crate) fn emit(&self, event: &PoolEvent) {
        tracing::trace!(pool_id = self.id, event = ?event, "pool event");
        for listener in self.listeners.read().iter() {
            listener(event);
        }
    }

    /// Append a record to the error log.
    pub(crate) fn record(&self, kind: &'static str, message: &str) {
        self.errors.lock().push(ErrorRecord {
            pool_id: self.id,
            kind,
            message: message.to_string(),
            timestamp: chrono::Utc::now(),
        });
    }
}

/// Builder for creating a [`Pool`].
///
/// # Example
///
/// ```rust,ignore
/// let pool = Pool::builder()
///     .driver(driver)
///     .connect_options(options)
///     .max_connections(20)
///     .should_queue(false)
///     .build()?;
/// ```
pub struct PoolBuilder {
    connect_options: ConnectOptions,
    pool_options: PoolOptions,
    driver: Option<Arc<dyn Driver>>,
}

impl PoolBuilder {
    /// Create a builder with default settings and no driver.
    #[must_use]
    pub fn new() -> Self {
        Self {
            connect_options: ConnectOptions::default(),
            pool_options: PoolOptions::default(),
            driver: None,
        }
    }

    /// Set the driver used to create connections. Required.
    #[must_use]
    pub fn driver(mut self, driver: Arc<dyn Driver>) -> Self {
        self.driver = Some(driver);
        self
    }

    /// Set the connection settings forwarded to the driver.
    #[must_use]
    pub fn connect_options(mut self, options: ConnectOptions) -> Self {
        self.connect_options = options;
        self
    }

    /// Set the pool configuration wholesale.
    #[must_use]
    pub fn pool_options(mut self, options: PoolOptions) -> Self {
        self.pool_options = options;
        self
    }

    /// Set the maximum number of connections.
    #[must_use]
    pub fn max_connections(mut self, count: usize) -> Self {
        self.pool_options.max_connections = count;
        self
    }

    /// Set the idle connection timeout.
    #[must_use]
    pub fn max_idle_time(mut self, timeout: std::time::Duration) -> Self {
        self.pool_options.max_idle_time = timeout;
        self
    }

    /// Enable or disable request queueing.
    #[must_use]
    pub fn should_queue(mut self, enabled: bool) -> Self {
        self.pool_options.should_queue = enabled;
        self
    }

    /// Set the pending-request queue capacity; `None` means unbounded.
    #[must_use]
    pub fn max_queue_size(mut self, size: Option<usize>) -> Self {
        self.pool_options.max_queue_size = size;
        self
    }

    /// Set how long a queued request may wait.
    #[must_use]
    pub fn max_queue_time(mut self, timeout: std::time::Duration) -> Self {
        self.pool_options.max_queue_time = timeout;
        self
    }

    /// Enable or disable create/close retries.
    #[must_use]
    pub fn should_retry(mut self, enabled: bool) -> Self {
        self.pool_options.should_retry = enabled;
        self
    }

    /// Build the pool.
    ///
    /// # Errors
    /// Returns [`PoolError::Configuration`] if no driver was set.
    pub fn build(self) -> Result<Pool, PoolError> {
        let driver = self
            .driver
            .ok_or_else(|| PoolError::Configuration("a driver is required".into()))?;
        Pool::new(self.connect_options, self.pool_options, driver)
    }
}

impl Default for PoolBuilder {
    fn default() -> Self {
        Self::new()
    }
}
