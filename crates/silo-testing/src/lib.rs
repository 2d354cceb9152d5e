//! # silo-testing
//!
//! An in-memory, scriptable [`Driver`] implementation for exercising the
//! pool without a real server.
//!
//! [`MockDriver`] counts connect attempts and can be told to fail the
//! first N connects (or all of them). Every [`MockConnection`] it hands
//! out exposes knobs for liveness, close failures, and query outcomes.

#![warn(missing_docs)]
#![deny(unsafe_code)]

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use silo_driver::{ConnectOptions, Connection, Driver, DriverError, QueryResult, Row, SqlValue};

/// How the driver should answer connect calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectScript {
    /// Every connect succeeds.
    Reliable,
    /// The first `n` connects fail, later ones succeed.
    FailFirst(usize),
    /// Every connect fails.
    AlwaysFail,
}

/// A scriptable driver for tests.
pub struct MockDriver {
    script: ConnectScript,
    attempts: AtomicUsize,
    next_id: AtomicU64,
    /// Knobs copied onto every connection this driver creates.
    defaults: Mutex<ConnectionKnobs>,
}

#[derive(Debug, Clone, Default)]
struct ConnectionKnobs {
    dead: bool,
    fail_close: bool,
    query_error: Option<String>,
}

impl MockDriver {
    /// A driver whose connects always succeed.
    #[must_use]
    pub fn reliable() -> Self {
        Self::with_script(ConnectScript::Reliable)
    }

    /// A driver that fails the first `n` connect attempts.
    #[must_use]
    pub fn failing_first(n: usize) -> Self {
        Self::with_script(ConnectScript::FailFirst(n))
    }

    /// A driver whose connects always fail.
    #[must_use]
    pub fn always_failing() -> Self {
        Self::with_script(ConnectScript::AlwaysFail)
    }

    fn with_script(script: ConnectScript) -> Self {
        Self {
            script,
            attempts: AtomicUsize::new(0),
            next_id: AtomicU64::new(1),
            defaults: Mutex::new(ConnectionKnobs::default()),
        }
    }

    /// Number of connect calls observed so far.
    #[must_use]
    pub fn connect_attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Make every future connection report itself dead on `ping`.
    pub fn hand_out_dead_connections(&self) {
        self.defaults.lock().dead = true;
    }

    /// Make every future connection healthy again.
    pub fn hand_out_healthy_connections(&self) {
        self.defaults.lock().dead = false;
    }

    /// Make every future connection fail its `close`.
    pub fn hand_out_unclosable_connections(&self) {
        self.defaults.lock().fail_close = true;
    }

    /// Make every future connection fail queries with `message`.
    pub fn hand_out_failing_queries(&self, message: &str) {
        self.defaults.lock().query_error = Some(message.to_string());
    }
}

#[async_trait]
impl Driver for MockDriver {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn connect(&self, _options: &ConnectOptions) -> Result<Box<dyn Connection>, DriverError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;

        let fail = match self.script {
            ConnectScript::Reliable => false,
            ConnectScript::FailFirst(n) => attempt <= n,
            ConnectScript::AlwaysFail => true,
        };
        if fail {
            return Err(DriverError::Connect(format!(
                "scripted connect failure (attempt {attempt})"
            )));
        }

        let knobs = self.defaults.lock().clone();
        let connection = MockConnection {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            dead: AtomicBool::new(knobs.dead),
            fail_close: AtomicBool::new(knobs.fail_close),
            closed: AtomicBool::new(false),
            close_calls: AtomicUsize::new(0),
            query_error: Mutex::new(knobs.query_error),
        };
        Ok(Box::new(connection))
    }
}

/// A scriptable in-memory connection.
pub struct MockConnection {
    id: u64,
    dead: AtomicBool,
    fail_close: AtomicBool,
    closed: AtomicBool,
    close_calls: AtomicUsize,
    query_error: Mutex<Option<String>>,
}

impl MockConnection {
    /// A standalone healthy connection with the given id.
    #[must_use]
    pub fn healthy(id: u64) -> Self {
        Self {
            id,
            dead: AtomicBool::new(false),
            fail_close: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            close_calls: AtomicUsize::new(0),
            query_error: Mutex::new(None),
        }
    }

    /// Make `ping` report this connection dead.
    pub fn kill(&self) {
        self.dead.store(true, Ordering::SeqCst);
    }

    /// Make `close` fail.
    pub fn refuse_close(&self) {
        self.fail_close.store(true, Ordering::SeqCst);
    }

    /// Make queries fail with `message`.
    pub fn fail_queries(&self, message: &str) {
        *self.query_error.lock() = Some(message.to_string());
    }

    /// Number of `close` calls observed (successful or not).
    #[must_use]
    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    /// Whether the connection has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connection for MockConnection {
    fn id(&self) -> u64 {
        self.id
    }

    async fn query(&self, sql: &str, params: &[SqlValue]) -> Result<QueryResult, DriverError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DriverError::Closed);
        }
        if let Some(message) = self.query_error.lock().clone() {
            return Err(DriverError::Query(message));
        }

        // Echo the statement back so tests can assert on what ran.
        let row = Row::new(
            &["sql", "params"],
            vec![
                SqlValue::Text(sql.to_string()),
                SqlValue::Int(params.len() as i64),
            ],
        );
        Ok(QueryResult {
            rows: vec![row],
            rows_affected: 0,
        })
    }

    async fn close(&self) -> Result<(), DriverError> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_close.load(Ordering::SeqCst) {
            return Err(DriverError::Query("scripted close failure".into()));
        }
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn ping(&self) -> Result<(), DriverError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DriverError::Closed);
        }
        if self.dead.load(Ordering::SeqCst) {
            return Err(DriverError::Ping("scripted dead connection".into()));
        }
        Ok(())
    }
}

/// Convenience: a reliable driver behind an `Arc`, ready for `Pool::new`.
#[must_use]
pub fn reliable_driver() -> Arc<MockDriver> {
    Arc::new(MockDriver::reliable())
}
