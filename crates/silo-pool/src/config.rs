//! Pool configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for a [`Pool`](crate::Pool).
///
/// Every field has a documented default, and normalization follows a
/// repair-don't-reject policy: an invalid field value (zero where a
/// positive value is required) is silently replaced with its default and
/// logged at warn level, never propagated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolOptions {
    /// Maximum number of connections the pool may hold, idle and
    /// acquired combined. Default: 10.
    pub max_connections: usize,

    /// How long a connection may sit idle before it is closed.
    /// Default: 60 seconds.
    pub max_idle_time: Duration,

    /// Whether requests should queue when the pool is at capacity.
    /// Default: true.
    pub should_queue: bool,

    /// Maximum number of queued requests; `None` means unbounded.
    /// Default: unbounded.
    pub max_queue_size: Option<usize>,

    /// How long a queued request may wait before it fails.
    /// Default: 1 second.
    pub max_queue_time: Duration,

    /// Whether failed connection creation and closing should be retried.
    /// Default: true.
    pub should_retry: bool,

    /// Total number of attempts for a retried operation. Default: 3.
    pub max_retry: u32,

    /// Wait before the first retry attempt. Default: 500ms.
    pub retry_delay: Duration,

    /// Extra wait added after every failed attempt. Default: 500ms.
    pub extra_delay: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            max_connections: 10,
            max_idle_time: Duration::from_secs(60),
            should_queue: true,
            max_queue_size: None,
            max_queue_time: Duration::from_secs(1),
            should_retry: true,
            max_retry: 3,
            retry_delay: Duration::from_millis(500),
            extra_delay: Duration::from_millis(500),
        }
    }
}

impl PoolOptions {
    /// Create options with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Repair invalid field values, replacing each with its default.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        let defaults = Self::default();

        if self.max_connections == 0 {
            tracing::warn!("max_connections must be greater than zero, using default");
            self.max_connections = defaults.max_connections;
        }
        if self.max_idle_time.is_zero() {
            tracing::warn!("max_idle_time must be greater than zero, using default");
            self.max_idle_time = defaults.max_idle_time;
        }
        if self.max_queue_size == Some(0) {
            tracing::warn!("max_queue_size must be greater than zero, using unbounded");
            self.max_queue_size = defaults.max_queue_size;
        }
        if self.max_queue_time.is_zero() {
            tracing::warn!("max_queue_time must be greater than zero, using default");
            self.max_queue_time = defaults.max_queue_time;
        }
        if self.max_retry == 0 {
            tracing::warn!("max_retry must be greater than zero, using default");
            self.max_retry = defaults.max_retry;
        }

        self
    }
}
