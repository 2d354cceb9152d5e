//! Bounded delay queue implementation.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::AbortHandle;

use crate::error::QueueError;

/// Handler invoked with an item that expired before being withdrawn.
type TimeoutHandler<T> = Box<dyn Fn(T) + Send + Sync + 'static>;

/// A single queued item together with its running deadline timer.
///
/// An entry present in the queue always has a live timer; removing the
/// entry (by [`DelayQueue::pull`], [`DelayQueue::batch`], or the timer
/// firing) consumes that timer exactly once.
struct Entry<T> {
    id: u64,
    item: T,
    timer: AbortHandle,
}

struct State<T> {
    queue: VecDeque<Entry<T>>,
    next_id: u64,
}

struct Inner<T> {
    max_queue_time: Duration,
    max_queue_size: Option<usize>,
    state: Mutex<State<T>>,
    on_timeout: Mutex<Option<TimeoutHandler<T>>>,
}

/// A FIFO queue that holds items for a bounded time and up to a bounded size.
///
/// Each inserted item gets a deadline timer of the queue's maximum time.
/// If the item is still queued when the timer fires it is removed and
/// handed to the handler registered with [`DelayQueue::on_timeout`];
/// without a handler the expired item is dropped.
///
/// Insertion happens at the newest end, withdrawal at the oldest end, so
/// items are served strictly in insertion order.
pub struct DelayQueue<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for DelayQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + 'static> std::fmt::Debug for DelayQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DelayQueue")
            .field("len", &self.len())
            .field("max_queue_time", &self.inner.max_queue_time)
            .field("max_queue_size", &self.inner.max_queue_size)
            .finish()
    }
}

impl<T: Send + 'static> DelayQueue<T> {
    /// Create a new queue.
    ///
    /// `max_queue_time` is the deadline applied to every inserted item and
    /// must be non-zero. `max_queue_size` bounds the number of queued
    /// items; `None` means unbounded.
    ///
    /// # Errors
    /// Returns [`QueueError::Config`] if `max_queue_time` is zero or
    /// `max_queue_size` is `Some(0)`.
    pub fn new(max_queue_time: Duration, max_queue_size: Option<usize>) -> Result<Self, QueueError> {
        if max_queue_time.is_zero() {
            return Err(QueueError::Config(
                "max_queue_time must be greater than zero".into(),
            ));
        }
        if max_queue_size == Some(0) {
            return Err(QueueError::Config(
                "max_queue_size must be greater than zero".into(),
            ));
        }

        Ok(Self {
            inner: Arc::new(Inner {
                max_queue_time,
                max_queue_size,
                state: Mutex::new(State {
                    queue: VecDeque::new(),
                    next_id: 0,
                }),
                on_timeout: Mutex::new(None),
            }),
        })
    }

    /// Register the handler invoked with items that expire in the queue.
    ///
    /// Replaces any previously registered handler. The handler runs on the
    /// timer task that detected the expiry.
    pub fn on_timeout<F>(&self, handler: F)
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        *self.inner.on_timeout.lock() = Some(Box::new(handler));
    }

    /// Remove the registered timeout handler, if any.
    ///
    /// Items expiring afterwards are dropped silently.
    pub fn clear_timeout_handler(&self) {
        *self.inner.on_timeout.lock() = None;
    }

    /// Insert an item at the newest end of the queue and start its
    /// deadline timer.
    ///
    /// Must be called from within a Tokio runtime (the deadline timer is a
    /// spawned task).
    ///
    /// # Errors
    /// Returns [`QueueError::Full`] if the queue is at capacity.
    pub fn put(&self, item: T) -> Result<(), QueueError> {
        let mut state = self.inner.state.lock();

        if let Some(max) = self.inner.max_queue_size {
            if state.queue.len() >= max {
                return Err(QueueError::Full {
                    size: state.queue.len(),
                    max,
                });
            }
        }

        let id = state.next_id;
        state.next_id += 1;

        let weak = Arc::downgrade(&self.inner);
        let deadline = self.inner.max_queue_time;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            if let Some(inner) = weak.upgrade() {
                Inner::expire(&inner, id);
            }
        })
        .abort_handle();

        tracing::trace!(id, len = state.queue.len() + 1, "queued item");
        state.queue.push_back(Entry { id, item, timer });
        Ok(())
    }

    /// Remove and return the oldest item, canceling its deadline timer.
    ///
    /// Returns `None` if the queue is empty.
    pub fn pull(&self) -> Option<T> {
        let entry = self.inner.state.lock().queue.pop_front()?;
        entry.timer.abort();
        tracing::trace!(id = entry.id, "pulled item");
        Some(entry.item)
    }

    /// Drain the queue, returning all items in insertion order.
    pub fn batch(&self) -> Vec<T> {
        let mut items = Vec::new();
        while let Some(item) = self.pull() {
            items.push(item);
        }
        items
    }

    /// Number of items currently queued.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    /// Whether the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the queue holds at least one item.
    #[must_use]
    pub fn has_items(&self) -> bool {
        !self.is_empty()
    }

    /// The deadline applied to every inserted item.
    #[must_use]
    pub fn max_queue_time(&self) -> Duration {
        self.inner.max_queue_time
    }

    /// The configured capacity; `None` means unbounded.
    #[must_use]
    pub fn max_queue_size(&self) -> Option<usize> {
        self.inner.max_queue_size
    }
}

impl<T: Send + 'static> Inner<T> {
    /// Timer callback: remove the entry if it is still queued and hand the
    /// item to the timeout handler.
    ///
    /// A concurrent `pull` may already have withdrawn the entry; in that
    /// case the timer lost the race and does nothing.
    fn expire(inner: &Arc<Self>, id: u64) {
        let entry = {
            let mut state = inner.state.lock();
            state
                .queue
                .iter()
                .position(|entry| entry.id == id)
                .and_then(|index| state.queue.remove(index))
        };

        if let Some(entry) = entry {
            tracing::trace!(id = entry.id, "queued item expired");
            if let Some(handler) = inner.on_timeout.lock().as_ref() {
                handler(entry.item);
            }
        }
    }
}
