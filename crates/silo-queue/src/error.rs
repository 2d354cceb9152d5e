//! Queue error types.

use thiserror::Error;

/// Errors that can occur when constructing or filling a [`DelayQueue`].
///
/// [`DelayQueue`]: crate::DelayQueue
#[derive(Debug, Error)]
pub enum QueueError {
    /// Invalid construction argument.
    #[error("invalid queue configuration: {0}")]
    Config(String),

    /// The queue is at capacity and cannot accept another item.
    #[error("queue is full: {size} item(s) (max {max})")]
    Full {
        /// Current number of items in the queue.
        size: usize,
        /// Configured capacity.
        max: usize,
    },
}
