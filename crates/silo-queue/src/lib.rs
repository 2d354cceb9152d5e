//! # silo-queue
//!
//! A time- and size-bounded holding area for deferred work.
//!
//! [`DelayQueue`] keeps items in strict FIFO order for up to a configured
//! maximum time. Items that are not withdrawn before their deadline are
//! evicted and handed to a registered timeout handler, which decides what
//! "timed out" means for that item (reject a waiting caller, close an idle
//! connection, and so on).
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use silo_queue::DelayQueue;
//!
//! let queue: DelayQueue<u32> = DelayQueue::new(Duration::from_secs(1), Some(16))?;
//! queue.on_timeout(|item| println!("expired: {item}"));
//!
//! queue.put(1)?;
//! queue.put(2)?;
//!
//! assert_eq!(queue.pull(), Some(1)); // oldest first
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod error;
pub mod queue;

pub use error::QueueError;
pub use queue::DelayQueue;
