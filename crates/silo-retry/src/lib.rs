//! # silo-retry
//!
//! A small retry executor for fallible async jobs.
//!
//! [`RetryPolicy`] runs a job up to a configured number of attempts,
//! waiting before every attempt and adding a fixed extra delay after each
//! failure. The policy is a plain value passed into every call; there is
//! no shared mutable configuration to reconfigure between callers.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use silo_retry::RetryPolicy;
//!
//! let policy = RetryPolicy::new(3, Duration::from_millis(500), Duration::from_millis(500))?;
//!
//! // Attempt 1 after 500ms, attempt 2 after a further 1000ms,
//! // attempt 3 after a further 1500ms; the last failure is returned as-is.
//! let value = policy.run(|| async { fallible_operation().await }).await?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod policy;

pub use policy::{sleep, RetryError, RetryPolicy};
