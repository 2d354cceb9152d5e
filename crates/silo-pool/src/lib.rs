//! Asynchronous bounded connection pool.
//!
//! This crate provides [`Pool`], a driver-agnostic connection pool with
//! idle reuse, liveness probing, creation retry, request queueing with
//! per-request timeouts, lifecycle events, an error log, and an
//! irreversible shutdown.
//!
//! # Example
//!
//! ```rust,ignore
//! use silo_pool::{Pool, PoolOptions};
//!
//! let pool = Pool::builder()
//!     .driver(driver)
//!     .max_connections(20)
//!     .build()?;
//!
//! let conn = pool.request().await?;
//! let users = conn.query("SELECT * FROM users", &[]).await?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

mod config;
mod connection;
mod error;
mod events;
mod pool;

pub use config::PoolOptions;
pub use connection::PoolConnection;
pub use error::{ErrorRecord, PoolError};
pub use events::PoolEvent;
pub use pool::{Pool, PoolBuilder};
