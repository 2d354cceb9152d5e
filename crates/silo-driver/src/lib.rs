//! # silo-driver
//!
//! The boundary between the silo pool and whatever actually speaks a wire
//! protocol.
//!
//! The pool never opens sockets itself: it asks a [`Driver`] for new
//! [`Connection`]s and afterwards only queries, pings, and closes them.
//! Any backend that can implement those two traits can be pooled.
//!
//! This crate also carries the small value model drivers answer with
//! ([`SqlValue`], [`Row`], [`QueryResult`]) and the connection settings
//! ([`ConnectOptions`]) the pool forwards verbatim.
//!
//! ## Example
//!
//! ```rust,ignore
//! use silo_driver::{Connection, ConnectOptions, Driver, DriverError, QueryResult, SqlValue};
//!
//! struct MyDriver;
//!
//! #[async_trait::async_trait]
//! impl Driver for MyDriver {
//!     fn name(&self) -> &'static str {
//!         "my-driver"
//!     }
//!
//!     async fn connect(
//!         &self,
//!         options: &ConnectOptions,
//!     ) -> Result<Box<dyn Connection>, DriverError> {
//!         // open a socket, authenticate, ...
//!     }
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod connection;
pub mod error;
pub mod options;
pub mod row;
pub mod value;

pub use connection::{Connection, Driver};
pub use error::DriverError;
pub use options::ConnectOptions;
pub use row::{Column, Row};
pub use value::{QueryResult, SqlValue};
