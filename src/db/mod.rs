//! Database access layer.
//!
//! - Client seam ([`Connector`] / [`Session`]) and the sqlx-backed driver
//! - Option file reader
//! - Pooled connections with repair-on-acquire
//! - Profile registry
//! - Query execution with one reconnect-and-retry
//! - String escaping

pub mod client;
pub mod connection;
pub mod escape;
pub mod executor;
pub mod mysql;
pub mod option_file;
pub mod pool;
pub mod registry;

pub use client::{Connector, QueryFailure, Session};
pub use connection::Connection;
pub use escape::{EscapeMode, EscapeService, escape_string};
pub use executor::QueryExecutor;
pub use mysql::{ClientRuntime, DEFAULT_RUNTIME_THREADS, MySqlConnector, MySqlSession};
pub use option_file::{ClientOptions, OptionFileError};
pub use pool::{ConnectionPool, PoolStats, PooledConnection};
pub use registry::{ProfileEntry, ProfileRegistry};
