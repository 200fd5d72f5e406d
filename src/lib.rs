//! MariaDB connection pools.
//!
//! Synchronous, profile-based access to MySQL/MariaDB servers for code running
//! on plain worker threads: fixed-size pools per profile, repair of dead
//! connections on acquire, one reconnect-and-retry per failed query, and
//! results normalized into a structured [`Value`](models::Value) tree.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod service;
pub mod tools;

pub use config::{Config, PluginConfig, ProfileConfig};
pub use error::{ClientError, DbError, DbResult};
pub use models::{Profile, QueryOutcome, ResultSet, Value};
pub use service::DbService;
