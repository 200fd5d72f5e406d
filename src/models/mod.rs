//! Data models for the MariaDB pool.
//!
//! This module re-exports all model types used throughout the crate.

pub mod profile;
pub mod query;
pub mod value;

// Re-export commonly used types
pub use profile::{DEFAULT_POOL_SIZE, DEFAULT_PROFILE_NAME, Profile, optional_secs};
pub use query::{Cell, QueryOutcome, ResultSet};
pub use value::Value;
