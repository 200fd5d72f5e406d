//! Query handler.
//!
//! Implements `mysql_query(sql)`: run one statement on the default profile
//! and return `{result, affected}` or `{errno, error, sqlstate}`.

use crate::db::{ProfileEntry, ProfileRegistry, QueryExecutor};
use crate::error::DbResult;
use crate::models::{QueryOutcome, Value};
use crate::tools::string_argument;
use std::sync::Arc;
use tracing::debug;

/// Handler for query operations.
#[derive(Debug, Clone)]
pub struct QueryHandler {
    registry: Arc<ProfileRegistry>,
    executor: QueryExecutor,
}

impl QueryHandler {
    pub fn new(registry: Arc<ProfileRegistry>) -> Self {
        Self {
            registry,
            executor: QueryExecutor::new(),
        }
    }

    /// `mysql_query(sql)` on the default profile.
    ///
    /// The argument is checked before the profile is resolved; neither check
    /// touches a pool.
    pub fn mysql_query(&self, args: &[Value]) -> DbResult<Value> {
        let sql = string_argument(args, 0)?;
        let entry = self.registry.default_profile()?;
        debug!(profile = %entry.name(), "mysql_query");
        self.query_entry(entry, sql).map(|outcome| outcome.to_value())
    }

    /// Run `sql` on the named profile, or the default one.
    pub fn query_profile(&self, profile: Option<&str>, sql: &[u8]) -> DbResult<QueryOutcome> {
        let entry = self.registry.resolve(profile)?;
        self.query_entry(entry, sql)
    }

    /// Run `sql` on an already-resolved profile.
    pub fn query_entry(&self, entry: &ProfileEntry, sql: &[u8]) -> DbResult<QueryOutcome> {
        self.executor.execute(entry, sql)
    }
}
