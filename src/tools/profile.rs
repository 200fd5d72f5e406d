//! Profile handles.
//!
//! `MySQL(profile?)` binds a handle to one profile; `handle.query(sql)` runs
//! on that profile's pool.

use crate::db::{EscapeService, ProfileEntry, ProfileRegistry, QueryExecutor};
use crate::error::{DbError, DbResult};
use crate::models::Value;
use crate::tools::{optional_string_argument, string_argument};
use std::sync::Arc;
use tracing::debug;

/// A handle bound to one profile.
#[derive(Debug, Clone)]
pub struct ProfileHandle {
    entry: Arc<ProfileEntry>,
    executor: QueryExecutor,
    escape: EscapeService,
}

impl ProfileHandle {
    /// `MySQL(profile?)`.
    ///
    /// Without an argument the default profile is used. The profile is
    /// resolved here, so an unknown name fails at creation rather than at
    /// the first query.
    pub fn open(registry: &ProfileRegistry, args: &[Value]) -> DbResult<Self> {
        let entry = match optional_string_argument(args, 0)? {
            Some(name) => {
                let name =
                    std::str::from_utf8(name).map_err(|_| DbError::unknown_profile(
                        String::from_utf8_lossy(name).into_owned(),
                    ))?;
                registry.get(name)?
            }
            None => registry.default_profile()?,
        };
        debug!(profile = %entry.name(), "Opened profile handle");
        Ok(Self::for_entry(Arc::clone(entry)))
    }

    pub fn for_entry(entry: Arc<ProfileEntry>) -> Self {
        Self {
            entry,
            executor: QueryExecutor::new(),
            escape: EscapeService::new(),
        }
    }

    pub fn name(&self) -> &str {
        self.entry.name()
    }

    pub fn entry(&self) -> &ProfileEntry {
        &self.entry
    }

    /// `handle.query(sql)`.
    pub fn query(&self, args: &[Value]) -> DbResult<Value> {
        let sql = string_argument(args, 0)?;
        Ok(self.executor.execute(&self.entry, sql)?.to_value())
    }

    /// Escape with a connection from this handle's profile.
    pub fn escape_string(&self, args: &[Value]) -> DbResult<Value> {
        let input = string_argument(args, 0)?;
        Ok(Value::String(self.escape.escape(&self.entry, input)?))
    }
}
