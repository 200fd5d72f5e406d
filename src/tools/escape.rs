//! Escape handler.
//!
//! `mysql_escape_string(s)` and the static `MySQL.escape_string(s)` both
//! escape with a connection from the default profile's pool.

use crate::db::{EscapeService, ProfileRegistry};
use crate::error::DbResult;
use crate::models::Value;
use crate::tools::string_argument;
use std::sync::Arc;

/// Handler for escape operations.
#[derive(Debug, Clone)]
pub struct EscapeHandler {
    registry: Arc<ProfileRegistry>,
    service: EscapeService,
}

impl EscapeHandler {
    pub fn new(registry: Arc<ProfileRegistry>) -> Self {
        Self {
            registry,
            service: EscapeService::new(),
        }
    }

    /// `mysql_escape_string(s)`.
    pub fn mysql_escape_string(&self, args: &[Value]) -> DbResult<Value> {
        let input = string_argument(args, 0)?;
        self.escape_profile(None, input).map(Value::String)
    }

    /// Static `MySQL.escape_string(s)`; same rule as [`Self::mysql_escape_string`].
    pub fn escape_string(&self, args: &[Value]) -> DbResult<Value> {
        self.mysql_escape_string(args)
    }

    /// Escape `input` with a connection of the named profile, or the default one.
    pub fn escape_profile(&self, profile: Option<&str>, input: &[u8]) -> DbResult<Vec<u8>> {
        let entry = self.registry.resolve(profile)?;
        self.service.escape(entry, input)
    }
}
