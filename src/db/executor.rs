//! Query execution engine.
//!
//! [`QueryExecutor::execute`] runs one statement on a pooled connection:
//!
//! 1. Acquire a connection from the profile's pool.
//! 2. Execute. If the statement fails, reconnect once and execute once more.
//! 3. A failure while reading rows, or a statement the client refused to
//!    send, is reported as-is, without a retry.
//! 4. The connection goes back to the pool on every path.
//!
//! Database failures are returned as [`QueryOutcome::Failure`] values; only
//! pool-level problems (an acquire timeout) are errors.

use crate::db::registry::ProfileEntry;
use crate::error::DbResult;
use crate::models::QueryOutcome;
use std::time::Instant;
use tracing::{debug, warn};

/// Runs statements against a profile's pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryExecutor;

impl QueryExecutor {
    pub fn new() -> Self {
        Self
    }

    /// Execute `sql` on a connection from `entry`'s pool.
    pub fn execute(&self, entry: &ProfileEntry, sql: &[u8]) -> DbResult<QueryOutcome> {
        let start = Instant::now();
        let mut conn = entry.pool().checkout()?;

        debug!(
            profile = %entry.name(),
            slot = conn.slot(),
            sql = %String::from_utf8_lossy(sql),
            "Executing query"
        );

        let outcome = match conn.query(sql) {
            Ok(result) => QueryOutcome::Success(result),
            Err(failure) if !failure.is_retryable() => {
                let err = failure.into_error();
                warn!(
                    profile = %entry.name(),
                    slot = conn.slot(),
                    errno = err.errno,
                    error = %err.message,
                    "Query failed, not retrying"
                );
                QueryOutcome::Failure(err)
            }
            Err(failure) => {
                let err = failure.into_error();
                warn!(
                    profile = %entry.name(),
                    slot = conn.slot(),
                    errno = err.errno,
                    error = %err.message,
                    "Query failed, reconnecting and retrying once"
                );
                match conn.reconnect() {
                    Err(reconnect_err) => {
                        warn!(
                            profile = %entry.name(),
                            slot = conn.slot(),
                            errno = reconnect_err.errno,
                            "Reconnect failed, giving up"
                        );
                        QueryOutcome::Failure(conn.error_state().clone())
                    }
                    Ok(()) => match conn.query(sql) {
                        Ok(result) => QueryOutcome::Success(result),
                        Err(failure) => QueryOutcome::Failure(failure.into_error()),
                    },
                }
            }
        };

        debug!(
            profile = %entry.name(),
            slot = conn.slot(),
            success = outcome.is_success(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Query finished"
        );

        conn.release();
        Ok(outcome)
    }
}
