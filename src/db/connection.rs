//! A single pooled connection.
//!
//! A [`Connection`] pairs an optional live [`Session`] with the profile it
//! was opened for, so it can always be re-created with identical options.
//! A connection without a session is Broken; it stays in its pool and is
//! repaired the next time it is acquired.

use crate::db::client::{Connector, QueryFailure, Session};
use crate::db::escape::{EscapeMode, escape_string};
use crate::error::ClientError;
use crate::models::{Profile, ResultSet};
use std::sync::Arc;
use tracing::{debug, error};

pub struct Connection {
    /// Position of this connection in its pool, for logs.
    slot: usize,
    profile: Arc<Profile>,
    connector: Arc<dyn Connector>,
    session: Option<Box<dyn Session>>,
    /// Error state of the last operation.
    state: ClientError,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("slot", &self.slot)
            .field("profile", &self.profile.name)
            .field("alive", &self.is_alive())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Create a connection and try to connect it.
    ///
    /// A failed connect is logged and leaves the connection Broken; it is
    /// never an error for the caller.
    pub(crate) fn open(slot: usize, profile: Arc<Profile>, connector: Arc<dyn Connector>) -> Self {
        let mut conn = Self {
            slot,
            profile,
            connector,
            session: None,
            state: ClientError::none(),
        };
        if let Err(err) = conn.connect() {
            error!(
                profile = %conn.profile.name,
                slot,
                pool_size = conn.profile.pool_size,
                errno = err.errno,
                error = %err.message,
                "MariaDB client failed to connect"
            );
        }
        conn
    }

    fn connect(&mut self) -> Result<(), ClientError> {
        match self.connector.connect(&self.profile) {
            Ok(session) => {
                self.session = Some(session);
                self.state = ClientError::none();
                Ok(())
            }
            Err(err) => {
                self.session = None;
                self.state = err.clone();
                Err(err)
            }
        }
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    /// Liveness probe without a round trip.
    pub fn is_alive(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.is_alive())
    }

    /// Error state of the last operation on this connection.
    pub fn error_state(&self) -> &ClientError {
        &self.state
    }

    pub fn server_version(&self) -> Option<String> {
        self.session.as_ref().and_then(|s| s.server_version())
    }

    /// Close the current session (if any) and open a new one with the same options.
    pub fn reconnect(&mut self) -> Result<(), ClientError> {
        self.close();
        self.connect()
    }

    /// Repair a dead connection in place. A failed reconnect is logged and
    /// the connection stays Broken. Returns whether the connection is alive.
    pub(crate) fn repair(&mut self) -> bool {
        match self.reconnect() {
            Ok(()) => true,
            Err(err) => {
                error!(
                    profile = %self.profile.name,
                    slot = self.slot,
                    errno = err.errno,
                    error = %err.message,
                    "MariaDB client failed to reconnect"
                );
                false
            }
        }
    }

    /// Run one statement. The error state is updated either way.
    pub fn query(&mut self, sql: &[u8]) -> Result<ResultSet, QueryFailure> {
        let Some(session) = self.session.as_mut() else {
            self.state = ClientError::server_gone();
            return Err(QueryFailure::Execute(self.state.clone()));
        };
        match session.query(sql) {
            Ok(result) => {
                self.state = ClientError::none();
                Ok(result)
            }
            Err(failure) => {
                self.state = failure.error().clone();
                Err(failure)
            }
        }
    }

    /// Escape `input` with this connection's escaping rule.
    pub fn escape(&mut self, input: &[u8]) -> Vec<u8> {
        let mode = match self.session.as_mut() {
            Some(session) if session.is_alive() => session.escape_mode(),
            _ => EscapeMode::default(),
        };
        escape_string(input, mode)
    }

    /// Close the session. The connection becomes Broken.
    ///
    /// Dropping a connection without closing it discards the session without
    /// the goodbye round trip, which is what happens to connections still
    /// checked out at shutdown.
    pub fn close(&mut self) {
        if let Some(session) = self.session.take() {
            debug!(profile = %self.profile.name, slot = self.slot, "Closing session");
            session.close();
        }
    }
}
