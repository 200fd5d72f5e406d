//! Client seam between the pool and the database driver.
//!
//! The pool, executor and escape service only talk to [`Connector`] and
//! [`Session`]. The MySQL implementation lives in [`crate::db::mysql`];
//! tests provide scripted implementations.

use crate::db::escape::EscapeMode;
use crate::error::ClientError;
use crate::models::{Profile, ResultSet};

/// Why a query did not produce a result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryFailure {
    /// The statement could not be sent or was rejected. Eligible for one
    /// reconnect-and-retry.
    Execute(ClientError),
    /// The statement ran but reading its result set failed. Not retried.
    Fetch(ClientError),
    /// Refused on the client before anything was sent. The session is
    /// untouched and retrying would fail the same way.
    Rejected(ClientError),
}

impl QueryFailure {
    pub fn error(&self) -> &ClientError {
        match self {
            Self::Execute(err) | Self::Fetch(err) | Self::Rejected(err) => err,
        }
    }

    pub fn into_error(self) -> ClientError {
        match self {
            Self::Execute(err) | Self::Fetch(err) | Self::Rejected(err) => err,
        }
    }

    /// Whether a reconnect-and-retry may help.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Execute(_))
    }
}

/// Opens sessions for a profile.
///
/// Implementations read the profile's option file themselves; the pool never
/// looks at credentials.
pub trait Connector: Send + Sync {
    fn connect(&self, profile: &Profile) -> Result<Box<dyn Session>, ClientError>;
}

/// One live session with the server. Used by one thread at a time.
pub trait Session: Send {
    /// Cheap liveness probe, no round trip. False once the session has seen a
    /// transport-level failure.
    fn is_alive(&self) -> bool;

    /// Run one statement over the text protocol and collect its result.
    fn query(&mut self, sql: &[u8]) -> Result<ResultSet, QueryFailure>;

    /// Escaping rule currently in effect for this session.
    fn escape_mode(&mut self) -> EscapeMode;

    /// Server version string, if known.
    fn server_version(&self) -> Option<String> {
        None
    }

    /// Close the session. Errors are not reported.
    fn close(self: Box<Self>);
}
