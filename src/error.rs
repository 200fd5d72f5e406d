//! Error types for the MariaDB pool.
//!
//! Two families of errors live here:
//! - [`DbError`]: configuration failures (fatal at startup) and caller faults
//!   (bad arguments, unresolvable profiles). These are raised to the caller.
//! - [`ClientError`]: the error state of a single server connection
//!   (errno, message, SQLSTATE). Query failures are reported to the caller as
//!   a normal value built from this state, never raised.

use crate::models::Value;
use thiserror::Error;

/// Client error codes, numbered like the MySQL client library so callers can
/// branch on them the same way they would with the C connector.
pub mod codes {
    pub const CR_UNKNOWN_ERROR: u32 = 2000;
    pub const CR_CONNECTION_ERROR: u32 = 2002;
    pub const CR_SERVER_GONE_ERROR: u32 = 2006;
    pub const CR_SERVER_LOST: u32 = 2013;
    pub const CR_SSL_CONNECTION_ERROR: u32 = 2026;
    pub const CR_MALFORMED_PACKET: u32 = 2027;
    /// Server-side "Invalid %s character string".
    pub const ER_INVALID_CHARACTER_STRING: u32 = 1300;

    /// SQLSTATE used for every client-side error.
    pub const GENERAL_SQL_STATE: &str = "HY000";
    /// SQLSTATE of a connection with no error.
    pub const SUCCESS_SQL_STATE: &str = "00000";
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("no default profile")]
    NoDefaultProfile,

    #[error("unknown profile")]
    UnknownProfile { profile: String },

    #[error("{message}")]
    InvalidArgument { message: String },

    #[error("Timeout: no connection available in profile '{profile}' after {waited_ms}ms")]
    AcquireTimeout { profile: String, waited_ms: u64 },

    #[error("Client runtime error: {message}")]
    Runtime { message: String },
}

impl DbError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an unknown profile error.
    pub fn unknown_profile(profile: impl Into<String>) -> Self {
        Self::UnknownProfile {
            profile: profile.into(),
        }
    }

    /// Create an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// The fault raised when a positional argument is missing or has the wrong type.
    pub fn not_a_string() -> Self {
        Self::invalid_argument("argument is not a string")
    }

    /// Create an acquire timeout error.
    pub fn acquire_timeout(profile: impl Into<String>, waited_ms: u64) -> Self {
        Self::AcquireTimeout {
            profile: profile.into(),
            waited_ms,
        }
    }

    /// Create a client runtime error.
    pub fn runtime(message: impl Into<String>) -> Self {
        Self::Runtime {
            message: message.into(),
        }
    }

    /// Check if this error is a caller fault (raised at the call site) rather
    /// than a startup failure.
    pub fn is_fault(&self) -> bool {
        matches!(
            self,
            Self::NoDefaultProfile
                | Self::UnknownProfile { .. }
                | Self::InvalidArgument { .. }
                | Self::AcquireTimeout { .. }
        )
    }
}

/// Result type alias for pool and handler operations.
pub type DbResult<T> = Result<T, DbError>;

/// Error state of one connection: numeric code, message and SQLSTATE.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("ERROR {errno} ({sql_state}): {message}")]
pub struct ClientError {
    pub errno: u32,
    pub message: String,
    pub sql_state: String,
}

impl ClientError {
    pub fn new(errno: u32, message: impl Into<String>, sql_state: impl Into<String>) -> Self {
        Self {
            errno,
            message: message.into(),
            sql_state: sql_state.into(),
        }
    }

    /// A client-side error (SQLSTATE `HY000`).
    pub fn client(errno: u32, message: impl Into<String>) -> Self {
        Self::new(errno, message, codes::GENERAL_SQL_STATE)
    }

    /// State of a connection whose last operation succeeded.
    pub fn none() -> Self {
        Self::new(0, "", codes::SUCCESS_SQL_STATE)
    }

    /// The connection has no live session.
    pub fn server_gone() -> Self {
        Self::client(codes::CR_SERVER_GONE_ERROR, "Server has gone away")
    }

    /// A network round trip exceeded its deadline.
    pub fn timed_out(operation: &str, secs: u64) -> Self {
        Self::client(
            codes::CR_SERVER_LOST,
            format!("Lost connection to server during {operation} (timed out after {secs}s)"),
        )
    }

    /// Map a driver error raised while establishing a session.
    pub fn from_connect(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(io_err) => Self::client(
                codes::CR_CONNECTION_ERROR,
                format!("Can't connect to server: {}", io_err),
            ),
            other => Self::from(other),
        }
    }

    /// Whether this state carries an error.
    pub fn is_error(&self) -> bool {
        self.errno != 0
    }

    /// Whether the session that produced this error can no longer be used.
    pub fn is_connection_lost(&self) -> bool {
        matches!(
            self.errno,
            codes::CR_CONNECTION_ERROR
                | codes::CR_SERVER_GONE_ERROR
                | codes::CR_SERVER_LOST
                | codes::CR_SSL_CONNECTION_ERROR
                | codes::CR_MALFORMED_PACKET
        )
    }

    /// Build the `{errno, error, sqlstate}` value returned to callers.
    pub fn to_value(&self) -> Value {
        let mut value = Value::array();
        value.insert("errno", Value::Number(self.errno as f64));
        value.insert("error", Value::string(self.message.as_str()));
        value.insert("sqlstate", Value::string(self.sql_state.as_str()));
        value
    }
}

impl Default for ClientError {
    fn default() -> Self {
        Self::none()
    }
}

/// Convert sqlx errors to the client error state.
impl From<sqlx::Error> for ClientError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => {
                match db_err.try_downcast_ref::<sqlx::mysql::MySqlDatabaseError>() {
                    Some(mysql_err) => Self::new(
                        u32::from(mysql_err.number()),
                        mysql_err.message(),
                        mysql_err.code().unwrap_or(codes::GENERAL_SQL_STATE),
                    ),
                    None => Self::new(
                        codes::CR_UNKNOWN_ERROR,
                        db_err.message(),
                        db_err
                            .code()
                            .map(|c| c.to_string())
                            .unwrap_or_else(|| codes::GENERAL_SQL_STATE.to_string()),
                    ),
                }
            }
            sqlx::Error::Io(io_err) => Self::client(
                codes::CR_SERVER_LOST,
                format!("Lost connection to server during query: {}", io_err),
            ),
            sqlx::Error::Tls(tls_err) => Self::client(
                codes::CR_SSL_CONNECTION_ERROR,
                format!("SSL connection error: {}", tls_err),
            ),
            sqlx::Error::Protocol(msg) => Self::client(
                codes::CR_MALFORMED_PACKET,
                format!("Malformed packet: {}", msg),
            ),
            sqlx::Error::Configuration(msg) => Self::client(
                codes::CR_UNKNOWN_ERROR,
                format!("Invalid connection options: {}", msg),
            ),
            sqlx::Error::WorkerCrashed => Self::client(codes::CR_SERVER_LOST, "Driver worker crashed"),
            other => Self::client(codes::CR_UNKNOWN_ERROR, format!("Unknown client error: {}", other)),
        }
    }
}
