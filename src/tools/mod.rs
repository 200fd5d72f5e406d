//! Caller-facing handlers.
//!
//! These are the operations exposed to request-handling code:
//! - `mysql_query`: run a statement on the default profile
//! - `mysql_escape_string` / `MySQL.escape_string`: escape a string
//! - `MySQL(profile?)`: open a handle bound to one profile, with `query`
//! - `format`: output formatting for the command line
//!
//! Arguments arrive as [`Value`]s. Usage errors (wrong argument types,
//! unknown profiles) are returned as faults; database failures are values.

pub mod escape;
pub mod format;
pub mod profile;
pub mod query;

pub use escape::EscapeHandler;
pub use format::{OutputFormat, format_as_table, format_outcome};
pub use profile::ProfileHandle;
pub use query::QueryHandler;

use crate::error::{DbError, DbResult};
use crate::models::Value;

/// Bytes of the string argument at `index`.
///
/// A missing argument or one of any other type is a fault.
pub(crate) fn string_argument(args: &[Value], index: usize) -> DbResult<&[u8]> {
    args.get(index)
        .and_then(Value::as_bytes)
        .ok_or_else(DbError::not_a_string)
}

/// Optional string argument. Only an absent argument means "not given";
/// an explicit none is the wrong type.
pub(crate) fn optional_string_argument(args: &[Value], index: usize) -> DbResult<Option<&[u8]>> {
    match args.get(index) {
        None => Ok(None),
        Some(value) => value.as_bytes().map(Some).ok_or_else(DbError::not_a_string),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_argument() {
        let args = [Value::from("SELECT 1"), Value::Number(1.0)];
        assert_eq!(string_argument(&args, 0).unwrap(), b"SELECT 1");
        assert!(string_argument(&args, 1).is_err());
        let err = string_argument(&args, 2).unwrap_err();
        assert_eq!(err.to_string(), "argument is not a string");
    }

    #[test]
    fn test_optional_string_argument() {
        assert_eq!(optional_string_argument(&[], 0).unwrap(), None);
        assert!(optional_string_argument(&[Value::None], 0).is_err());
        assert_eq!(
            optional_string_argument(&[Value::from("main")], 0).unwrap(),
            Some(&b"main"[..])
        );
        assert!(optional_string_argument(&[Value::array()], 0).is_err());
    }
}
