//! SQL string escaping.
//!
//! [`escape_string`] implements the MySQL client's escaping rules for a
//! `utf8mb4` connection. [`EscapeService`] borrows a connection from a
//! profile's pool so the rule follows the session that will run the query.

use crate::db::registry::ProfileEntry;
use crate::error::DbResult;
use tracing::debug;

/// Escaping rule of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EscapeMode {
    /// Backslash escapes for `\0 \n \r \\ ' " ^Z`.
    #[default]
    Backslash,
    /// Server runs with `NO_BACKSLASH_ESCAPES`: only `'` is doubled.
    QuoteDoubling,
}

impl EscapeMode {
    /// Derive the mode from an `@@sql_mode` value.
    pub fn from_sql_mode(sql_mode: &str) -> Self {
        let no_backslash = sql_mode
            .split(',')
            .any(|m| m.trim().eq_ignore_ascii_case("NO_BACKSLASH_ESCAPES"));
        if no_backslash {
            Self::QuoteDoubling
        } else {
            Self::Backslash
        }
    }
}

/// Length of the well-formed UTF-8 sequence starting at `input[0]`, if the
/// sequence is multibyte.
fn multibyte_len(input: &[u8]) -> Option<usize> {
    let len = match input.first()? {
        0xC2..=0xDF => 2,
        0xE0..=0xEF => 3,
        0xF0..=0xF4 => 4,
        _ => return None,
    };
    let candidate = input.get(..len)?;
    std::str::from_utf8(candidate).ok().map(|_| len)
}

/// Whether `byte` announces a multibyte character in utf8mb4. The client
/// library treats every lead byte up to 0xF7 as one, even past the Unicode
/// range.
fn is_multibyte_lead(byte: u8) -> bool {
    matches!(byte, 0xC2..=0xF7)
}

/// Escape `input` for use inside a quoted SQL string literal.
///
/// The output buffer is sized for the worst case of every byte escaped.
pub fn escape_string(input: &[u8], mode: EscapeMode) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len() * 2 + 1);
    let mut i = 0;
    while i < input.len() {
        if let Some(len) = multibyte_len(&input[i..]) {
            out.extend_from_slice(&input[i..i + len]);
            i += len;
            continue;
        }

        let byte = input[i];
        i += 1;
        match mode {
            EscapeMode::QuoteDoubling => {
                if byte == b'\'' {
                    out.push(b'\'');
                }
                out.push(byte);
            }
            EscapeMode::Backslash => {
                let escaped = match byte {
                    0 => Some(b'0'),
                    b'\n' => Some(b'n'),
                    b'\r' => Some(b'r'),
                    b'\\' => Some(b'\\'),
                    b'\'' => Some(b'\''),
                    b'"' => Some(b'"'),
                    0x1A => Some(b'Z'),
                    // A lead byte without its continuation: escape it as itself.
                    b if is_multibyte_lead(b) => Some(b),
                    _ => None,
                };
                match escaped {
                    Some(e) => {
                        out.push(b'\\');
                        out.push(e);
                    }
                    None => out.push(byte),
                }
            }
        }
    }
    out
}

/// Escapes strings with a connection borrowed from a profile's pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct EscapeService;

impl EscapeService {
    pub fn new() -> Self {
        Self
    }

    /// Escape `input` using the escaping rule of a pooled connection.
    ///
    /// The connection is returned to the pool before this returns. A broken
    /// connection escapes with the default backslash rule.
    pub fn escape(&self, entry: &ProfileEntry, input: &[u8]) -> DbResult<Vec<u8>> {
        let mut conn = entry.pool().checkout()?;
        let escaped = conn.escape(input);
        debug!(
            profile = %entry.name(),
            slot = conn.slot(),
            input_len = input.len(),
            output_len = escaped.len(),
            "Escaped string"
        );
        conn.release();
        Ok(escaped)
    }
}
