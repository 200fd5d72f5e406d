//! MySQL option file (`.cnf`) reader.
//!
//! The connector loads the profile's option file on every connect so that
//! repaired connections pick up rotated credentials. Only the client groups
//! and the keys needed to open a session are read.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Groups read from the option file, in order. Later groups override earlier ones.
pub const CLIENT_GROUPS: &[&str] = &["client", "client-server", "client-mariadb", "mysql"];

/// Connection settings read from an option file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientOptions {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
    pub socket: Option<String>,
    pub ssl_mode: Option<String>,
    pub ssl_ca: Option<String>,
    pub connect_timeout: Option<Duration>,
    pub default_character_set: Option<String>,
}

/// Errors that can occur while reading an option file.
#[derive(Debug, thiserror::Error)]
pub enum OptionFileError {
    #[error("Failed to read option file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid value for '{key}' in option file: {value}")]
    InvalidValue { key: String, value: String },
}

impl ClientOptions {
    /// Read and parse the option file at `path`.
    pub fn load(path: &Path) -> Result<Self, OptionFileError> {
        let contents = std::fs::read_to_string(path).map_err(|source| OptionFileError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&contents)
    }

    /// Parse option file contents.
    pub fn parse(contents: &str) -> Result<Self, OptionFileError> {
        let values = client_values(contents);
        let mut opts = ClientOptions {
            host: values.get("host").cloned(),
            user: values.get("user").cloned(),
            password: values.get("password").cloned(),
            database: values.get("database").cloned(),
            socket: values.get("socket").cloned(),
            ssl_mode: values.get("ssl-mode").cloned(),
            ssl_ca: values.get("ssl-ca").cloned(),
            default_character_set: values.get("default-character-set").cloned(),
            ..Default::default()
        };

        if let Some(port) = values.get("port") {
            opts.port = Some(port.parse().map_err(|_| OptionFileError::InvalidValue {
                key: "port".to_string(),
                value: port.clone(),
            })?);
        }

        if let Some(timeout) = values.get("connect-timeout") {
            let secs: u64 = timeout.parse().map_err(|_| OptionFileError::InvalidValue {
                key: "connect-timeout".to_string(),
                value: timeout.clone(),
            })?;
            opts.connect_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }

        Ok(opts)
    }
}

/// Collect `key -> value` from the client groups, normalizing `_` to `-`.
fn client_values(contents: &str) -> HashMap<String, String> {
    let mut values = HashMap::new();
    let mut in_client_group = false;

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        if let Some(group) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            let group = group.trim().to_ascii_lowercase();
            in_client_group = CLIENT_GROUPS.contains(&group.as_str());
            continue;
        }

        // !include and !includedir are not followed.
        if !in_client_group || line.starts_with('!') {
            continue;
        }

        let (key, value) = match line.split_once('=') {
            Some((k, v)) => (k.trim(), unquote(v.trim())),
            None => (line, String::new()),
        };
        let key = key.replace('_', "-").to_ascii_lowercase();
        // Later values win.
        values.insert(key, value);
    }

    values
}

/// Strip matching quotes and handle the escapes MySQL allows in quoted values.
/// Unquoted values lose any trailing `#` comment.
fn unquote(value: &str) -> String {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let quote = bytes[0];
        if (quote == b'"' || quote == b'\'') && bytes[bytes.len() - 1] == quote {
            let inner = &value[1..value.len() - 1];
            let mut out = String::with_capacity(inner.len());
            let mut chars = inner.chars();
            while let Some(c) = chars.next() {
                if c != '\\' {
                    out.push(c);
                    continue;
                }
                match chars.next() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('r') => out.push('\r'),
                    Some('b') => out.push('\u{8}'),
                    Some('s') => out.push(' '),
                    Some(other) => out.push(other),
                    None => out.push('\\'),
                }
            }
            return out;
        }
    }

    match value.find(" #") {
        Some(pos) => value[..pos].trim_end().to_string(),
        None => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_client_group() {
        let opts = ClientOptions::parse(
            "# credentials\n[client]\nhost = db.internal\nport=3307\nuser=app\npassword=\"s3cr#t\"\ndatabase=mail\n",
        )
        .unwrap();
        assert_eq!(opts.host.as_deref(), Some("db.internal"));
        assert_eq!(opts.port, Some(3307));
        assert_eq!(opts.user.as_deref(), Some("app"));
        assert_eq!(opts.password.as_deref(), Some("s3cr#t"));
        assert_eq!(opts.database.as_deref(), Some("mail"));
    }

    #[test]
    fn test_other_groups_ignored() {
        let opts =
            ClientOptions::parse("[mysqld]\nport=1234\nuser=mysql\n[client]\nuser=app\n").unwrap();
        assert_eq!(opts.user.as_deref(), Some("app"));
        assert!(opts.port.is_none());
    }

    #[test]
    fn test_later_groups_override() {
        let opts = ClientOptions::parse("[client]\nhost=a\n[client-mariadb]\nhost=b\n").unwrap();
        assert_eq!(opts.host.as_deref(), Some("b"));
    }

    #[test]
    fn test_underscore_and_dash_equivalent() {
        let opts = ClientOptions::parse(
            "[client]\nssl_mode=REQUIRED\nconnect_timeout=7\ndefault-character-set=utf8mb4\n",
        )
        .unwrap();
        assert_eq!(opts.ssl_mode.as_deref(), Some("REQUIRED"));
        assert_eq!(opts.connect_timeout, Some(Duration::from_secs(7)));
        assert_eq!(opts.default_character_set.as_deref(), Some("utf8mb4"));
    }

    #[test]
    fn test_unquoted_trailing_comment_stripped() {
        let opts = ClientOptions::parse("[client]\nuser=app # service account\n").unwrap();
        assert_eq!(opts.user.as_deref(), Some("app"));
    }

    #[test]
    fn test_single_quoted_escapes() {
        let opts = ClientOptions::parse("[client]\npassword='a\\sb\\\\c'\n").unwrap();
        assert_eq!(opts.password.as_deref(), Some("a b\\c"));
    }

    #[test]
    fn test_invalid_port_rejected() {
        let err = ClientOptions::parse("[client]\nport=abc\n").unwrap_err();
        assert!(err.to_string().contains("port"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[client]\nsocket=/run/mysqld/mysqld.sock\nuser=root").unwrap();
        let opts = ClientOptions::load(file.path()).unwrap();
        assert_eq!(opts.socket.as_deref(), Some("/run/mysqld/mysqld.sock"));
    }

    #[test]
    fn test_load_missing_file() {
        let err = ClientOptions::load(Path::new("/nonexistent/my.cnf")).unwrap_err();
        assert!(matches!(err, OptionFileError::Io { .. }));
    }
}
