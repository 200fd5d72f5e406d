//! Configuration handling.
//!
//! Two layers:
//! - [`PluginConfig`]: the pool configuration file (JSON), either a single
//!   flat profile or a list of named profiles with an optional default.
//! - [`Config`]: command line arguments and environment variables for the
//!   `mariadb-pool` binary.

use crate::db::DEFAULT_RUNTIME_THREADS;
use crate::error::{DbError, DbResult};
use crate::models::{DEFAULT_POOL_SIZE, DEFAULT_PROFILE_NAME, Profile, optional_secs};
use crate::tools::OutputFormat;
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const DEFAULT_RUN_THREADS: usize = 4;

/// A numeric setting given either as a JSON number or a numeric string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NumberOrString {
    Number(u64),
    Text(String),
}

impl NumberOrString {
    fn to_u64(&self, profile: &str, key: &str) -> DbResult<u64> {
        match self {
            Self::Number(n) => Ok(*n),
            Self::Text(s) => s.trim().parse().map_err(|_| {
                DbError::config(format!(
                    "Profile '{}': {} must be a non-negative integer, got '{}'",
                    profile, key, s
                ))
            }),
        }
    }
}

impl From<u64> for NumberOrString {
    fn from(n: u64) -> Self {
        Self::Number(n)
    }
}

/// Settings of one profile as written in the configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileConfig {
    /// Profile name. Required in the `profiles` form, ignored otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Option file with connection settings and credentials.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cnf: Option<PathBuf>,
    /// Number of connections (default: 1)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool_size: Option<NumberOrString>,
    /// Seconds, 0 = unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_timeout: Option<NumberOrString>,
    /// Seconds, 0 = unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_timeout: Option<NumberOrString>,
    /// Seconds to wait for a free connection, 0 = forever (default: 0)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acquire_timeout: Option<NumberOrString>,
}

impl ProfileConfig {
    fn secs_or_default(&self, value: &Option<NumberOrString>, name: &str, key: &str) -> DbResult<u64> {
        value.as_ref().map_or(Ok(0), |v| v.to_u64(name, key))
    }

    /// Get pool_size with default value.
    pub fn pool_size_or_default(&self, name: &str) -> DbResult<usize> {
        let size = match &self.pool_size {
            Some(v) => v.to_u64(name, "pool_size")?,
            None => DEFAULT_POOL_SIZE as u64,
        };
        if size == 0 {
            return Err(DbError::config(format!(
                "Profile '{}': pool_size must be at least 1",
                name
            )));
        }
        usize::try_from(size)
            .map_err(|_| DbError::config(format!("Profile '{}': pool_size is too large", name)))
    }

    /// Resolve defaults and validate into a [`Profile`] named `name`.
    pub fn to_profile(&self, name: &str) -> DbResult<Profile> {
        let cnf = self
            .cnf
            .clone()
            .ok_or_else(|| DbError::config(format!("Profile '{}': cnf is required", name)))?;

        Ok(Profile::new(name, cnf)
            .with_pool_size(self.pool_size_or_default(name)?)
            .with_read_timeout(optional_secs(
                self.secs_or_default(&self.read_timeout, name, "read_timeout")?,
            ))
            .with_write_timeout(optional_secs(
                self.secs_or_default(&self.write_timeout, name, "write_timeout")?,
            ))
            .with_acquire_timeout(optional_secs(
                self.secs_or_default(&self.acquire_timeout, name, "acquire_timeout")?,
            )))
    }
}

/// The pool configuration file.
///
/// ```json
/// {"cnf": "/etc/app/my.cnf", "pool_size": 4}
/// ```
///
/// ```json
/// {
///   "profiles": [
///     {"id": "main", "cnf": "/etc/app/main.cnf", "pool_size": "8"},
///     {"id": "reports", "cnf": "/etc/app/reports.cnf", "read_timeout": 30}
///   ],
///   "default_profile": "main"
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profiles: Option<Vec<ProfileConfig>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_profile: Option<String>,
    /// Flat single-profile form.
    #[serde(flatten)]
    pub single: ProfileConfig,
}

impl PluginConfig {
    pub fn from_json_str(json: &str) -> DbResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| DbError::config(format!("Invalid configuration: {}", e)))
    }

    pub fn from_path(path: &Path) -> DbResult<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            DbError::config(format!(
                "Failed to read configuration '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json_str(&json)
    }

    /// Single flat profile.
    pub fn single(profile: ProfileConfig) -> Self {
        Self {
            single: profile,
            ..Default::default()
        }
    }

    /// Validate every profile and return them with the default profile name.
    ///
    /// The implicit single profile is always the default.
    pub fn resolve_profiles(&self) -> DbResult<(Vec<Profile>, Option<String>)> {
        let Some(configs) = &self.profiles else {
            let profile = self.single.to_profile(DEFAULT_PROFILE_NAME)?;
            return Ok((vec![profile], Some(DEFAULT_PROFILE_NAME.to_string())));
        };

        if configs.is_empty() {
            return Err(DbError::config("profiles must not be empty"));
        }

        let mut profiles: Vec<Profile> = Vec::with_capacity(configs.len());
        for (index, config) in configs.iter().enumerate() {
            let id = config
                .id
                .as_deref()
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .ok_or_else(|| DbError::config(format!("profiles[{}]: id is required", index)))?;
            if profiles.iter().any(|p| p.name == id) {
                return Err(DbError::config(format!("Duplicate profile id '{}'", id)));
            }
            profiles.push(config.to_profile(id)?);
        }

        Ok((profiles, self.default_profile.clone()))
    }
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Run one statement and print its outcome
    Query {
        /// Profile name (default profile when omitted)
        #[arg(short, long)]
        profile: Option<String>,

        #[arg(short, long, value_enum, default_value = "json")]
        format: OutputFormat,

        /// SQL statement
        sql: String,
    },

    /// Escape a string for use inside a quoted SQL literal
    Escape {
        #[arg(short, long)]
        profile: Option<String>,

        input: String,
    },

    /// Run every line of a file as a statement on worker threads
    Run {
        #[arg(short, long)]
        profile: Option<String>,

        /// Number of worker threads
        #[arg(short = 'j', long, default_value_t = DEFAULT_RUN_THREADS)]
        threads: usize,

        #[arg(short, long, value_enum, default_value = "json")]
        format: OutputFormat,

        /// File with one statement per line
        file: PathBuf,
    },

    /// Open every pool and report its state
    Check,
}

/// Command line configuration for `mariadb-pool`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "mariadb-pool",
    about = "Blocking MySQL/MariaDB connection pools with reconnect-and-retry",
    version,
    author
)]
pub struct Config {
    /// Pool configuration file (JSON)
    #[arg(short, long, value_name = "FILE", env = "MARIADB_POOL_CONFIG")]
    pub config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = DEFAULT_LOG_LEVEL, env = "MARIADB_POOL_LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "MARIADB_POOL_JSON_LOGS")]
    pub json_logs: bool,

    /// Driver runtime worker threads
    #[arg(long, default_value_t = DEFAULT_RUNTIME_THREADS, env = "MARIADB_POOL_RUNTIME_THREADS")]
    pub runtime_threads: usize,

    #[command(subcommand)]
    pub command: Command,
}

impl Config {
    /// Parse configuration from command line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Load the pool configuration file named by `--config`.
    pub fn plugin_config(&self) -> DbResult<PluginConfig> {
        PluginConfig::from_path(&self.config)
    }
}
