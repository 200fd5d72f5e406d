//! Profile model.
//!
//! A profile is one named configuration unit with its own connection pool.

use std::path::PathBuf;
use std::time::Duration;

/// Name under which the implicit single profile is registered.
pub const DEFAULT_PROFILE_NAME: &str = "__default";

/// Default number of connections per profile.
pub const DEFAULT_POOL_SIZE: usize = 1;

/// Validated configuration of one profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub name: String,
    /// Option file handed to the client connector; never interpreted by the pool.
    pub cnf: PathBuf,
    /// Exact number of connections the pool for this profile holds.
    pub pool_size: usize,
    pub read_timeout: Option<Duration>,
    pub write_timeout: Option<Duration>,
    /// None waits for a free connection forever.
    pub acquire_timeout: Option<Duration>,
}

impl Profile {
    /// Create a profile with default pool size and no timeouts.
    pub fn new(name: impl Into<String>, cnf: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            cnf: cnf.into(),
            pool_size: DEFAULT_POOL_SIZE,
            read_timeout: None,
            write_timeout: None,
            acquire_timeout: None,
        }
    }

    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_write_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.write_timeout = timeout;
        self
    }

    pub fn with_acquire_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Whether this is the implicit single profile.
    pub fn is_implicit(&self) -> bool {
        self.name == DEFAULT_PROFILE_NAME
    }
}

/// Convert a seconds setting where 0 means "unset".
pub fn optional_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_defaults() {
        let profile = Profile::new("main", "/etc/my.cnf");
        assert_eq!(profile.pool_size, 1);
        assert!(profile.read_timeout.is_none());
        assert!(profile.write_timeout.is_none());
        assert!(profile.acquire_timeout.is_none());
        assert!(!profile.is_implicit());
    }

    #[test]
    fn test_optional_secs_zero_is_unset() {
        assert_eq!(optional_secs(0), None);
        assert_eq!(optional_secs(5), Some(Duration::from_secs(5)));
    }
}
