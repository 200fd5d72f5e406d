//! Profile registry.
//!
//! An immutable name -> (profile, pool) table built once at startup and
//! shared by every caller. Lookups need no locking.

use crate::config::PluginConfig;
use crate::db::client::Connector;
use crate::db::pool::ConnectionPool;
use crate::error::{DbError, DbResult};
use crate::models::Profile;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// A registered profile and its pool.
#[derive(Debug)]
pub struct ProfileEntry {
    profile: Arc<Profile>,
    pool: ConnectionPool,
}

impl ProfileEntry {
    fn new(profile: Profile, connector: Arc<dyn Connector>) -> Self {
        let profile = Arc::new(profile);
        let pool = ConnectionPool::new(Arc::clone(&profile), connector);
        Self { profile, pool }
    }

    pub fn name(&self) -> &str {
        &self.profile.name
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }
}

#[derive(Debug)]
pub struct ProfileRegistry {
    profiles: HashMap<String, Arc<ProfileEntry>>,
    /// Registration order, for stable listings.
    order: Vec<String>,
    default: Option<Arc<ProfileEntry>>,
}

impl ProfileRegistry {
    /// Validate the configuration and open every pool.
    ///
    /// Nothing is connected unless the whole configuration is valid.
    pub fn from_config(config: &PluginConfig, connector: Arc<dyn Connector>) -> DbResult<Self> {
        let (profiles, default_name) = config.resolve_profiles()?;
        Self::from_profiles(profiles, default_name.as_deref(), connector)
    }

    /// Build the registry from already-resolved profiles.
    pub fn from_profiles(
        profiles: Vec<Profile>,
        default_name: Option<&str>,
        connector: Arc<dyn Connector>,
    ) -> DbResult<Self> {
        if profiles.is_empty() {
            return Err(DbError::config("No profiles configured"));
        }
        let mut seen = std::collections::HashSet::new();
        for profile in &profiles {
            if profile.pool_size == 0 {
                return Err(DbError::config(format!(
                    "Profile '{}': pool_size must be at least 1",
                    profile.name
                )));
            }
            if !seen.insert(profile.name.as_str()) {
                return Err(DbError::config(format!(
                    "Duplicate profile id '{}'",
                    profile.name
                )));
            }
        }

        if let Some(name) = default_name {
            if !seen.contains(name) {
                warn!(
                    default_profile = %name,
                    "default_profile does not match any profile, no default is set"
                );
            }
        }

        let mut map = HashMap::with_capacity(profiles.len());
        let mut order = Vec::with_capacity(profiles.len());
        let mut default = None;
        for profile in profiles {
            let name = profile.name.clone();
            let is_default = default_name == Some(name.as_str());
            let entry = Arc::new(ProfileEntry::new(profile, Arc::clone(&connector)));
            if is_default {
                default = Some(Arc::clone(&entry));
            }
            order.push(name.clone());
            map.insert(name, entry);
        }

        info!(
            profiles = order.len(),
            default = default.as_ref().map(|e| e.name()).unwrap_or("<none>"),
            "Profile registry initialized"
        );

        Ok(Self {
            profiles: map,
            order,
            default,
        })
    }

    /// Look up a profile by name.
    pub fn get(&self, name: &str) -> DbResult<&Arc<ProfileEntry>> {
        self.profiles
            .get(name)
            .ok_or_else(|| DbError::unknown_profile(name))
    }

    /// The default profile, if one is set.
    pub fn default_profile(&self) -> DbResult<&Arc<ProfileEntry>> {
        self.default.as_ref().ok_or(DbError::NoDefaultProfile)
    }

    /// Resolve an optional profile name, falling back to the default.
    pub fn resolve(&self, name: Option<&str>) -> DbResult<&Arc<ProfileEntry>> {
        match name {
            Some(name) => self.get(name),
            None => self.default_profile(),
        }
    }

    /// Profile names in configuration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn entries(&self) -> impl Iterator<Item = &Arc<ProfileEntry>> {
        self.order.iter().filter_map(|name| self.profiles.get(name))
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// Close the idle connections of every pool.
    pub fn close(&self) {
        let closed: usize = self.entries().map(|entry| entry.pool().close()).sum();
        info!(closed = closed, "All connection pools closed");
    }
}
