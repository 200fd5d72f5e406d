//! Database service.
//!
//! [`DbService`] owns the process-wide pieces: the client runtime, the
//! profile registry built from configuration, and the handlers callers use.
//! Start it once, share it across worker threads, shut it down once.

use crate::config::PluginConfig;
use crate::db::{ClientRuntime, Connector, ProfileRegistry};
use crate::error::DbResult;
use crate::models::Value;
use crate::tools::{EscapeHandler, ProfileHandle, QueryHandler};
use std::sync::Arc;
use tracing::info;

pub struct DbService {
    registry: Arc<ProfileRegistry>,
    query: QueryHandler,
    escape: EscapeHandler,
    /// None when the connector was supplied by the caller.
    runtime: Option<ClientRuntime>,
    closed: bool,
}

impl std::fmt::Debug for DbService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbService")
            .field("profiles", &self.registry.names().collect::<Vec<_>>())
            .field("owns_runtime", &self.runtime.is_some())
            .finish_non_exhaustive()
    }
}

impl DbService {
    /// Start the client runtime and open every configured pool.
    ///
    /// The configuration is validated before the runtime starts, so a bad
    /// configuration never opens a connection.
    pub fn start(config: &PluginConfig, runtime_threads: usize) -> DbResult<Self> {
        let (profiles, default_name) = config.resolve_profiles()?;
        let runtime = ClientRuntime::start(runtime_threads)?;
        let connector: Arc<dyn Connector> = Arc::new(runtime.connector());

        match ProfileRegistry::from_profiles(profiles, default_name.as_deref(), connector) {
            Ok(registry) => Ok(Self::assemble(registry, Some(runtime))),
            Err(e) => {
                runtime.shutdown();
                Err(e)
            }
        }
    }

    /// Open every configured pool with a caller-supplied connector.
    pub fn with_connector(config: &PluginConfig, connector: Arc<dyn Connector>) -> DbResult<Self> {
        let registry = ProfileRegistry::from_config(config, connector)?;
        Ok(Self::assemble(registry, None))
    }

    fn assemble(registry: ProfileRegistry, runtime: Option<ClientRuntime>) -> Self {
        let registry = Arc::new(registry);
        info!(profiles = registry.len(), "Database service started");
        Self {
            query: QueryHandler::new(Arc::clone(&registry)),
            escape: EscapeHandler::new(Arc::clone(&registry)),
            registry,
            runtime,
            closed: false,
        }
    }

    pub fn registry(&self) -> &Arc<ProfileRegistry> {
        &self.registry
    }

    pub fn query_handler(&self) -> &QueryHandler {
        &self.query
    }

    pub fn escape_handler(&self) -> &EscapeHandler {
        &self.escape
    }

    /// `mysql_query(sql)`
    pub fn mysql_query(&self, args: &[Value]) -> DbResult<Value> {
        self.query.mysql_query(args)
    }

    /// `mysql_escape_string(s)`
    pub fn mysql_escape_string(&self, args: &[Value]) -> DbResult<Value> {
        self.escape.mysql_escape_string(args)
    }

    /// `MySQL.escape_string(s)`
    pub fn escape_string(&self, args: &[Value]) -> DbResult<Value> {
        self.escape.escape_string(args)
    }

    /// `MySQL(profile?)`
    pub fn open_profile(&self, args: &[Value]) -> DbResult<ProfileHandle> {
        ProfileHandle::open(&self.registry, args)
    }

    /// Close every idle connection, then stop the client runtime.
    pub fn shutdown(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.registry.close();
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown();
        }
        info!("Database service stopped");
    }
}

impl Drop for DbService {
    fn drop(&mut self) {
        self.teardown();
    }
}
