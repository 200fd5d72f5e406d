//! MySQL/MariaDB driver built on sqlx.
//!
//! sqlx is asynchronous; the pool is not. [`ClientRuntime`] owns a small
//! tokio runtime started once per process, and every [`MySqlSession`] drives
//! its futures to completion with `Handle::block_on` on the calling worker
//! thread. Calling into a session from inside an async context panics, so
//! callers must be plain threads.

use crate::db::client::{Connector, QueryFailure, Session};
use crate::db::escape::EscapeMode;
use crate::db::option_file::ClientOptions;
use crate::error::{ClientError, DbError, DbResult, codes};
use crate::models::{Cell, Profile, ResultSet};
use futures_util::{Stream, StreamExt};
use sqlx::mysql::{
    MySqlConnectOptions, MySqlConnection, MySqlQueryResult, MySqlRow, MySqlSslMode,
};
use sqlx::{Column, ConnectOptions, Connection, Decode, Either, Executor, MySql, Row, ValueRef};
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;
use tokio::runtime::{Handle, Runtime};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Default number of driver worker threads.
pub const DEFAULT_RUNTIME_THREADS: usize = 2;

/// Upper bound on closing a session when no write timeout is configured.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Character set every session is opened with. Escaping assumes it.
const CONNECTION_CHARSET: &str = "utf8mb4";

/// Process-wide client state. Start it before creating any pool and shut it
/// down after every pool has been closed.
#[derive(Debug)]
pub struct ClientRuntime {
    runtime: Runtime,
}

impl ClientRuntime {
    /// Start the driver runtime.
    pub fn start(worker_threads: usize) -> DbResult<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(worker_threads.max(1))
            .thread_name("mariadb-client")
            .enable_io()
            .enable_time()
            .build()
            .map_err(|e| DbError::runtime(format!("Failed to start client runtime: {}", e)))?;

        info!(worker_threads = worker_threads.max(1), "Client runtime started");
        Ok(Self { runtime })
    }

    /// Handle used by sessions to drive driver futures.
    pub fn handle(&self) -> Handle {
        self.runtime.handle().clone()
    }

    /// Create a connector bound to this runtime.
    pub fn connector(&self) -> MySqlConnector {
        MySqlConnector::new(self.handle())
    }

    /// Stop the runtime. Sessions must not be used afterwards.
    pub fn shutdown(self) {
        self.runtime.shutdown_timeout(CLOSE_TIMEOUT);
        info!("Client runtime stopped");
    }
}

/// Opens sqlx sessions from a profile's option file.
#[derive(Debug, Clone)]
pub struct MySqlConnector {
    handle: Handle,
}

impl MySqlConnector {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }
}

impl Connector for MySqlConnector {
    fn connect(&self, profile: &Profile) -> Result<Box<dyn Session>, ClientError> {
        let client = ClientOptions::load(&profile.cnf)
            .map_err(|e| ClientError::client(codes::CR_UNKNOWN_ERROR, e.to_string()))?;
        let options = connect_options(&client)?;
        let connect_timeout = client.connect_timeout.or(profile.write_timeout);

        let (conn, escape_mode, server_version) = self.handle.block_on(within(
            connect_timeout,
            "connect",
            async move {
                let mut conn = MySqlConnection::connect_with(&options)
                    .await
                    .map_err(ClientError::from_connect)?;
                let (escape_mode, version) = probe_session(&mut conn).await?;
                Ok((conn, escape_mode, version))
            },
        ))?;

        debug!(
            profile = %profile.name,
            server_version = ?server_version,
            escape_mode = ?escape_mode,
            "Session established"
        );

        Ok(Box::new(MySqlSession {
            handle: self.handle.clone(),
            conn: Some(conn),
            lost: false,
            escape_mode,
            escape_mode_stale: false,
            server_version,
            read_timeout: profile.read_timeout,
            write_timeout: profile.write_timeout,
        }))
    }
}

/// Build sqlx connect options from option-file settings.
pub fn connect_options(client: &ClientOptions) -> Result<MySqlConnectOptions, ClientError> {
    let mut options = MySqlConnectOptions::new().charset(CONNECTION_CHARSET);

    if let Some(host) = &client.host {
        options = options.host(host);
    }
    if let Some(port) = client.port {
        options = options.port(port);
    }
    if let Some(socket) = &client.socket {
        options = options.socket(socket);
    }
    if let Some(user) = &client.user {
        options = options.username(user);
    }
    if let Some(password) = &client.password {
        options = options.password(password);
    }
    if let Some(database) = &client.database {
        options = options.database(database);
    }
    if let Some(mode) = &client.ssl_mode {
        let mode = MySqlSslMode::from_str(&mode.to_ascii_lowercase()).map_err(|e| {
            ClientError::client(
                codes::CR_UNKNOWN_ERROR,
                format!("Invalid ssl-mode '{}': {}", mode, e),
            )
        })?;
        options = options.ssl_mode(mode);
    }
    if let Some(ca) = &client.ssl_ca {
        options = options.ssl_ca(ca);
    }
    if let Some(charset) = &client.default_character_set {
        if !charset.eq_ignore_ascii_case(CONNECTION_CHARSET) {
            warn!(
                requested = %charset,
                "default-character-set ignored, sessions always use utf8mb4"
            );
        }
    }

    // Statements are traced by the executor.
    Ok(options.disable_statement_logging())
}

/// Run `fut` with an optional deadline.
async fn within<T, F>(deadline: Option<Duration>, operation: &str, fut: F) -> Result<T, ClientError>
where
    F: Future<Output = Result<T, ClientError>>,
{
    match deadline {
        Some(d) => match timeout(d, fut).await {
            Ok(result) => result,
            Err(_) => Err(ClientError::timed_out(operation, d.as_secs())),
        },
        None => fut.await,
    }
}

/// Read the session's escaping rule and server version in one round trip.
async fn probe_session(
    conn: &mut MySqlConnection,
) -> Result<(EscapeMode, Option<String>), ClientError> {
    let row = conn.fetch_one("SELECT @@SESSION.sql_mode, VERSION()").await?;
    let sql_mode = cell_text(&row, 0)?.unwrap_or_default();
    let version = cell_text(&row, 1)?;
    Ok((EscapeMode::from_sql_mode(&sql_mode), version))
}

fn cell_bytes(row: &MySqlRow, index: usize) -> Result<Cell, ClientError> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(None);
    }
    let bytes = <&[u8] as Decode<'_, MySql>>::decode(raw).map_err(|e| {
        ClientError::client(
            codes::CR_MALFORMED_PACKET,
            format!("Failed to read column {}: {}", index, e),
        )
    })?;
    Ok(Some(bytes.to_vec()))
}

fn cell_text(row: &MySqlRow, index: usize) -> Result<Option<String>, ClientError> {
    Ok(cell_bytes(row, index)?.map(|b| String::from_utf8_lossy(&b).into_owned()))
}

type ResponseItem = Result<Either<MySqlQueryResult, MySqlRow>, sqlx::Error>;

/// Wait for the next response item. The read timeout bounds each wait, not
/// the whole statement, so a long result keeps streaming as long as rows
/// keep arriving.
async fn next_item<S>(
    stream: &mut S,
    read_timeout: Option<Duration>,
) -> Result<Option<ResponseItem>, ClientError>
where
    S: Stream<Item = ResponseItem> + Unpin,
{
    match read_timeout {
        Some(d) => timeout(d, stream.next())
            .await
            .map_err(|_| ClientError::timed_out("query", d.as_secs())),
        None => Ok(stream.next().await),
    }
}

/// An error before any response item means the statement failed; an error
/// after the response started is a fetch failure.
fn classify(started: bool, err: ClientError) -> QueryFailure {
    if started {
        QueryFailure::Fetch(err)
    } else {
        QueryFailure::Execute(err)
    }
}

/// Collect the first result of a statement's response stream.
///
/// Result sets of further statements in a multi-statement query are drained
/// and discarded.
async fn collect_first_result<S>(
    mut stream: S,
    read_timeout: Option<Duration>,
) -> Result<ResultSet, QueryFailure>
where
    S: Stream<Item = ResponseItem> + Unpin,
{
    let mut result = ResultSet::default();
    let mut started = false;
    let mut first_done = false;

    loop {
        let item = match next_item(&mut stream, read_timeout).await {
            Ok(Some(item)) => item,
            Ok(None) => break,
            Err(err) => return Err(classify(started, err)),
        };
        match item {
            Ok(Either::Right(row)) => {
                started = true;
                if first_done {
                    continue;
                }
                if result.columns.is_empty() {
                    result.columns = row.columns().iter().map(|c| c.name().to_string()).collect();
                }
                let cells = (0..row.len())
                    .map(|i| cell_bytes(&row, i))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(QueryFailure::Fetch)?;
                result.rows.push(cells);
            }
            Ok(Either::Left(done)) => {
                started = true;
                if !first_done {
                    result.affected = done.rows_affected();
                    first_done = true;
                }
            }
            Err(err) => return Err(classify(started, ClientError::from(err))),
        }
    }

    Ok(result)
}

/// Execute one statement and collect the first result.
async fn run_statement(
    conn: &mut MySqlConnection,
    sql: &str,
    read_timeout: Option<Duration>,
) -> Result<ResultSet, QueryFailure> {
    #[allow(deprecated)]
    let stream = (&mut *conn).fetch_many(sql);
    collect_first_result(stream, read_timeout).await
}

/// Column names of a statement, from its prepared metadata.
async fn describe_columns(
    conn: &mut MySqlConnection,
    sql: &str,
    read_timeout: Option<Duration>,
) -> Result<Vec<String>, ClientError> {
    let describe = (&mut *conn).describe(sql);
    let described = within(read_timeout, "query", async move {
        describe.await.map_err(ClientError::from)
    })
    .await?;
    Ok(described
        .columns()
        .iter()
        .map(|c| c.name().to_string())
        .collect())
}

/// A sqlx session driven synchronously.
pub struct MySqlSession {
    handle: Handle,
    conn: Option<MySqlConnection>,
    /// Set once the session has observed a transport-level failure.
    lost: bool,
    escape_mode: EscapeMode,
    /// Set after a statement that may have changed `sql_mode`.
    escape_mode_stale: bool,
    server_version: Option<String>,
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
}

impl std::fmt::Debug for MySqlSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MySqlSession")
            .field("connected", &self.conn.is_some())
            .field("lost", &self.lost)
            .field("escape_mode", &self.escape_mode)
            .field("server_version", &self.server_version)
            .finish_non_exhaustive()
    }
}

impl Session for MySqlSession {
    fn is_alive(&self) -> bool {
        self.conn.is_some() && !self.lost
    }

    fn query(&mut self, sql: &[u8]) -> Result<ResultSet, QueryFailure> {
        let Ok(sql) = std::str::from_utf8(sql) else {
            return Err(QueryFailure::Rejected(ClientError::client(
                codes::ER_INVALID_CHARACTER_STRING,
                "Invalid utf8mb4 character string in query",
            )));
        };
        if self.lost {
            return Err(QueryFailure::Execute(ClientError::server_gone()));
        }
        let Some(conn) = self.conn.as_mut() else {
            return Err(QueryFailure::Execute(ClientError::server_gone()));
        };

        let read_timeout = self.read_timeout;
        let mut result = self
            .handle
            .block_on(run_statement(conn, sql, read_timeout));

        // The text protocol only carries column definitions alongside rows,
        // so an empty SELECT needs the statement's metadata to be told apart
        // from a write.
        if let Ok(set) = &mut result {
            if set.columns.is_empty() && set.rows.is_empty() && set.affected == 0 {
                match self
                    .handle
                    .block_on(describe_columns(conn, sql, read_timeout))
                {
                    Ok(columns) => set.columns = columns,
                    Err(err) => {
                        debug!(error = %err, "No column metadata for empty result");
                        if err.is_connection_lost() {
                            self.lost = true;
                        }
                    }
                }
            }
        }

        if let Err(failure) = &result {
            if failure.error().is_connection_lost() {
                self.lost = true;
            }
        }
        if sql.to_ascii_lowercase().contains("sql_mode") {
            self.escape_mode_stale = true;
        }
        result
    }

    fn escape_mode(&mut self) -> EscapeMode {
        if !self.escape_mode_stale || !self.is_alive() {
            return self.escape_mode;
        }
        let Some(conn) = self.conn.as_mut() else {
            return self.escape_mode;
        };

        let read_timeout = self.read_timeout;
        let probed = self
            .handle
            .block_on(within(read_timeout, "query", probe_session(conn)));
        match probed {
            Ok((mode, _)) => {
                self.escape_mode = mode;
                self.escape_mode_stale = false;
            }
            Err(err) => {
                warn!(error = %err, "Failed to refresh sql_mode, keeping previous escape mode");
                if err.is_connection_lost() {
                    self.lost = true;
                }
            }
        }
        self.escape_mode
    }

    fn server_version(&self) -> Option<String> {
        self.server_version.clone()
    }

    fn close(mut self: Box<Self>) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        if self.lost {
            // The socket is already unusable; skip the goodbye round trip.
            return;
        }
        let deadline = Some(self.write_timeout.unwrap_or(CLOSE_TIMEOUT));
        let closed = self.handle.block_on(within(deadline, "close", async move {
            conn.close().await.map_err(ClientError::from)
        }));
        if let Err(err) = closed {
            debug!(error = %err, "Session close reported an error");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_connect_options_from_client_options() {
        let client = ClientOptions {
            host: Some("db.internal".to_string()),
            port: Some(3307),
            user: Some("app".to_string()),
            password: Some("secret".to_string()),
            database: Some("mail".to_string()),
            ssl_mode: Some("DISABLED".to_string()),
            ..Default::default()
        };
        let options = connect_options(&client).unwrap();
        assert_eq!(options.get_host(), "db.internal");
        assert_eq!(options.get_port(), 3307);
        assert_eq!(options.get_username(), "app");
        assert_eq!(options.get_database(), Some("mail"));
        assert_eq!(options.get_charset(), "utf8mb4");
    }

    #[test]
    fn test_invalid_ssl_mode_rejected() {
        let client = ClientOptions {
            ssl_mode: Some("sometimes".to_string()),
            ..Default::default()
        };
        let err = connect_options(&client).unwrap_err();
        assert_eq!(err.errno, codes::CR_UNKNOWN_ERROR);
        assert!(err.message.contains("ssl-mode"));
    }

    #[test]
    fn test_missing_option_file_fails_connect() {
        let runtime = ClientRuntime::start(1).unwrap();
        let connector = runtime.connector();
        let profile = Profile::new("p", PathBuf::from("/nonexistent/client.cnf"));

        let err = connector.connect(&profile).err().unwrap();
        assert_eq!(err.errno, codes::CR_UNKNOWN_ERROR);
        assert!(err.message.contains("/nonexistent/client.cnf"));
        runtime.shutdown();
    }

    fn done() -> ResponseItem {
        Ok(Either::Left(MySqlQueryResult::default()))
    }

    #[test]
    fn test_read_timeout_before_response_is_execute_failure() {
        let runtime = ClientRuntime::start(1).unwrap();
        let stream = futures_util::stream::pending::<ResponseItem>();

        let failure = runtime
            .handle()
            .block_on(collect_first_result(stream, Some(Duration::from_millis(20))))
            .unwrap_err();

        assert!(matches!(failure, QueryFailure::Execute(_)));
        assert_eq!(failure.error().errno, codes::CR_SERVER_LOST);
        runtime.shutdown();
    }

    #[test]
    fn test_read_timeout_after_response_started_is_fetch_failure() {
        let runtime = ClientRuntime::start(1).unwrap();
        let stream = futures_util::stream::iter(vec![done()])
            .chain(futures_util::stream::pending());

        let failure = runtime
            .handle()
            .block_on(collect_first_result(stream, Some(Duration::from_millis(20))))
            .unwrap_err();

        assert!(matches!(failure, QueryFailure::Fetch(_)));
        assert!(!failure.is_retryable());
        runtime.shutdown();
    }

    #[test]
    fn test_read_timeout_bounds_each_read() {
        let runtime = ClientRuntime::start(1).unwrap();
        // Four items 30ms apart: 120ms in total, each read well under 80ms.
        let stream = Box::pin(futures_util::stream::unfold(0, |n| async move {
            if n == 4 {
                return None;
            }
            tokio::time::sleep(Duration::from_millis(30)).await;
            Some((done(), n + 1))
        }));

        let result = runtime
            .handle()
            .block_on(collect_first_result(stream, Some(Duration::from_millis(80))));

        assert!(result.is_ok());
        runtime.shutdown();
    }

    #[test]
    fn test_invalid_utf8_is_rejected_before_sending() {
        let runtime = ClientRuntime::start(1).unwrap();
        let mut session = MySqlSession {
            handle: runtime.handle(),
            conn: None,
            lost: false,
            escape_mode: EscapeMode::Backslash,
            escape_mode_stale: false,
            server_version: None,
            read_timeout: None,
            write_timeout: None,
        };

        let failure = session.query(b"SELECT '\xff\xfe'".as_slice()).unwrap_err();
        assert!(matches!(failure, QueryFailure::Rejected(_)));
        assert_eq!(failure.error().errno, codes::ER_INVALID_CHARACTER_STRING);
        assert!(!session.lost);
        runtime.shutdown();
    }
}
