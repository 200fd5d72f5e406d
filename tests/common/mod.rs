//! Scripted in-process server shared by the integration tests.
//!
//! `MockServer` answers a handful of statements and can be told to refuse
//! connections, restart (invalidating every open session) or fail the next
//! statements. `MockConnector` opens `MockSession`s against it.

#![allow(dead_code)]

use mariadb_pool::ClientError;
use mariadb_pool::db::{Connector, EscapeMode, QueryFailure, Session};
use mariadb_pool::models::{Cell, Profile, ResultSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Default)]
pub struct MockServer {
    reachable: AtomicBool,
    generation: AtomicU64,
    no_backslash_escapes: AtomicBool,
    fail_next_execute: AtomicUsize,
    fail_next_fetch: AtomicUsize,
    query_delay_ms: AtomicU64,

    pub connects: AtomicUsize,
    pub failed_connects: AtomicUsize,
    pub queries: AtomicUsize,
    pub closes: AtomicUsize,
    active: AtomicUsize,
    pub max_active: AtomicUsize,
}

impl MockServer {
    pub fn new() -> Arc<Self> {
        let server = Self::default();
        server.reachable.store(true, Ordering::SeqCst);
        Arc::new(server)
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Invalidate every open session, as a server restart would.
    pub fn restart(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    pub fn set_no_backslash_escapes(&self, enabled: bool) {
        self.no_backslash_escapes.store(enabled, Ordering::SeqCst);
    }

    /// Make the next `n` statements fail before returning anything.
    pub fn fail_next_execute(&self, n: usize) {
        self.fail_next_execute.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` statements fail while reading rows.
    pub fn fail_next_fetch(&self, n: usize) {
        self.fail_next_fetch.store(n, Ordering::SeqCst);
    }

    pub fn set_query_delay(&self, delay: Duration) {
        self.query_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    fn take(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    /// Canned responses.
    fn respond(&self, sql: &str) -> Result<ResultSet, ClientError> {
        let upper = sql.trim().to_ascii_uppercase();
        if upper == "SELECT 1 AS X" {
            return Ok(rows(&["x"], vec![vec![text("1")]]));
        }
        if upper.starts_with("SELECT NULLS") {
            return Ok(rows(
                &["a", "b", "c"],
                vec![
                    vec![text("1"), None, text("")],
                    vec![Some(vec![0, 0xff, 0x10]), text("two"), None],
                ],
            ));
        }
        if upper.starts_with("SELECT CONNECTION_ID()") {
            return Ok(rows(&["id"], vec![vec![text("7")]]));
        }
        if upper.starts_with("UPDATE") {
            return Ok(ResultSet::affected(0));
        }
        if upper.starts_with("DELETE") {
            return Ok(ResultSet::affected(3));
        }
        Err(ClientError::new(
            1064,
            format!(
                "You have an error in your SQL syntax near '{}'",
                sql.chars().take(20).collect::<String>()
            ),
            "42000",
        ))
    }
}

pub fn text(s: &str) -> Cell {
    Some(s.as_bytes().to_vec())
}

pub fn rows(columns: &[&str], rows: Vec<Vec<Cell>>) -> ResultSet {
    ResultSet {
        columns: columns.iter().map(|c| c.to_string()).collect(),
        rows,
        affected: 0,
    }
}

#[derive(Debug, Clone)]
pub struct MockConnector {
    pub server: Arc<MockServer>,
}

impl MockConnector {
    pub fn new(server: Arc<MockServer>) -> Arc<Self> {
        Arc::new(Self { server })
    }
}

impl Connector for MockConnector {
    fn connect(&self, _profile: &Profile) -> Result<Box<dyn Session>, ClientError> {
        self.server.connects.fetch_add(1, Ordering::SeqCst);
        if !self.server.reachable.load(Ordering::SeqCst) {
            self.server.failed_connects.fetch_add(1, Ordering::SeqCst);
            return Err(ClientError::new(
                2002,
                "Can't connect to server on 'mock' (111)",
                "HY000",
            ));
        }
        Ok(Box::new(MockSession {
            server: Arc::clone(&self.server),
            generation: self.server.generation.load(Ordering::SeqCst),
            alive: true,
        }))
    }
}

#[derive(Debug)]
pub struct MockSession {
    server: Arc<MockServer>,
    generation: u64,
    alive: bool,
}

impl MockSession {
    fn lost(&mut self) -> ClientError {
        self.alive = false;
        ClientError::new(2013, "Lost connection to server during query", "HY000")
    }

    fn run(&mut self, sql: &[u8]) -> Result<ResultSet, QueryFailure> {
        let server = Arc::clone(&self.server);
        // Refused before anything reaches the server, like the real driver.
        let Ok(sql) = std::str::from_utf8(sql) else {
            return Err(QueryFailure::Rejected(ClientError::new(
                1300,
                "Invalid utf8mb4 character string in query",
                "HY000",
            )));
        };
        if !self.alive {
            return Err(QueryFailure::Execute(ClientError::server_gone()));
        }
        if self.generation != server.generation.load(Ordering::SeqCst) {
            self.alive = false;
            return Err(QueryFailure::Execute(ClientError::new(
                2006,
                "Server has gone away",
                "HY000",
            )));
        }
        if MockServer::take(&server.fail_next_execute) {
            return Err(QueryFailure::Execute(self.lost()));
        }

        let delay = server.query_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            std::thread::sleep(Duration::from_millis(delay));
        }

        let result = server.respond(sql).map_err(QueryFailure::Execute)?;
        if MockServer::take(&server.fail_next_fetch) {
            return Err(QueryFailure::Fetch(self.lost()));
        }
        Ok(result)
    }
}

impl Session for MockSession {
    fn is_alive(&self) -> bool {
        self.alive
    }

    fn query(&mut self, sql: &[u8]) -> Result<ResultSet, QueryFailure> {
        let server = Arc::clone(&self.server);
        server.queries.fetch_add(1, Ordering::SeqCst);
        let active = server.active.fetch_add(1, Ordering::SeqCst) + 1;
        server.max_active.fetch_max(active, Ordering::SeqCst);

        let result = self.run(sql);

        server.active.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn escape_mode(&mut self) -> EscapeMode {
        if self.server.no_backslash_escapes.load(Ordering::SeqCst) {
            EscapeMode::QuoteDoubling
        } else {
            EscapeMode::Backslash
        }
    }

    fn server_version(&self) -> Option<String> {
        Some("11.4.2-MariaDB-mock".to_string())
    }

    fn close(self: Box<Self>) {
        self.server.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// A profile against the mock server.
pub fn profile(name: &str, pool_size: usize) -> Profile {
    Profile::new(name, format!("/etc/mock/{}.cnf", name)).with_pool_size(pool_size)
}
