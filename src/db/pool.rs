//! Connection pool management.
//!
//! Each profile owns one [`ConnectionPool`]: a fixed set of connections
//! created up front, a FIFO queue of idle ones, a mutex and a "not empty"
//! condition. Acquire blocks until a connection is idle, then checks its
//! liveness outside the lock and repairs it if needed. Release puts it back
//! and wakes one waiter.
//!
//! `idle + checked_out == size` holds whenever the lock is not held.

use crate::db::client::Connector;
use crate::db::connection::Connection;
use crate::error::{DbError, DbResult};
use crate::models::Profile;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

struct PoolState {
    idle: VecDeque<Connection>,
    checked_out: usize,
    /// Set by [`ConnectionPool::close`]; closed pools stop repairing.
    closed: bool,
}

/// Snapshot of pool counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct PoolStats {
    /// Successful acquisitions.
    pub acquisitions: u64,
    /// Acquisitions that found the queue empty and had to wait.
    pub waits: u64,
    /// Dead connections found at acquire time.
    pub repairs: u64,
    /// Repairs whose reconnect failed.
    pub failed_repairs: u64,
    /// Bounded acquisitions that gave up.
    pub timeouts: u64,
}

#[derive(Debug, Default)]
struct AtomicPoolStats {
    acquisitions: AtomicU64,
    waits: AtomicU64,
    repairs: AtomicU64,
    failed_repairs: AtomicU64,
    timeouts: AtomicU64,
}

impl AtomicPoolStats {
    fn record(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> PoolStats {
        PoolStats {
            acquisitions: self.acquisitions.load(Ordering::Relaxed),
            waits: self.waits.load(Ordering::Relaxed),
            repairs: self.repairs.load(Ordering::Relaxed),
            failed_repairs: self.failed_repairs.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
        }
    }
}

pub struct ConnectionPool {
    profile: Arc<Profile>,
    state: Mutex<PoolState>,
    available: Condvar,
    stats: AtomicPoolStats,
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("profile", &self.profile.name)
            .field("size", &self.profile.pool_size)
            .field("idle", &self.idle_count())
            .finish_non_exhaustive()
    }
}

impl ConnectionPool {
    /// Create the pool and all of its connections.
    ///
    /// Every connection attempts to connect immediately; failures are logged
    /// and the broken connection is enqueued anyway.
    pub fn new(profile: Arc<Profile>, connector: Arc<dyn Connector>) -> Self {
        let idle: VecDeque<Connection> = (0..profile.pool_size)
            .map(|slot| Connection::open(slot, Arc::clone(&profile), Arc::clone(&connector)))
            .collect();
        let alive = idle.iter().filter(|c| c.is_alive()).count();

        info!(
            profile = %profile.name,
            pool_size = profile.pool_size,
            alive = alive,
            "Connection pool created"
        );

        Self {
            profile,
            state: Mutex::new(PoolState {
                idle,
                checked_out: 0,
                closed: false,
            }),
            available: Condvar::new(),
            stats: AtomicPoolStats::default(),
        }
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    /// Number of connections this pool will ever hold.
    pub fn size(&self) -> usize {
        self.profile.pool_size
    }

    pub fn idle_count(&self) -> usize {
        self.state.lock().idle.len()
    }

    pub fn checked_out(&self) -> usize {
        self.state.lock().checked_out
    }

    /// Idle and checked-out counts read under one lock.
    pub fn counts(&self) -> (usize, usize) {
        let state = self.state.lock();
        (state.idle.len(), state.checked_out)
    }

    pub fn stats(&self) -> PoolStats {
        self.stats.snapshot()
    }

    /// Take a connection, waiting as long as it takes.
    pub fn acquire(&self) -> PooledConnection<'_> {
        let mut state = self.state.lock();
        let mut waited = false;
        let conn = loop {
            if let Some(conn) = state.idle.pop_front() {
                break conn;
            }
            waited = true;
            self.available.wait(&mut state);
        };
        state.checked_out += 1;
        let closed = state.closed;
        drop(state);

        if waited {
            AtomicPoolStats::record(&self.stats.waits);
        }
        self.prepare(conn, closed)
    }

    /// Take a connection, giving up after `timeout`.
    pub fn acquire_timeout(&self, timeout: Duration) -> DbResult<PooledConnection<'_>> {
        let start = Instant::now();
        let deadline = start + timeout;
        let mut state = self.state.lock();
        let mut waited = false;
        let conn = loop {
            if let Some(conn) = state.idle.pop_front() {
                break conn;
            }
            if Instant::now() >= deadline {
                drop(state);
                AtomicPoolStats::record(&self.stats.timeouts);
                warn!(
                    profile = %self.profile.name,
                    timeout_ms = timeout.as_millis() as u64,
                    "Timed out waiting for a connection"
                );
                return Err(DbError::acquire_timeout(
                    &self.profile.name,
                    start.elapsed().as_millis() as u64,
                ));
            }
            waited = true;
            self.available.wait_until(&mut state, deadline);
        };
        state.checked_out += 1;
        let closed = state.closed;
        drop(state);

        if waited {
            AtomicPoolStats::record(&self.stats.waits);
        }
        Ok(self.prepare(conn, closed))
    }

    /// Take a connection honoring the profile's acquire timeout, if any.
    pub fn checkout(&self) -> DbResult<PooledConnection<'_>> {
        match self.profile.acquire_timeout {
            Some(timeout) => self.acquire_timeout(timeout),
            None => Ok(self.acquire()),
        }
    }

    /// Liveness check and repair, outside the lock.
    ///
    /// The guard exists before the repair runs, so a panicking driver still
    /// puts the connection back.
    fn prepare(&self, conn: Connection, closed: bool) -> PooledConnection<'_> {
        AtomicPoolStats::record(&self.stats.acquisitions);
        let mut guard = PooledConnection {
            pool: self,
            conn: Some(conn),
        };

        if !closed && !guard.is_alive() {
            AtomicPoolStats::record(&self.stats.repairs);
            warn!(
                profile = %self.profile.name,
                slot = guard.slot(),
                "Connection is not alive, reconnecting"
            );
            if !guard.repair() {
                AtomicPoolStats::record(&self.stats.failed_repairs);
            }
        }

        debug!(profile = %self.profile.name, slot = guard.slot(), "Connection acquired");
        guard
    }

    /// Return a connection and wake one waiter.
    fn release(&self, conn: Connection) {
        let slot = conn.slot();
        {
            let mut state = self.state.lock();
            state.idle.push_back(conn);
            state.checked_out = state.checked_out.saturating_sub(1);
        }
        self.available.notify_one();
        debug!(profile = %self.profile.name, slot = slot, "Connection released");
    }

    /// Close every idle connection. Returns how many were closed.
    ///
    /// Connections stay in the queue as Broken entries so the pool's size is
    /// unchanged; a closed pool no longer repairs them.
    pub fn close(&self) -> usize {
        let mut state = self.state.lock();
        state.closed = true;
        let mut closed = 0;
        for conn in state.idle.iter_mut() {
            if conn.is_alive() {
                closed += 1;
            }
            conn.close();
        }
        if state.checked_out > 0 {
            warn!(
                profile = %self.profile.name,
                checked_out = state.checked_out,
                "Closing pool with connections still checked out"
            );
        }
        info!(profile = %self.profile.name, closed = closed, "Connection pool closed");
        closed
    }
}

/// A connection checked out of a pool.
///
/// Dereferences to [`Connection`] and goes back to its pool when dropped, so
/// every exit path of the holder releases it exactly once.
pub struct PooledConnection<'a> {
    pool: &'a ConnectionPool,
    conn: Option<Connection>,
}

impl std::fmt::Debug for PooledConnection<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("profile", &self.pool.profile.name)
            .field("conn", &self.conn)
            .finish()
    }
}

impl PooledConnection<'_> {
    /// Return the connection to its pool now.
    pub fn release(mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn);
        }
    }
}

impl std::ops::Deref for PooledConnection<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn
            .as_ref()
            .expect("connection already returned to its pool")
    }
}

impl std::ops::DerefMut for PooledConnection<'_> {
    fn deref_mut(&mut self) -> &mut Connection {
        self.conn
            .as_mut()
            .expect("connection already returned to its pool")
    }
}

impl Drop for PooledConnection<'_> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn);
        }
    }
}
