//! # Connection Pool
//!
//! Purpose: Reuse authenticated connections per endpoint to avoid repeated
//! connects and handshakes.
//!
//! ## Design Principles
//! 1. **Object Pool Pattern**: A bounded set of reusable connections per
//!    endpoint; `idle + checked out <= max_size` at all times.
//! 2. **Minimal Locking**: The mutex is held only to move idle connections and
//!    adjust the counter, never across an await.
//! 3. **Bounded Waiting**: A semaphore queues callers once the pool is at
//!    capacity; the wait ends with `PoolExhausted` after `checkout_timeout`.
//! 4. **RAII Release**: `PooledConnection` returns itself on drop, or is
//!    retired when unhealthy, including when the holder's future is cancelled.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, trace};

use rkv_common::{Command, Endpoint};

use crate::connection::{ConnectOptions, Connection};
use crate::error::{ClientError, ClientResult};
use crate::resp::RespValue;

/// Pool configuration shared by every endpoint's pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum total connections (idle + in-use) per endpoint.
    pub max_size: usize,
    /// Idle connections kept once returned; extras are closed.
    pub max_idle: usize,
    /// Bound on waiting for a free connection.
    pub checkout_timeout: Duration,
    pub connect: ConnectOptions,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            max_size: 10,
            max_idle: 10,
            checkout_timeout: Duration::from_secs(5),
            connect: ConnectOptions::default(),
        }
    }
}

/// Point-in-time counters of one endpoint's pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolStatus {
    pub endpoint: String,
    pub idle: usize,
    pub in_use: usize,
    pub max_size: usize,
}

struct PoolState {
    idle: VecDeque<Connection>,
    total: usize,
}

struct PoolInner {
    endpoint: Endpoint,
    config: Arc<PoolConfig>,
    permits: Arc<Semaphore>,
    state: Mutex<PoolState>,
    closed: AtomicBool,
}

/// Connection pool for a single endpoint.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    pub fn new(endpoint: Endpoint, config: Arc<PoolConfig>) -> Self {
        let max_size = config.max_size.max(1);
        ConnectionPool {
            inner: Arc::new(PoolInner {
                endpoint,
                permits: Arc::new(Semaphore::new(max_size)),
                state: Mutex::new(PoolState {
                    idle: VecDeque::with_capacity(config.max_idle.min(max_size)),
                    total: 0,
                }),
                config,
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Checks out a connection, opening one if none is idle.
    ///
    /// Waits while the pool is at capacity and fails with `PoolExhausted`
    /// once `checkout_timeout` elapses.
    pub async fn checkout(&self) -> ClientResult<PooledConnection> {
        let inner = &self.inner;
        if inner.closed.load(Ordering::Acquire) {
            return Err(ClientError::Closed);
        }

        let acquire = inner.permits.clone().acquire_owned();
        let permit = match tokio::time::timeout(inner.config.checkout_timeout, acquire).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(ClientError::Closed),
            Err(_) => {
                debug!(endpoint = %inner.endpoint, "checkout timed out");
                return Err(ClientError::PoolExhausted(inner.endpoint.clone()));
            }
        };

        let reservation = {
            let mut state = inner.state.lock();
            if let Some(conn) = state.idle.pop_front() {
                trace!(endpoint = %inner.endpoint, "reusing idle connection");
                return Ok(PooledConnection::new(inner.clone(), conn, permit));
            }
            if state.total >= inner.config.max_size.max(1) {
                return Err(ClientError::PoolExhausted(inner.endpoint.clone()));
            }
            state.total += 1;
            Reservation {
                pool: inner.clone(),
                armed: true,
            }
        };

        let conn = Connection::open(&inner.endpoint, &inner.config.connect).await?;
        reservation.commit();
        debug!(endpoint = %inner.endpoint, "pool grew");
        Ok(PooledConnection::new(inner.clone(), conn, permit))
    }

    /// Closes idle connections and fails all current and future checkouts.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        self.inner.permits.close();
        let mut state = self.inner.state.lock();
        let drained = state.idle.len();
        state.idle.clear();
        state.total = state.total.saturating_sub(drained);
    }

    pub fn status(&self) -> PoolStatus {
        let state = self.inner.state.lock();
        PoolStatus {
            endpoint: self.inner.endpoint.to_string(),
            idle: state.idle.len(),
            in_use: state.total - state.idle.len(),
            max_size: self.inner.config.max_size,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.inner.endpoint
    }
}

impl PoolInner {
    fn return_connection(&self, conn: Connection) {
        let mut state = self.state.lock();
        let keep = conn.is_healthy()
            && !self.closed.load(Ordering::Acquire)
            && state.idle.len() < self.config.max_idle;
        if keep {
            state.idle.push_back(conn);
        } else {
            state.total = state.total.saturating_sub(1);
            trace!(endpoint = %self.endpoint, healthy = conn.is_healthy(), "connection retired");
        }
    }

    fn release_slot(&self) {
        let mut state = self.state.lock();
        state.total = state.total.saturating_sub(1);
    }
}

// Undoes a counted-but-unopened connection if the open fails or is cancelled.
struct Reservation {
    pool: Arc<PoolInner>,
    armed: bool,
}

impl Reservation {
    fn commit(mut self) {
        self.armed = false;
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if self.armed {
            self.pool.release_slot();
        }
    }
}

/// RAII wrapper returning a connection to the pool on drop.
pub struct PooledConnection {
    pool: Arc<PoolInner>,
    conn: Option<Connection>,
    // Released after `drop` has put the connection back in the idle set.
    _permit: OwnedSemaphorePermit,
}

impl PooledConnection {
    fn new(pool: Arc<PoolInner>, conn: Connection, permit: OwnedSemaphorePermit) -> Self {
        PooledConnection {
            pool,
            conn: Some(conn),
            _permit: permit,
        }
    }

    pub async fn send_and_receive(&mut self, command: &Command) -> ClientResult<RespValue> {
        self.conn()?.send_and_receive(command).await
    }

    pub async fn send(&mut self, command: &Command) -> ClientResult<()> {
        self.conn()?.send(command).await
    }

    pub async fn receive(&mut self) -> ClientResult<RespValue> {
        self.conn()?.receive().await
    }

    fn conn(&mut self) -> ClientResult<&mut Connection> {
        self.conn
            .as_mut()
            .ok_or_else(|| ClientError::Protocol("connection already released".to_string()))
    }

    pub fn is_healthy(&self) -> bool {
        self.conn.as_ref().is_some_and(Connection::is_healthy)
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.pool.endpoint
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.return_connection(conn);
        }
    }
}

/// Per-endpoint pools, created lazily on first use.
pub struct NodePools {
    config: Arc<PoolConfig>,
    pools: RwLock<HashMap<Endpoint, ConnectionPool>>,
    closed: AtomicBool,
}

impl NodePools {
    pub fn new(config: PoolConfig) -> Self {
        NodePools {
            config: Arc::new(config),
            pools: RwLock::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Returns the pool for `endpoint`, creating it on first use.
    ///
    /// Fails with `Closed` once `close_all` has run.
    pub fn get(&self, endpoint: &Endpoint) -> ClientResult<ConnectionPool> {
        if let Some(pool) = self.pools.read().get(endpoint) {
            return Ok(pool.clone());
        }
        let mut pools = self.pools.write();
        // Checked under the write lock so a racing close_all cannot miss a pool.
        if self.closed.load(Ordering::Acquire) {
            return Err(ClientError::Closed);
        }
        Ok(pools
            .entry(endpoint.clone())
            .or_insert_with(|| ConnectionPool::new(endpoint.clone(), self.config.clone()))
            .clone())
    }

    pub async fn checkout(&self, endpoint: &Endpoint) -> ClientResult<PooledConnection> {
        self.get(endpoint)?.checkout().await
    }

    pub fn close_all(&self) {
        let mut pools = self.pools.write();
        self.closed.store(true, Ordering::Release);
        for pool in pools.drain().map(|(_, pool)| pool) {
            pool.close();
        }
    }

    /// Status of every pool, sorted by endpoint.
    pub fn statuses(&self) -> Vec<PoolStatus> {
        let mut pools: Vec<ConnectionPool> = self.pools.read().values().cloned().collect();
        pools.sort_by(|a, b| a.endpoint().cmp(b.endpoint()));
        pools.iter().map(ConnectionPool::status).collect()
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }
}
