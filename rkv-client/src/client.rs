//! # Client Engine
//!
//! Purpose: The single entry point the binding layer calls: route a command,
//! run it on a pooled connection, decode the reply, and retry what is safe
//! to retry.
//!
//! ## Design Principles
//! 1. **Facade Pattern**: `Client` hides routing, pooling and the wire codec
//!    behind `execute`.
//! 2. **Explicit State Machine**: Every call walks `retry::State`; retries
//!    always go back through endpoint resolution.
//! 3. **Cancellation Safety**: Dropping a call at any await point releases
//!    its pool reservation and retires a connection with a reply pending.
//! 4. **Cheap Clones**: `Client` is an `Arc` handle shared across tasks.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, trace, warn};

use rkv_common::{Command, ConnectionUrl, Encoding, Endpoint, ParseError};

use crate::command::CommandInfo;
use crate::connection::ConnectOptions;
use crate::decode::{decode, Value};
use crate::error::{ClientError, ClientResult};
use crate::pool::{NodePools, PoolConfig, PoolStatus};
use crate::resp::{Redirect, RespValue};
use crate::retry::{Attempts, Backoff, Decision, RetryPolicy, State};
use crate::router::{Route, Router};

/// Construction-time configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server endpoints; cluster mode treats them as discovery seeds.
    pub endpoints: Vec<Endpoint>,
    /// Maximum connections per endpoint (idle + in-use).
    pub pool_max_size: usize,
    /// Idle connections kept per endpoint.
    pub max_idle: usize,
    /// `None` asks the seeds at connect time whether they run a cluster.
    pub cluster_mode: Option<bool>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Database selected on every connection (single-node mode only).
    pub database: i64,
    /// Opaque identifier sent with `CLIENT SETNAME`.
    pub client_id: String,
    pub base_retry_delay: Duration,
    pub max_retry_delay: Duration,
    pub max_attempts: u32,
    pub max_redirects: u32,
    pub connect_timeout: Duration,
    pub checkout_timeout: Duration,
    /// Deadline for non-blocking commands when the call sets none.
    pub command_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            endpoints: vec![Endpoint::default()],
            pool_max_size: 10,
            max_idle: 10,
            cluster_mode: None,
            username: None,
            password: None,
            database: 0,
            client_id: String::new(),
            base_retry_delay: Duration::from_millis(10),
            max_retry_delay: Duration::from_secs(1),
            max_attempts: 4,
            max_redirects: 5,
            connect_timeout: Duration::from_secs(5),
            checkout_timeout: Duration::from_secs(5),
            command_timeout: None,
        }
    }
}

impl ClientConfig {
    /// Builds a configuration from `redis://` URLs or `host:port` strings.
    ///
    /// Credentials and database come from the first URL that carries them.
    pub fn from_urls<I, S>(urls: I) -> ClientResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut config = ClientConfig {
            endpoints: Vec::new(),
            ..ClientConfig::default()
        };
        for url in urls {
            let url: ConnectionUrl = url.as_ref().parse()?;
            if config.username.is_none() {
                config.username = url.username;
            }
            if config.password.is_none() {
                config.password = url.password;
            }
            if let (0, Some(database)) = (config.database, url.database) {
                config.database = database;
            }
            config.endpoints.push(url.endpoint);
        }
        if config.endpoints.is_empty() {
            return Err(ParseError::Endpoint("no endpoints given".to_string()).into());
        }
        Ok(config)
    }

    fn connect_options(&self, cluster: bool) -> ConnectOptions {
        ConnectOptions {
            username: self.username.clone(),
            password: self.password.clone(),
            // Cluster nodes only serve database 0.
            database: if cluster { 0 } else { self.database },
            client_id: self.client_id.clone(),
            connect_timeout: self.connect_timeout,
        }
    }

    fn node_pools(&self, cluster: bool) -> NodePools {
        NodePools::new(PoolConfig {
            max_size: self.pool_max_size,
            max_idle: self.max_idle,
            checkout_timeout: self.checkout_timeout,
            connect: self.connect_options(cluster),
        })
    }
}

/// Per-call options.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecOptions {
    /// Deadline for the whole call, retries included.
    pub timeout: Option<Duration>,
    /// Allow replaying a non-read-only command whose reply was lost.
    pub retry_unsafe: bool,
}

/// Diagnostic snapshot of a client.
#[derive(Debug, Clone, Serialize)]
pub struct ClientStatus {
    pub cluster_mode: bool,
    pub initial_nodes: Vec<String>,
    pub max_pool_size: usize,
    pub username: Option<String>,
    pub auth_configured: bool,
    pub closed: bool,
    /// Slot map generation; zero outside cluster mode.
    pub topology_epoch: u64,
    pub pools: Vec<PoolStatus>,
}

struct ClientInner {
    config: ClientConfig,
    /// Whether the client runs in cluster mode, after any detection.
    cluster: bool,
    pools: NodePools,
    router: Option<Router>,
    policy: RetryPolicy,
    closed: AtomicBool,
}

/// Pooled, optionally cluster-aware client.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    /// Creates a client. In cluster mode the slot map is loaded before this
    /// returns. With `cluster_mode` unset the seeds are asked first; an
    /// explicit single-node client opens its connections lazily.
    pub async fn connect(config: ClientConfig) -> ClientResult<Self> {
        if config.endpoints.is_empty() {
            return Err(ParseError::Endpoint("no endpoints given".to_string()).into());
        }

        let router = Router::new(config.endpoints.clone());
        let (cluster, pools) = match config.cluster_mode {
            Some(false) => (false, config.node_pools(false)),
            Some(true) => {
                let pools = config.node_pools(true);
                router.refresh(&pools).await?;
                (true, pools)
            }
            None => {
                let pools = config.node_pools(true);
                if router.detect(&pools).await? {
                    (true, pools)
                } else {
                    // Detection connected without SELECT; reopen with the configured database.
                    pools.close_all();
                    (false, config.node_pools(false))
                }
            }
        };
        let router = cluster.then_some(router);
        let policy = RetryPolicy {
            backoff: Backoff {
                base: config.base_retry_delay,
                max: config.max_retry_delay,
            },
            max_attempts: config.max_attempts.max(1),
            max_redirects: config.max_redirects,
            cluster_mode: cluster,
        };

        debug!(
            endpoints = config.endpoints.len(),
            cluster,
            detected = config.cluster_mode.is_none(),
            "client ready"
        );
        Ok(Client {
            inner: Arc::new(ClientInner {
                config,
                cluster,
                pools,
                router,
                policy,
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// Runs `command` and decodes its reply with `encoding`.
    pub async fn execute(&self, command: &Command, encoding: Encoding) -> ClientResult<Value> {
        self.execute_with(command, encoding, ExecOptions::default())
            .await
    }

    pub async fn execute_with(
        &self,
        command: &Command,
        encoding: Encoding,
        options: ExecOptions,
    ) -> ClientResult<Value> {
        if self.is_closed() {
            return Err(ClientError::Closed);
        }
        if command.is_empty() {
            return Err(ClientError::InvalidCommand("empty command".to_string()));
        }

        let info = CommandInfo::of(command);
        // Blocking commands are exempt from the engine-wide deadline only.
        let deadline = options.timeout.or(if info.blocking {
            None
        } else {
            self.inner.config.command_timeout
        });

        let call = self.run(command, &info, encoding, options);
        match deadline {
            Some(deadline) => tokio::time::timeout(deadline, call)
                .await
                .map_err(|_| ClientError::Timeout)?,
            None => call.await,
        }
    }

    /// Like `execute_with`, but fails with `Cancelled` as soon as `signal`
    /// completes.
    pub async fn execute_cancellable<F>(
        &self,
        command: &Command,
        encoding: Encoding,
        options: ExecOptions,
        signal: F,
    ) -> ClientResult<Value>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            biased;
            _ = signal => Err(ClientError::Cancelled),
            result = self.execute_with(command, encoding, options) => result,
        }
    }

    async fn run(
        &self,
        command: &Command,
        info: &CommandInfo,
        encoding: Encoding,
        options: ExecOptions,
    ) -> ClientResult<Value> {
        let mut attempts = Attempts::default();
        let mut redirect: Option<Redirect> = None;

        loop {
            if self.is_closed() {
                return Err(ClientError::Closed);
            }
            let epoch = self.inner.router.as_ref().map_or(0, Router::epoch);
            let mut state = State::Resolving;
            let err = match self
                .attempt(command, info, encoding, redirect.take(), &mut state)
                .await
            {
                Ok(value) => {
                    trace!(state = ?State::Done, "call complete");
                    return Ok(value);
                }
                Err(err) => err,
            };

            let replay_safe = !state.may_have_sent() || info.read_only || options.retry_unsafe;
            match self.inner.policy.decide(&err, &mut attempts, replay_safe) {
                Decision::Fail => {
                    debug!(
                        state = ?state,
                        attempt = attempts.failures,
                        error = %err,
                        "call failed"
                    );
                    return Err(err);
                }
                Decision::Redirect => {
                    let target = match err {
                        ClientError::Redirect(target) => target,
                        other => return Err(other),
                    };
                    debug!(redirect = %target, "following redirect");
                    if let Redirect::Moved { .. } = target {
                        self.refresh_topology(epoch).await;
                    }
                    redirect = Some(target);
                }
                Decision::Retry { delay, refresh } => {
                    debug!(
                        state = ?State::Retrying,
                        attempt = attempts.failures,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying"
                    );
                    if refresh {
                        self.refresh_topology(epoch).await;
                    }
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn attempt(
        &self,
        command: &Command,
        info: &CommandInfo,
        encoding: Encoding,
        redirect: Option<Redirect>,
        state: &mut State,
    ) -> ClientResult<Value> {
        *state = State::Resolving;
        let route = match &redirect {
            Some(target) => Route::Node(target.endpoint().clone()),
            None => self.resolve(info)?,
        };

        let reply = match route {
            Route::Node(endpoint) => {
                let asking = matches!(redirect, Some(Redirect::Ask { .. }));
                self.exchange(&endpoint, command, asking, state).await?
            }
            Route::FanOut(endpoints) => self.fan_out(&endpoints, command, state).await?,
        };

        *state = State::Decoding;
        if let RespValue::Error(reply) = &reply {
            if self.inner.router.is_some() {
                if let Some(target) = reply.redirect() {
                    return Err(ClientError::Redirect(target));
                }
            }
        }
        decode(reply, encoding)
    }

    fn resolve(&self, info: &CommandInfo) -> ClientResult<Route> {
        match &self.inner.router {
            Some(router) => router.route(info),
            None => self
                .inner
                .config
                .endpoints
                .first()
                .cloned()
                .map(Route::Node)
                .ok_or_else(|| ClientError::Topology("no endpoint configured".to_string())),
        }
    }

    async fn exchange(
        &self,
        endpoint: &Endpoint,
        command: &Command,
        asking: bool,
        state: &mut State,
    ) -> ClientResult<RespValue> {
        *state = State::Acquiring;
        let mut conn = self.inner.pools.checkout(endpoint).await?;

        if asking {
            if let RespValue::Error(reply) = conn.send_and_receive(&Command::new("ASKING")).await? {
                return Err(ClientError::Server(reply));
            }
        }

        *state = State::Sending;
        conn.send(command).await?;
        *state = State::Waiting;
        conn.receive().await
    }

    // Sends to every master in turn and keys the replies by node address.
    async fn fan_out(
        &self,
        endpoints: &[Endpoint],
        command: &Command,
        state: &mut State,
    ) -> ClientResult<RespValue> {
        let mut replies = Vec::with_capacity(endpoints.len());
        for endpoint in endpoints {
            let reply = self.exchange(endpoint, command, false, state).await?;
            if let RespValue::Error(reply) = reply {
                return Err(ClientError::Server(reply));
            }
            replies.push((RespValue::Bulk(endpoint.to_string().into_bytes()), reply));
        }
        Ok(RespValue::Map(replies))
    }

    async fn refresh_topology(&self, seen_epoch: u64) {
        let Some(router) = &self.inner.router else {
            return;
        };
        if let Err(err) = router.refresh_if_stale(&self.inner.pools, seen_epoch).await {
            warn!(error = %err, "topology refresh failed");
        }
    }

    /// Closes every pooled connection; later calls fail with `Closed`.
    pub fn close(&self) {
        if !self.inner.closed.swap(true, Ordering::AcqRel) {
            self.inner.pools.close_all();
            debug!("client closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    pub fn status(&self) -> ClientStatus {
        let config = &self.inner.config;
        ClientStatus {
            cluster_mode: self.inner.cluster,
            initial_nodes: config.endpoints.iter().map(Endpoint::to_string).collect(),
            max_pool_size: config.pool_max_size,
            username: config.username.clone(),
            auth_configured: config.password.is_some(),
            closed: self.is_closed(),
            topology_epoch: self.inner.router.as_ref().map_or(0, Router::epoch),
            pools: self.inner.pools.statuses(),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }
}
