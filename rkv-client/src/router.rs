//! # Topology Router
//!
//! Purpose: Resolve the endpoint that owns a command's keys in cluster mode
//! and keep the slot map current.
//!
//! ## Design Principles
//! 1. **Snapshot Reads**: Readers clone an `Arc<SlotMap>` and never see a map
//!    that is half old and half new; refresh swaps the pointer whole.
//! 2. **Single Refresher**: Concurrent refresh requests for the same epoch
//!    collapse into one `CLUSTER SLOTS` round-trip.
//! 3. **Detection by Asking**: When the caller does not say whether the
//!    deployment is a cluster, the seeds' answer to `CLUSTER SLOTS` decides.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, trace, warn};

use rkv_common::{Command, Endpoint};

use crate::command::CommandInfo;
use crate::error::{ClientError, ClientResult};
use crate::pool::NodePools;
use crate::resp::RespValue;
use crate::slots::SlotMap;

/// Where a command should be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Node(Endpoint),
    /// Send to every listed master and combine the replies.
    FanOut(Vec<Endpoint>),
}

pub struct Router {
    seeds: Vec<Endpoint>,
    map: RwLock<Arc<SlotMap>>,
    epoch: AtomicU64,
    refresh_lock: tokio::sync::Mutex<()>,
}

impl Router {
    pub fn new(seeds: Vec<Endpoint>) -> Self {
        Router {
            seeds,
            map: RwLock::new(Arc::new(SlotMap::default())),
            epoch: AtomicU64::new(0),
            refresh_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn snapshot(&self) -> Arc<SlotMap> {
        self.map.read().clone()
    }

    /// Number of slot maps installed so far.
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    pub fn install(&self, map: SlotMap) {
        *self.map.write() = Arc::new(map);
        self.epoch.fetch_add(1, Ordering::AcqRel);
    }

    pub fn route(&self, info: &CommandInfo) -> ClientResult<Route> {
        let map = self.snapshot();
        if map.is_empty() {
            return Err(ClientError::Topology("slot map is empty".to_string()));
        }
        if info.fan_out {
            return Ok(Route::FanOut(map.masters()));
        }
        match info.slot()? {
            Some(slot) => {
                let owner = map.owner(slot).cloned().ok_or(ClientError::NoSlot(slot))?;
                trace!(slot, endpoint = %owner, "routed");
                Ok(Route::Node(owner))
            }
            None => map
                .masters()
                .into_iter()
                .next()
                .map(Route::Node)
                .ok_or_else(|| ClientError::Topology("no master known".to_string())),
        }
    }

    /// Refreshes unless another caller already did since `seen_epoch`.
    pub async fn refresh_if_stale(&self, pools: &NodePools, seen_epoch: u64) -> ClientResult<()> {
        let _guard = self.refresh_lock.lock().await;
        if self.epoch() != seen_epoch {
            return Ok(());
        }
        self.refresh_locked(pools).await
    }

    /// Queries known masters, then the seeds, until one answers `CLUSTER SLOTS`.
    pub async fn refresh(&self, pools: &NodePools) -> ClientResult<()> {
        let _guard = self.refresh_lock.lock().await;
        self.refresh_locked(pools).await
    }

    /// Asks each seed for `CLUSTER SLOTS` and reports whether the deployment
    /// is a cluster, installing the slot map when it is.
    ///
    /// A seed that answers with an error reply or an unusable map is a
    /// standalone server. Unreachable seeds are skipped.
    pub async fn detect(&self, pools: &NodePools) -> ClientResult<bool> {
        let _guard = self.refresh_lock.lock().await;
        let mut last_error = None;
        for seed in &self.seeds {
            match query_slots(pools, seed).await {
                Ok(map) => {
                    debug!(endpoint = %seed, ranges = map.ranges().len(), "cluster detected");
                    self.install(map);
                    return Ok(true);
                }
                Err(err @ (ClientError::Server(_) | ClientError::Topology(_))) => {
                    debug!(endpoint = %seed, reason = %err, "standalone server detected");
                    return Ok(false);
                }
                Err(err) => {
                    warn!(endpoint = %seed, error = %err, "cluster detection failed");
                    last_error = Some(err);
                }
            }
        }
        Err(last_error
            .unwrap_or_else(|| ClientError::Topology("no cluster nodes configured".to_string())))
    }

    async fn refresh_locked(&self, pools: &NodePools) -> ClientResult<()> {
        let mut candidates = self.snapshot().masters();
        for seed in &self.seeds {
            if !candidates.contains(seed) {
                candidates.push(seed.clone());
            }
        }

        let mut last_error = None;
        for endpoint in candidates {
            match query_slots(pools, &endpoint).await {
                Ok(map) => {
                    debug!(
                        endpoint = %endpoint,
                        ranges = map.ranges().len(),
                        epoch = self.epoch() + 1,
                        "slot map refreshed"
                    );
                    self.install(map);
                    return Ok(());
                }
                Err(err) => {
                    warn!(endpoint = %endpoint, error = %err, "topology query failed");
                    last_error = Some(err);
                }
            }
        }

        Err(match last_error {
            Some(err) => ClientError::Topology(format!("no node answered CLUSTER SLOTS: {err}")),
            None => ClientError::Topology("no cluster nodes configured".to_string()),
        })
    }
}

async fn query_slots(pools: &NodePools, endpoint: &Endpoint) -> ClientResult<SlotMap> {
    let mut conn = pools.checkout(endpoint).await?;
    let reply = conn
        .send_and_receive(&Command::new("CLUSTER").arg("SLOTS"))
        .await?;
    match reply {
        RespValue::Error(reply) => Err(ClientError::Server(reply)),
        reply => SlotMap::from_cluster_slots(&reply, endpoint),
    }
}
