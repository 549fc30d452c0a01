//! In-memory cluster gateway
//!
//! Models machinesets as plain counters that converge instantly, and records
//! every call in an ordered event log. Used by the test suite and by
//! `--simulate` to rehearse a run without a cluster.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use super::gateway::{ClusterGateway, GatewayError};
use super::pool::{NodePool, PoolRef};
use crate::config::ConfigError;

/// One observed gateway call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ClusterEvent {
    Applied { cloud_type: String },
    Scaled { pool: PoolRef, replicas: u32 },
    WaitedReady { pool: PoolRef, count: u32 },
    WaitedDrain { pool: PoolRef, count: u32 },
    HealthChecked { healthy: bool },
}

#[derive(Debug, Default)]
struct ClusterState {
    pools: Vec<NodePool>,
    events: Vec<ClusterEvent>,
    manifest: Option<NodePool>,
    read_failures: HashSet<String>,
    /// One-shot: health check fails right after this (pool name, replicas) scale
    unhealthy_after_scale: Option<(String, u32)>,
    always_unhealthy: bool,
    ready_timeout_at: Option<u32>,
    /// Scale commands for these (pool name, replicas) pairs are rejected
    scale_failures: HashSet<(String, u32)>,
    /// Drain waits for these (pool name, count) pairs time out
    drain_timeouts: HashSet<(String, u32)>,
}

impl ClusterState {
    fn pool_mut(&mut self, pool: &PoolRef) -> Result<&mut NodePool, GatewayError> {
        self.pools
            .iter_mut()
            .find(|p| &p.pool == pool)
            .ok_or_else(|| GatewayError::NotFound(pool.clone()))
    }

    fn last_scale(&self) -> Option<(&PoolRef, u32)> {
        self.events.iter().rev().find_map(|e| match e {
            ClusterEvent::Scaled { pool, replicas } => Some((pool, *replicas)),
            _ => None,
        })
    }
}

/// A cluster that lives entirely in memory
#[derive(Debug, Default)]
pub struct InMemoryCluster {
    state: Mutex<ClusterState>,
}

impl InMemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pool; listing order follows insertion order
    pub fn with_pool(mut self, pool: NodePool) -> Self {
        let state = self.state.get_mut();
        let mut pool = pool;
        pool.ready_replicas = pool.replicas.unwrap_or(0);
        state.pools.push(pool);
        self
    }

    /// Pool created by `apply_pool_manifest` when it does not exist yet
    pub fn with_manifest(mut self, pool: NodePool) -> Self {
        self.state.get_mut().manifest = Some(pool);
        self
    }

    /// Replica reads for this pool fail
    pub fn with_read_failure(mut self, name: impl Into<String>) -> Self {
        self.state.get_mut().read_failures.insert(name.into());
        self
    }

    /// The first health check after scaling `name` to `replicas` fails
    pub fn with_health_failure_after_scale(mut self, name: impl Into<String>, replicas: u32) -> Self {
        self.state.get_mut().unhealthy_after_scale = Some((name.into(), replicas));
        self
    }

    /// Every health check fails
    pub fn with_unhealthy_cluster(mut self) -> Self {
        self.state.get_mut().always_unhealthy = true;
        self
    }

    /// Waiting for `count` ready nodes times out
    pub fn with_ready_timeout_at(mut self, count: u32) -> Self {
        self.state.get_mut().ready_timeout_at = Some(count);
        self
    }

    /// Scaling `name` to `replicas` is rejected by the cluster
    pub fn with_scale_failure(mut self, name: impl Into<String>, replicas: u32) -> Self {
        self.state.get_mut().scale_failures.insert((name.into(), replicas));
        self
    }

    /// Waiting for `name` to report `count` replicas times out
    pub fn with_drain_timeout_at(mut self, name: impl Into<String>, count: u32) -> Self {
        self.state.get_mut().drain_timeouts.insert((name.into(), count));
        self
    }

    /// Ordered log of every mutation, wait and health check
    pub async fn events(&self) -> Vec<ClusterEvent> {
        self.state.lock().await.events.clone()
    }

    /// Declared replicas of a pool by name
    pub async fn replicas_of(&self, name: &str) -> Option<u32> {
        let state = self.state.lock().await;
        state
            .pools
            .iter()
            .find(|p| p.name() == name)
            .and_then(|p| p.replicas)
    }

    /// Every replica count a pool was scaled to, in order
    pub async fn scale_history(&self, name: &str) -> Vec<u32> {
        let state = self.state.lock().await;
        state
            .events
            .iter()
            .filter_map(|e| match e {
                ClusterEvent::Scaled { pool, replicas } if pool.name == name => Some(*replicas),
                _ => None,
            })
            .collect()
    }

    /// Read and parse a simulation file, then build the cluster from it
    pub fn from_simulation_file(path: &Path, target: &PoolRef) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let spec = parse_simulation(&content)?;
        Ok(Self::from_simulation(&spec, target))
    }

    /// Build a cluster from a simulation file
    pub fn from_simulation(spec: &SimulationSpec, target: &PoolRef) -> Self {
        let mut cluster = Self::new();
        for sim in &spec.pools {
            let namespace = sim
                .namespace
                .clone()
                .unwrap_or_else(|| target.namespace.clone());
            let mut pool = NodePool::new(PoolRef::new(namespace, &sim.name), sim.replicas);
            pool.labels = sim.labels.clone();
            cluster = cluster.with_pool(pool);
        }
        cluster = cluster.with_manifest(NodePool::new(target.clone(), spec.target_manifest_replicas));
        for name in &spec.unreadable_pools {
            cluster = cluster.with_read_failure(name);
        }
        if let Some(fault) = &spec.unhealthy_after_scale {
            cluster = cluster.with_health_failure_after_scale(&fault.pool, fault.replicas);
        }
        cluster
    }
}

#[async_trait]
impl ClusterGateway for InMemoryCluster {
    async fn apply_pool_manifest(&self, cloud_type: &str) -> Result<(), GatewayError> {
        let mut state = self.state.lock().await;
        state.events.push(ClusterEvent::Applied {
            cloud_type: cloud_type.to_string(),
        });

        let manifest = state
            .manifest
            .clone()
            .ok_or_else(|| GatewayError::Template(format!("no manifest for cloud '{}'", cloud_type)))?;

        if !state.pools.iter().any(|p| p.pool == manifest.pool) {
            debug!(pool = %manifest.pool, "Creating pool from manifest");
            let mut pool = manifest;
            pool.ready_replicas = pool.replicas.unwrap_or(0);
            state.pools.push(pool);
        }
        Ok(())
    }

    async fn get_replica_count(&self, pool: &PoolRef) -> Result<Option<u32>, GatewayError> {
        let mut state = self.state.lock().await;
        if state.read_failures.contains(&pool.name) {
            return Err(GatewayError::CommandFailed {
                command: format!("get {}", pool.path()),
                stderr: "simulated read failure".to_string(),
            });
        }
        Ok(state.pool_mut(pool)?.replicas)
    }

    async fn set_replica_count(&self, pool: &PoolRef, replicas: u32) -> Result<(), GatewayError> {
        let mut state = self.state.lock().await;
        if state.scale_failures.contains(&(pool.name.clone(), replicas)) {
            return Err(GatewayError::CommandFailed {
                command: format!("scale {} --replicas={}", pool.path(), replicas),
                stderr: "simulated scale rejection".to_string(),
            });
        }
        let entry = state.pool_mut(pool)?;
        entry.replicas = Some(replicas);
        entry.ready_replicas = replicas;
        state.events.push(ClusterEvent::Scaled {
            pool: pool.clone(),
            replicas,
        });
        Ok(())
    }

    async fn wait_for_nodes_ready(
        &self,
        pool: &PoolRef,
        count: u32,
        _instance_type: &str,
    ) -> Result<(), GatewayError> {
        let mut state = self.state.lock().await;
        state.events.push(ClusterEvent::WaitedReady {
            pool: pool.clone(),
            count,
        });
        let ready = state.pool_mut(pool)?.ready_replicas;
        if state.ready_timeout_at == Some(count) || ready < count {
            return Err(GatewayError::Timeout {
                what: format!("{} ready nodes in {}", count, pool),
                waited: Duration::ZERO,
            });
        }
        Ok(())
    }

    async fn wait_for_replica_drain(&self, pool: &PoolRef, count: u32) -> Result<(), GatewayError> {
        let mut state = self.state.lock().await;
        state.events.push(ClusterEvent::WaitedDrain {
            pool: pool.clone(),
            count,
        });
        let replicas = state.pool_mut(pool)?.replicas.unwrap_or(0);
        if replicas != count || state.drain_timeouts.contains(&(pool.name.clone(), count)) {
            return Err(GatewayError::Timeout {
                what: format!("{} to report {} replicas", pool, count),
                waited: Duration::ZERO,
            });
        }
        Ok(())
    }

    async fn list_pools(&self) -> Result<Vec<NodePool>, GatewayError> {
        Ok(self.state.lock().await.pools.clone())
    }

    async fn cluster_health_check(&self) -> Result<(), GatewayError> {
        let mut state = self.state.lock().await;

        let tripped = match (&state.unhealthy_after_scale, state.last_scale()) {
            (Some((name, replicas)), Some((pool, scaled))) => {
                &pool.name == name && *replicas == scaled
            }
            _ => false,
        };
        if tripped {
            state.unhealthy_after_scale = None;
        }

        let healthy = !(tripped || state.always_unhealthy);
        state.events.push(ClusterEvent::HealthChecked { healthy });

        if healthy {
            Ok(())
        } else {
            Err(GatewayError::Unhealthy(
                "simulated control-plane degradation".to_string(),
            ))
        }
    }
}

// ============================================================================
// Simulation file
// ============================================================================

/// Seed for `--simulate`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SimulationSpec {
    #[serde(default)]
    pub pools: Vec<SimulatedPool>,

    /// Replicas of the target pool when the manifest creates it
    #[serde(default)]
    pub target_manifest_replicas: u32,

    #[serde(default)]
    pub unreadable_pools: Vec<String>,

    #[serde(default)]
    pub unhealthy_after_scale: Option<SimulatedFault>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatedPool {
    pub name: String,
    #[serde(default)]
    pub namespace: Option<String>,
    pub replicas: u32,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatedFault {
    pub pool: String,
    pub replicas: u32,
}

pub fn parse_simulation(content: &str) -> Result<SimulationSpec, serde_yaml::Error> {
    serde_yaml::from_str(content)
}
