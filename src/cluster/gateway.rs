//! Cluster gateway - the narrow capability surface the replacement run needs
//!
//! The orchestrator never talks to the cluster directly. Production code uses
//! [`OcGateway`](super::oc::OcGateway); tests and simulations use
//! [`InMemoryCluster`](super::memory::InMemoryCluster).

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use super::pool::{NodePool, PoolRef};

/// Errors surfaced by a gateway implementation
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command `{command}` failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("Failed to parse {what}: {reason}")]
    Parse { what: String, reason: String },

    #[error("Timed out after {waited:?} waiting for {what}")]
    Timeout { what: String, waited: Duration },

    #[error("Cluster is unhealthy: {0}")]
    Unhealthy(String),

    #[error("Pool not found: {0}")]
    NotFound(PoolRef),

    #[error("Manifest template error: {0}")]
    Template(String),
}

impl GatewayError {
    pub fn parse(what: impl Into<String>, reason: impl ToString) -> Self {
        Self::Parse {
            what: what.into(),
            reason: reason.to_string(),
        }
    }
}

/// Capabilities required from the cluster
#[async_trait]
pub trait ClusterGateway: Send + Sync {
    /// Render and apply the target pool manifest for a cloud type.
    /// Idempotent: re-applying an existing pool leaves its running state alone.
    async fn apply_pool_manifest(&self, cloud_type: &str) -> Result<(), GatewayError>;

    /// Current declared replica count, or `None` when unknown
    async fn get_replica_count(&self, pool: &PoolRef) -> Result<Option<u32>, GatewayError>;

    /// Request a scale to `replicas`. Asynchronous: the change is not
    /// immediately observable.
    async fn set_replica_count(&self, pool: &PoolRef, replicas: u32) -> Result<(), GatewayError>;

    /// Block until `count` nodes of `pool` with `instance_type` report Ready
    async fn wait_for_nodes_ready(
        &self,
        pool: &PoolRef,
        count: u32,
        instance_type: &str,
    ) -> Result<(), GatewayError>;

    /// Block until `pool` reports exactly `count` replicas
    async fn wait_for_replica_drain(&self, pool: &PoolRef, count: u32) -> Result<(), GatewayError>;

    /// All pools in listing order, including infrastructure and target pools
    async fn list_pools(&self) -> Result<Vec<NodePool>, GatewayError>;

    /// Cluster-wide health probe; fails with [`GatewayError::Unhealthy`]
    async fn cluster_health_check(&self) -> Result<(), GatewayError>;
}
