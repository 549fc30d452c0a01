//! Pool inventory - builds the replacement roster from live cluster state
//!
//! Discovery runs once per run. Pools are listed in the gateway's order,
//! the target and infrastructure pools are dropped, and each remaining pool's
//! replica count is read individually. A failed read skips that pool only.

use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::error::ReplaceError;
use super::gateway::ClusterGateway;
use super::plan::ReplacementRoster;
use super::pool::{NodePool, PoolRef};
use super::resources::LabelSelector;
use crate::config::InfraSettings;

/// Why a listed pool was left out of the roster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Exclusion {
    Target,
    InfraName(String),
    InfraLabel,
    NoReplicas,
}

/// Decides which listed pools are eligible sources
#[derive(Debug, Clone)]
pub struct PoolFilter {
    target: PoolRef,
    name_patterns: Vec<Regex>,
    labels: LabelSelector,
}

impl PoolFilter {
    pub fn new(target: PoolRef, name_patterns: Vec<Regex>, labels: LabelSelector) -> Self {
        Self {
            target,
            name_patterns,
            labels,
        }
    }

    pub fn from_settings(target: PoolRef, infra: &InfraSettings) -> Result<Self, regex::Error> {
        let name_patterns = infra
            .name_patterns
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(target, name_patterns, infra.labels.clone()))
    }

    pub fn target(&self) -> &PoolRef {
        &self.target
    }

    /// `Some(reason)` when the pool must not be retired
    pub fn exclusion(&self, pool: &NodePool) -> Option<Exclusion> {
        if pool.pool.name == self.target.name {
            return Some(Exclusion::Target);
        }
        if let Some(re) = self.name_patterns.iter().find(|re| re.is_match(pool.name())) {
            return Some(Exclusion::InfraName(re.as_str().to_string()));
        }
        if self.labels.matches(&pool.labels) {
            return Some(Exclusion::InfraLabel);
        }
        None
    }
}

/// A pool dropped because its replica count could not be read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedPool {
    pub pool: PoolRef,
    pub reason: String,
}

/// Result of a discovery pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discovery {
    pub roster: ReplacementRoster,
    pub total_replicas: u32,
    pub skipped: Vec<SkippedPool>,
    pub excluded: Vec<(PoolRef, Exclusion)>,
}

/// Discovers the source pools to retire
pub struct PoolInventory {
    gateway: Arc<dyn ClusterGateway>,
    filter: PoolFilter,
}

impl PoolInventory {
    pub fn new(gateway: Arc<dyn ClusterGateway>, filter: PoolFilter) -> Self {
        Self { gateway, filter }
    }

    /// Build the roster. Fails with `NoSourcePoolsFound` when nothing is left
    /// to retire after filtering; the error carries any unreadable pools.
    pub async fn discover(&self) -> Result<Discovery, ReplaceError> {
        let pools = self.gateway.list_pools().await?;
        debug!("Listed {} pools", pools.len());

        let mut discovery = Discovery::default();

        for pool in pools {
            if let Some(reason) = self.filter.exclusion(&pool) {
                debug!(pool = %pool.pool, ?reason, "Excluding pool from roster");
                discovery.excluded.push((pool.pool, reason));
                continue;
            }

            match self.gateway.get_replica_count(&pool.pool).await {
                Ok(Some(replicas)) if replicas > 0 => {
                    info!(pool = %pool.pool, replicas, "Found source pool");
                    discovery.roster.push(pool.pool, replicas);
                }
                Ok(_) => {
                    debug!(pool = %pool.pool, "Pool has no replicas");
                    discovery.excluded.push((pool.pool, Exclusion::NoReplicas));
                }
                Err(e) => {
                    warn!(
                        pool = %pool.pool,
                        error = %e,
                        "Could not read replicas for pool, skipping"
                    );
                    discovery.skipped.push(SkippedPool {
                        pool: pool.pool,
                        reason: e.to_string(),
                    });
                }
            }
        }

        if discovery.roster.is_empty() {
            return Err(ReplaceError::NoSourcePoolsFound {
                target: self.filter.target.clone(),
                skipped: discovery.skipped,
            });
        }

        discovery.total_replicas = discovery.roster.total_replicas();
        Ok(discovery)
    }
}
