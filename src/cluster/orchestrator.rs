//! Replacement orchestrator - retires old masters one node at a time
//!
//! A run moves through `Idle → Preparing → (Cycling ⇄ Draining)* → Done`, or
//! `Aborted` on any fatal error. Each cycle grows the target pool by one,
//! waits for the new node and checks cluster health, then shrinks the earliest
//! roster pool that still has replicas by one, waits for the removal and checks
//! health again. Exactly one topology change happens between two health checks.
//!
//! Nothing runs concurrently. On abort the cluster is left exactly as the last
//! successful command left it; there is no rollback.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::error::ReplaceError;
use super::gateway::ClusterGateway;
use super::inventory::{Discovery, PoolFilter, PoolInventory, SkippedPool};
use super::plan::{ReplacementPlan, RosterEntry};
use super::pool::PoolRef;
use crate::config::{ConfigError, CycleBudget, ReplaceConfig};

/// Lifecycle phase of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Idle,
    Preparing,
    /// Scale-up half of a cycle
    Cycling,
    /// Scale-down half of a cycle
    Draining,
    Aborted,
    Done,
}

/// How a successful run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Outcome {
    /// Every planned cycle ran
    Completed,
    /// The roster ran out before the planned cycles did
    CompletedEarly,
    /// No source pools were found; nothing was scaled
    NothingToDo,
}

/// One scale command and its wait
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    pub pool: PoolRef,
    pub replicas: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl StepRecord {
    pub fn duration_secs(&self) -> i64 {
        (self.finished_at - self.started_at).num_seconds()
    }
}

/// One scale-up / scale-down pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleRecord {
    pub index: u32,
    pub scale_up: StepRecord,
    /// `None` when the roster was exhausted after the scale-up
    pub scale_down: Option<StepRecord>,
}

/// Final report of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub outcome: Outcome,
    pub target: PoolRef,
    pub target_replicas: u32,
    pub requested_replicas: u32,
    pub cycles_planned: u32,
    pub cycles: Vec<CycleRecord>,
    pub pools: Vec<RosterEntry>,
    pub skipped: Vec<SkippedPool>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunSummary {
    /// Cycles whose scale-down also completed
    pub fn cycles_completed(&self) -> usize {
        self.cycles.iter().filter(|c| c.scale_down.is_some()).count()
    }
}

/// Read-only projection used by dry runs
#[derive(Debug, Clone)]
pub struct Preview {
    pub target_replicas: Option<u32>,
    pub discovery: Discovery,
    pub plan: ReplacementPlan,
}

enum CycleEnd {
    Completed,
    RosterExhausted,
}

/// Drives a single replacement run
pub struct ReplacementOrchestrator {
    gateway: Arc<dyn ClusterGateway>,
    config: ReplaceConfig,
    inventory: PoolInventory,
    run_id: Uuid,
    phase: Phase,
    history: Vec<Phase>,
    plan: Option<ReplacementPlan>,
    cycles: Vec<CycleRecord>,
}

impl ReplacementOrchestrator {
    pub fn new(gateway: Arc<dyn ClusterGateway>, config: ReplaceConfig) -> Result<Self, ConfigError> {
        let filter = PoolFilter::from_settings(config.target.clone(), &config.settings.infra)
            .map_err(|e| ConfigError::Invalid {
                field: "infra.name-patterns",
                reason: e.to_string(),
            })?;
        let inventory = PoolInventory::new(gateway.clone(), filter);

        Ok(Self {
            gateway,
            config,
            inventory,
            run_id: Uuid::new_v4(),
            phase: Phase::Idle,
            history: vec![Phase::Idle],
            plan: None,
            cycles: Vec::new(),
        })
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Every phase entered so far, in order
    pub fn history(&self) -> &[Phase] {
        &self.history
    }

    /// The live plan; after an abort this is the last state reached
    pub fn plan(&self) -> Option<&ReplacementPlan> {
        self.plan.as_ref()
    }

    pub fn cycles(&self) -> &[CycleRecord] {
        &self.cycles
    }

    fn transition(&mut self, next: Phase) {
        if self.phase != next {
            info!(from = ?self.phase, to = ?next, "Phase transition");
        }
        self.phase = next;
        self.history.push(next);
    }

    /// Execute the whole run
    pub async fn run(&mut self) -> Result<RunSummary, ReplaceError> {
        let span = info_span!("replacement", run_id = %self.run_id, pool = %self.config.target);
        let result = self.run_inner().instrument(span).await;

        if let Err(e) = &result {
            self.transition(Phase::Aborted);
            error!(run_id = %self.run_id, kind = e.kind(), "Replacement aborted: {}", e);
            if let Some(plan) = &self.plan {
                error!(
                    target_replicas = plan.target_replicas(),
                    remaining = plan.remaining_total(),
                    "Cluster left as last scaled; inspect and resume manually"
                );
            }
        }

        result
    }

    async fn run_inner(&mut self) -> Result<RunSummary, ReplaceError> {
        let started_at = Utc::now();
        info!(
            requested = self.config.requested_replicas,
            instance_type = %self.config.instance_type,
            "Starting master replacement"
        );

        self.transition(Phase::Preparing);
        let discovery = match self.prepare().await? {
            Some(discovery) => discovery,
            None => {
                self.transition(Phase::Done);
                self.health_check("after replacement").await?;
                return Ok(self.summary(Outcome::NothingToDo, 0, Vec::new(), started_at));
            }
        };

        let mut plan = ReplacementPlan::new(self.config.target.clone(), discovery.roster.clone());
        if self.config.requested_replicas != plan.total_original() {
            warn!(
                requested = self.config.requested_replicas,
                discovered = plan.total_original(),
                budget = ?self.config.cycle_budget,
                "Requested replica count differs from discovered old masters"
            );
        }
        if self.config.cycle_budget == CycleBudget::Requested {
            plan = plan.with_cycle_count(self.config.requested_replicas);
        }
        let cycles_planned = plan.cycle_count();
        info!(cycles = cycles_planned, "Replacement plan ready");
        self.plan = Some(plan);

        let mut outcome = Outcome::Completed;
        for index in 1..=cycles_planned {
            info!("--- Replacement iteration {} of {} ---", index, cycles_planned);
            match self.cycle(index).await? {
                CycleEnd::Completed => {}
                CycleEnd::RosterExhausted => {
                    outcome = Outcome::CompletedEarly;
                    break;
                }
            }
        }

        self.transition(Phase::Done);
        info!("Master replacement process completed, running final health check");
        self.health_check("after replacement").await?;

        Ok(self.summary(outcome, cycles_planned, discovery.skipped, started_at))
    }

    /// Preparing phase. `None` means there is nothing to retire.
    async fn prepare(&mut self) -> Result<Option<Discovery>, ReplaceError> {
        self.health_check("before replacement").await?;

        let target = self.config.target.clone();
        info!(pool = %target, cloud = %self.config.cloud_type, "Applying target pool manifest");
        self.gateway
            .apply_pool_manifest(&self.config.cloud_type)
            .await
            .map_err(|e| ReplaceError::ManifestApplyFailed {
                cloud_type: self.config.cloud_type.clone(),
                reason: e.to_string(),
            })?;

        let current = match self.gateway.get_replica_count(&target).await {
            Ok(current) => current,
            Err(e) => {
                warn!(pool = %target, error = %e, "Could not read target pool replicas");
                None
            }
        };
        if current != Some(0) {
            info!(
                pool = %target,
                current = ?current,
                "Scaling target pool to 0 before one-by-one replacement"
            );
            self.gateway
                .set_replica_count(&target, 0)
                .await
                .map_err(|e| ReplaceError::scale(&target, 0, e))?;
            self.gateway
                .wait_for_replica_drain(&target, 0)
                .await
                .map_err(|e| ReplaceError::wait(format!("{} to drain to 0", target), e))?;
        }
        info!(pool = %target, "Target pool initialized with 0 replicas");

        match self.inventory.discover().await {
            Ok(discovery) => {
                info!(
                    pools = discovery.roster.len(),
                    total = discovery.total_replicas,
                    "Identified existing master pools for replacement"
                );
                Ok(Some(discovery))
            }
            Err(ReplaceError::NoSourcePoolsFound { target, skipped }) if skipped.is_empty() => {
                warn!(pool = %target, "No existing master pools with active replicas found; nothing to replace");
                Ok(None)
            }
            // unreadable pools may still hold masters
            Err(e) => Err(e),
        }
    }

    async fn cycle(&mut self, index: u32) -> Result<CycleEnd, ReplaceError> {
        let target = self.config.target.clone();
        let cycle_started = Utc::now();

        // Scale-up; the plan only moves once the scale command went through
        self.transition(Phase::Cycling);
        let Some(replicas) = self.plan.as_ref().map(|p| p.next_target_replicas()) else {
            return Ok(CycleEnd::RosterExhausted);
        };
        let started_at = Utc::now();
        info!("Start time: scaling up {} to {} at {}", target, replicas, started_at);
        self.gateway
            .set_replica_count(&target, replicas)
            .await
            .map_err(|e| ReplaceError::scale(&target, replicas, e))?;
        if let Some(plan) = self.plan.as_mut() {
            plan.advance_target();
        }
        self.gateway
            .wait_for_nodes_ready(&target, replicas, &self.config.instance_type)
            .await
            .map_err(|e| ReplaceError::wait(format!("{} Ready nodes in {}", replicas, target), e))?;
        let finished_at = Utc::now();
        info!("End time: finished scaling up {} to {} at {}", target, replicas, finished_at);
        let scale_up = StepRecord {
            pool: target,
            replicas,
            started_at,
            finished_at,
        };
        info!(cycle = index, duration_secs = scale_up.duration_secs(), "Scale-up done");
        self.health_check(&format!("after scale-up of cycle {}", index))
            .await?;

        // Scale-down
        self.transition(Phase::Draining);
        let Some(retirement) = self.plan.as_ref().and_then(|p| p.next_retirement()) else {
            warn!(
                "No more old master pools with replicas to scale down; more new masters \
                 were targeted than old ones existed"
            );
            self.cycles.push(CycleRecord {
                index,
                scale_up,
                scale_down: None,
            });
            info!(
                cycle = index,
                duration_secs = (Utc::now() - cycle_started).num_seconds(),
                "Cycle {} ended without scale-down",
                index
            );
            return Ok(CycleEnd::RosterExhausted);
        };

        let pool = retirement.pool;
        let remaining = retirement.remaining;
        let started_at = Utc::now();
        info!("Start time: scaling down {} to {} at {}", pool, remaining, started_at);
        self.gateway
            .set_replica_count(&pool, remaining)
            .await
            .map_err(|e| ReplaceError::scale(&pool, remaining, e))?;
        if let Some(plan) = self.plan.as_mut() {
            plan.retire_one();
        }
        self.gateway
            .wait_for_replica_drain(&pool, remaining)
            .await
            .map_err(|e| ReplaceError::wait(format!("{} to drain to {}", pool, remaining), e))?;
        let finished_at = Utc::now();
        info!("End time: finished scaling down {} to {} at {}", pool, remaining, finished_at);
        let scale_down = StepRecord {
            pool,
            replicas: remaining,
            started_at,
            finished_at,
        };
        info!(cycle = index, duration_secs = scale_down.duration_secs(), "Scale-down done");
        self.cycles.push(CycleRecord {
            index,
            scale_up,
            scale_down: Some(scale_down),
        });
        self.health_check(&format!("after scale-down of cycle {}", index))
            .await?;

        info!(
            cycle = index,
            duration_secs = (Utc::now() - cycle_started).num_seconds(),
            "Cycle {} of replacement finished",
            index
        );
        Ok(CycleEnd::Completed)
    }

    /// Read-only preparation: current target replicas, discovery and the
    /// projected plan. Issues no mutation.
    pub async fn preview(&self) -> Result<Preview, ReplaceError> {
        let target_replicas = match self.gateway.get_replica_count(&self.config.target).await {
            Ok(replicas) => replicas,
            Err(e) => {
                warn!(pool = %self.config.target, error = %e, "Target pool not readable");
                None
            }
        };
        let discovery = self.inventory.discover().await?;

        let mut plan = ReplacementPlan::new(self.config.target.clone(), discovery.roster.clone());
        if self.config.cycle_budget == CycleBudget::Requested {
            plan = plan.with_cycle_count(self.config.requested_replicas);
        }

        Ok(Preview {
            target_replicas,
            discovery,
            plan,
        })
    }

    async fn health_check(&self, stage: &str) -> Result<(), ReplaceError> {
        info!("Cluster health check {}", stage);
        self.gateway
            .cluster_health_check()
            .await
            .map_err(|e| ReplaceError::health(stage, e))
    }

    fn summary(
        &self,
        outcome: Outcome,
        cycles_planned: u32,
        skipped: Vec<SkippedPool>,
        started_at: DateTime<Utc>,
    ) -> RunSummary {
        let (target_replicas, pools) = self
            .plan
            .as_ref()
            .map(|p| (p.target_replicas(), p.entries().to_vec()))
            .unwrap_or_default();

        RunSummary {
            run_id: self.run_id,
            outcome,
            target: self.config.target.clone(),
            target_replicas,
            requested_replicas: self.config.requested_replicas,
            cycles_planned,
            cycles: self.cycles.clone(),
            pools,
            skipped,
            started_at,
            finished_at: Utc::now(),
        }
    }
}
