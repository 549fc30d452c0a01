//! # Control-plane machineset replacement
//!
//! Retires a cluster's existing master machinesets and moves their replicas
//! to a single new target machineset, one node at a time.
//!
//! ## Cycle
//!
//! ```text
//!   target: N → N+1          wait Ready        health check
//!        │                       │                  │
//!        ▼                       ▼                  ▼
//!   ┌──────────┐           ┌──────────┐       ┌──────────┐
//!   │ scale up │ ────────▶ │   wait   │ ────▶ │  health  │
//!   └──────────┘           └──────────┘       └──────────┘
//!                                                   │
//!        ┌──────────────────────────────────────────┘
//!        ▼
//!   ┌──────────┐           ┌──────────┐       ┌──────────┐
//!   │scale down│ ────────▶ │  drain   │ ────▶ │  health  │
//!   └──────────┘           └──────────┘       └──────────┘
//!   source: M → M-1         wait replicas == M-1
//! ```
//!
//! ## Layers
//!
//! - [`ClusterGateway`]: the only seam that touches the cluster.
//!   [`OcGateway`] shells out to `oc`, [`InMemoryCluster`] keeps state in memory.
//! - [`PoolInventory`]: builds the ordered roster of source pools.
//! - [`ReplacementPlan`]: pure bookkeeping of target growth and source drain.
//! - [`ReplacementOrchestrator`]: the state machine that drives a run.

pub mod error;
pub mod gateway;
pub mod health;
pub mod inventory;
pub mod memory;
pub mod oc;
pub mod orchestrator;
pub mod plan;
pub mod pool;
pub mod resources;

pub use error::ReplaceError;
pub use gateway::{ClusterGateway, GatewayError};
pub use health::HealthReport;
pub use inventory::{Discovery, Exclusion, PoolFilter, PoolInventory, SkippedPool};
pub use memory::{parse_simulation, ClusterEvent, InMemoryCluster, SimulationSpec};
pub use oc::OcGateway;
pub use orchestrator::{
    CycleRecord, Outcome, Phase, Preview, ReplacementOrchestrator, RunSummary, StepRecord,
};
pub use plan::{PlannedCycle, ReplacementPlan, ReplacementRoster, Retirement, RosterEntry};
pub use pool::{NodePool, PoolRef};
pub use resources::{Condition, LabelSelector, ObjectMeta};
