//! Error taxonomy for a replacement run
//!
//! Per-pool discovery failures are the only errors recovered locally (see
//! [`SkippedPool`](super::inventory::SkippedPool)); every variant here ends the run.

use thiserror::Error;

use super::gateway::GatewayError;
use super::inventory::SkippedPool;
use super::pool::PoolRef;

/// Fatal errors of a replacement run
#[derive(Error, Debug)]
pub enum ReplaceError {
    /// `skipped` lists pools whose replicas could not be read; when it is
    /// non-empty the roster may be empty only because of those failures.
    #[error(
        "No source pools with active replicas found (target: {target}, {unreadable} unreadable)",
        unreadable = .skipped.len()
    )]
    NoSourcePoolsFound {
        target: PoolRef,
        skipped: Vec<SkippedPool>,
    },

    #[error("Health check failed {stage}: {reason}")]
    HealthCheckFailed { stage: String, reason: String },

    #[error("Scaling {pool} to {replicas} replicas failed: {reason}")]
    ScaleCommandFailed {
        pool: PoolRef,
        replicas: u32,
        reason: String,
    },

    #[error("Wait for {what} failed: {reason}")]
    ReadinessWaitTimeout { what: String, reason: String },

    #[error("Applying manifest for cloud '{cloud_type}' failed: {reason}")]
    ManifestApplyFailed { cloud_type: String, reason: String },

    #[error("Cluster gateway error: {0}")]
    Gateway(#[from] GatewayError),
}

impl ReplaceError {
    pub fn health(stage: impl Into<String>, err: GatewayError) -> Self {
        Self::HealthCheckFailed {
            stage: stage.into(),
            reason: err.to_string(),
        }
    }

    pub fn scale(pool: &PoolRef, replicas: u32, err: GatewayError) -> Self {
        Self::ScaleCommandFailed {
            pool: pool.clone(),
            replicas,
            reason: err.to_string(),
        }
    }

    pub fn wait(what: impl Into<String>, err: GatewayError) -> Self {
        Self::ReadinessWaitTimeout {
            what: what.into(),
            reason: err.to_string(),
        }
    }

    /// Short machine-friendly name of the error class
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NoSourcePoolsFound { .. } => "NoSourcePoolsFound",
            Self::HealthCheckFailed { .. } => "HealthCheckFailed",
            Self::ScaleCommandFailed { .. } => "ScaleCommandFailed",
            Self::ReadinessWaitTimeout { .. } => "ReadinessWaitTimeout",
            Self::ManifestApplyFailed { .. } => "ManifestApplyFailed",
            Self::Gateway(_) => "GatewayError",
        }
    }
}
