pub mod settings;

pub use settings::{
    parse_settings, HealthSettings, InfraSettings, NodeSettings, RetrySettings, Settings,
    WaitSettings,
};

use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cluster::PoolRef;

/// Namespace holding the cluster's machinesets
pub const DEFAULT_NAMESPACE: &str = "openshift-machine-api";

/// Directory holding `master-node-machineset-{cloud}.yaml` templates
pub const DEFAULT_MANIFEST_DIR: &str = "./replace_nodes/clouds";

/// Default settings file location: ~/.masterswap/config.yaml
pub fn default_settings_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".masterswap")
        .join("config.yaml")
}

/// Errors raised while building the run configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse settings: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Missing required value: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// How many replacement cycles to run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CycleBudget {
    /// One cycle per discovered old master
    #[default]
    Discovered,
    /// One cycle per requested target replica; stops early once the roster is exhausted
    Requested,
}

/// Fully validated configuration for one replacement run
#[derive(Debug, Clone)]
pub struct ReplaceConfig {
    pub cluster_name: String,
    pub cloud_type: String,
    /// Advisory unless `cycle_budget` is `Requested`
    pub requested_replicas: u32,
    pub instance_type: String,
    pub target: PoolRef,
    pub manifest_dir: PathBuf,
    pub cycle_budget: CycleBudget,
    pub settings: Settings,
}

/// Raw inputs gathered from the command line and environment
#[derive(Debug, Clone, Default)]
pub struct ConfigInputs {
    pub cluster_name: Option<String>,
    pub namespace: Option<String>,
    pub cloud_type: String,
    pub requested_replicas: u32,
    pub instance_type: String,
    pub manifest_dir: Option<PathBuf>,
    pub cycle_budget: CycleBudget,
}

impl ReplaceConfig {
    /// Build and validate. Fails fast on the first bad field.
    pub fn from_parts(inputs: ConfigInputs, settings: Settings) -> Result<Self, ConfigError> {
        let cluster_name = inputs
            .cluster_name
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::Missing("cluster name (CLUSTER_NAME)"))?;

        if inputs.cloud_type.trim().is_empty() {
            return Err(ConfigError::Missing("cloud type"));
        }
        if inputs.instance_type.trim().is_empty() {
            return Err(ConfigError::Missing("instance type"));
        }

        validate_settings(&settings)?;

        let namespace = inputs
            .namespace
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());
        let target = PoolRef::target_for(&cluster_name, namespace);

        Ok(Self {
            cluster_name,
            cloud_type: inputs.cloud_type.trim().to_string(),
            requested_replicas: inputs.requested_replicas,
            instance_type: inputs.instance_type.trim().to_string(),
            target,
            manifest_dir: inputs
                .manifest_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_MANIFEST_DIR)),
            cycle_budget: inputs.cycle_budget,
            settings,
        })
    }

    /// Path of the target pool manifest template for this run's cloud type
    pub fn manifest_path(&self) -> PathBuf {
        manifest_template_path(&self.manifest_dir, &self.cloud_type)
    }
}

pub fn manifest_template_path(dir: &Path, cloud_type: &str) -> PathBuf {
    dir.join(format!("master-node-machineset-{}.yaml", cloud_type))
}

/// Check settings that serde cannot check on its own
pub fn validate_settings(settings: &Settings) -> Result<(), ConfigError> {
    if settings.waits.poll_interval_secs == 0 {
        return Err(ConfigError::Invalid {
            field: "waits.poll-interval-secs",
            reason: "must be greater than zero".to_string(),
        });
    }
    if settings.waits.ready_timeout_secs == 0 || settings.waits.drain_timeout_secs == 0 {
        return Err(ConfigError::Invalid {
            field: "waits",
            reason: "timeouts must be greater than zero".to_string(),
        });
    }
    for pattern in &settings.infra.name_patterns {
        Regex::new(pattern).map_err(|e| ConfigError::Invalid {
            field: "infra.name-patterns",
            reason: e.to_string(),
        })?;
    }
    Ok(())
}

// ============================================================================
// I/O boundary
// ============================================================================

/// Load settings from an explicit path, or from the default location if present
pub fn load_settings(explicit: Option<&Path>) -> Result<Settings, ConfigError> {
    match explicit {
        Some(path) => load_settings_file(path),
        None => {
            let path = default_settings_path();
            if path.exists() {
                load_settings_file(&path)
            } else {
                Ok(Settings::default())
            }
        }
    }
}

/// Read and parse a settings file. A missing explicit file is an error.
pub fn load_settings_file(path: &Path) -> Result<Settings, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let settings = parse_settings(&content)?;
    validate_settings(&settings)?;
    Ok(settings)
}
