//! Tunable settings loaded from an optional YAML file
//!
//! Every field has a default so an empty (or missing) file is valid.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cluster::resources::LabelSelector;
use crate::retry::RetryConfig;

/// Label carried by control-plane nodes
pub const DEFAULT_MASTER_NODE_LABEL: &str = "node-role.kubernetes.io/master";

/// Label carrying a node's instance type
pub const DEFAULT_INSTANCE_TYPE_LABEL: &str = "node.kubernetes.io/instance-type";

/// Complete settings file structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Settings {
    #[serde(default)]
    pub infra: InfraSettings,

    #[serde(default)]
    pub waits: WaitSettings,

    #[serde(default)]
    pub retry: RetrySettings,

    #[serde(default)]
    pub health: HealthSettings,

    #[serde(default)]
    pub nodes: NodeSettings,
}

/// Rule identifying infrastructure pools, which are never retired
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct InfraSettings {
    /// Regexes matched against the pool name
    #[serde(default = "default_infra_patterns")]
    pub name_patterns: Vec<String>,

    /// Pools carrying all of these labels are infrastructure
    #[serde(default)]
    pub labels: LabelSelector,
}

impl Default for InfraSettings {
    fn default() -> Self {
        Self {
            name_patterns: default_infra_patterns(),
            labels: LabelSelector::default(),
        }
    }
}

fn default_infra_patterns() -> Vec<String> {
    vec!["infra".to_string()]
}

/// Polling and timeout policy for the blocking waits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct WaitSettings {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_wait_timeout")]
    pub ready_timeout_secs: u64,

    #[serde(default = "default_wait_timeout")]
    pub drain_timeout_secs: u64,
}

impl Default for WaitSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            ready_timeout_secs: default_wait_timeout(),
            drain_timeout_secs: default_wait_timeout(),
        }
    }
}

impl WaitSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.ready_timeout_secs)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }
}

fn default_poll_interval() -> u64 {
    15
}

fn default_wait_timeout() -> u64 {
    3600
}

/// Retry policy for transient read failures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_secs: default_max_delay_secs(),
        }
    }
}

impl RetrySettings {
    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_secs(self.max_delay_secs),
            ..RetryConfig::default()
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    500
}

fn default_max_delay_secs() -> u64 {
    10
}

/// What the cluster health probe looks at
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct HealthSettings {
    /// Also require every cluster operator to be Available and not Degraded
    #[serde(default = "default_true")]
    pub check_cluster_operators: bool,

    /// Operators excluded from the check
    #[serde(default)]
    pub ignore_operators: Vec<String>,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            check_cluster_operators: true,
            ignore_operators: Vec::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

/// Node labels used to count replacement masters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct NodeSettings {
    #[serde(default = "default_master_label")]
    pub master_label: String,

    #[serde(default = "default_instance_type_label")]
    pub instance_type_label: String,
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            master_label: default_master_label(),
            instance_type_label: default_instance_type_label(),
        }
    }
}

fn default_master_label() -> String {
    DEFAULT_MASTER_NODE_LABEL.to_string()
}

fn default_instance_type_label() -> String {
    DEFAULT_INSTANCE_TYPE_LABEL.to_string()
}

/// Parse settings from a YAML string
pub fn parse_settings(content: &str) -> Result<Settings, serde_yaml::Error> {
    if content.trim().is_empty() {
        return Ok(Settings::default());
    }
    serde_yaml::from_str(content)
}
