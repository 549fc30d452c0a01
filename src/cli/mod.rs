//! CLI module for masterswap
//!
//! `masterswap <cloud-type> <target-replicas> <instance-type>` replaces the
//! cluster's master machinesets with a single new one, node by node.
//! `--dry-run` prints the projected schedule, `--simulate` rehearses the run
//! against an in-memory cluster described by a YAML file.

use clap::{ArgAction, Parser, ValueEnum};
use std::path::PathBuf;

mod display;

pub use display::*;

use crate::config::{ConfigInputs, CycleBudget};

#[derive(Parser, Debug)]
#[command(name = "masterswap")]
#[command(about = "Replace control-plane machinesets one node at a time")]
#[command(version)]
pub struct Args {
    /// Cloud type; selects master-node-machineset-<cloud>.yaml
    pub cloud_type: String,

    /// Number of new master replicas to end with
    pub target_replicas: u32,

    /// Instance type for the new master nodes
    pub instance_type: String,

    /// Cluster name used to derive the target machineset name
    #[arg(long, env = "CLUSTER_NAME")]
    pub cluster_name: Option<String>,

    /// Namespace holding the machinesets
    #[arg(short, long)]
    pub namespace: Option<String>,

    /// Directory holding the machineset manifest templates
    #[arg(long, value_name = "DIR")]
    pub manifest_dir: Option<PathBuf>,

    /// How many cycles to run
    #[arg(long, value_enum, default_value_t = CycleBudget::Discovered)]
    pub cycles: CycleBudget,

    /// Path to settings file (default: ~/.masterswap/config.yaml)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Path to a .env file to load before anything else
    #[arg(long, value_name = "FILE")]
    pub env_file: Option<PathBuf>,

    /// Show the replacement schedule without changing the cluster
    #[arg(long)]
    pub dry_run: bool,

    /// Run against an in-memory cluster seeded from this YAML file
    #[arg(long, value_name = "FILE")]
    pub simulate: Option<PathBuf>,

    /// Output format for the final report
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    pub output: OutputFormat,

    /// Enable verbose logging output (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

impl Args {
    /// Tracing filter for the requested verbosity
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }

    pub fn config_inputs(&self) -> ConfigInputs {
        ConfigInputs {
            cluster_name: self.cluster_name.clone(),
            namespace: self.namespace.clone(),
            cloud_type: self.cloud_type.clone(),
            requested_replicas: self.target_replicas,
            instance_type: self.instance_type.clone(),
            manifest_dir: self.manifest_dir.clone(),
            cycle_budget: self.cycles,
        }
    }
}
