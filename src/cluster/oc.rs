//! `oc` CLI gateway
//!
//! Production [`ClusterGateway`] driving the OpenShift CLI. Argument building
//! and template rendering are pure functions; only [`OcGateway`] spawns
//! processes.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use regex::Regex;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::gateway::{ClusterGateway, GatewayError};
use super::health::{self, HealthReport};
use super::pool::{self, NodePool, PoolRef, POOL_KIND};
use crate::config::{manifest_template_path, HealthSettings, NodeSettings, ReplaceConfig, WaitSettings};
use crate::retry::{retry_with_backoff, RetryConfig};

/// Default CLI binary
pub const OC_BINARY: &str = "oc";

// ============================================================================
// SBIO: Pure argument builders (no I/O)
// ============================================================================

fn args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

/// `oc get machinesets -A -o json`
pub fn list_pools_args() -> Vec<String> {
    args(&["get", "machinesets", "-A", "-o", "json"])
}

/// Declared replicas: `oc get machineset <name> -n <ns> -o jsonpath={.spec.replicas}`
pub fn get_replicas_args(pool: &PoolRef) -> Vec<String> {
    args(&[
        "get",
        POOL_KIND,
        &pool.name,
        "-n",
        &pool.namespace,
        "-o",
        "jsonpath={.spec.replicas}",
    ])
}

/// Observed replicas: `... -o jsonpath={.status.replicas}`
pub fn get_status_replicas_args(pool: &PoolRef) -> Vec<String> {
    args(&[
        "get",
        POOL_KIND,
        &pool.name,
        "-n",
        &pool.namespace,
        "-o",
        "jsonpath={.status.replicas}",
    ])
}

/// Ready machines of the pool itself: `... -o jsonpath={.status.readyReplicas}`
pub fn get_ready_replicas_args(pool: &PoolRef) -> Vec<String> {
    args(&[
        "get",
        POOL_KIND,
        &pool.name,
        "-n",
        &pool.namespace,
        "-o",
        "jsonpath={.status.readyReplicas}",
    ])
}

/// `oc scale machineset <name> -n <ns> --replicas=<n>`
pub fn scale_args(pool: &PoolRef, replicas: u32) -> Vec<String> {
    vec![
        "scale".to_string(),
        POOL_KIND.to_string(),
        pool.name.clone(),
        "-n".to_string(),
        pool.namespace.clone(),
        format!("--replicas={}", replicas),
    ]
}

/// `oc get nodes -l <selector> -o json`
pub fn get_nodes_args(selector: Option<&str>) -> Vec<String> {
    let mut out = args(&["get", "nodes"]);
    if let Some(sel) = selector {
        out.push("-l".to_string());
        out.push(sel.to_string());
    }
    out.extend(args(&["-o", "json"]));
    out
}

pub fn get_operators_args() -> Vec<String> {
    args(&["get", "clusteroperators", "-o", "json"])
}

/// `oc apply -f -` (manifest piped on stdin)
pub fn apply_stdin_args() -> Vec<String> {
    args(&["apply", "-f", "-"])
}

/// Node labels a replacement master must carry
pub fn replacement_node_selector(nodes: &NodeSettings, instance_type: &str) -> HashMap<String, String> {
    let mut selector = HashMap::new();
    selector.insert(nodes.master_label.clone(), String::new());
    selector.insert(nodes.instance_type_label.clone(), instance_type.to_string());
    selector
}

/// Expand `${VAR}` / `$VAR` in a manifest template. `vars` wins over the
/// process environment; anything left unresolved is an error.
pub fn render_manifest(template: &str, vars: &HashMap<String, String>) -> Result<String, GatewayError> {
    let rendered = shellexpand::env_with_context(template, |name: &str| {
        if let Some(value) = vars.get(name) {
            return Ok(Some(value.clone()));
        }
        match std::env::var(name) {
            Ok(value) => Ok(Some(value)),
            Err(std::env::VarError::NotPresent) => Ok(None),
            Err(e) => Err(e),
        }
    })
    .map_err(|e| GatewayError::Template(e.to_string()))?;

    let unresolved = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}")
        .map_err(|e| GatewayError::Template(e.to_string()))?;
    let missing: Vec<&str> = unresolved
        .captures_iter(&rendered)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect();
    if !missing.is_empty() {
        return Err(GatewayError::Template(format!(
            "unresolved variables: {}",
            missing.join(", ")
        )));
    }

    Ok(rendered.into_owned())
}

fn is_transient(err: &GatewayError) -> bool {
    matches!(err, GatewayError::CommandFailed { .. })
}

// ============================================================================
// I/O boundary
// ============================================================================

/// Gateway backed by the `oc` binary
#[derive(Debug, Clone)]
pub struct OcGateway {
    binary: String,
    default_namespace: String,
    manifest_dir: PathBuf,
    manifest_vars: HashMap<String, String>,
    waits: WaitSettings,
    retry: RetryConfig,
    health: HealthSettings,
    nodes: NodeSettings,
}

impl OcGateway {
    pub fn from_config(config: &ReplaceConfig) -> Self {
        let mut manifest_vars = HashMap::new();
        manifest_vars.insert("CLUSTER_NAME".to_string(), config.cluster_name.clone());
        manifest_vars.insert("NEW_MASTER_INSTANCE_TYPE".to_string(), config.instance_type.clone());

        Self {
            binary: OC_BINARY.to_string(),
            default_namespace: config.target.namespace.clone(),
            manifest_dir: config.manifest_dir.clone(),
            manifest_vars,
            waits: config.settings.waits.clone(),
            retry: config.settings.retry.to_retry_config(),
            health: config.settings.health.clone(),
            nodes: config.settings.nodes.clone(),
        }
    }

    /// Use a different binary (e.g. `kubectl` or a wrapper script)
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    fn command_line(&self, args: &[String]) -> String {
        format!("{} {}", self.binary, args.join(" "))
    }

    async fn run(&self, args: &[String]) -> Result<String, GatewayError> {
        debug!("Running: {}", self.command_line(args));

        let output = Command::new(&self.binary)
            .args(args)
            .output()
            .await
            .map_err(|source| GatewayError::Spawn {
                program: self.binary.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(GatewayError::CommandFailed {
                command: self.command_line(args),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn run_with_stdin(&self, args: &[String], input: &str) -> Result<String, GatewayError> {
        debug!("Running with stdin: {}", self.command_line(args));

        let spawn_err = |source| GatewayError::Spawn {
            program: self.binary.clone(),
            source,
        };

        let mut child = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(spawn_err)?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(input.as_bytes()).await.map_err(spawn_err)?;
        }

        let output = child.wait_with_output().await.map_err(spawn_err)?;
        if !output.status.success() {
            return Err(GatewayError::CommandFailed {
                command: self.command_line(args),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// A read that may be retried on transient failure
    async fn read(&self, name: &str, args: Vec<String>) -> Result<String, GatewayError> {
        retry_with_backoff(&self.retry, name, is_transient, || self.run(&args)).await
    }

    async fn status_replicas(&self, pool: &PoolRef) -> Result<u32, GatewayError> {
        let raw = self
            .read("get_status_replicas", get_status_replicas_args(pool))
            .await?;
        let replicas = pool::parse_replica_field(&raw)
            .map_err(|e| GatewayError::parse(format!("status replicas of {}", pool), e))?;
        Ok(replicas.unwrap_or(0))
    }

    async fn pool_ready_replicas(&self, pool: &PoolRef) -> Result<u32, GatewayError> {
        let raw = self
            .read("get_ready_replicas", get_ready_replicas_args(pool))
            .await?;
        let replicas = pool::parse_replica_field(&raw)
            .map_err(|e| GatewayError::parse(format!("ready replicas of {}", pool), e))?;
        Ok(replicas.unwrap_or(0))
    }

    async fn ready_replacement_nodes(&self, instance_type: &str) -> Result<u32, GatewayError> {
        let raw = self
            .read("get_nodes", get_nodes_args(Some(&self.nodes.master_label)))
            .await?;
        let nodes = health::parse_nodes(&raw).map_err(|e| GatewayError::parse("node list", e))?;
        let selector = replacement_node_selector(&self.nodes, instance_type);
        Ok(health::count_ready_nodes(&nodes, &selector))
    }

    async fn health_report(&self) -> Result<HealthReport, GatewayError> {
        let raw = self.read("get_nodes", get_nodes_args(None)).await?;
        let nodes = health::parse_nodes(&raw).map_err(|e| GatewayError::parse("node list", e))?;

        let operators = if self.health.check_cluster_operators {
            let raw = self.read("get_clusteroperators", get_operators_args()).await?;
            Some(
                health::parse_operators(&raw)
                    .map_err(|e| GatewayError::parse("cluster operator list", e))?,
            )
        } else {
            None
        };

        Ok(health::evaluate(
            &nodes,
            operators.as_deref(),
            &self.health.ignore_operators,
        ))
    }

    /// Poll `observe` until it returns `true` or `timeout` elapses
    async fn poll_until<F, Fut>(&self, what: &str, timeout: Duration, mut observe: F) -> Result<(), GatewayError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<bool, GatewayError>>,
    {
        let started = Instant::now();
        loop {
            if observe().await? {
                debug!("{} satisfied after {:?}", what, started.elapsed());
                return Ok(());
            }
            if started.elapsed() >= timeout {
                return Err(GatewayError::Timeout {
                    what: what.to_string(),
                    waited: started.elapsed(),
                });
            }
            sleep(self.waits.poll_interval()).await;
        }
    }
}

#[async_trait]
impl ClusterGateway for OcGateway {
    async fn apply_pool_manifest(&self, cloud_type: &str) -> Result<(), GatewayError> {
        let path = manifest_template_path(&self.manifest_dir, cloud_type);
        let template = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| GatewayError::Template(format!("{}: {}", path.display(), e)))?;
        let manifest = render_manifest(&template, &self.manifest_vars)?;

        info!("Applying pool manifest {}", path.display());
        let out = self.run_with_stdin(&apply_stdin_args(), &manifest).await?;
        debug!("oc apply: {}", out.trim());
        Ok(())
    }

    async fn get_replica_count(&self, pool: &PoolRef) -> Result<Option<u32>, GatewayError> {
        let raw = self.read("get_replicas", get_replicas_args(pool)).await?;
        pool::parse_replica_field(&raw)
            .map_err(|e| GatewayError::parse(format!("replicas of {}", pool), e))
    }

    async fn set_replica_count(&self, pool: &PoolRef, replicas: u32) -> Result<(), GatewayError> {
        self.run(&scale_args(pool, replicas)).await?;
        Ok(())
    }

    async fn wait_for_nodes_ready(
        &self,
        pool: &PoolRef,
        count: u32,
        instance_type: &str,
    ) -> Result<(), GatewayError> {
        let what = format!("{} Ready {} masters from {}", count, instance_type, pool);
        info!("Waiting for {}", what);
        // Old masters may share the instance type, so the pool's own ready
        // count gates the wait as well as the node count.
        self.poll_until(&what, self.waits.ready_timeout(), move || async move {
            let pool_ready = self.pool_ready_replicas(pool).await?;
            if pool_ready < count {
                debug!(pool_ready, wanted = count, "Target pool machines not Ready yet");
                return Ok(false);
            }
            let ready = self.ready_replacement_nodes(instance_type).await?;
            debug!(pool_ready, ready, wanted = count, "Replacement masters Ready");
            Ok(ready >= count)
        })
        .await
    }

    async fn wait_for_replica_drain(&self, pool: &PoolRef, count: u32) -> Result<(), GatewayError> {
        let what = format!("{} to report {} replicas", pool, count);
        info!("Waiting for {}", what);
        self.poll_until(&what, self.waits.drain_timeout(), move || async move {
            let observed = self.status_replicas(pool).await?;
            debug!(observed, wanted = count, "Pool replicas");
            Ok(observed == count)
        })
        .await
    }

    async fn list_pools(&self) -> Result<Vec<NodePool>, GatewayError> {
        let raw = self.read("list_pools", list_pools_args()).await?;
        pool::parse_pool_list(&raw, &self.default_namespace)
            .map_err(|e| GatewayError::parse("machineset list", e))
    }

    async fn cluster_health_check(&self) -> Result<(), GatewayError> {
        let report = self.health_report().await?;
        if report.is_healthy() {
            info!(nodes = report.nodes_checked, "Cluster health check passed");
            Ok(())
        } else {
            warn!("Cluster health check failed: {}", report.describe());
            Err(GatewayError::Unhealthy(report.describe()))
        }
    }
}
