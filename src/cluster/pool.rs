//! Node pool (machineset) types
//!
//! A pool is a cluster-managed group of identically configured machines with a
//! declared replica count. The replacement run deals with two roles: exactly
//! one `Target` pool being grown, and any number of `Source` pools being
//! retired.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::resources::{ObjectMeta, ResourceList};

/// Kind used on the command line for pool resources
pub const POOL_KIND: &str = "machineset";

/// Suffix appended to the cluster name to form the target pool name
pub const TARGET_POOL_SUFFIX: &str = "-master-new";

/// Identity of a pool: namespace plus name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PoolRef {
    pub namespace: String,
    pub name: String,
}

impl PoolRef {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Target pool for a cluster: `{cluster_name}-master-new`
    pub fn target_for(cluster_name: &str, namespace: impl Into<String>) -> Self {
        Self::new(namespace, format!("{}{}", cluster_name, TARGET_POOL_SUFFIX))
    }

    /// Resource path as accepted by `oc`, e.g. `machinesets/foo-master-new`
    pub fn path(&self) -> String {
        format!("{}s/{}", POOL_KIND, self.name)
    }
}

impl fmt::Display for PoolRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.path())
    }
}

/// A pool as observed in the cluster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodePool {
    pub pool: PoolRef,

    #[serde(default)]
    pub labels: HashMap<String, String>,

    /// Declared replica count (`spec.replicas`); `None` when unset
    #[serde(default)]
    pub replicas: Option<u32>,

    /// Observed ready machine count (`status.readyReplicas`)
    #[serde(default)]
    pub ready_replicas: u32,
}

impl NodePool {
    pub fn new(pool: PoolRef, replicas: u32) -> Self {
        Self {
            pool,
            labels: HashMap::new(),
            replicas: Some(replicas),
            ready_replicas: 0,
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.pool.name
    }
}

// ============================================================================
// Wire decoding of `oc get machinesets -o json`
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
struct MachineSet {
    metadata: ObjectMeta,
    #[serde(default)]
    spec: MachineSetSpec,
    #[serde(default)]
    status: MachineSetStatus,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct MachineSetSpec {
    #[serde(default)]
    replicas: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MachineSetStatus {
    #[serde(default)]
    ready_replicas: Option<u32>,
}

/// Decode a machineset list, keeping the listing order.
///
/// Items without a namespace are placed in `default_namespace`.
pub fn parse_pool_list(json: &str, default_namespace: &str) -> Result<Vec<NodePool>, serde_json::Error> {
    let list: ResourceList<MachineSet> = serde_json::from_str(json)?;
    Ok(list
        .items
        .into_iter()
        .map(|ms| NodePool {
            pool: PoolRef::new(
                ms.metadata
                    .namespace
                    .unwrap_or_else(|| default_namespace.to_string()),
                ms.metadata.name,
            ),
            labels: ms.metadata.labels,
            replicas: ms.spec.replicas,
            ready_replicas: ms.status.ready_replicas.unwrap_or(0),
        })
        .collect())
}

/// Parse the output of a `jsonpath={...replicas}` query.
///
/// An empty field means the API server omitted it.
pub fn parse_replica_field(raw: &str) -> Result<Option<u32>, std::num::ParseIntError> {
    let trimmed = raw.trim().trim_matches('\'');
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed.parse::<u32>().map(Some)
}
