//! Cluster health evaluation
//!
//! Pure functions over decoded `oc get nodes` / `oc get clusteroperators`
//! output. The gateway fetches, this module judges.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::resources::{find_condition, Condition, ObjectMeta, ResourceList};

/// A node as far as health and readiness are concerned
#[derive(Debug, Clone, Deserialize)]
pub struct NodeInfo {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub status: ConditionStatus,
}

/// A cluster operator (`config.openshift.io/v1 ClusterOperator`)
#[derive(Debug, Clone, Deserialize)]
pub struct OperatorInfo {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub status: ConditionStatus,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConditionStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl NodeInfo {
    pub fn is_ready(&self) -> bool {
        find_condition(&self.status.conditions, "Ready")
            .map(|c| c.is_true())
            .unwrap_or(false)
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.metadata.labels.get(key).map(|s| s.as_str())
    }
}

impl OperatorInfo {
    fn condition_is(&self, condition_type: &str, expected: bool) -> bool {
        find_condition(&self.status.conditions, condition_type)
            .map(|c| c.is_true() == expected)
            .unwrap_or(false)
    }

    pub fn is_available(&self) -> bool {
        self.condition_is("Available", true)
    }

    pub fn is_degraded(&self) -> bool {
        self.condition_is("Degraded", true)
    }
}

pub fn parse_nodes(json: &str) -> Result<Vec<NodeInfo>, serde_json::Error> {
    let list: ResourceList<NodeInfo> = serde_json::from_str(json)?;
    Ok(list.items)
}

pub fn parse_operators(json: &str) -> Result<Vec<OperatorInfo>, serde_json::Error> {
    let list: ResourceList<OperatorInfo> = serde_json::from_str(json)?;
    Ok(list.items)
}

/// Count Ready nodes carrying every label in `selector`
pub fn count_ready_nodes(nodes: &[NodeInfo], selector: &HashMap<String, String>) -> u32 {
    nodes
        .iter()
        .filter(|n| n.is_ready())
        .filter(|n| selector.iter().all(|(k, v)| n.label(k) == Some(v.as_str())))
        .count() as u32
}

/// Outcome of a health probe
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub nodes_checked: usize,
    pub unready_nodes: Vec<String>,
    pub unavailable_operators: Vec<String>,
    pub degraded_operators: Vec<String>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.nodes_checked > 0
            && self.unready_nodes.is_empty()
            && self.unavailable_operators.is_empty()
            && self.degraded_operators.is_empty()
    }

    /// One-line description of what is wrong
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if self.nodes_checked == 0 {
            parts.push("no nodes reported".to_string());
        }
        if !self.unready_nodes.is_empty() {
            parts.push(format!("nodes not Ready: {}", self.unready_nodes.join(", ")));
        }
        if !self.unavailable_operators.is_empty() {
            parts.push(format!(
                "operators not Available: {}",
                self.unavailable_operators.join(", ")
            ));
        }
        if !self.degraded_operators.is_empty() {
            parts.push(format!(
                "operators Degraded: {}",
                self.degraded_operators.join(", ")
            ));
        }
        if parts.is_empty() {
            "healthy".to_string()
        } else {
            parts.join("; ")
        }
    }
}

/// Judge nodes and (optionally) operators. Operators named in `ignore` are skipped.
pub fn evaluate(nodes: &[NodeInfo], operators: Option<&[OperatorInfo]>, ignore: &[String]) -> HealthReport {
    let mut report = HealthReport {
        nodes_checked: nodes.len(),
        unready_nodes: nodes
            .iter()
            .filter(|n| !n.is_ready())
            .map(|n| n.metadata.name.clone())
            .collect(),
        ..Default::default()
    };

    for op in operators.unwrap_or_default() {
        if ignore.iter().any(|i| i == &op.metadata.name) {
            continue;
        }
        if !op.is_available() {
            report.unavailable_operators.push(op.metadata.name.clone());
        }
        if op.is_degraded() {
            report.degraded_operators.push(op.metadata.name.clone());
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;

    const NODES: &str = r#"{
        "kind": "List",
        "items": [
            {"metadata": {"name": "master-0", "labels": {
                "node-role.kubernetes.io/master": "",
                "node.kubernetes.io/instance-type": "m6i.2xlarge"}},
             "status": {"conditions": [{"type": "Ready", "status": "True"}]}},
            {"metadata": {"name": "master-1", "labels": {
                "node-role.kubernetes.io/master": "",
                "node.kubernetes.io/instance-type": "m5.xlarge"}},
             "status": {"conditions": [{"type": "Ready", "status": "True"}]}},
            {"metadata": {"name": "master-2", "labels": {
                "node-role.kubernetes.io/master": "",
                "node.kubernetes.io/instance-type": "m6i.2xlarge"}},
             "status": {"conditions": [{"type": "Ready", "status": "False"}]}}
        ]
    }"#;

    const OPERATORS: &str = r#"{
        "kind": "List",
        "items": [
            {"metadata": {"name": "etcd"},
             "status": {"conditions": [
                {"type": "Available", "status": "True"},
                {"type": "Degraded", "status": "False"}]}},
            {"metadata": {"name": "kube-apiserver"},
             "status": {"conditions": [
                {"type": "Available", "status": "True"},
                {"type": "Degraded", "status": "True", "reason": "NodeInstallerDegraded"}]}},
            {"metadata": {"name": "monitoring"},
             "status": {"conditions": [{"type": "Available", "status": "False"}]}}
        ]
    }"#;

    #[test]
    fn test_count_ready_nodes_by_instance_type() {
        let nodes = parse_nodes(NODES).unwrap();
        let mut selector = HashMap::new();
        selector.insert("node-role.kubernetes.io/master".to_string(), String::new());
        selector.insert(
            "node.kubernetes.io/instance-type".to_string(),
            "m6i.2xlarge".to_string(),
        );
        assert_eq!(count_ready_nodes(&nodes, &selector), 1);
    }

    #[test]
    fn test_evaluate_reports_problems() {
        let nodes = parse_nodes(NODES).unwrap();
        let operators = parse_operators(OPERATORS).unwrap();
        let report = evaluate(&nodes, Some(&operators), &["monitoring".to_string()]);

        assert!(!report.is_healthy());
        assert_eq!(report.unready_nodes, vec!["master-2".to_string()]);
        assert_eq!(report.degraded_operators, vec!["kube-apiserver".to_string()]);
        assert!(report.unavailable_operators.is_empty());
        assert!(report.describe().contains("master-2"));
    }

    #[test]
    fn test_evaluate_nodes_only() {
        let nodes: Vec<NodeInfo> = parse_nodes(NODES)
            .unwrap()
            .into_iter()
            .filter(|n| n.is_ready())
            .collect();
        let report = evaluate(&nodes, None, &[]);
        assert!(report.is_healthy());
        assert_eq!(report.describe(), "healthy");
    }

    #[test]
    fn test_empty_cluster_is_unhealthy() {
        let report = evaluate(&[], None, &[]);
        assert!(!report.is_healthy());
        assert_eq!(report.describe(), "no nodes reported");
    }
}
