//! Shared resource types decoded from `oc ... -o json` output
//!
//! Only the fields the replacement run reads are modelled; everything else in
//! the API objects is ignored by serde.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Response for listing resources (`kind: List` or `*List`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceList<T> {
    /// Kind (e.g., "MachineSetList", "NodeList")
    #[serde(default)]
    pub kind: String,

    /// List of items
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}

impl<T> ResourceList<T> {
    /// Create a new resource list
    pub fn new(kind: impl Into<String>, items: Vec<T>) -> Self {
        Self {
            kind: kind.into(),
            items,
        }
    }
}

/// Object metadata common to every API object
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    #[serde(default)]
    pub labels: HashMap<String, String>,
}

/// A status condition (`type` / `status` pair with optional detail)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    #[serde(rename = "type")]
    pub condition_type: String,

    /// "True", "False" or "Unknown"
    pub status: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Condition {
    pub fn new(condition_type: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            condition_type: condition_type.into(),
            status: status.into(),
            reason: None,
            message: None,
        }
    }

    pub fn is_true(&self) -> bool {
        self.status == "True"
    }
}

/// Find a condition by type
pub fn find_condition<'a>(conditions: &'a [Condition], condition_type: &str) -> Option<&'a Condition> {
    conditions
        .iter()
        .find(|c| c.condition_type == condition_type)
}

/// Label selector for filtering resources
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LabelSelector {
    /// Match exact labels
    #[serde(rename = "matchLabels")]
    #[serde(default)]
    pub match_labels: HashMap<String, String>,
}

impl LabelSelector {
    /// Create a selector that matches a specific label
    pub fn matching(key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut labels = HashMap::new();
        labels.insert(key.into(), value.into());
        Self {
            match_labels: labels,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.match_labels.is_empty()
    }

    /// Check if labels match this selector. An empty selector matches nothing.
    pub fn matches(&self, labels: &HashMap<String, String>) -> bool {
        !self.is_empty()
            && self
                .match_labels
                .iter()
                .all(|(k, v)| labels.get(k) == Some(v))
    }
}
