//! Core domain types: nodes, pods, and the values that travel between the
//! controller, the API surface, and the state store.

use serde::{Deserialize, Serialize};

/// Coarse hardware profile of a simulated node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    HighCpu,
    HighMem,
    Balanced,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::HighCpu => "high_cpu",
            NodeType::HighMem => "high_mem",
            NodeType::Balanced => "balanced",
        }
    }

    /// All variants, in a stable order used by the auto-scaler's random pick.
    pub fn all() -> &'static [NodeType] {
        &[NodeType::HighCpu, NodeType::HighMem, NodeType::Balanced]
    }
}

impl std::str::FromStr for NodeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "high_cpu" => Ok(NodeType::HighCpu),
            "high_mem" => Ok(NodeType::HighMem),
            "balanced" => Ok(NodeType::Balanced),
            other => Err(format!("unknown node_type: {other}")),
        }
    }
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Node lifecycle status (§4.9 state machine: active <-> failed; removal is terminal).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Active,
    Failed,
}

impl NodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeStatus::Active => "active",
            NodeStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scheduling algorithm, parsed once at the API boundary (§9: tagged variant,
/// not a dynamic dispatch on algorithm strings).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    FirstFit,
    BestFit,
    WorstFit,
}

impl Default for Algorithm {
    fn default() -> Self {
        Algorithm::FirstFit
    }
}

impl Algorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::FirstFit => "first_fit",
            Algorithm::BestFit => "best_fit",
            Algorithm::WorstFit => "worst_fit",
        }
    }
}

impl std::str::FromStr for Algorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "first_fit" => Ok(Algorithm::FirstFit),
            "best_fit" => Ok(Algorithm::BestFit),
            "worst_fit" => Ok(Algorithm::WorstFit),
            other => Err(format!("unknown scheduling_algorithm: {other}")),
        }
    }
}

/// A simulated compute node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub node_id: String,
    pub cpu_total: i64,
    pub cpu_available: i64,
    pub memory_total: i64,
    pub memory_available: i64,
    pub node_type: NodeType,
    pub network_group: String,
    /// Unix epoch seconds of the most recent heartbeat, if any.
    pub last_heartbeat: Option<f64>,
    pub status: NodeStatus,
    pub simulate_heartbeat: bool,
    pub container_id: Option<String>,
    /// Derived view, rebuilt from the pod map under the ClusterState lock.
    #[serde(default)]
    pub pods: Vec<String>,
}

impl Node {
    pub fn used_cpu(&self) -> i64 {
        self.cpu_total - self.cpu_available
    }

    pub fn used_memory(&self) -> i64 {
        self.memory_total - self.memory_available
    }
}

/// A workload unit hosted on exactly one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pod {
    pub pod_id: String,
    pub node_id: Option<String>,
    pub cpu: i64,
    pub memory: i64,
    pub network_group: String,
    pub node_affinity: Option<NodeType>,
}

/// Append-only event record, bounded in the in-memory ring (§9).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub timestamp: f64,
    pub event: String,
}

/// Append-only utilisation sample, bounded in the in-memory ring (§9).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UtilizationSample {
    pub timestamp: f64,
    pub utilization: f64,
}

/// A coherent, point-in-time view of the cluster, as returned by
/// `ClusterState::snapshot` and broadcast by the Publisher.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterSnapshot {
    pub nodes: Vec<Node>,
    pub logs: Vec<EventLogEntry>,
    pub history: Vec<UtilizationSample>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn algorithm_round_trips_through_str() {
        for algo in [Algorithm::FirstFit, Algorithm::BestFit, Algorithm::WorstFit] {
            let parsed: Algorithm = algo.as_str().parse().unwrap();
            assert_eq!(parsed, algo);
        }
    }

    #[test]
    fn node_type_round_trips_through_str() {
        for nt in NodeType::all() {
            let parsed: NodeType = nt.as_str().parse().unwrap();
            assert_eq!(parsed, *nt);
        }
    }

    #[test]
    fn unknown_algorithm_is_rejected() {
        assert!("quantum_fit".parse::<Algorithm>().is_err());
    }

    #[test]
    fn node_used_resources_are_total_minus_available() {
        let node = Node {
            node_id: "n1".into(),
            cpu_total: 8,
            cpu_available: 6,
            memory_total: 16,
            memory_available: 12,
            node_type: NodeType::Balanced,
            network_group: "default".into(),
            last_heartbeat: None,
            status: NodeStatus::Active,
            simulate_heartbeat: true,
            container_id: None,
            pods: vec![],
        };
        assert_eq!(node.used_cpu(), 2);
        assert_eq!(node.used_memory(), 4);
    }
}
