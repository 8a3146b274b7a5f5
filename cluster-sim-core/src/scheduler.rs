//! The scheduler: a pure placement function over a snapshot and a pod spec (§4.2).

use crate::types::{Algorithm, ClusterSnapshot, Node, NodeStatus, Pod};

/// Returns the id of the node `pod` should be placed on, or `None` if no
/// node is eligible (the caller surfaces `NoCapacity`).
///
/// Eligibility and tie-breaking follow §4.2 exactly; `snapshot.nodes` is
/// iterated in insertion order, so `first_fit` is deterministic (P3) and
/// ties in `best_fit`/`worst_fit` resolve to the earliest-inserted node.
pub fn place(snapshot: &ClusterSnapshot, pod: &Pod, algorithm: Algorithm) -> Option<String> {
    let eligible: Vec<&Node> = snapshot
        .nodes
        .iter()
        .filter(|n| is_eligible(n, pod))
        .collect();

    match algorithm {
        Algorithm::FirstFit => eligible.first().map(|n| n.node_id.clone()),
        Algorithm::BestFit => eligible
            .into_iter()
            .min_by_key(|n| residual_slack(n, pod))
            .map(|n| n.node_id.clone()),
        Algorithm::WorstFit => eligible
            .into_iter()
            .enumerate()
            // max_by_key keeps the *last* maximal element on ties; folding the
            // index in as a reversed secondary key keeps the earliest-inserted
            // node instead, matching first_fit/best_fit's tie-breaking (§4.2).
            .max_by_key(|(i, n)| (n.cpu_available + n.memory_available, std::cmp::Reverse(*i)))
            .map(|(_, n)| n.node_id.clone()),
    }
}

pub(crate) fn is_eligible(node: &Node, pod: &Pod) -> bool {
    if node.status != NodeStatus::Active {
        return false;
    }
    if node.cpu_available < pod.cpu {
        return false;
    }
    if node.memory_available < pod.memory {
        return false;
    }
    if node.network_group != pod.network_group {
        return false;
    }
    if let Some(affinity) = pod.node_affinity {
        if node.node_type != affinity {
            return false;
        }
    }
    true
}

/// `(cpu_available - pod.cpu) + (memory_available - pod.memory)`, minimised by `best_fit`.
fn residual_slack(node: &Node, pod: &Pod) -> i64 {
    (node.cpu_available - pod.cpu) + (node.memory_available - pod.memory)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NodeType;

    fn node(id: &str, cpu: i64, mem: i64) -> Node {
        Node {
            node_id: id.to_string(),
            cpu_total: cpu,
            cpu_available: cpu,
            memory_total: mem,
            memory_available: mem,
            node_type: NodeType::Balanced,
            network_group: "default".into(),
            last_heartbeat: None,
            status: NodeStatus::Active,
            simulate_heartbeat: true,
            container_id: None,
            pods: vec![],
        }
    }

    fn pod(cpu: i64, mem: i64) -> Pod {
        Pod {
            pod_id: "pod_1".into(),
            node_id: None,
            cpu,
            memory: mem,
            network_group: "default".into(),
            node_affinity: None,
        }
    }

    fn snapshot(nodes: Vec<Node>) -> ClusterSnapshot {
        ClusterSnapshot {
            nodes,
            logs: vec![],
            history: vec![],
        }
    }

    #[test]
    fn first_fit_picks_first_eligible_in_insertion_order() {
        let snap = snapshot(vec![node("n1", 1, 1), node("n2", 8, 16)]);
        let placed = place(&snap, &pod(2, 4), Algorithm::FirstFit);
        assert_eq!(placed, Some("n2".to_string()));
    }

    #[test]
    fn best_fit_minimises_residual_slack() {
        // n1: cpu=8,mem=16 -> slack (8-2)+(16-4) = 18
        // n2: cpu=4,mem=8  -> slack (4-2)+(8-4)  = 6
        let snap = snapshot(vec![node("n1", 8, 16), node("n2", 4, 8)]);
        let placed = place(&snap, &pod(2, 4), Algorithm::BestFit);
        assert_eq!(placed, Some("n2".to_string()));
    }

    #[test]
    fn worst_fit_maximises_total_available() {
        let snap = snapshot(vec![node("n1", 8, 16), node("n2", 4, 8)]);
        let placed = place(&snap, &pod(2, 4), Algorithm::WorstFit);
        assert_eq!(placed, Some("n1".to_string()));
    }

    #[test]
    fn worst_fit_breaks_ties_in_favor_of_earliest_inserted() {
        let snap = snapshot(vec![node("n1", 8, 16), node("n2", 8, 16)]);
        let placed = place(&snap, &pod(2, 4), Algorithm::WorstFit);
        assert_eq!(placed, Some("n1".to_string()));
    }

    #[test]
    fn no_eligible_node_returns_none() {
        let snap = snapshot(vec![node("n1", 1, 1)]);
        assert_eq!(place(&snap, &pod(2, 4), Algorithm::FirstFit), None);
    }

    #[test]
    fn network_group_mismatch_is_ineligible() {
        let mut n = node("n1", 8, 16);
        n.network_group = "other".into();
        let snap = snapshot(vec![n]);
        assert_eq!(place(&snap, &pod(2, 4), Algorithm::FirstFit), None);
    }

    #[test]
    fn node_affinity_must_match_node_type() {
        let snap = snapshot(vec![node("n1", 8, 16)]);
        let mut p = pod(2, 4);
        p.node_affinity = Some(NodeType::HighCpu);
        assert_eq!(place(&snap, &p, Algorithm::FirstFit), None);

        let mut n2 = node("n2", 8, 16);
        n2.node_type = NodeType::HighCpu;
        let snap2 = snapshot(vec![n2]);
        assert_eq!(place(&snap2, &p, Algorithm::FirstFit), Some("n2".to_string()));
    }

    #[test]
    fn failed_node_is_ineligible() {
        let mut n = node("n1", 8, 16);
        n.status = NodeStatus::Failed;
        let snap = snapshot(vec![n]);
        assert_eq!(place(&snap, &pod(2, 4), Algorithm::FirstFit), None);
    }
}
