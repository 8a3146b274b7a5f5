//! Rescheduler: re-places pods displaced by a failed or removed node.

use crate::metrics;
use crate::scheduler;
use crate::state::ClusterState;
use crate::types::{Algorithm, ClusterSnapshot};
use std::sync::Arc;
use tracing::{info, warn};

pub struct Rescheduler {
    state: Arc<ClusterState>,
}

impl Rescheduler {
    pub fn new(state: Arc<ClusterState>) -> Self {
        Self { state }
    }

    /// 1. Evicts `node_id` from the map under the lock, taking its displaced
    ///    pods with it (the store deletion cascades, §4.4).
    /// 2. Re-runs `first_fit` for each displaced pod against the current
    ///    snapshot. Placement failures are logged and the pod is dropped
    ///    from the runtime view, not retried in-band (§4.4, open question in §9).
    pub async fn reschedule_from(&self, node_id: &str) {
        let displaced = self.state.evict_failed_node(node_id).await;
        let displaced = match displaced {
            Ok(pods) => pods,
            Err(err) => {
                warn!(node_id = %node_id, error = %err, "failed to evict node for reschedule");
                return;
            }
        };

        for pod in displaced {
            metrics::record_reschedule_attempt();
            let snapshot: ClusterSnapshot = self.state.snapshot().await;
            metrics::record_scheduler_invocation(Algorithm::FirstFit.as_str());
            match scheduler::place(&snapshot, &pod, Algorithm::FirstFit) {
                Some(target) => {
                    if let Err(err) = self.state.rehome_pod(&pod.pod_id, &target).await {
                        warn!(pod_id = %pod.pod_id, error = %err, "failed to rehome pod, dropping");
                        self.state.drop_pod(&pod.pod_id).await;
                    } else {
                        metrics::record_reschedule_success();
                        info!(pod_id = %pod.pod_id, node_id = %target, "pod rescheduled");
                    }
                }
                None => {
                    warn!(pod_id = %pod.pod_id, "no eligible node for displaced pod, dropping");
                    self.state.drop_pod(&pod.pod_id).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use crate::types::{Node, NodeStatus, NodeType, Pod};

    fn make_node(id: &str, cpu: i64, mem: i64) -> Node {
        Node {
            node_id: id.to_string(),
            cpu_total: cpu,
            cpu_available: cpu,
            memory_total: mem,
            memory_available: mem,
            node_type: NodeType::Balanced,
            network_group: "default".into(),
            last_heartbeat: Some(0.0),
            status: NodeStatus::Active,
            simulate_heartbeat: true,
            container_id: None,
            pods: vec![],
        }
    }

    #[tokio::test]
    async fn displaced_pod_is_rehomed_to_another_active_node() {
        let state = Arc::new(ClusterState::new(Arc::new(InMemoryStore::new()), 50, 50));
        state.upsert_node(make_node("n1", 4, 8)).await.unwrap();
        state.upsert_node(make_node("n2", 4, 8)).await.unwrap();
        state
            .place_pod(
                "n1",
                Pod {
                    pod_id: "pod_1".into(),
                    node_id: None,
                    cpu: 2,
                    memory: 4,
                    network_group: "default".into(),
                    node_affinity: None,
                },
            )
            .await
            .unwrap();
        state.update_status("n1", NodeStatus::Failed).await.unwrap();

        let rescheduler = Rescheduler::new(state.clone());
        rescheduler.reschedule_from("n1").await;

        let snap = state.snapshot().await;
        assert_eq!(snap.nodes.len(), 1);
        assert_eq!(snap.nodes[0].node_id, "n2");
        assert_eq!(snap.nodes[0].pods, vec!["pod_1".to_string()]);
    }

    #[tokio::test]
    async fn unplaceable_pod_is_dropped_not_retried() {
        let state = Arc::new(ClusterState::new(Arc::new(InMemoryStore::new()), 50, 50));
        state.upsert_node(make_node("n1", 2, 4)).await.unwrap();
        state
            .place_pod(
                "n1",
                Pod {
                    pod_id: "pod_1".into(),
                    node_id: None,
                    cpu: 2,
                    memory: 4,
                    network_group: "default".into(),
                    node_affinity: None,
                },
            )
            .await
            .unwrap();
        state.update_status("n1", NodeStatus::Failed).await.unwrap();

        let rescheduler = Rescheduler::new(state.clone());
        rescheduler.reschedule_from("n1").await;

        let snap = state.snapshot().await;
        assert!(snap.nodes.is_empty());
    }
}
