//! HealthMonitor: periodic stale-heartbeat detection, failure marking, and
//! triggering of rescheduling + scale-out (§4.3).

use crate::autoscale::AutoScaler;
use crate::clock::now_secs;
use crate::publisher::Publisher;
use crate::reschedule::Rescheduler;
use crate::state::ClusterState;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

/// Gather-under-lock (`ClusterState::fail_stale_nodes`), act-outside-lock
/// (rescheduler + scale-out) tick, run once per `health_check_interval_secs` (§5).
pub async fn check_once(
    state: &Arc<ClusterState>,
    publisher: &Arc<Publisher>,
    rescheduler: &Arc<Rescheduler>,
    autoscaler: &Arc<AutoScaler>,
    threshold_secs: u64,
) {
    let now = now_secs();
    let failed_ids = match state.fail_stale_nodes(threshold_secs as f64, now).await {
        Ok(ids) => ids,
        Err(err) => {
            warn!(error = %err, "health check failed to mark stale nodes");
            return;
        }
    };

    for node_id in failed_ids {
        warn!(node_id = %node_id, "node failed (heartbeat stale)");
        publisher.broadcast_alert(format!("Node {node_id} failed"));
        rescheduler.reschedule_from(&node_id).await;
        autoscaler
            .scale_out_now(format!("replacing failed node {node_id}"))
            .await;
    }
}

/// Runs the HealthMonitor loop until `shutdown` is signalled.
pub async fn run(
    state: Arc<ClusterState>,
    publisher: Arc<Publisher>,
    rescheduler: Arc<Rescheduler>,
    autoscaler: Arc<AutoScaler>,
    interval_secs: u64,
    threshold_secs: u64,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
    loop {
        tokio::select! {
            _ = interval.tick() => {
                check_once(&state, &publisher, &rescheduler, &autoscaler, threshold_secs).await;
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("health monitor shutting down");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::LoggingNodeRuntime;
    use crate::store::InMemoryStore;
    use crate::types::{Node, NodeStatus, NodeType};

    fn make_node(id: &str, last_heartbeat: Option<f64>) -> Node {
        Node {
            node_id: id.to_string(),
            cpu_total: 4,
            cpu_available: 4,
            memory_total: 8,
            memory_available: 8,
            node_type: NodeType::Balanced,
            network_group: "default".into(),
            last_heartbeat,
            status: NodeStatus::Active,
            simulate_heartbeat: false,
            container_id: None,
            pods: vec![],
        }
    }

    #[tokio::test]
    async fn stale_node_is_marked_failed_and_replaced() {
        let state = Arc::new(ClusterState::new(Arc::new(InMemoryStore::new()), 50, 50));
        let publisher = Arc::new(Publisher::new(16));
        let runtime = Arc::new(LoggingNodeRuntime::new());
        let rescheduler = Arc::new(Rescheduler::new(state.clone()));
        let autoscaler = Arc::new(AutoScaler::new(state.clone(), runtime, 8, 16));

        state
            .upsert_node(make_node("n1", Some(0.0)))
            .await
            .unwrap();

        let now = now_secs();
        let failed = state.fail_stale_nodes(1.0, now + 1000.0).await.unwrap();
        assert_eq!(failed, vec!["n1".to_string()]);

        let mut rx = publisher.subscribe();
        publisher.broadcast_alert("Node n1 failed");
        let frame = rx.recv().await.unwrap();
        assert!(matches!(frame, crate::publisher::Frame::Alert { .. }));

        rescheduler.reschedule_from("n1").await;
        autoscaler.scale_out_now("test replacement".to_string()).await;
        let (_active, total) = state.node_counts().await;
        assert_eq!(total, 1, "autoscaler should have added exactly one node");
    }
}
