//! HeartbeatSimulator: periodically refreshes the heartbeat of nodes flagged
//! as self-simulating (§4.5).

use crate::clock::now_secs;
use crate::state::ClusterState;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

pub async fn tick_once(state: &Arc<ClusterState>) {
    let now = now_secs();
    if let Err(err) = state.refresh_simulated_heartbeats(now).await {
        warn!(error = %err, "heartbeat simulation tick failed");
    }
}

pub async fn run(state: Arc<ClusterState>, interval_secs: u64, mut shutdown: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
    loop {
        tokio::select! {
            _ = interval.tick() => {
                tick_once(&state).await;
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("heartbeat simulator shutting down");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use crate::types::{Node, NodeStatus, NodeType};

    #[tokio::test]
    async fn simulated_nodes_get_fresh_heartbeats() {
        let state = Arc::new(ClusterState::new(Arc::new(InMemoryStore::new()), 50, 50));
        state
            .upsert_node(Node {
                node_id: "n1".into(),
                cpu_total: 4,
                cpu_available: 4,
                memory_total: 8,
                memory_available: 8,
                node_type: NodeType::Balanced,
                network_group: "default".into(),
                last_heartbeat: None,
                status: NodeStatus::Active,
                simulate_heartbeat: true,
                container_id: None,
                pods: vec![],
            })
            .await
            .unwrap();

        tick_once(&state).await;
        let node = state.get_node("n1").await.unwrap();
        assert!(node.last_heartbeat.is_some());
    }
}
