//! AutoScaler: reactive replacement of lost capacity, plus a periodic
//! minimum-active-ratio check (§4.6).

use crate::clock::now_secs;
use crate::metrics;
use crate::runtime::NodeRuntime;
use crate::state::ClusterState;
use crate::types::{Node, NodeStatus, NodeType};
use rand::seq::SliceRandom;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

pub struct AutoScaler {
    state: Arc<ClusterState>,
    runtime: Arc<dyn NodeRuntime>,
    default_cpu: i64,
    default_memory: i64,
}

impl AutoScaler {
    pub fn new(
        state: Arc<ClusterState>,
        runtime: Arc<dyn NodeRuntime>,
        default_cpu: i64,
        default_memory: i64,
    ) -> Self {
        Self {
            state,
            runtime,
            default_cpu,
            default_memory,
        }
    }

    /// Creates one new node with default resources, a randomly chosen
    /// `node_type`, `network_group = "default"`, and self-simulated
    /// heartbeats; inserts it and asks the runtime to launch it (§4.6).
    pub async fn scale_out_now(&self, reason: String) {
        let node_id = uuid::Uuid::new_v4().to_string();
        let now = now_secs();
        let node_type = *NodeType::all().choose(&mut rand::thread_rng()).unwrap();

        let mut node = Node {
            node_id: node_id.clone(),
            cpu_total: self.default_cpu,
            cpu_available: self.default_cpu,
            memory_total: self.default_memory,
            memory_available: self.default_memory,
            node_type,
            network_group: "default".to_string(),
            last_heartbeat: Some(now),
            status: NodeStatus::Active,
            simulate_heartbeat: true,
            container_id: None,
            pods: vec![],
        };

        if let Err(err) = self.state.upsert_node(node.clone()).await {
            warn!(error = %err, "auto-scale failed to persist new node");
            return;
        }
        metrics::record_autoscale_event(&reason);
        info!(node_id = %node_id, %reason, "auto-scaled new node");
        let _ = self
            .state
            .append_event(now, format!("Auto-scaled new node {node_id}: {reason}"))
            .await;

        match self.runtime.ensure_network(&node.network_group).await {
            Ok(_) => match self.runtime.launch(&node).await {
                Ok(container_id) => {
                    node.container_id = container_id;
                    let _ = self.state.upsert_node(node).await;
                }
                Err(err) => warn!(node_id = %node_id, error = %err, "runtime unavailable, scale-out proceeds logically"),
            },
            Err(err) => warn!(node_id = %node_id, error = %err, "runtime network setup failed"),
        }
    }

    /// Periodic tick (§4.6): if fewer than half the fleet is active, triggers
    /// a reactive scale-out.
    pub async fn check_ratio_once(&self) {
        let (active, total) = self.state.node_counts().await;
        if total > 0 && active < total / 2 {
            self.scale_out_now(format!("low active node ratio: {active}/{total}"))
                .await;
        }
    }

    pub async fn run(self: Arc<Self>, interval_secs: u64, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.check_ratio_once().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("auto-scaler shutting down");
                        return;
                    }
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

    #[tokio::test]
    async fn scale_out_now_adds_exactly_one_active_node() {
        let state = Arc::new(ClusterState::new(Arc::new(InMemoryStore::new()), 50, 50));
        let autoscaler = AutoScaler::new(
            state.clone(),
            Arc::new(LoggingNodeRuntime::new()),
            8,
            16,
        );
        autoscaler.scale_out_now("test".to_string()).await;
        let (active, total) = state.node_counts().await;
        assert_eq!(active, 1);
        assert_eq!(total, 1);
    }

    #[tokio::test]
    async fn periodic_check_scales_out_when_ratio_below_half() {
        let state = Arc::new(ClusterState::new(Arc::new(InMemoryStore::new()), 50, 50));
        let autoscaler = AutoScaler::new(
            state.clone(),
            Arc::new(LoggingNodeRuntime::new()),
            8,
            16,
        );

        autoscaler.scale_out_now("seed".to_string()).await;
        let (active, total) = state.node_counts().await;
        assert_eq!((active, total), (1, 1));
        // 1 active / 1 total is not < total/2 (0), so no scale-out yet.
        autoscaler.check_ratio_once().await;
        let (_, total_after) = state.node_counts().await;
        assert_eq!(total_after, 1);
    }
}
