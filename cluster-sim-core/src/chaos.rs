//! Chaos Monkey: operator-initiated forced failure of a node.
//!
//! Does NOT invoke the AutoScaler; auto-replacement is reserved for
//! heartbeat-driven failure via HealthMonitor.

use crate::error::{ClusterError, Result};
use crate::metrics;
use crate::publisher::Publisher;
use crate::reschedule::Rescheduler;
use crate::state::ClusterState;
use crate::types::NodeStatus;
use std::sync::Arc;
use tracing::warn;

pub struct ChaosMonkey {
    state: Arc<ClusterState>,
    publisher: Arc<Publisher>,
    rescheduler: Arc<Rescheduler>,
}

impl ChaosMonkey {
    pub fn new(
        state: Arc<ClusterState>,
        publisher: Arc<Publisher>,
        rescheduler: Arc<Rescheduler>,
    ) -> Self {
        Self {
            state,
            publisher,
            rescheduler,
        }
    }

    /// Targets `node_id` if given, else a uniformly random active node.
    pub async fn strike(&self, node_id: Option<String>) -> Result<String> {
        let target = match node_id {
            Some(id) => {
                if !self.state.node_exists(&id).await {
                    return Err(ClusterError::NotFound(id));
                }
                id
            }
            None => self
                .state
                .random_active_node_id()
                .await
                .ok_or(ClusterError::NoActiveNodes)?,
        };

        self.state.update_status(&target, NodeStatus::Failed).await?;
        metrics::record_chaos_strike();
        warn!(node_id = %target, "chaos monkey marked node failed");
        self.publisher
            .broadcast_alert(format!("Node {target} failed"));
        self.rescheduler.reschedule_from(&target).await;
        Ok(target)
    }
}
