use super::NodeRuntime;
use crate::error::Result;
use crate::types::Node;
use async_trait::async_trait;
use tracing::info;

/// No-op [`NodeRuntime`] that logs what it would have done.
#[derive(Debug, Default)]
pub struct LoggingNodeRuntime;

impl LoggingNodeRuntime {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl NodeRuntime for LoggingNodeRuntime {
    async fn ensure_network(&self, group: &str) -> Result<Option<String>> {
        let handle = format!("net_{group}");
        info!(network = %handle, "ensure_network (no-op runtime)");
        Ok(Some(handle))
    }

    async fn launch(&self, node: &Node) -> Result<Option<String>> {
        let container_id = format!("sim-{}", node.node_id);
        info!(
            node_id = %node.node_id,
            image = "node-simulator:latest",
            cpu_count = node.cpu_total,
            mem_limit = format!("{}g", node.memory_total),
            container_id = %container_id,
            "launch (no-op runtime)"
        );
        Ok(Some(container_id))
    }

    async fn stop(&self, container_id: &str) {
        info!(container_id = %container_id, "stop (no-op runtime)");
    }
}
