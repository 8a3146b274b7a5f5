//! In-process StateStore adapter: no external dependency, used by default
//! and by the test suite.

use super::StateStore;
use crate::error::Result;
use crate::types::{EventLogEntry, Node, Pod, UtilizationSample};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Default)]
struct Inner {
    nodes: HashMap<String, Node>,
    pods: HashMap<String, Pod>,
    events: Vec<EventLogEntry>,
    utilization: Vec<UtilizationSample>,
}

/// In-memory implementation of [`StateStore`].
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StateStore for InMemoryStore {
    async fn upsert_node(&self, node: &Node) -> Result<()> {
        self.inner
            .lock()
            .nodes
            .insert(node.node_id.clone(), node.clone());
        Ok(())
    }

    async fn delete_node(&self, node_id: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.nodes.remove(node_id);
        inner.pods.retain(|_, p| p.node_id.as_deref() != Some(node_id));
        Ok(())
    }

    async fn upsert_pod(&self, pod: &Pod) -> Result<()> {
        self.inner.lock().pods.insert(pod.pod_id.clone(), pod.clone());
        Ok(())
    }

    async fn update_pod_node(&self, pod_id: &str, node_id: Option<&str>) -> Result<()> {
        if let Some(pod) = self.inner.lock().pods.get_mut(pod_id) {
            pod.node_id = node_id.map(|s| s.to_string());
        }
        Ok(())
    }

    async fn list_nodes(&self) -> Result<Vec<Node>> {
        Ok(self.inner.lock().nodes.values().cloned().collect())
    }

    async fn list_pods(&self) -> Result<Vec<Pod>> {
        Ok(self.inner.lock().pods.values().cloned().collect())
    }

    async fn list_events(&self, limit: usize) -> Result<Vec<EventLogEntry>> {
        let inner = self.inner.lock();
        let len = inner.events.len();
        let start = len.saturating_sub(limit);
        let mut out: Vec<_> = inner.events[start..].to_vec();
        out.reverse();
        Ok(out)
    }

    async fn list_utilization(&self, limit: usize) -> Result<Vec<UtilizationSample>> {
        let inner = self.inner.lock();
        let len = inner.utilization.len();
        let start = len.saturating_sub(limit);
        let mut out: Vec<_> = inner.utilization[start..].to_vec();
        out.reverse();
        Ok(out)
    }

    async fn append_event(&self, timestamp: f64, text: &str) -> Result<()> {
        self.inner.lock().events.push(EventLogEntry {
            timestamp,
            event: text.to_string(),
        });
        Ok(())
    }

    async fn append_utilization(&self, timestamp: f64, pct: f64) -> Result<()> {
        self.inner.lock().utilization.push(UtilizationSample {
            timestamp,
            utilization: pct,
        });
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
