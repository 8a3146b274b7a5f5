//! Persistence capability
//!
//! Abstracted behind a trait so the controller core stays testable without a
//! real database (§6.2). Two adapters are provided: [`memory::InMemoryStore`]
//! (the default, and what the test suite exercises) and
//! [`mysql::MySqlStateStore`] (durable, against the historic schema).

mod memory;
mod mysql;

pub use memory::InMemoryStore;
pub use mysql::MySqlStateStore;

use crate::error::Result;
use crate::types::{EventLogEntry, Node, Pod, UtilizationSample};
use async_trait::async_trait;

/// Durable record of nodes, pods, events, and utilisation samples (§6.2).
///
/// No transactional grouping across operations is required; each call is
/// independently durable or fails independently.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn upsert_node(&self, node: &Node) -> Result<()>;

    /// Deletes a node and cascades deletion of its pods.
    async fn delete_node(&self, node_id: &str) -> Result<()>;

    async fn upsert_pod(&self, pod: &Pod) -> Result<()>;

    async fn update_pod_node(&self, pod_id: &str, node_id: Option<&str>) -> Result<()>;

    async fn list_nodes(&self) -> Result<Vec<Node>>;

    async fn list_pods(&self) -> Result<Vec<Pod>>;

    async fn list_events(&self, limit: usize) -> Result<Vec<EventLogEntry>>;

    async fn list_utilization(&self, limit: usize) -> Result<Vec<UtilizationSample>>;

    async fn append_event(&self, timestamp: f64, text: &str) -> Result<()>;

    async fn append_utilization(&self, timestamp: f64, pct: f64) -> Result<()>;

    /// Backend name, for logging/metrics labeling.
    fn backend_name(&self) -> &'static str;
}
