//! MySQL-backed StateStore adapter.
//!
//! Schema and query shapes mirror the historic reference implementation this
//! controller replaces: an upsert-via-existence-check pattern for nodes and
//! pods, cascading pod deletion on node removal, and `ORDER BY timestamp DESC
//! LIMIT <n>` for the two append-only logs.

use super::StateStore;
use crate::error::Result;
use crate::types::{EventLogEntry, Node, NodeStatus, NodeType, Pod, UtilizationSample};
use async_trait::async_trait;
use sqlx::mysql::MySqlPoolOptions;
use sqlx::{MySqlPool, Row};
use tracing::warn;

pub struct MySqlStateStore {
    pool: MySqlPool,
}

impl MySqlStateStore {
    /// Connects and creates the reference tables if they do not already
    /// exist.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = MySqlPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await?;
        let store = Self { pool };
        store.init_tables().await?;
        Ok(store)
    }

    async fn init_tables(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS nodes (
                node_id VARCHAR(50) PRIMARY KEY,
                cpu_total INT NOT NULL,
                cpu_available INT NOT NULL,
                memory_total INT NOT NULL,
                memory_available INT NOT NULL,
                node_type VARCHAR(20) NOT NULL,
                network_group VARCHAR(50) NOT NULL,
                last_heartbeat DOUBLE,
                status VARCHAR(20) NOT NULL,
                simulate_heartbeat BOOLEAN NOT NULL,
                container_id VARCHAR(100)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS pods (
                pod_id VARCHAR(50) PRIMARY KEY,
                node_id VARCHAR(50),
                cpu INT NOT NULL,
                memory INT NOT NULL,
                network_group VARCHAR(50) NOT NULL,
                node_affinity VARCHAR(20)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS event_logs (
                id INT AUTO_INCREMENT PRIMARY KEY,
                timestamp DOUBLE NOT NULL,
                event TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS utilization_history (
                id INT AUTO_INCREMENT PRIMARY KEY,
                timestamp DOUBLE NOT NULL,
                utilization DOUBLE NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Probes the pool with a cheap query before the real one, so a dead
    /// connection is discovered (and the pool given a chance to reconnect)
    /// ahead of the operation that actually matters (§5).
    async fn probe(&self) {
        if let Err(err) = sqlx::query("SELECT 1").execute(&self.pool).await {
            warn!(error = %err, "mysql connectivity probe failed, pool will attempt reconnect");
        }
    }
}

#[async_trait]
impl StateStore for MySqlStateStore {
    async fn upsert_node(&self, node: &Node) -> Result<()> {
        self.probe().await;
        let existing = sqlx::query("SELECT 1 FROM nodes WHERE node_id = ?")
            .bind(&node.node_id)
            .fetch_optional(&self.pool)
            .await?;

        if existing.is_some() {
            sqlx::query(
                r#"
                UPDATE nodes
                SET cpu_total = ?, cpu_available = ?, memory_total = ?, memory_available = ?,
                    node_type = ?, network_group = ?, last_heartbeat = ?, status = ?,
                    simulate_heartbeat = ?, container_id = ?
                WHERE node_id = ?
                "#,
            )
            .bind(node.cpu_total)
            .bind(node.cpu_available)
            .bind(node.memory_total)
            .bind(node.memory_available)
            .bind(node.node_type.as_str())
            .bind(&node.network_group)
            .bind(node.last_heartbeat)
            .bind(node.status.as_str())
            .bind(node.simulate_heartbeat)
            .bind(&node.container_id)
            .bind(&node.node_id)
            .execute(&self.pool)
            .await?;
        } else {
            sqlx::query(
                r#"
                INSERT INTO nodes (node_id, cpu_total, cpu_available, memory_total, memory_available,
                                    node_type, network_group, last_heartbeat, status, simulate_heartbeat, container_id)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&node.node_id)
            .bind(node.cpu_total)
            .bind(node.cpu_available)
            .bind(node.memory_total)
            .bind(node.memory_available)
            .bind(node.node_type.as_str())
            .bind(&node.network_group)
            .bind(node.last_heartbeat)
            .bind(node.status.as_str())
            .bind(node.simulate_heartbeat)
            .bind(&node.container_id)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    async fn delete_node(&self, node_id: &str) -> Result<()> {
        self.probe().await;
        sqlx::query("DELETE FROM pods WHERE node_id = ?")
            .bind(node_id)
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM nodes WHERE node_id = ?")
            .bind(node_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn upsert_pod(&self, pod: &Pod) -> Result<()> {
        self.probe().await;
        let existing = sqlx::query("SELECT 1 FROM pods WHERE pod_id = ?")
            .bind(&pod.pod_id)
            .fetch_optional(&self.pool)
            .await?;

        let affinity = pod.node_affinity.map(|a| a.as_str());
        if existing.is_some() {
            sqlx::query(
                "UPDATE pods SET node_id = ?, cpu = ?, memory = ?, network_group = ?, node_affinity = ? WHERE pod_id = ?",
            )
            .bind(&pod.node_id)
            .bind(pod.cpu)
            .bind(pod.memory)
            .bind(&pod.network_group)
            .bind(affinity)
            .bind(&pod.pod_id)
            .execute(&self.pool)
            .await?;
        } else {
            sqlx::query(
                "INSERT INTO pods (pod_id, node_id, cpu, memory, network_group, node_affinity) VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&pod.pod_id)
            .bind(&pod.node_id)
            .bind(pod.cpu)
            .bind(pod.memory)
            .bind(&pod.network_group)
            .bind(affinity)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    async fn update_pod_node(&self, pod_id: &str, node_id: Option<&str>) -> Result<()> {
        self.probe().await;
        sqlx::query("UPDATE pods SET node_id = ? WHERE pod_id = ?")
            .bind(node_id)
            .bind(pod_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_nodes(&self) -> Result<Vec<Node>> {
        self.probe().await;
        let rows = sqlx::query("SELECT * FROM nodes").fetch_all(&self.pool).await?;
        let mut nodes = Vec::with_capacity(rows.len());
        for row in rows {
            let node_type: String = row.try_get("node_type")?;
            let status: String = row.try_get("status")?;
            nodes.push(Node {
                node_id: row.try_get("node_id")?,
                cpu_total: row.try_get("cpu_total")?,
                cpu_available: row.try_get("cpu_available")?,
                memory_total: row.try_get("memory_total")?,
                memory_available: row.try_get("memory_available")?,
                node_type: node_type.parse().unwrap_or(NodeType::Balanced),
                network_group: row.try_get("network_group")?,
                last_heartbeat: row.try_get("last_heartbeat")?,
                status: if status == "active" {
                    NodeStatus::Active
                } else {
                    NodeStatus::Failed
                },
                simulate_heartbeat: row.try_get("simulate_heartbeat")?,
                container_id: row.try_get("container_id")?,
                pods: vec![],
            });
        }
        Ok(nodes)
    }

    async fn list_pods(&self) -> Result<Vec<Pod>> {
        self.probe().await;
        let rows = sqlx::query("SELECT * FROM pods").fetch_all(&self.pool).await?;
        let mut pods = Vec::with_capacity(rows.len());
        for row in rows {
            let affinity: Option<String> = row.try_get("node_affinity")?;
            pods.push(Pod {
                pod_id: row.try_get("pod_id")?,
                node_id: row.try_get("node_id")?,
                cpu: row.try_get("cpu")?,
                memory: row.try_get("memory")?,
                network_group: row.try_get("network_group")?,
                node_affinity: affinity.and_then(|s| s.parse().ok()),
            });
        }
        Ok(pods)
    }

    async fn list_events(&self, limit: usize) -> Result<Vec<EventLogEntry>> {
        self.probe().await;
        let rows = sqlx::query("SELECT timestamp, event FROM event_logs ORDER BY timestamp DESC LIMIT ?")
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(EventLogEntry {
                timestamp: row.try_get("timestamp")?,
                event: row.try_get("event")?,
            });
        }
        Ok(out)
    }

    async fn list_utilization(&self, limit: usize) -> Result<Vec<UtilizationSample>> {
        self.probe().await;
        let rows = sqlx::query(
            "SELECT timestamp, utilization FROM utilization_history ORDER BY timestamp DESC LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(UtilizationSample {
                timestamp: row.try_get("timestamp")?,
                utilization: row.try_get("utilization")?,
            });
        }
        Ok(out)
    }

    async fn append_event(&self, timestamp: f64, text: &str) -> Result<()> {
        self.probe().await;
        sqlx::query("INSERT INTO event_logs (timestamp, event) VALUES (?, ?)")
            .bind(timestamp)
            .bind(text)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn append_utilization(&self, timestamp: f64, pct: f64) -> Result<()> {
        self.probe().await;
        sqlx::query("INSERT INTO utilization_history (timestamp, utilization) VALUES (?, ?)")
            .bind(timestamp)
            .bind(pct)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "mysql"
    }
}
