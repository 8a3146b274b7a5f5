//! ClusterState: the authoritative in-memory model (§4.1).
//!
//! All mutations funnel through a single async mutex guarding the node and
//! pod maps, the event log, and the utilisation history, matching the
//! "single reentrant mutex" concurrency model of §5. Pod-id generation uses
//! an independent atomic counter so it never contends with that lock.

use crate::error::{ClusterError, Result};
use crate::scheduler;
use crate::store::StateStore;
use crate::types::{ClusterSnapshot, EventLogEntry, Node, NodeStatus, Pod, UtilizationSample};
use indexmap::IndexMap;
use rand::seq::SliceRandom;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

struct Inner {
    /// Insertion order is iteration order (§4.1, P3).
    nodes: IndexMap<String, Node>,
    pods: IndexMap<String, Pod>,
    logs: VecDeque<EventLogEntry>,
    history: VecDeque<UtilizationSample>,
}

pub struct ClusterState {
    inner: Mutex<Inner>,
    pod_counter: AtomicU64,
    store: Arc<dyn StateStore>,
    log_capacity: usize,
    history_capacity: usize,
}

impl ClusterState {
    pub fn new(store: Arc<dyn StateStore>, log_capacity: usize, history_capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                nodes: IndexMap::new(),
                pods: IndexMap::new(),
                logs: VecDeque::new(),
                history: VecDeque::new(),
            }),
            pod_counter: AtomicU64::new(1),
            store,
            log_capacity,
            history_capacity,
        }
    }

    /// Restores in-memory state from the store at startup.
    pub async fn load_from_store(&self) -> Result<()> {
        let nodes = self.store.list_nodes().await?;
        let pods = self.store.list_pods().await?;
        let events = self.store.list_events(self.log_capacity).await?;
        let history = self.store.list_utilization(self.history_capacity).await?;

        let mut inner = self.inner.lock().await;
        for node in nodes {
            inner.nodes.insert(node.node_id.clone(), node);
        }
        for pod in pods {
            inner.pods.insert(pod.pod_id.clone(), pod);
        }
        // Stored logs come back newest-first; re-reverse so the ring is oldest-first.
        inner.logs = events.into_iter().rev().collect();
        inner.history = history.into_iter().rev().collect();
        Ok(())
    }

    /// Allocates the next `pod_<N>` id. Independent of the ClusterState lock (§5).
    pub fn next_pod_id(&self) -> String {
        let n = self.pod_counter.fetch_add(1, Ordering::SeqCst);
        format!("pod_{n}")
    }

    fn rebuild_pods_view(nodes: &mut IndexMap<String, Node>, pods: &IndexMap<String, Pod>) {
        for node in nodes.values_mut() {
            node.pods.clear();
        }
        for pod in pods.values() {
            if let Some(node_id) = &pod.node_id {
                if let Some(node) = nodes.get_mut(node_id) {
                    node.pods.push(pod.pod_id.clone());
                }
            }
        }
    }

    /// Persists then installs the node (§4.1). Fails with `StoreUnavailable`
    /// if persistence fails, leaving in-memory state untouched (fail-closed, §5).
    pub async fn upsert_node(&self, node: Node) -> Result<()> {
        self.store.upsert_node(&node).await?;
        let mut inner = self.inner.lock().await;
        inner.nodes.insert(node.node_id.clone(), node);
        Ok(())
    }

    /// Cascades pod deletion in the store, then removes the node.
    /// Idempotent: a second call returns `NotFound` but leaves state unchanged.
    pub async fn remove_node(&self, node_id: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if !inner.nodes.contains_key(node_id) {
            return Err(ClusterError::NotFound(node_id.to_string()));
        }
        self.store.delete_node(node_id).await?;
        inner.nodes.shift_remove(node_id);
        inner.pods.retain(|_, p| p.node_id.as_deref() != Some(node_id));
        Ok(())
    }

    /// If the node is `failed`, reactivates it and emits a reactivation
    /// event; otherwise just bumps the timestamp (§4.1, P6).
    pub async fn set_heartbeat(&self, node_id: &str, now: f64) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let reactivated = {
            let node = inner
                .nodes
                .get_mut(node_id)
                .ok_or_else(|| ClusterError::NotFound(node_id.to_string()))?;
            node.last_heartbeat = Some(now);
            let was_failed = node.status == NodeStatus::Failed;
            if was_failed {
                node.status = NodeStatus::Active;
            }
            was_failed
        };

        let node = inner.nodes.get(node_id).cloned();
        if let Some(node) = node {
            self.store.upsert_node(&node).await?;
        }

        if reactivated {
            let text = format!("Node {node_id} reactivated via heartbeat");
            Self::push_event_locked(&mut inner, self.log_capacity, now, text.clone());
            self.store.append_event(now, &text).await?;
            info!(node_id = %node_id, "node reactivated");
        }
        Ok(())
    }

    pub async fn update_status(&self, node_id: &str, status: NodeStatus) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let node = inner
            .nodes
            .get_mut(node_id)
            .ok_or_else(|| ClusterError::NotFound(node_id.to_string()))?;
        node.status = status;
        let node = node.clone();
        self.store.upsert_node(&node).await?;
        Ok(())
    }

    pub async fn toggle_simulation(&self, node_id: &str, simulate: bool) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let node = inner
            .nodes
            .get_mut(node_id)
            .ok_or_else(|| ClusterError::NotFound(node_id.to_string()))?;
        node.simulate_heartbeat = simulate;
        let node = node.clone();
        self.store.upsert_node(&node).await?;
        Ok(())
    }

    /// A coherent, point-in-time view of the cluster (§4.1, §4.8).
    pub async fn snapshot(&self) -> ClusterSnapshot {
        let mut inner = self.inner.lock().await;
        Self::rebuild_pods_view(&mut inner.nodes, &inner.pods);
        ClusterSnapshot {
            nodes: inner.nodes.values().cloned().collect(),
            logs: inner.logs.iter().cloned().collect(),
            history: inner.history.iter().cloned().collect(),
        }
    }

    pub async fn get_node(&self, node_id: &str) -> Option<Node> {
        let mut inner = self.inner.lock().await;
        Self::rebuild_pods_view(&mut inner.nodes, &inner.pods);
        inner.nodes.get(node_id).cloned()
    }

    /// Places `pod` on `node_id`, committing atomically: re-validates
    /// eligibility under the lock (the caller's snapshot may be stale by the
    /// time this runs, §5), then decrements the node's available resources,
    /// appends the pod, and persists both (§4.2).
    pub async fn place_pod(&self, node_id: &str, mut pod: Pod) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let node = inner
            .nodes
            .get_mut(node_id)
            .ok_or_else(|| ClusterError::NotFound(node_id.to_string()))?;
        if !scheduler::is_eligible(node, &pod) {
            return Err(ClusterError::NoCapacity);
        }
        node.cpu_available -= pod.cpu;
        node.memory_available -= pod.memory;
        pod.node_id = Some(node_id.to_string());
        let node_snapshot = node.clone();

        self.store.upsert_node(&node_snapshot).await?;
        self.store.upsert_pod(&pod).await?;
        inner.pods.insert(pod.pod_id.clone(), pod);
        Ok(())
    }

    /// Re-homes `pod_id` onto `node_id`, adjusting resource counters on both
    /// the old and new hosts (used by the rescheduler, §4.4). Re-validates
    /// eligibility under the lock, since the snapshot `scheduler::place` ran
    /// against may have gone stale by the time this commits.
    pub async fn rehome_pod(&self, pod_id: &str, node_id: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let pod = inner
            .pods
            .get(pod_id)
            .cloned()
            .ok_or_else(|| ClusterError::NotFound(pod_id.to_string()))?;
        let node = inner
            .nodes
            .get_mut(node_id)
            .ok_or_else(|| ClusterError::NotFound(node_id.to_string()))?;
        if !scheduler::is_eligible(node, &pod) {
            return Err(ClusterError::NoCapacity);
        }
        node.cpu_available -= pod.cpu;
        node.memory_available -= pod.memory;
        let node_snapshot = node.clone();
        self.store.upsert_node(&node_snapshot).await?;

        if let Some(pod) = inner.pods.get_mut(pod_id) {
            pod.node_id = Some(node_id.to_string());
        }
        self.store.update_pod_node(pod_id, Some(node_id)).await?;
        Ok(())
    }

    /// Gather phase of HealthMonitor (§4.3): under the lock, mark nodes whose
    /// heartbeat is older than `threshold_secs` as failed, persist them, and
    /// return their ids for the act-outside-lock phase.
    pub async fn fail_stale_nodes(&self, threshold_secs: f64, now: f64) -> Result<Vec<String>> {
        let mut inner = self.inner.lock().await;
        let mut failed_ids = Vec::new();
        let stale_ids: Vec<String> = inner
            .nodes
            .values()
            .filter(|n| {
                n.status == NodeStatus::Active
                    && match n.last_heartbeat {
                        Some(hb) => now - hb > threshold_secs,
                        None => true,
                    }
            })
            .map(|n| n.node_id.clone())
            .collect();

        for id in stale_ids {
            if let Some(node) = inner.nodes.get_mut(&id) {
                node.status = NodeStatus::Failed;
                let snapshot = node.clone();
                self.store.upsert_node(&snapshot).await?;
                let text = format!("Node {id} failed (heartbeat stale)");
                Self::push_event_locked(&mut inner, self.log_capacity, now, text.clone());
                self.store.append_event(now, &text).await?;
                failed_ids.push(id);
            }
        }
        Ok(failed_ids)
    }

    /// Rescheduler step 1 (§4.4): remove a failed node from the map under the
    /// lock and return its displaced pods, persisting the node's deletion.
    pub async fn evict_failed_node(&self, node_id: &str) -> Result<Vec<Pod>> {
        let mut inner = self.inner.lock().await;
        if !inner.nodes.contains_key(node_id) {
            return Ok(Vec::new());
        }
        self.store.delete_node(node_id).await?;
        inner.nodes.shift_remove(node_id);

        let displaced: Vec<Pod> = inner
            .pods
            .values()
            .filter(|p| p.node_id.as_deref() == Some(node_id))
            .cloned()
            .collect();
        for pod in &displaced {
            inner.pods.shift_remove(&pod.pod_id);
        }
        Ok(displaced)
    }

    /// Drops a pod that could not be re-placed after its host failed (§4.4).
    pub async fn drop_pod(&self, pod_id: &str) {
        let mut inner = self.inner.lock().await;
        inner.pods.shift_remove(pod_id);
    }

    /// HeartbeatSimulator tick (§4.5): refreshes `last_heartbeat` for every
    /// self-simulating active node.
    pub async fn refresh_simulated_heartbeats(&self, now: f64) -> Result<usize> {
        let mut inner = self.inner.lock().await;
        let ids: Vec<String> = inner
            .nodes
            .values()
            .filter(|n| n.simulate_heartbeat && n.status == NodeStatus::Active)
            .map(|n| n.node_id.clone())
            .collect();
        for id in &ids {
            if let Some(node) = inner.nodes.get_mut(id) {
                node.last_heartbeat = Some(now);
                let snapshot = node.clone();
                self.store.upsert_node(&snapshot).await?;
            }
        }
        Ok(ids.len())
    }

    /// `(active_count, total_count)`, used by the periodic AutoScaler (§4.6).
    pub async fn node_counts(&self) -> (usize, usize) {
        let inner = self.inner.lock().await;
        let active = inner
            .nodes
            .values()
            .filter(|n| n.status == NodeStatus::Active)
            .count();
        (active, inner.nodes.len())
    }

    /// Fleet CPU utilisation as a fraction in `[0, 1]`; `1.0` if there are no
    /// active nodes (§4.7 sentinel).
    pub async fn cpu_utilization_fraction(&self) -> f64 {
        let inner = self.inner.lock().await;
        let active: Vec<&Node> = inner
            .nodes
            .values()
            .filter(|n| n.status == NodeStatus::Active)
            .collect();
        if active.is_empty() {
            return 1.0;
        }
        let total: i64 = active.iter().map(|n| n.cpu_total).sum();
        let used: i64 = active.iter().map(|n| n.used_cpu()).sum();
        if total == 0 {
            1.0
        } else {
            used as f64 / total as f64
        }
    }

    /// A uniformly random active node id, or `None` if the fleet has none (§4.9).
    pub async fn random_active_node_id(&self) -> Option<String> {
        let inner = self.inner.lock().await;
        let active: Vec<&String> = inner
            .nodes
            .values()
            .filter(|n| n.status == NodeStatus::Active)
            .map(|n| &n.node_id)
            .collect();
        active.choose(&mut rand::thread_rng()).map(|s| s.to_string())
    }

    pub async fn node_exists(&self, node_id: &str) -> bool {
        self.inner.lock().await.nodes.contains_key(node_id)
    }

    pub async fn append_event(&self, now: f64, text: impl Into<String>) -> Result<()> {
        let text = text.into();
        let mut inner = self.inner.lock().await;
        Self::push_event_locked(&mut inner, self.log_capacity, now, text.clone());
        self.store.append_event(now, &text).await?;
        Ok(())
    }

    pub async fn append_utilization_sample(&self, now: f64, pct: f64) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.history.push_back(UtilizationSample {
            timestamp: now,
            utilization: pct,
        });
        while inner.history.len() > self.history_capacity {
            inner.history.pop_front();
        }
        self.store.append_utilization(now, pct).await?;
        Ok(())
    }

    fn push_event_locked(inner: &mut Inner, capacity: usize, timestamp: f64, event: String) {
        inner.logs.push_back(EventLogEntry { timestamp, event });
        while inner.logs.len() > capacity {
            inner.logs.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use crate::types::{NodeType, Pod};

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

    fn state() -> ClusterState {
        ClusterState::new(Arc::new(InMemoryStore::new()), 50, 50)
    }

    #[tokio::test]
    async fn upsert_then_snapshot_round_trips_modulo_pods() {
        let state = state();
        let node = make_node("n1", 4, 8);
        state.upsert_node(node.clone()).await.unwrap();
        let snap = state.snapshot().await;
        assert_eq!(snap.nodes.len(), 1);
        assert_eq!(snap.nodes[0].node_id, node.node_id);
        assert_eq!(snap.nodes[0].cpu_total, node.cpu_total);
        assert!(snap.nodes[0].pods.is_empty());
    }

    #[tokio::test]
    async fn place_pod_decrements_resources_and_is_visible_in_snapshot() {
        let state = state();
        state.upsert_node(make_node("n1", 4, 8)).await.unwrap();
        state
            .place_pod(
                "n1",
                Pod {
                    pod_id: state.next_pod_id(),
                    node_id: None,
                    cpu: 2,
                    memory: 4,
                    network_group: "default".into(),
                    node_affinity: None,
                },
            )
            .await
            .unwrap();

        let snap = state.snapshot().await;
        let node = &snap.nodes[0];
        assert_eq!(node.cpu_available, 2);
        assert_eq!(node.memory_available, 4);
        assert_eq!(node.pods.len(), 1);
    }

    #[tokio::test]
    async fn place_pod_rejects_when_node_no_longer_fits_under_lock() {
        let state = state();
        state.upsert_node(make_node("n1", 4, 8)).await.unwrap();
        state
            .place_pod(
                "n1",
                Pod {
                    pod_id: state.next_pod_id(),
                    node_id: None,
                    cpu: 3,
                    memory: 4,
                    network_group: "default".into(),
                    node_affinity: None,
                },
            )
            .await
            .unwrap();

        // A second concurrent placement from a stale snapshot (still showing
        // cpu_available=4) must be re-checked under the lock, not blindly
        // decremented into negative territory (I5/P2, §5).
        let err = state
            .place_pod(
                "n1",
                Pod {
                    pod_id: state.next_pod_id(),
                    node_id: None,
                    cpu: 3,
                    memory: 4,
                    network_group: "default".into(),
                    node_affinity: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ClusterError::NoCapacity));

        let node = state.get_node("n1").await.unwrap();
        assert_eq!(node.cpu_available, 1);
        assert_eq!(node.memory_available, 4);
    }

    #[tokio::test]
    async fn rehome_pod_rejects_when_target_no_longer_fits_under_lock() {
        let state = state();
        state.upsert_node(make_node("n1", 4, 8)).await.unwrap();
        state.upsert_node(make_node("n2", 2, 4)).await.unwrap();
        state
            .place_pod(
                "n2",
                Pod {
                    pod_id: state.next_pod_id(),
                    node_id: None,
                    cpu: 2,
                    memory: 4,
                    network_group: "default".into(),
                    node_affinity: None,
                },
            )
            .await
            .unwrap();
        let displaced_pod_id = state.next_pod_id();
        state
            .place_pod(
                "n1",
                Pod {
                    pod_id: displaced_pod_id.clone(),
                    node_id: None,
                    cpu: 4,
                    memory: 8,
                    network_group: "default".into(),
                    node_affinity: None,
                },
            )
            .await
            .unwrap();

        // n2 is already full; rehoming onto it must fail rather than drive
        // its counters negative.
        let err = state
            .rehome_pod(&displaced_pod_id, "n2")
            .await
            .unwrap_err();
        assert!(matches!(err, ClusterError::NoCapacity));

        let node = state.get_node("n2").await.unwrap();
        assert_eq!(node.cpu_available, 0);
        assert_eq!(node.memory_available, 0);
    }

    #[tokio::test]
    async fn remove_node_is_idempotent() {
        let state = state();
        state.upsert_node(make_node("n1", 4, 8)).await.unwrap();
        state.remove_node("n1").await.unwrap();
        let err = state.remove_node("n1").await.unwrap_err();
        assert!(matches!(err, ClusterError::NotFound(_)));
    }

    #[tokio::test]
    async fn heartbeat_reactivates_failed_node() {
        let state = state();
        state.upsert_node(make_node("n1", 4, 8)).await.unwrap();
        state.update_status("n1", NodeStatus::Failed).await.unwrap();
        state.set_heartbeat("n1", 100.0).await.unwrap();
        let node = state.get_node("n1").await.unwrap();
        assert_eq!(node.status, NodeStatus::Active);
        let snap = state.snapshot().await;
        assert!(snap.logs.iter().any(|e| e.event.contains("reactivated")));
    }

    #[tokio::test]
    async fn fail_stale_nodes_marks_and_returns_ids() {
        let state = state();
        state.upsert_node(make_node("n1", 4, 8)).await.unwrap();
        let failed = state.fail_stale_nodes(15.0, 100.0).await.unwrap();
        assert_eq!(failed, vec!["n1".to_string()]);
        let node = state.get_node("n1").await.unwrap();
        assert_eq!(node.status, NodeStatus::Failed);
    }

    #[tokio::test]
    async fn utilization_sentinel_is_one_when_no_active_nodes() {
        let state = state();
        assert_eq!(state.cpu_utilization_fraction().await, 1.0);
    }

    #[tokio::test]
    async fn pod_ids_are_strictly_increasing() {
        let state = state();
        let a = state.next_pod_id();
        let b = state.next_pod_id();
        assert_ne!(a, b);
        assert!(a < b);
    }

    #[tokio::test]
    async fn node_iteration_order_is_insertion_order() {
        let state = state();
        state.upsert_node(make_node("n2", 4, 8)).await.unwrap();
        state.upsert_node(make_node("n1", 4, 8)).await.unwrap();
        let snap = state.snapshot().await;
        let ids: Vec<&str> = snap.nodes.iter().map(|n| n.node_id.as_str()).collect();
        assert_eq!(ids, vec!["n2", "n1"]);
    }
}
