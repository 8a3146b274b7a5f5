//! Cluster observability metrics (§10.7)
//!
//! Prometheus-compatible counters/gauges for fleet health, scheduling, and
//! the background loops, exported via `metrics-exporter-prometheus` on the
//! same bind address as the HTTP API at `GET /metrics`. This is ambient
//! observability, not the billing/quota functionality excluded by the
//! controller's non-goals.

use crate::types::ClusterSnapshot;

/// Node and fleet-utilisation gauges, recomputed from a fresh snapshot.
pub fn update_fleet_gauges(snapshot: &ClusterSnapshot) {
    let active = snapshot
        .nodes
        .iter()
        .filter(|n| n.status == crate::types::NodeStatus::Active)
        .count();
    let failed = snapshot.nodes.len() - active;

    metrics::gauge!("cluster_sim_nodes_active").set(active as f64);
    metrics::gauge!("cluster_sim_nodes_failed").set(failed as f64);
    metrics::gauge!("cluster_sim_nodes_total").set(snapshot.nodes.len() as f64);

    let pod_count: usize = snapshot.nodes.iter().map(|n| n.pods.len()).sum();
    metrics::gauge!("cluster_sim_pods_total").set(pod_count as f64);
}

/// Records a fleet CPU utilisation sample (as a percentage, §4.7).
pub fn update_utilization_gauge(pct: f64) {
    metrics::gauge!("cluster_sim_fleet_utilization_percent").set(pct);
}

/// Records a scheduler invocation for `algorithm`, regardless of outcome.
pub fn record_scheduler_invocation(algorithm: &str) {
    metrics::counter!(
        "cluster_sim_scheduler_invocations_total",
        "algorithm" => algorithm.to_string(),
    )
    .increment(1);
}

/// Records a successful pod placement.
pub fn record_pod_placed(algorithm: &str) {
    metrics::counter!(
        "cluster_sim_pods_placed_total",
        "algorithm" => algorithm.to_string(),
    )
    .increment(1);
}

/// Records a placement attempt that found no eligible node.
pub fn record_pod_placement_failed(algorithm: &str) {
    metrics::counter!(
        "cluster_sim_pods_placement_failed_total",
        "algorithm" => algorithm.to_string(),
    )
    .increment(1);
}

/// Records a heartbeat received over the API (real or simulated).
pub fn record_heartbeat_received() {
    metrics::counter!("cluster_sim_heartbeats_received_total").increment(1);
}

/// Records a rescheduling attempt for one displaced pod.
pub fn record_reschedule_attempt() {
    metrics::counter!("cluster_sim_reschedule_attempts_total").increment(1);
}

/// Records a rescheduling attempt that found a new home for the pod.
pub fn record_reschedule_success() {
    metrics::counter!("cluster_sim_reschedule_success_total").increment(1);
}

/// Records an auto-scale event, tagged with its triggering reason class.
pub fn record_autoscale_event(reason: &str) {
    let reason_class = if reason.starts_with("low active node ratio") {
        "low_ratio"
    } else if reason.starts_with("replacing failed node") {
        "failed_node_replacement"
    } else {
        "other"
    };
    metrics::counter!(
        "cluster_sim_autoscale_events_total",
        "reason" => reason_class,
    )
    .increment(1);
}

/// Records a Chaos Monkey strike.
pub fn record_chaos_strike() {
    metrics::counter!("cluster_sim_chaos_strikes_total").increment(1);
}
