//! HTTP + WebSocket surface (§6.1): thin handlers that translate requests
//! into `ClusterState`/`Scheduler`/`ChaosMonkey` calls and translate core
//! errors into the HTTP status/JSON taxonomy of §7.

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use cluster_sim_core::{
    clock::now_secs, metrics, scheduler, Algorithm, ClusterError, ClusterState, NodeType, Pod,
    Publisher,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppState {
    pub cluster: Arc<ClusterState>,
    pub publisher: Arc<Publisher>,
    pub chaos: Arc<cluster_sim_core::ChaosMonkey>,
}

/// Wraps [`ClusterError`] so this crate can implement `IntoResponse` for it
/// without running into the orphan rule (§7: API handlers translate core
/// errors to HTTP status + JSON `{error: <msg>}`).
pub struct ApiError(ClusterError);

impl From<ClusterError> for ApiError {
    fn from(err: ClusterError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = Json(serde_json::json!({ "error": self.0.to_string() }));
        (status, body).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/add_node", post(add_node))
        .route("/api/remove_node", post(remove_node))
        .route("/api/toggle_simulation", post(toggle_simulation))
        .route("/api/list_nodes", get(list_nodes))
        .route("/api/heartbeat", post(heartbeat))
        .route("/heartbeat", post(heartbeat))
        .route("/api/launch_pod", post(launch_pod))
        .route("/api/chaos_monkey", post(chaos_monkey))
        .route("/api/logs", get(logs))
        .route("/api/utilization_history", get(utilization_history))
        .route("/api/download_report", get(download_report))
        .route("/api/stream", get(stream))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Deserialize)]
struct AddNodeRequest {
    cpu: Option<i64>,
    #[serde(default)]
    memory: Option<i64>,
    #[serde(default)]
    node_type: Option<String>,
    #[serde(default)]
    network_group: Option<String>,
}

#[tracing::instrument(skip(state, req))]
async fn add_node(
    State(state): State<AppState>,
    Json(req): Json<AddNodeRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let cpu = req.cpu.ok_or_else(|| ClusterError::MissingField("cpu".into()))?;
    let memory = req.memory.unwrap_or(16);
    let node_type = match req.node_type {
        Some(s) => NodeType::from_str(&s).map_err(ClusterError::MissingField)?,
        None => NodeType::Balanced,
    };
    let network_group = req.network_group.unwrap_or_else(|| "default".to_string());

    let node_id = uuid::Uuid::new_v4().to_string();
    let node = cluster_sim_core::Node {
        node_id: node_id.clone(),
        cpu_total: cpu,
        cpu_available: cpu,
        memory_total: memory,
        memory_available: memory,
        node_type,
        network_group,
        last_heartbeat: Some(now_secs()),
        status: cluster_sim_core::NodeStatus::Active,
        simulate_heartbeat: true,
        container_id: None,
        pods: vec![],
    };

    state.cluster.upsert_node(node).await?;
    info!(node_id = %node_id, "node added via API");
    Ok(Json(serde_json::json!({
        "message": "node added",
        "node_id": node_id,
    })))
}

#[derive(Deserialize)]
struct RemoveNodeRequest {
    node_id: Option<String>,
}

async fn remove_node(
    State(state): State<AppState>,
    Json(req): Json<RemoveNodeRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let node_id = req.node_id.ok_or_else(|| ClusterError::MissingField("node_id".into()))?;
    state.cluster.remove_node(&node_id).await?;
    info!(node_id = %node_id, "node removed via API");
    Ok(Json(serde_json::json!({ "message": "node removed" })))
}

#[derive(Deserialize)]
struct ToggleSimulationRequest {
    node_id: Option<String>,
    simulate: Option<bool>,
}

async fn toggle_simulation(
    State(state): State<AppState>,
    Json(req): Json<ToggleSimulationRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let node_id = req.node_id.ok_or_else(|| ClusterError::MissingField("node_id".into()))?;
    let simulate = req.simulate.ok_or_else(|| ClusterError::MissingField("simulate".into()))?;
    state.cluster.toggle_simulation(&node_id, simulate).await?;
    Ok(Json(serde_json::json!({ "message": "simulation toggled" })))
}

async fn list_nodes(State(state): State<AppState>) -> Json<serde_json::Value> {
    let snapshot = state.cluster.snapshot().await;
    Json(serde_json::json!({ "nodes": snapshot.nodes }))
}

#[derive(Deserialize)]
struct HeartbeatRequest {
    node_id: Option<String>,
}

async fn heartbeat(
    State(state): State<AppState>,
    Json(req): Json<HeartbeatRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let node_id = req.node_id.ok_or_else(|| ClusterError::MissingField("node_id".into()))?;
    metrics::record_heartbeat_received();
    state.cluster.set_heartbeat(&node_id, now_secs()).await?;
    Ok(Json(serde_json::json!({ "message": "heartbeat received" })))
}

#[derive(Deserialize)]
struct LaunchPodRequest {
    cpu_required: Option<i64>,
    #[serde(default)]
    memory_required: Option<i64>,
    #[serde(default)]
    scheduling_algorithm: Option<String>,
    #[serde(default)]
    network_group: Option<String>,
    #[serde(default)]
    node_affinity: Option<String>,
}

async fn launch_pod(
    State(state): State<AppState>,
    Json(req): Json<LaunchPodRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let cpu = req
        .cpu_required
        .ok_or_else(|| ClusterError::MissingField("cpu_required".into()))?;
    let memory = req.memory_required.unwrap_or(4);
    let algorithm = match req.scheduling_algorithm {
        Some(s) => Algorithm::from_str(&s).map_err(ClusterError::MissingField)?,
        None => Algorithm::FirstFit,
    };
    let network_group = req.network_group.unwrap_or_else(|| "default".to_string());
    let node_affinity = req
        .node_affinity
        .map(|s| NodeType::from_str(&s).map_err(ClusterError::MissingField))
        .transpose()?;

    let pod = Pod {
        pod_id: state.cluster.next_pod_id(),
        node_id: None,
        cpu,
        memory,
        network_group,
        node_affinity,
    };

    let snapshot = state.cluster.snapshot().await;
    metrics::record_scheduler_invocation(algorithm.as_str());
    let target = scheduler::place(&snapshot, &pod, algorithm);

    match target {
        Some(node_id) => {
            let pod_id = pod.pod_id.clone();
            state.cluster.place_pod(&node_id, pod).await?;
            metrics::record_pod_placed(algorithm.as_str());
            info!(pod_id = %pod_id, node_id = %node_id, %algorithm, "pod launched");
            Ok(Json(serde_json::json!({
                "message": "pod launched",
                "pod_id": pod_id,
                "assigned_node": node_id,
                "scheduling_algorithm": algorithm.as_str(),
            })))
        }
        None => {
            metrics::record_pod_placement_failed(algorithm.as_str());
            warn!(%algorithm, cpu, memory, "no capacity for pod");
            Err(ClusterError::NoCapacity.into())
        }
    }
}

#[derive(Deserialize)]
struct ChaosMonkeyRequest {
    #[serde(default)]
    node_id: Option<String>,
}

async fn chaos_monkey(
    State(state): State<AppState>,
    Json(req): Json<ChaosMonkeyRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let target = state.chaos.strike(req.node_id).await?;
    Ok(Json(serde_json::json!({
        "message": format!("node {target} struck by chaos monkey"),
    })))
}

async fn logs(State(state): State<AppState>) -> Json<serde_json::Value> {
    let snapshot = state.cluster.snapshot().await;
    Json(serde_json::json!({ "logs": snapshot.logs }))
}

async fn utilization_history(State(state): State<AppState>) -> Json<serde_json::Value> {
    let snapshot = state.cluster.snapshot().await;
    Json(serde_json::json!({ "history": snapshot.history }))
}

async fn download_report(State(state): State<AppState>) -> ApiResult<Response> {
    let snapshot = state.cluster.snapshot().await;
    let mut writer = csv::WriterBuilder::new().from_writer(vec![]);
    writer
        .write_record(["Node", "CPU tot/avail", "Mem tot/avail", "Status", "Type", "Group", "Pods"])
        .map_err(|e| ClusterError::Internal(e.to_string()))?;

    for node in &snapshot.nodes {
        let pods = if node.pods.is_empty() {
            "None".to_string()
        } else {
            node.pods.join(";")
        };
        writer
            .write_record([
                node.node_id.as_str(),
                &format!("{}/{}", node.cpu_total, node.cpu_available),
                &format!("{}/{}", node.memory_total, node.memory_available),
                node.status.as_str(),
                node.node_type.as_str(),
                node.network_group.as_str(),
                &pods,
            ])
            .map_err(|e| ClusterError::Internal(e.to_string()))?;
    }

    let csv_bytes = writer
        .into_inner()
        .map_err(|e| ClusterError::Internal(e.to_string()))?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"cluster_report.csv\"",
            ),
        ],
        csv_bytes,
    )
        .into_response())
}

async fn healthz() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn stream(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| stream_socket(socket, state))
}

/// A new connection immediately receives one `state_update` frame before
/// joining the periodic broadcast (§6.1).
async fn stream_socket(mut socket: WebSocket, state: AppState) {
    let snapshot = state.cluster.snapshot().await;
    let initial = cluster_sim_core::Frame::state_update(snapshot);
    if let Ok(text) = serde_json::to_string(&initial) {
        if socket.send(Message::Text(text)).await.is_err() {
            return;
        }
    }

    let mut rx = state.publisher.subscribe();
    loop {
        tokio::select! {
            frame = rx.recv() => {
                match frame {
                    Ok(frame) => {
                        let Ok(text) = serde_json::to_string(&frame) else { continue };
                        if socket.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "stream subscriber lagged, dropping frames");
                        continue;
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(_)) => continue,
                    _ => break,
                }
            }
        }
    }
}
