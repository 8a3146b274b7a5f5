mod api;

use anyhow::{Context, Result};
use clap::Parser;
use cluster_sim_core::store::{InMemoryStore, MySqlStateStore, StateStore};
use cluster_sim_core::{
    autoscale::AutoScaler, chaos::ChaosMonkey, config::ControllerConfig, health, heartbeat_sim,
    reschedule::Rescheduler, runtime::LoggingNodeRuntime, utilization, ClusterState, Publisher,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug, Clone)]
#[command(name = "cluster-sim-server")]
#[command(about = "Cluster orchestration simulator")]
#[command(version)]
struct Args {
    /// Configuration file path (env: CLUSTER_SIM_CONFIG_PATH)
    #[arg(
        short,
        long,
        default_value = "cluster-sim.json",
        env = "CLUSTER_SIM_CONFIG_PATH"
    )]
    config: PathBuf,

    /// Address to bind the HTTP API to, overrides the config file (env: CLUSTER_SIM_BIND_ADDR)
    #[arg(long, env = "CLUSTER_SIM_BIND_ADDR")]
    bind_addr: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = ControllerConfig::load_or_default(&args.config)
        .with_context(|| format!("loading config from {}", args.config.display()))?;
    config.apply_env();
    if let Some(bind_addr) = args.bind_addr {
        config.bind_addr = bind_addr;
    }

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(env_filter);
    if config.log_format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    tracing::info!(bind_addr = %config.bind_addr, "starting cluster-sim-server");

    let store: Arc<dyn StateStore> = if config.mysql_configured() {
        let url = config.mysql_url().expect("mysql_configured implies mysql_url");
        tracing::info!("connecting to MySQL state store");
        Arc::new(MySqlStateStore::connect(&url).await?)
    } else {
        tracing::info!("using in-memory state store");
        Arc::new(InMemoryStore::new())
    };

    let cluster = Arc::new(ClusterState::new(
        store,
        config.event_log_capacity,
        config.utilization_history_capacity,
    ));
    cluster
        .load_from_store()
        .await
        .context("restoring cluster state from store")?;

    let runtime = Arc::new(LoggingNodeRuntime::new());
    let publisher = Arc::new(Publisher::default());
    let rescheduler = Arc::new(Rescheduler::new(cluster.clone()));
    let autoscaler = Arc::new(AutoScaler::new(
        cluster.clone(),
        runtime,
        config.default_node_cpu,
        config.default_node_memory,
    ));
    let chaos = Arc::new(ChaosMonkey::new(
        cluster.clone(),
        publisher.clone(),
        rescheduler.clone(),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let health_task = tokio::spawn(health::run(
        cluster.clone(),
        publisher.clone(),
        rescheduler.clone(),
        autoscaler.clone(),
        config.health_check_interval_secs,
        config.heartbeat_threshold_secs,
        shutdown_rx.clone(),
    ));
    let heartbeat_task = tokio::spawn(heartbeat_sim::run(
        cluster.clone(),
        config.node_heartbeat_interval_secs,
        shutdown_rx.clone(),
    ));
    let autoscale_task = tokio::spawn(autoscaler.clone().run(
        config.health_check_interval_secs,
        shutdown_rx.clone(),
    ));
    let utilization_task = tokio::spawn(utilization::run(
        cluster.clone(),
        config.utilization_sample_interval_secs,
        shutdown_rx.clone(),
    ));
    let broadcast_task = tokio::spawn(broadcast_loop(
        cluster.clone(),
        publisher.clone(),
        config.broadcast_interval_secs,
        shutdown_rx.clone(),
    ));

    let app_state = api::AppState {
        cluster: cluster.clone(),
        publisher: publisher.clone(),
        chaos,
    };
    let app = api::router(app_state).route(
        "/metrics",
        axum::routing::get(move || {
            let handle = metrics_handle.clone();
            async move { handle.render() }
        }),
    );

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    tracing::info!(bind_addr = %config.bind_addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    let _ = tokio::join!(
        health_task,
        heartbeat_task,
        autoscale_task,
        utilization_task,
        broadcast_task
    );

    Ok(())
}

/// Periodically rebroadcasts a full state snapshot to WebSocket subscribers
/// and refreshes the fleet/utilisation gauges (§4.8, §10.7).
async fn broadcast_loop(
    cluster: Arc<ClusterState>,
    publisher: Arc<Publisher>,
    interval_secs: u64,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let snapshot = cluster.snapshot().await;
                cluster_sim_core::metrics::update_fleet_gauges(&snapshot);
                let pct = cluster.cpu_utilization_fraction().await * 100.0;
                cluster_sim_core::metrics::update_utilization_gauge(pct);
                publisher.broadcast_state(snapshot);
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    tracing::info!("broadcast loop shutting down");
                    return;
                }
            }
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
