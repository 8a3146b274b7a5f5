//! UtilizationSampler: periodically computes and records fleet CPU
//! utilisation (§4.7).

use crate::clock::now_secs;
use crate::state::ClusterState;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

pub async fn sample_once(state: &Arc<ClusterState>) {
    let fraction = state.cpu_utilization_fraction().await;
    let pct = fraction * 100.0;
    let now = now_secs();
    if let Err(err) = state.append_utilization_sample(now, pct).await {
        warn!(error = %err, "utilization sampler failed to persist sample");
    }
}

pub async fn run(state: Arc<ClusterState>, interval_secs: u64, mut shutdown: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
    loop {
        tokio::select! {
            _ = interval.tick() => {
                sample_once(&state).await;
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("utilization sampler shutting down");
                    return;
                }
            }
        }
    }
}
