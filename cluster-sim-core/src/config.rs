//! Controller configuration
//!
//! Layered the way this project's other services build theirs: compiled-in
//! defaults via `#[serde(default = "fn")]`, overridable by an optional config
//! file, then by environment variables, then by CLI flags (see
//! `cluster-sim-server`'s `Args`).

use serde::{Deserialize, Serialize};

/// Top-level controller configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ControllerConfig {
    /// Address the HTTP API binds to.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// HealthMonitor loop period, seconds.
    #[serde(default = "default_health_check_interval_secs")]
    pub health_check_interval_secs: u64,

    /// Heartbeat staleness threshold, seconds.
    #[serde(default = "default_heartbeat_threshold_secs")]
    pub heartbeat_threshold_secs: u64,

    /// HeartbeatSimulator loop period, seconds.
    #[serde(default = "default_node_heartbeat_interval_secs")]
    pub node_heartbeat_interval_secs: u64,

    /// UtilizationSampler loop period, seconds.
    #[serde(default = "default_utilization_sample_interval_secs")]
    pub utilization_sample_interval_secs: u64,

    /// Publisher broadcast period, seconds.
    #[serde(default = "default_broadcast_interval_secs")]
    pub broadcast_interval_secs: u64,

    /// Default CPU for a node created by the AutoScaler.
    #[serde(default = "default_node_cpu")]
    pub default_node_cpu: i64,

    /// Default memory (GiB) for a node created by the AutoScaler.
    #[serde(default = "default_node_memory")]
    pub default_node_memory: i64,

    /// Reserved for future rate limiting; not currently consulted anywhere.
    #[serde(default = "default_auto_scale_cooldown_secs")]
    pub auto_scale_cooldown_secs: u64,

    /// Capacity of the in-memory event log ring.
    #[serde(default = "default_event_log_capacity")]
    pub event_log_capacity: usize,

    /// Capacity of the in-memory utilisation history ring.
    #[serde(default = "default_utilization_history_capacity")]
    pub utilization_history_capacity: usize,

    /// StateStore connection settings, historic `MYSQL_*` env names.
    #[serde(default)]
    pub mysql_host: Option<String>,
    #[serde(default)]
    pub mysql_user: Option<String>,
    #[serde(default)]
    pub mysql_password: Option<String>,
    #[serde(default)]
    pub mysql_database: Option<String>,

    /// `json` or `pretty`; selects the tracing formatter.
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

fn default_bind_addr() -> String {
    "0.0.0.0:5000".to_string()
}
fn default_health_check_interval_secs() -> u64 {
    5
}
fn default_heartbeat_threshold_secs() -> u64 {
    15
}
fn default_node_heartbeat_interval_secs() -> u64 {
    7
}
fn default_utilization_sample_interval_secs() -> u64 {
    10
}
fn default_broadcast_interval_secs() -> u64 {
    3
}
fn default_node_cpu() -> i64 {
    8
}
fn default_node_memory() -> i64 {
    16
}
fn default_auto_scale_cooldown_secs() -> u64 {
    60
}
fn default_event_log_capacity() -> usize {
    50
}
fn default_utilization_history_capacity() -> usize {
    50
}
fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            health_check_interval_secs: default_health_check_interval_secs(),
            heartbeat_threshold_secs: default_heartbeat_threshold_secs(),
            node_heartbeat_interval_secs: default_node_heartbeat_interval_secs(),
            utilization_sample_interval_secs: default_utilization_sample_interval_secs(),
            broadcast_interval_secs: default_broadcast_interval_secs(),
            default_node_cpu: default_node_cpu(),
            default_node_memory: default_node_memory(),
            auto_scale_cooldown_secs: default_auto_scale_cooldown_secs(),
            event_log_capacity: default_event_log_capacity(),
            utilization_history_capacity: default_utilization_history_capacity(),
            mysql_host: None,
            mysql_user: None,
            mysql_password: None,
            mysql_database: None,
            log_format: default_log_format(),
        }
    }
}

impl ControllerConfig {
    /// Loads config from `path` if it exists (JSON; the object may omit any
    /// subset of fields, each falling back to its compiled-in default),
    /// otherwise returns compiled-in defaults. Does not apply environment
    /// overlays; call [`ControllerConfig::apply_env`] afterwards.
    pub fn load_or_default(path: &std::path::Path) -> crate::error::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text)
            .map_err(|e| crate::error::ClusterError::Internal(format!("invalid config file: {e}")))
    }

    /// Overlay values from the historic `MYSQL_*` environment variables;
    /// a present variable always wins over whatever was loaded from
    /// a config file.
    pub fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("MYSQL_HOST") {
            self.mysql_host = Some(v);
        }
        if let Ok(v) = std::env::var("MYSQL_USER") {
            self.mysql_user = Some(v);
        }
        if let Ok(v) = std::env::var("MYSQL_PASSWORD") {
            self.mysql_password = Some(v);
        }
        if let Ok(v) = std::env::var("MYSQL_DATABASE") {
            self.mysql_database = Some(v);
        }
        if let Ok(v) = std::env::var("LOG_FORMAT") {
            self.log_format = v;
        }
    }

    /// Whether enough MySQL settings are present to attempt a connection.
    pub fn mysql_configured(&self) -> bool {
        self.mysql_host.is_some() && self.mysql_database.is_some()
    }

    /// Build a `mysql://` connection URL from the configured parts.
    pub fn mysql_url(&self) -> Option<String> {
        let host = self.mysql_host.as_deref()?;
        let database = self.mysql_database.as_deref()?;
        let user = self.mysql_user.as_deref().unwrap_or("root");
        let password = self.mysql_password.as_deref().unwrap_or("");
        Some(format!("mysql://{user}:{password}@{host}/{database}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_intervals() {
        let cfg = ControllerConfig::default();
        assert_eq!(cfg.bind_addr, "0.0.0.0:5000");
        assert_eq!(cfg.health_check_interval_secs, 5);
        assert_eq!(cfg.heartbeat_threshold_secs, 15);
        assert_eq!(cfg.node_heartbeat_interval_secs, 7);
        assert_eq!(cfg.utilization_sample_interval_secs, 10);
        assert_eq!(cfg.broadcast_interval_secs, 3);
        assert_eq!(cfg.default_node_cpu, 8);
        assert_eq!(cfg.default_node_memory, 16);
        assert_eq!(cfg.auto_scale_cooldown_secs, 60);
    }

    #[test]
    fn mysql_url_requires_host_and_database() {
        let mut cfg = ControllerConfig::default();
        assert!(cfg.mysql_url().is_none());
        cfg.mysql_host = Some("localhost".into());
        cfg.mysql_database = Some("cluster_sim".into());
        assert_eq!(
            cfg.mysql_url().unwrap(),
            "mysql://root:@localhost/cluster_sim"
        );
    }

    #[test]
    fn deserializes_with_partial_fields() {
        let cfg: ControllerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.event_log_capacity, 50);
    }

    #[test]
    fn load_or_default_falls_back_when_file_missing() {
        let cfg = ControllerConfig::load_or_default(std::path::Path::new(
            "/nonexistent/cluster-sim.json",
        ))
        .unwrap();
        assert_eq!(cfg.bind_addr, "0.0.0.0:5000");
    }

    #[test]
    fn load_or_default_reads_partial_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cluster-sim.json");
        std::fs::write(&path, r#"{"health_check_interval_secs": 30}"#).unwrap();
        let cfg = ControllerConfig::load_or_default(&path).unwrap();
        assert_eq!(cfg.health_check_interval_secs, 30);
        assert_eq!(cfg.heartbeat_threshold_secs, 15);
    }
}
