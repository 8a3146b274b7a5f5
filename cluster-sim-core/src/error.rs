//! Controller error types

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced by cluster operations
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum ClusterError {
    #[error("missing field: {0}")]
    MissingField(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("no capacity for pod")]
    NoCapacity,

    #[error("no active nodes")]
    NoActiveNodes,

    #[error("state store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("node runtime unavailable: {0}")]
    RuntimeUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ClusterError {
    /// Error type as a string, for metrics labeling.
    pub fn error_type(&self) -> &'static str {
        match self {
            ClusterError::MissingField(_) => "missing_field",
            ClusterError::NotFound(_) => "not_found",
            ClusterError::NoCapacity => "no_capacity",
            ClusterError::NoActiveNodes => "no_active_nodes",
            ClusterError::StoreUnavailable(_) => "store_unavailable",
            ClusterError::RuntimeUnavailable(_) => "runtime_unavailable",
            ClusterError::Internal(_) => "internal",
        }
    }

    /// HTTP status code this error maps to.
    pub fn status_code(&self) -> u16 {
        match self {
            ClusterError::MissingField(_) => 400,
            ClusterError::NotFound(_) => 404,
            ClusterError::NoCapacity => 400,
            ClusterError::NoActiveNodes => 400,
            ClusterError::StoreUnavailable(_) => 503,
            ClusterError::RuntimeUnavailable(_) => 502,
            ClusterError::Internal(_) => 500,
        }
    }
}

impl From<sqlx::Error> for ClusterError {
    fn from(err: sqlx::Error) -> Self {
        ClusterError::StoreUnavailable(err.to_string())
    }
}

impl From<std::io::Error> for ClusterError {
    fn from(err: std::io::Error) -> Self {
        ClusterError::Internal(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ClusterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_taxonomy() {
        assert_eq!(ClusterError::MissingField("cpu".into()).status_code(), 400);
        assert_eq!(ClusterError::NotFound("n1".into()).status_code(), 404);
        assert_eq!(ClusterError::NoCapacity.status_code(), 400);
        assert_eq!(
            ClusterError::StoreUnavailable("down".into()).status_code(),
            503
        );
        assert_eq!(
            ClusterError::RuntimeUnavailable("none".into()).status_code(),
            502
        );
    }

    #[test]
    fn error_type_labels_are_stable() {
        assert_eq!(ClusterError::NoActiveNodes.error_type(), "no_active_nodes");
        assert_eq!(ClusterError::Internal("x".into()).error_type(), "internal");
    }
}
