//! Container runtime capability
//!
//! No container engine dependency is introduced anywhere in this crate; the
//! only adapter provided is [`logging::LoggingNodeRuntime`], which logs the
//! calls it would have made and returns synthetic handles. This satisfies
//! §6.3 and keeps the core testable without Docker (§9).

mod logging;

pub use logging::LoggingNodeRuntime;

use crate::error::Result;
use crate::types::Node;
use async_trait::async_trait;

/// Creates/destroys node sandboxes on a named network (§6.3).
#[async_trait]
pub trait NodeRuntime: Send + Sync {
    /// Idempotent creation of a bridge network named `net_<group>`.
    async fn ensure_network(&self, group: &str) -> Result<Option<String>>;

    /// Starts a container for `node`; returns its container id if launched.
    async fn launch(&self, node: &Node) -> Result<Option<String>>;

    /// Best-effort stop; errors are logged, not fatal.
    async fn stop(&self, container_id: &str);
}
