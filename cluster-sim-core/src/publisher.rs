//! Publisher: fan-out of state snapshots and alerts to connected observers (§4.8).

use crate::types::ClusterSnapshot;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// A single message delivered over the real-time channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    StateUpdate {
        nodes: Vec<crate::types::Node>,
        logs: Vec<crate::types::EventLogEntry>,
        history: Vec<crate::types::UtilizationSample>,
    },
    Alert {
        msg: String,
    },
}

impl Frame {
    pub fn state_update(snapshot: ClusterSnapshot) -> Self {
        Frame::StateUpdate {
            nodes: snapshot.nodes,
            logs: snapshot.logs,
            history: snapshot.history,
        }
    }

    pub fn alert(msg: impl Into<String>) -> Self {
        Frame::Alert { msg: msg.into() }
    }
}

/// Broadcast-channel backed implementation of the Publisher capability.
///
/// A new observer subscribes via [`Publisher::subscribe`] and immediately
/// receives the next periodic `state_update`, plus any `alert` emitted in
/// between (§6.1: "A new connection immediately receives one state_update
/// frame before joining the periodic broadcast" is satisfied by the caller
/// sending an initial frame directly to the new receiver before relying on
/// the shared channel).
pub struct Publisher {
    tx: broadcast::Sender<Frame>,
}

impl Publisher {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Frame> {
        self.tx.subscribe()
    }

    /// Broadcasts a state snapshot; silently drops if there are no subscribers.
    pub fn broadcast_state(&self, snapshot: ClusterSnapshot) {
        let _ = self.tx.send(Frame::state_update(snapshot));
    }

    /// Broadcasts a one-off alert (e.g. node failure).
    pub fn broadcast_alert(&self, msg: impl Into<String>) {
        let _ = self.tx.send(Frame::alert(msg));
    }
}

impl Default for Publisher {
    fn default() -> Self {
        Self::new(256)
    }
}
