//! Message types for the reload coordinator

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::domain::{Fqid, Session, SessionId};

/// Diagnostic text emitted for every accepted change notification
pub const EVENT_RECEIVED_MESSAGE: &str = "--- Event received to load new configuration";

/// Diagnostic text emitted for every flush
pub const CONFIGURATION_RELOADED_MESSAGE: &str = "--- configuration reloaded";

/// Events published by the coordinator to its subscribers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ReloadEvent {
    /// Human-readable progress message
    Diagnostic { message: String },

    /// A flush finished; `reloads` is the number of reloads it invoked
    FlushCompleted { reloads: usize },

    /// The upstream feed connected or disconnected
    ConnectionStateChanged { connected: bool },
}

impl ReloadEvent {
    pub fn diagnostic(message: impl Into<String>) -> Self {
        Self::Diagnostic {
            message: message.into(),
        }
    }

    /// Short name of the event variant
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Diagnostic { .. } => "diagnostic",
            Self::FlushCompleted { .. } => "flush-completed",
            Self::ConnectionStateChanged { .. } => "connection-state-changed",
        }
    }
}

/// Snapshot of the pending map: session -> owning servers awaiting reload
pub type PendingSnapshot = HashMap<SessionId, HashSet<Fqid>>;

/// Internal requests to the coordinator task
#[derive(Debug)]
pub enum ReloadRequest {
    /// Make a session eligible for future reloads
    AddSession { session: Session },

    /// Forget a session and its pending reloads
    RemoveSession { session_id: SessionId },

    /// Get the current pending map
    GetPending { reply_tx: oneshot::Sender<PendingSnapshot> },

    /// Get current metrics
    GetMetrics {
        reply_tx: oneshot::Sender<CoordinatorMetrics>,
    },

    /// Release the feed and stop the coordinator
    Shutdown { reply_tx: oneshot::Sender<()> },
}

/// Coordinator metrics for observability
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CoordinatorMetrics {
    pub sessions: usize,
    pub pending_entries: usize,
    pub notifications_received: u64,
    pub ids_excluded: u64,
    pub ids_unresolved: u64,
    pub flushes: u64,
    pub reloads_invoked: u64,
    pub reload_failures: u64,
    pub connected: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reload_event_serialization() {
        let event = ReloadEvent::FlushCompleted { reloads: 3 };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event\":\"flush-completed\""));
        assert!(json.contains("\"reloads\":3"));

        let parsed: ReloadEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn test_event_type_names() {
        assert_eq!(ReloadEvent::diagnostic("x").event_type(), "diagnostic");
        assert_eq!(
            ReloadEvent::ConnectionStateChanged { connected: true }.event_type(),
            "connection-state-changed"
        );
    }
}
