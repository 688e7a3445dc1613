//! Notification feed seam
//!
//! The feed delivers batches of changed resource ids for a server and
//! reports whether its upstream connection is alive. Connections are shared
//! and reference counted per server by the feed, not by its users.

mod error;
mod local;

pub use error::FeedError;
pub use local::LocalFeed;

use std::fmt;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

use crate::domain::{Fqid, ServerId};

/// Topic carrying configuration change indications
pub const CONFIGURATION_CHANGED_TOPIC: &str = "system.configuration-changed";

/// One change indication: the ids touched by a configuration change
pub type ChangeBatch = Vec<Fqid>;

/// Identifies a topic subscription on a feed connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// A live topic subscription
#[derive(Debug)]
pub struct FeedSubscription {
    pub id: SubscriptionId,
    /// Change batches in delivery order; closes when the connection is released
    pub changes: mpsc::Receiver<ChangeBatch>,
}

/// Source of change notifications and connection-state transitions
#[async_trait]
pub trait NotificationFeed: Send + Sync {
    /// Open (or add a reference to) the shared connection for `server`
    async fn start(&self, server: &ServerId) -> Result<(), FeedError>;

    /// Subscribe to a topic on an open connection
    async fn subscribe(&self, server: &ServerId, topic: &str) -> Result<FeedSubscription, FeedError>;

    /// Watch the connection state of an open connection
    async fn connection_state(&self, server: &ServerId) -> Result<watch::Receiver<bool>, FeedError>;

    /// Drop a topic subscription
    async fn unsubscribe(&self, server: &ServerId, id: SubscriptionId) -> Result<(), FeedError>;

    /// Release one reference to the shared connection for `server`
    async fn stop(&self, server: &ServerId) -> Result<(), FeedError>;
}
