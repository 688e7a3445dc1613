//! In-process notification feed
//!
//! Keeps one reference-counted channel per server. Publishers push change
//! batches and connection-state transitions; subscribers receive them through
//! the [`NotificationFeed`] interface.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc, watch};
use tracing::{debug, info, warn};

use super::{ChangeBatch, FeedError, FeedSubscription, NotificationFeed, SubscriptionId};
use crate::domain::ServerId;

/// Default per-subscription buffer (batches)
pub const DEFAULT_SUBSCRIPTION_BUFFER: usize = 256;

struct Subscriber {
    topic: String,
    tx: mpsc::Sender<ChangeBatch>,
}

/// Shared connection state for one server
struct ServerChannel {
    refs: usize,
    connected: watch::Sender<bool>,
    subscribers: HashMap<SubscriptionId, Subscriber>,
}

/// In-process [`NotificationFeed`]
pub struct LocalFeed {
    channels: Mutex<HashMap<ServerId, ServerChannel>>,
    next_subscription: AtomicU64,
    buffer: usize,
}

impl LocalFeed {
    pub fn new() -> Self {
        Self::with_buffer(DEFAULT_SUBSCRIPTION_BUFFER)
    }

    /// Create a feed with the given per-subscription buffer size
    pub fn with_buffer(buffer: usize) -> Self {
        debug!(buffer, "LocalFeed::with_buffer: called");
        Self {
            channels: Mutex::new(HashMap::new()),
            next_subscription: AtomicU64::new(1),
            buffer,
        }
    }

    /// Deliver a batch to every subscriber of `topic` on `server`
    ///
    /// Returns the number of subscriptions the batch was delivered to.
    pub async fn publish(&self, server: &ServerId, topic: &str, batch: ChangeBatch) -> Result<usize, FeedError> {
        debug!(%server, %topic, ids = batch.len(), "LocalFeed::publish: called");
        // Clone the senders so no lock is held while waiting on a full channel
        let targets: Vec<mpsc::Sender<ChangeBatch>> = {
            let channels = self.channels.lock().await;
            let channel = channels.get(server).ok_or_else(|| FeedError::NotStarted(server.clone()))?;
            channel
                .subscribers
                .values()
                .filter(|s| s.topic == topic)
                .map(|s| s.tx.clone())
                .collect()
        };

        let mut delivered = 0;
        for tx in targets {
            if tx.send(batch.clone()).await.is_ok() {
                delivered += 1;
            } else {
                warn!(%server, %topic, "LocalFeed::publish: subscriber dropped");
            }
        }
        Ok(delivered)
    }

    /// Report a connection-state transition for `server`
    pub async fn set_connected(&self, server: &ServerId, connected: bool) -> Result<(), FeedError> {
        debug!(%server, connected, "LocalFeed::set_connected: called");
        let channels = self.channels.lock().await;
        let channel = channels.get(server).ok_or_else(|| FeedError::NotStarted(server.clone()))?;
        channel.connected.send_replace(connected);
        Ok(())
    }

    /// Number of open references to the connection for `server`
    pub async fn ref_count(&self, server: &ServerId) -> usize {
        self.channels.lock().await.get(server).map(|c| c.refs).unwrap_or(0)
    }

    /// Number of live subscriptions on `server`
    pub async fn subscription_count(&self, server: &ServerId) -> usize {
        self.channels
            .lock()
            .await
            .get(server)
            .map(|c| c.subscribers.len())
            .unwrap_or(0)
    }
}

impl Default for LocalFeed {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationFeed for LocalFeed {
    async fn start(&self, server: &ServerId) -> Result<(), FeedError> {
        let mut channels = self.channels.lock().await;
        let channel = channels.entry(server.clone()).or_insert_with(|| {
            info!(%server, "Opening feed connection");
            let (connected, _) = watch::channel(true);
            ServerChannel {
                refs: 0,
                connected,
                subscribers: HashMap::new(),
            }
        });
        channel.refs += 1;
        debug!(%server, refs = channel.refs, "LocalFeed::start: referenced");
        Ok(())
    }

    async fn subscribe(&self, server: &ServerId, topic: &str) -> Result<FeedSubscription, FeedError> {
        let mut channels = self.channels.lock().await;
        let channel = channels
            .get_mut(server)
            .ok_or_else(|| FeedError::NotStarted(server.clone()))?;

        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(self.buffer);
        channel.subscribers.insert(
            id,
            Subscriber {
                topic: topic.to_string(),
                tx,
            },
        );
        debug!(%server, %topic, %id, "LocalFeed::subscribe: registered");
        Ok(FeedSubscription { id, changes: rx })
    }

    async fn connection_state(&self, server: &ServerId) -> Result<watch::Receiver<bool>, FeedError> {
        let channels = self.channels.lock().await;
        let channel = channels.get(server).ok_or_else(|| FeedError::NotStarted(server.clone()))?;
        Ok(channel.connected.subscribe())
    }

    async fn unsubscribe(&self, server: &ServerId, id: SubscriptionId) -> Result<(), FeedError> {
        let mut channels = self.channels.lock().await;
        let channel = channels
            .get_mut(server)
            .ok_or_else(|| FeedError::NotStarted(server.clone()))?;
        if channel.subscribers.remove(&id).is_none() {
            return Err(FeedError::UnknownSubscription {
                server: server.clone(),
                id,
            });
        }
        debug!(%server, %id, "LocalFeed::unsubscribe: removed");
        Ok(())
    }

    async fn stop(&self, server: &ServerId) -> Result<(), FeedError> {
        let mut channels = self.channels.lock().await;
        let channel = channels
            .get_mut(server)
            .ok_or_else(|| FeedError::NotStarted(server.clone()))?;
        channel.refs -= 1;
        debug!(%server, refs = channel.refs, "LocalFeed::stop: released");
        if channel.refs == 0 {
            info!(%server, "Closing feed connection");
            channels.remove(server);
        }
        Ok(())
    }
}
