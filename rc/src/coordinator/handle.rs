//! ReloadCoordinator - client interface to the coordinator task

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use eyre::{Result, WrapErr, eyre};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};

use super::config::CoordinatorConfig;
use super::core::{Collaborators, CoordinatorTask};
use super::messages::{CoordinatorMetrics, PendingSnapshot, ReloadEvent, ReloadRequest};
use crate::domain::{ServerId, Session, SessionId};
use crate::feed::{CONFIGURATION_CHANGED_TOPIC, NotificationFeed};
use crate::reload::ReloadInvoker;
use crate::view::ConfigurationRegistry;

/// Handle to a running reload coordinator
///
/// This handle is cloneable; all clones talk to the same coordinator task.
/// The task stops on [`teardown`](Self::teardown) or once every clone has
/// been dropped, releasing its feed connection either way.
#[derive(Clone)]
pub struct ReloadCoordinator {
    server: ServerId,
    tx: mpsc::Sender<ReloadRequest>,
    events: broadcast::Sender<ReloadEvent>,
    connected: Arc<AtomicBool>,
    torn_down: Arc<AtomicBool>,
}

impl ReloadCoordinator {
    /// Connect to the feed for `server` and spawn the coordinator task
    ///
    /// Opens (or shares) the feed connection, subscribes to configuration
    /// change indications and connection-state transitions, and schedules
    /// the warm-up flush.
    pub async fn start(
        config: CoordinatorConfig,
        server: ServerId,
        feed: Arc<dyn NotificationFeed>,
        registry: Arc<dyn ConfigurationRegistry>,
        invoker: Arc<dyn ReloadInvoker>,
    ) -> Result<Self> {
        debug!(%server, ?config, "ReloadCoordinator::start: called");
        config.validate().wrap_err("Invalid coordinator configuration")?;

        feed.start(&server)
            .await
            .wrap_err_with(|| format!("Failed to open feed connection for {}", server))?;

        let subscription = match feed.subscribe(&server, CONFIGURATION_CHANGED_TOPIC).await {
            Ok(subscription) => subscription,
            Err(e) => {
                release_after_failure(feed.as_ref(), &server).await;
                return Err(e).wrap_err("Failed to subscribe to configuration changes");
            }
        };

        let connection = match feed.connection_state(&server).await {
            Ok(connection) => connection,
            Err(e) => {
                if let Err(e) = feed.unsubscribe(&server, subscription.id).await {
                    warn!(%server, error = %e, "Failed to unsubscribe after start failure");
                }
                release_after_failure(feed.as_ref(), &server).await;
                return Err(e).wrap_err("Failed to watch feed connection state");
            }
        };

        let (tx, rx) = mpsc::channel(config.channel_buffer);
        let (events, _) = broadcast::channel(config.event_capacity);
        let connected = Arc::new(AtomicBool::new(false));

        let task = CoordinatorTask::new(
            config,
            server.clone(),
            Collaborators {
                feed,
                registry,
                invoker,
            },
            rx,
            subscription,
            connection,
            events.clone(),
            connected.clone(),
        );
        tokio::spawn(task.run());

        info!(%server, "Reload coordinator spawned");

        Ok(Self {
            server,
            tx,
            events,
            connected,
            torn_down: Arc::new(AtomicBool::new(false)),
        })
    }

    /// The server this coordinator watches
    pub fn server(&self) -> &ServerId {
        &self.server
    }

    /// Whether the upstream feed was connected at its last transition
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Subscribe to coordinator events
    ///
    /// Only events emitted after subscription are received.
    pub fn subscribe(&self) -> broadcast::Receiver<ReloadEvent> {
        debug!(server = %self.server, "ReloadCoordinator::subscribe: new subscriber");
        self.events.subscribe()
    }

    /// Make a session eligible for future reloads
    pub async fn add_session(&self, session: Session) -> Result<()> {
        debug!(session = %session.id(), "ReloadCoordinator::add_session: called");
        self.send(ReloadRequest::AddSession { session }).await
    }

    /// Forget a session, discarding its pending reloads
    pub async fn remove_session(&self, session_id: &SessionId) -> Result<()> {
        debug!(session = %session_id, "ReloadCoordinator::remove_session: called");
        self.send(ReloadRequest::RemoveSession {
            session_id: session_id.clone(),
        })
        .await
    }

    /// Get the reloads waiting for the next flush
    pub async fn pending(&self) -> Result<PendingSnapshot> {
        debug!(server = %self.server, "ReloadCoordinator::pending: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(ReloadRequest::GetPending { reply_tx }).await?;
        reply_rx
            .await
            .map_err(|_| eyre!("Reload coordinator stopped before reply"))
    }

    /// Get current coordinator metrics
    pub async fn metrics(&self) -> Result<CoordinatorMetrics> {
        debug!(server = %self.server, "ReloadCoordinator::metrics: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(ReloadRequest::GetMetrics { reply_tx }).await?;
        reply_rx
            .await
            .map_err(|_| eyre!("Reload coordinator stopped before reply"))
    }

    /// Stop the coordinator and release its feed connection
    ///
    /// Waits for a flush that is already running to finish. Calling this more
    /// than once, from any clone, is a no-op.
    pub async fn teardown(&self) -> Result<()> {
        debug!(server = %self.server, "ReloadCoordinator::teardown: called");
        if self.torn_down.swap(true, Ordering::SeqCst) {
            debug!("ReloadCoordinator::teardown: already torn down");
            return Ok(());
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        if self.tx.send(ReloadRequest::Shutdown { reply_tx }).await.is_err() {
            debug!("ReloadCoordinator::teardown: task already stopped");
            return Ok(());
        }
        reply_rx
            .await
            .map_err(|_| eyre!("Reload coordinator stopped before releasing the feed"))
    }

    async fn send(&self, req: ReloadRequest) -> Result<()> {
        self.tx
            .send(req)
            .await
            .map_err(|_| eyre!("Reload coordinator channel closed"))
    }
}

async fn release_after_failure(feed: &dyn NotificationFeed, server: &ServerId) {
    if let Err(e) = feed.stop(server).await {
        warn!(%server, error = %e, "Failed to release feed connection after start failure");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::LocalFeed;
    use crate::reload::TracingInvoker;
    use crate::view::MemoryConfiguration;
    use std::time::Duration;
    use uuid::Uuid;

    async fn start(feed: Arc<LocalFeed>, server: ServerId) -> ReloadCoordinator {
        ReloadCoordinator::start(
            CoordinatorConfig::default(),
            server,
            feed,
            Arc::new(MemoryConfiguration::new()),
            Arc::new(TracingInvoker),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_start_references_feed() {
        let feed = Arc::new(LocalFeed::new());
        let server = ServerId::new("XPCO", Uuid::now_v7());
        let coordinator = start(feed.clone(), server.clone()).await;

        assert_eq!(coordinator.server(), &server);
        assert_eq!(feed.ref_count(&server).await, 1);
        assert_eq!(feed.subscription_count(&server).await, 1);

        coordinator.teardown().await.unwrap();
        assert_eq!(feed.ref_count(&server).await, 0);
    }

    #[tokio::test]
    async fn test_start_rejects_zero_channel_buffer() {
        let feed = Arc::new(LocalFeed::new());
        let server = ServerId::new("XPCO", Uuid::now_v7());
        let config: CoordinatorConfig = serde_yaml::from_str("channel-buffer: 0").unwrap();

        let result = ReloadCoordinator::start(
            config,
            server.clone(),
            feed.clone(),
            Arc::new(MemoryConfiguration::new()),
            Arc::new(TracingInvoker),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(feed.ref_count(&server).await, 0);
    }

    #[tokio::test]
    async fn test_start_rejects_zero_event_capacity() {
        let feed = Arc::new(LocalFeed::new());
        let server = ServerId::new("XPCO", Uuid::now_v7());
        let config = CoordinatorConfig {
            event_capacity: 0,
            ..Default::default()
        };

        let result = ReloadCoordinator::start(
            config,
            server.clone(),
            feed.clone(),
            Arc::new(MemoryConfiguration::new()),
            Arc::new(TracingInvoker),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(feed.ref_count(&server).await, 0);
    }

    #[tokio::test]
    async fn test_connected_only_after_transition() {
        let feed = Arc::new(LocalFeed::new());
        let server = ServerId::new("XPCO", Uuid::now_v7());
        let coordinator = start(feed.clone(), server.clone()).await;
        assert!(!coordinator.is_connected());
        assert!(!coordinator.metrics().await.unwrap().connected);

        feed.set_connected(&server, true).await.unwrap();
        for _ in 0..50 {
            if coordinator.is_connected() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(coordinator.is_connected());

        coordinator.teardown().await.unwrap();
    }

    #[tokio::test]
    async fn test_teardown_is_idempotent() {
        let feed = Arc::new(LocalFeed::new());
        let server = ServerId::new("XPCO", Uuid::now_v7());
        let coordinator = start(feed, server).await;
        let clone = coordinator.clone();

        coordinator.teardown().await.unwrap();
        coordinator.teardown().await.unwrap();
        clone.teardown().await.unwrap();

        assert!(coordinator.metrics().await.is_err());
    }

    #[tokio::test]
    async fn test_shared_connection_survives_one_teardown() {
        let feed = Arc::new(LocalFeed::new());
        let server = ServerId::new("XPCO", Uuid::now_v7());
        let first = start(feed.clone(), server.clone()).await;
        let second = start(feed.clone(), server.clone()).await;
        assert_eq!(feed.ref_count(&server).await, 2);

        first.teardown().await.unwrap();
        assert_eq!(feed.ref_count(&server).await, 1);
        assert_eq!(feed.subscription_count(&server).await, 1);
        assert!(second.metrics().await.is_ok());

        second.teardown().await.unwrap();
        assert_eq!(feed.ref_count(&server).await, 0);
    }

    #[tokio::test]
    async fn test_dropping_handles_releases_feed() {
        let feed = Arc::new(LocalFeed::new());
        let server = ServerId::new("XPCO", Uuid::now_v7());
        let coordinator = start(feed.clone(), server.clone()).await;
        drop(coordinator);

        for _ in 0..50 {
            if feed.ref_count(&server).await == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(feed.ref_count(&server).await, 0);
    }
}
