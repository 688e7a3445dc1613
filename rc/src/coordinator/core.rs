//! Reload coordinator task implementation
//!
//! A single task owns the session set and the pending map. Control requests,
//! change batches, connection-state transitions and the flush timer are all
//! events on this task, so none of them ever interleave.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use super::config::CoordinatorConfig;
use super::messages::{
    CONFIGURATION_RELOADED_MESSAGE, CoordinatorMetrics, EVENT_RECEIVED_MESSAGE, ReloadEvent, ReloadRequest,
};
use super::resolve::{PendingMap, accumulate};
use super::timer::FlushTimer;
use crate::domain::{Fqid, ServerId, Session, SessionId};
use crate::feed::{ChangeBatch, FeedSubscription, NotificationFeed};
use crate::reload::ReloadInvoker;
use crate::view::ConfigurationRegistry;

/// Collaborators the coordinator task calls into
pub(crate) struct Collaborators {
    pub feed: Arc<dyn NotificationFeed>,
    pub registry: Arc<dyn ConfigurationRegistry>,
    pub invoker: Arc<dyn ReloadInvoker>,
}

/// State owned exclusively by the coordinator task
struct CoordinatorState {
    sessions: HashMap<SessionId, Session>,
    pending: PendingMap,
    timer: FlushTimer,
    /// Set until the warm-up flush has run
    first_flush: bool,
    metrics: CoordinatorMetrics,
}

impl CoordinatorState {
    fn pending_entries(&self) -> usize {
        self.pending.values().map(|set| set.len()).sum()
    }

    fn refresh_gauges(&mut self) {
        self.metrics.sessions = self.sessions.len();
        self.metrics.pending_entries = self.pending_entries();
    }
}

/// The coordinator task: consumed by [`run`](CoordinatorTask::run)
pub(crate) struct CoordinatorTask {
    config: CoordinatorConfig,
    server: ServerId,
    collaborators: Collaborators,
    rx: mpsc::Receiver<ReloadRequest>,
    subscription: FeedSubscription,
    connection: watch::Receiver<bool>,
    events: broadcast::Sender<ReloadEvent>,
    connected: Arc<AtomicBool>,
}

impl CoordinatorTask {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: CoordinatorConfig,
        server: ServerId,
        collaborators: Collaborators,
        rx: mpsc::Receiver<ReloadRequest>,
        subscription: FeedSubscription,
        connection: watch::Receiver<bool>,
        events: broadcast::Sender<ReloadEvent>,
        connected: Arc<AtomicBool>,
    ) -> Self {
        Self {
            config,
            server,
            collaborators,
            rx,
            subscription,
            connection,
            events,
            connected,
        }
    }

    /// Publish an event; with no subscribers the event is dropped
    fn emit(&self, event: ReloadEvent) {
        debug!(event_type = event.event_type(), "CoordinatorTask::emit");
        let _ = self.events.send(event);
    }

    /// Run the coordinator until shutdown or until every handle is dropped
    pub async fn run(mut self) {
        let mut state = CoordinatorState {
            sessions: HashMap::new(),
            pending: PendingMap::new(),
            timer: FlushTimer::disabled(),
            first_flush: true,
            metrics: CoordinatorMetrics::default(),
        };

        // `connected` stays false until the feed reports a transition
        // Warm-up flush: runs before any reload work can be pending
        state.timer.arm(self.config.warmup_delay());

        let mut changes_open = true;
        let mut connection_open = true;

        info!(server = %self.server, "Reload coordinator started");

        loop {
            tokio::select! {
                biased;

                req = self.rx.recv() => match req {
                    Some(req) => {
                        if let Some(reply_tx) = self.handle_request(&mut state, req) {
                            info!(server = %self.server, "Reload coordinator shutting down");
                            state.timer.disable();
                            self.release().await;
                            let _ = reply_tx.send(());
                            break;
                        }
                    }
                    None => {
                        info!(server = %self.server, "All coordinator handles dropped");
                        state.timer.disable();
                        self.release().await;
                        break;
                    }
                },

                batch = self.subscription.changes.recv(), if changes_open => match batch {
                    Some(batch) => self.on_change_notification(&mut state, batch),
                    None => {
                        warn!(server = %self.server, "Change feed closed");
                        changes_open = false;
                    }
                },

                changed = self.connection.changed(), if connection_open => match changed {
                    Ok(()) => {
                        let connected = *self.connection.borrow_and_update();
                        self.on_connection_state(&mut state, connected);
                    }
                    Err(_) => {
                        warn!(server = %self.server, "Connection state feed closed");
                        connection_open = false;
                    }
                },

                _ = state.timer.expired(), if state.timer.is_armed() => {
                    self.flush(&mut state).await;
                }
            }
        }

        info!(server = %self.server, "Reload coordinator stopped");
    }

    /// Apply a control request; returns the reply channel of a shutdown request
    fn handle_request(&self, state: &mut CoordinatorState, req: ReloadRequest) -> Option<oneshot::Sender<()>> {
        match req {
            ReloadRequest::AddSession { session } => {
                debug!(session = %session.id(), user = %session.user(), "Adding session");
                state.sessions.insert(session.id().clone(), session);
            }

            ReloadRequest::RemoveSession { session_id } => {
                debug!(session = %session_id, "Removing session");
                if let Some(dropped) = state.pending.remove(&session_id) {
                    debug!(session = %session_id, dropped = dropped.len(), "Discarded pending reloads");
                }
                state.sessions.remove(&session_id);
            }

            ReloadRequest::GetPending { reply_tx } => {
                let _ = reply_tx.send(state.pending.clone());
            }

            ReloadRequest::GetMetrics { reply_tx } => {
                state.refresh_gauges();
                let _ = reply_tx.send(state.metrics.clone());
            }

            ReloadRequest::Shutdown { reply_tx } => return Some(reply_tx),
        }
        state.refresh_gauges();
        None
    }

    fn on_change_notification(&self, state: &mut CoordinatorState, batch: ChangeBatch) {
        debug!(server = %self.server, ids = batch.len(), "Change notification received");
        state.metrics.notifications_received += 1;

        let stats = accumulate(
            &batch,
            &state.sessions,
            &mut state.pending,
            self.collaborators.registry.as_ref(),
            &self.config.excluded_server_types,
        );
        state.metrics.ids_excluded += stats.excluded;
        state.metrics.ids_unresolved += stats.unresolved;
        state.refresh_gauges();

        debug!(
            added = stats.added,
            excluded = stats.excluded,
            unresolved = stats.unresolved,
            pending = state.metrics.pending_entries,
            "Pending reloads updated"
        );

        state.timer.arm(self.config.debounce());
        debug!(phase = ?state.timer.phase(), "Flush rescheduled");
        self.emit(ReloadEvent::diagnostic(EVENT_RECEIVED_MESSAGE));
    }

    fn on_connection_state(&self, state: &mut CoordinatorState, connected: bool) {
        info!(server = %self.server, connected, "Feed connection state changed");
        self.connected.store(connected, Ordering::SeqCst);
        state.metrics.connected = connected;
        self.emit(ReloadEvent::ConnectionStateChanged { connected });
    }

    async fn flush(&self, state: &mut CoordinatorState) {
        state.timer.disable();

        let mut reloads = 0;
        if state.first_flush {
            debug!(pending = state.pending_entries(), "Warm-up flush, skipping reloads");
        } else {
            // Drain before invoking so nothing borrowed from the state is held
            // across reload calls
            let batch: Vec<(Session, Fqid)> = state
                .pending
                .drain()
                .filter_map(|(session_id, servers)| state.sessions.get(&session_id).map(|s| (s.clone(), servers)))
                .flat_map(|(session, servers)| servers.into_iter().map(move |server| (session.clone(), server)))
                .collect();

            for (session, server) in batch {
                reloads += 1;
                state.metrics.reloads_invoked += 1;
                if let Err(e) = self.collaborators.invoker.reload(&session, &server).await {
                    warn!(session = %session.id(), %server, error = %e, "Reload failed");
                    state.metrics.reload_failures += 1;
                }
            }
        }
        state.first_flush = false;
        state.metrics.flushes += 1;
        state.refresh_gauges();

        info!(server = %self.server, reloads, "Configuration flush completed");
        self.emit(ReloadEvent::diagnostic(CONFIGURATION_RELOADED_MESSAGE));
        self.emit(ReloadEvent::FlushCompleted { reloads });
    }

    /// Drop the topic subscription and the feed connection
    async fn release(&self) {
        let feed = &self.collaborators.feed;
        if let Err(e) = feed.unsubscribe(&self.server, self.subscription.id).await {
            warn!(server = %self.server, error = %e, "Failed to unsubscribe from change feed");
        }
        if let Err(e) = feed.stop(&self.server).await {
            warn!(server = %self.server, error = %e, "Failed to release feed connection");
        }
    }
}
