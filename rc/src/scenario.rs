//! Scripted replay of a notification feed against a reload coordinator
//!
//! A scenario names servers, configuration objects and sessions, then lists
//! timed steps (change notifications, connection transitions, session
//! removals). Replaying it drives a real coordinator over an in-process feed
//! and records every event and reload it produces.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use eyre::{Context, Result, eyre};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::coordinator::{CoordinatorConfig, CoordinatorMetrics, ReloadCoordinator, ReloadEvent};
use crate::domain::{Fqid, Item, Kind, ServerId, Session, SessionId};
use crate::feed::{CONFIGURATION_CHANGED_TOPIC, LocalFeed};
use crate::reload::ReloadInvoker;
use crate::view::MemoryConfiguration;

/// How long to wait for the warm-up flush before replaying steps
const WARMUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Scenario file contents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Name of the server whose feed the coordinator subscribes to
    #[serde(rename = "feed-server")]
    pub feed_server: String,

    pub servers: Vec<ServerSpec>,

    #[serde(default)]
    pub objects: Vec<ObjectSpec>,

    pub sessions: Vec<SessionSpec>,

    /// Written as single-key maps, e.g. `- notify: [lobby-cam]`
    #[serde(with = "serde_yaml::with::singleton_map_recursive")]
    pub steps: Vec<Step>,

    /// Time to let the last flush settle before teardown
    #[serde(rename = "settle-ms", default = "default_settle_ms")]
    pub settle_ms: u64,

    /// Overrides the configured debounce window
    #[serde(rename = "debounce-ms", default, skip_serializing_if = "Option::is_none")]
    pub debounce_ms: Option<u64>,
}

fn default_settle_ms() -> u64 {
    100
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub server_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectSpec {
    pub name: String,
    /// Name of the owning server
    pub server: String,
    pub kind: Kind,
    /// Name of the parent object or server
    #[serde(default)]
    pub parent: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSpec {
    pub user: String,
}

/// One timed action of a scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Step {
    /// Publish a change batch naming objects or servers
    Notify(Vec<String>),
    /// Report a feed connection transition
    Connection(bool),
    /// Deregister every session of a user
    RemoveSession(String),
    /// Sleep
    WaitMs(u64),
}

impl Scenario {
    /// Load a scenario from a YAML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).context(format!("Failed to read scenario {}", path.display()))?;
        Self::from_yaml(&content).context(format!("Failed to parse scenario {}", path.display()))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }
}

/// A line of replay output
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ReplayEntry {
    Event { at: DateTime<Utc>, event: ReloadEvent },
    Reload { at: DateTime<Utc>, user: String, server: String },
}

/// Everything a replay produced
#[derive(Debug, Clone)]
pub struct ReplayOutcome {
    pub entries: Vec<ReplayEntry>,
    pub metrics: CoordinatorMetrics,
}

impl ReplayOutcome {
    /// Reloads as (user, server name) pairs in invocation order
    pub fn reloads(&self) -> Vec<(String, String)> {
        self.entries
            .iter()
            .filter_map(|entry| match entry {
                ReplayEntry::Reload { user, server, .. } => Some((user.clone(), server.clone())),
                ReplayEntry::Event { .. } => None,
            })
            .collect()
    }
}

/// Scenario names resolved to ids
struct World {
    feed_server: ServerId,
    ids: HashMap<String, Fqid>,
    names: HashMap<Fqid, String>,
    configuration: MemoryConfiguration,
}

impl World {
    fn build(scenario: &Scenario) -> Result<Self> {
        let mut servers = HashMap::new();
        let mut ids = HashMap::new();
        let mut configuration = MemoryConfiguration::new();

        for spec in &scenario.servers {
            let server = ServerId::new(spec.server_type.clone(), Uuid::now_v7());
            let fqid = Fqid::server(server.clone());
            configuration.insert(Item::new(fqid.clone(), spec.name.clone()));
            servers.insert(spec.name.clone(), server);
            ids.insert(spec.name.clone(), fqid);
        }

        for spec in &scenario.objects {
            let server = servers
                .get(&spec.server)
                .ok_or_else(|| eyre!("Object '{}' names unknown server '{}'", spec.name, spec.server))?;
            let mut fqid = Fqid::new(server.clone(), Uuid::now_v7(), spec.kind);
            if let Some(parent) = &spec.parent {
                let parent_id = ids
                    .get(parent)
                    .ok_or_else(|| eyre!("Object '{}' names unknown parent '{}'", spec.name, parent))?;
                fqid = fqid.with_parent(parent_id.object_id);
            }
            // Server references are resolved through their parent, not cached
            if spec.kind != Kind::Server {
                configuration.insert(Item::new(fqid.clone(), spec.name.clone()));
            }
            ids.insert(spec.name.clone(), fqid);
        }

        let feed_server = servers
            .get(&scenario.feed_server)
            .cloned()
            .ok_or_else(|| eyre!("Unknown feed server '{}'", scenario.feed_server))?;

        let names = ids.iter().map(|(name, fqid)| (fqid.clone(), name.clone())).collect();

        Ok(Self {
            feed_server,
            ids,
            names,
            configuration,
        })
    }

    fn batch(&self, names: &[String]) -> Result<Vec<Fqid>> {
        names
            .iter()
            .map(|name| {
                self.ids
                    .get(name)
                    .cloned()
                    .ok_or_else(|| eyre!("Step names unknown object '{}'", name))
            })
            .collect()
    }
}

/// Invoker that forwards each reload to the replay log
struct ReplayInvoker {
    names: HashMap<Fqid, String>,
    tx: mpsc::UnboundedSender<ReplayEntry>,
}

#[async_trait]
impl ReloadInvoker for ReplayInvoker {
    async fn reload(&self, session: &Session, server: &Fqid) -> Result<()> {
        let name = self.names.get(server).cloned().unwrap_or_else(|| server.to_string());
        debug!(user = %session.user(), server = %name, "ReplayInvoker::reload: called");
        self.tx
            .send(ReplayEntry::Reload {
                at: Utc::now(),
                user: session.user().to_string(),
                server: name,
            })
            .map_err(|_| eyre!("Replay log closed"))
    }
}

/// Replay `scenario` against a fresh coordinator
pub async fn replay(scenario: &Scenario, mut config: CoordinatorConfig) -> Result<ReplayOutcome> {
    info!(steps = scenario.steps.len(), "Replaying scenario");
    if let Some(debounce_ms) = scenario.debounce_ms {
        config.debounce_ms = debounce_ms;
    }
    let world = World::build(scenario)?;
    let feed = Arc::new(LocalFeed::new());
    let configuration = Arc::new(world.configuration.clone());
    let (log_tx, mut log_rx) = mpsc::unbounded_channel();

    let invoker = Arc::new(ReplayInvoker {
        names: world.names.clone(),
        tx: log_tx.clone(),
    });

    let coordinator = ReloadCoordinator::start(
        config,
        world.feed_server.clone(),
        feed.clone(),
        configuration.clone(),
        invoker,
    )
    .await?;

    let mut events = coordinator.subscribe();
    let forward_tx = log_tx.clone();
    let forwarder = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if forward_tx.send(ReplayEntry::Event { at: Utc::now(), event }).is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Replay fell behind coordinator events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
    drop(log_tx);

    wait_for_warmup(&coordinator).await?;

    // A user may hold several independent sessions
    let mut sessions: HashMap<String, Vec<SessionId>> = HashMap::new();
    for spec in &scenario.sessions {
        let session = Session::new(spec.user.clone(), configuration.clone());
        sessions.entry(spec.user.clone()).or_default().push(session.id().clone());
        coordinator.add_session(session).await?;
    }

    for step in &scenario.steps {
        debug!(?step, "replay: step");
        match step {
            Step::Notify(names) => {
                let batch = world.batch(names)?;
                feed.publish(&world.feed_server, CONFIGURATION_CHANGED_TOPIC, batch).await?;
            }
            Step::Connection(connected) => feed.set_connected(&world.feed_server, *connected).await?,
            Step::RemoveSession(user) => {
                let session_ids = sessions
                    .remove(user)
                    .ok_or_else(|| eyre!("Step removes unknown session '{}'", user))?;
                for session_id in &session_ids {
                    coordinator.remove_session(session_id).await?;
                }
            }
            Step::WaitMs(ms) => tokio::time::sleep(Duration::from_millis(*ms)).await,
        }
    }

    tokio::time::sleep(Duration::from_millis(scenario.settle_ms)).await;
    let metrics = coordinator.metrics().await?;
    coordinator.teardown().await?;
    drop(coordinator);

    // The event channel closes once the coordinator task is gone
    let _ = forwarder.await;
    let mut entries = Vec::new();
    while let Some(entry) = log_rx.recv().await {
        entries.push(entry);
    }

    Ok(ReplayOutcome { entries, metrics })
}

/// Wait until the coordinator has run its warm-up flush
pub async fn wait_for_warmup(coordinator: &ReloadCoordinator) -> Result<()> {
    let deadline = tokio::time::Instant::now() + WARMUP_TIMEOUT;
    while coordinator.metrics().await?.flushes == 0 {
        if tokio::time::Instant::now() >= deadline {
            return Err(eyre!("Coordinator did not complete its warm-up flush"));
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    Ok(())
}
