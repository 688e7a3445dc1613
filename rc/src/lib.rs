//! Reloadcoord - coalescing configuration reload coordinator
//!
//! Many sessions each hold their own cached view of a server-side
//! configuration tree. Change notifications arrive in bursts; reloading once
//! per notification would thrash every session. The coordinator resolves each
//! changed id to its owning server, collects a deduplicated pending set per
//! session, and flushes those sets on a single-shot timer so a burst costs one
//! reload pass.
//!
//! # Modules
//!
//! - [`coordinator`] - The coordinator task and its handle
//! - [`domain`] - Resource ids, items and sessions
//! - [`feed`] - Notification feed trait and in-process implementation
//! - [`view`] - Configuration lookup traits and in-memory snapshot
//! - [`reload`] - Reload invocation trait
//! - [`scenario`] - Scripted replay
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod config;
pub mod coordinator;
pub mod domain;
pub mod feed;
pub mod reload;
pub mod scenario;
pub mod view;

// Re-export commonly used types
pub use config::{Config, LoggingConfig};
pub use coordinator::{CoordinatorConfig, CoordinatorMetrics, PendingSnapshot, ReloadCoordinator, ReloadEvent};
pub use domain::{EXCLUDED_SERVER_TYPE, Fqid, Item, Kind, ServerId, Session, SessionId};
pub use feed::{
    CONFIGURATION_CHANGED_TOPIC, ChangeBatch, FeedError, FeedSubscription, LocalFeed, NotificationFeed, SubscriptionId,
};
pub use reload::{ReloadInvoker, TracingInvoker};
pub use view::{ConfigurationRegistry, ConfigurationView, MemoryConfiguration};
