//! In-memory configuration snapshot

use std::collections::HashMap;

use tracing::debug;
use uuid::Uuid;

use super::{ConfigurationRegistry, ConfigurationView};
use crate::domain::{Item, Kind};

/// Configuration snapshot held in a map keyed by (object id, kind)
///
/// Serves both as a per-session view and as the global registry.
#[derive(Debug, Clone, Default)]
pub struct MemoryConfiguration {
    items: HashMap<(Uuid, Kind), Item>,
}

impl MemoryConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a snapshot from a list of items
    pub fn from_items(items: impl IntoIterator<Item = Item>) -> Self {
        let mut config = Self::new();
        for item in items {
            config.insert(item);
        }
        config
    }

    /// Add or replace an item
    pub fn insert(&mut self, item: Item) {
        debug!(fqid = %item.fqid, name = %item.name, "MemoryConfiguration::insert: called");
        self.items.insert((item.fqid.object_id, item.fqid.kind), item);
    }

    /// Builder form of [`insert`](Self::insert)
    pub fn with_item(mut self, item: Item) -> Self {
        self.insert(item);
        self
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn lookup(&self, object_id: &Uuid, kind: Kind) -> Option<Item> {
        self.items.get(&(*object_id, kind)).cloned()
    }
}

impl ConfigurationView for MemoryConfiguration {
    fn resolve(&self, object_id: &Uuid, kind: Kind) -> Option<Item> {
        self.lookup(object_id, kind)
    }
}

impl ConfigurationRegistry for MemoryConfiguration {
    fn resolve_global(&self, server_id: &Uuid, kind: Kind) -> Option<Item> {
        self.lookup(server_id, kind)
    }
}
