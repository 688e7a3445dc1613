//! Configuration lookup seams
//!
//! Each session resolves objects against its own cached snapshot through a
//! [`ConfigurationView`]. Owning-server lookups go through an explicit
//! [`ConfigurationRegistry`] handed to the coordinator.

mod memory;

pub use memory::MemoryConfiguration;

use uuid::Uuid;

use crate::domain::{Item, Kind};

/// A session's cached view of the configuration tree
pub trait ConfigurationView: Send + Sync {
    /// Look up an object by id and kind
    fn resolve(&self, object_id: &Uuid, kind: Kind) -> Option<Item>;
}

/// Global configuration lookup used to find the server owning an object
pub trait ConfigurationRegistry: Send + Sync {
    /// Look up an object by the id of its server and kind
    fn resolve_global(&self, server_id: &Uuid, kind: Kind) -> Option<Item>;
}
