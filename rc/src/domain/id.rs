//! Resource identity types
//!
//! A resource is addressed by its fully qualified id (`Fqid`): the server that
//! owns it, its own object id, its kind, and optionally the id of its parent.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Server type that never takes part in reload propagation
pub const EXCLUDED_SERVER_TYPE: &str = "XP";

/// Identity of a remote server instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServerId {
    /// Server type tag (e.g. "XPCO", "XP")
    #[serde(rename = "server-type")]
    pub server_type: String,

    /// Server object id
    pub id: Uuid,
}

impl ServerId {
    /// Create a server id with the given type and object id
    pub fn new(server_type: impl Into<String>, id: Uuid) -> Self {
        Self {
            server_type: server_type.into(),
            id,
        }
    }

    /// Check whether this server's type is one of `excluded`
    pub fn is_excluded_by(&self, excluded: &[String]) -> bool {
        excluded.iter().any(|t| *t == self.server_type)
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.server_type, self.id)
    }
}

/// Category of a configuration object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Kind {
    Server,
    Camera,
    Microphone,
    Speaker,
    Metadata,
    InputEvent,
    Output,
    View,
    Folder,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Server => "server",
            Self::Camera => "camera",
            Self::Microphone => "microphone",
            Self::Speaker => "speaker",
            Self::Metadata => "metadata",
            Self::InputEvent => "input-event",
            Self::Output => "output",
            Self::View => "view",
            Self::Folder => "folder",
        };
        write!(f, "{}", name)
    }
}

/// Fully qualified id of a configuration object
///
/// Equality and hashing cover every field, so a `HashSet<Fqid>` holds each
/// distinct resource once.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fqid {
    /// Server owning the object
    #[serde(rename = "server-id")]
    pub server_id: ServerId,

    /// The object's own id
    #[serde(rename = "object-id")]
    pub object_id: Uuid,

    /// Object category
    pub kind: Kind,

    /// Parent object, when the object is addressed through a child reference
    #[serde(rename = "parent-id", default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Uuid>,
}

impl Fqid {
    /// Create an id without a parent
    pub fn new(server_id: ServerId, object_id: Uuid, kind: Kind) -> Self {
        Self {
            server_id,
            object_id,
            kind,
            parent_id: None,
        }
    }

    /// The id of a server object: its object id is the server's own id
    pub fn server(server_id: ServerId) -> Self {
        let object_id = server_id.id;
        Self::new(server_id, object_id, Kind::Server)
    }

    /// Set the parent id
    pub fn with_parent(mut self, parent_id: Uuid) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn is_server(&self) -> bool {
        self.kind == Kind::Server
    }
}

impl fmt::Display for Fqid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.server_id, self.kind, self.object_id)?;
        if let Some(parent) = self.parent_id {
            write!(f, " (parent {})", parent)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn recorder() -> ServerId {
        ServerId::new("XPCO", Uuid::now_v7())
    }

    #[test]
    fn test_fqid_equality_covers_parent() {
        let server = recorder();
        let object = Uuid::now_v7();
        let a = Fqid::new(server.clone(), object, Kind::Camera);
        let b = Fqid::new(server, object, Kind::Camera).with_parent(Uuid::now_v7());
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn test_fqid_set_deduplicates() {
        let server = recorder();
        let mut set = HashSet::new();
        set.insert(Fqid::server(server.clone()));
        set.insert(Fqid::server(server.clone()));
        set.insert(Fqid::new(server, Uuid::now_v7(), Kind::Camera));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_server_fqid_uses_server_object_id() {
        let server = recorder();
        let fqid = Fqid::server(server.clone());
        assert_eq!(fqid.object_id, server.id);
        assert!(fqid.is_server());
    }

    #[test]
    fn test_excluded_server_type() {
        let excluded = vec![EXCLUDED_SERVER_TYPE.to_string()];
        assert!(ServerId::new("XP", Uuid::now_v7()).is_excluded_by(&excluded));
        assert!(!ServerId::new("XPCO", Uuid::now_v7()).is_excluded_by(&excluded));
    }

    #[test]
    fn test_fqid_yaml_keys() {
        let fqid = Fqid::new(recorder(), Uuid::now_v7(), Kind::InputEvent);
        let yaml = serde_yaml::to_string(&fqid).unwrap();
        assert!(yaml.contains("server-id"));
        assert!(yaml.contains("object-id"));
        assert!(yaml.contains("input-event"));
        assert!(!yaml.contains("parent-id"));

        let parsed: Fqid = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, fqid);
    }
}
