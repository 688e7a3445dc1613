//! Resolution of changed resource ids to the servers that own them

use std::collections::{HashMap, HashSet};

use tracing::{debug, trace};

use crate::domain::{Fqid, Item, Kind, Session, SessionId};
use crate::view::{ConfigurationRegistry, ConfigurationView};

/// Pending reloads per session
pub(crate) type PendingMap = HashMap<SessionId, HashSet<Fqid>>;

/// Counters produced by one call to [`accumulate`]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct AccumulateStats {
    pub excluded: u64,
    pub unresolved: u64,
    pub added: u64,
}

/// Look up a changed id in a session's cached configuration
///
/// A server addressed through a child reference is retried by its parent id.
pub(crate) fn cached_item(view: &dyn ConfigurationView, fqid: &Fqid) -> Option<Item> {
    view.resolve(&fqid.object_id, fqid.kind).or_else(|| match (fqid.kind, fqid.parent_id) {
        (Kind::Server, Some(parent)) => view.resolve(&parent, fqid.kind),
        _ => None,
    })
}

/// Find the id of the server owning `fqid`
///
/// A server id owns itself; anything else is looked up by its server id.
pub(crate) fn owning_server(registry: &dyn ConfigurationRegistry, fqid: &Fqid) -> Option<Fqid> {
    if fqid.is_server() {
        return Some(fqid.clone());
    }
    registry
        .resolve_global(&fqid.server_id.id, Kind::Server)
        .map(|item| item.fqid)
}

/// Add the owning server of every changed id to every session's pending set
///
/// Ids on excluded server types are skipped. Ids whose owner cannot be found
/// are dropped silently.
pub(crate) fn accumulate(
    batch: &[Fqid],
    sessions: &HashMap<SessionId, Session>,
    pending: &mut PendingMap,
    registry: &dyn ConfigurationRegistry,
    excluded_server_types: &[String],
) -> AccumulateStats {
    let mut stats = AccumulateStats::default();

    for fqid in batch {
        if fqid.server_id.is_excluded_by(excluded_server_types) {
            trace!(%fqid, "accumulate: excluded server type");
            stats.excluded += 1;
            continue;
        }

        let owner = owning_server(registry, fqid);
        if owner.is_none() {
            debug!(%fqid, "accumulate: no owning server");
            stats.unresolved += 1;
        }

        for (session_id, session) in sessions {
            let cached = cached_item(session.view(), fqid).is_some();
            trace!(session = %session_id, %fqid, cached, "accumulate: session lookup");

            if let Some(owner) = &owner
                && pending.entry(session_id.clone()).or_default().insert(owner.clone())
            {
                stats.added += 1;
            }
        }
    }

    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use uuid::Uuid;

    use crate::domain::ServerId;
    use crate::view::MemoryConfiguration;

    struct Fixture {
        recorder: ServerId,
        camera: Fqid,
        registry: MemoryConfiguration,
        sessions: HashMap<SessionId, Session>,
    }

    fn fixture() -> Fixture {
        let recorder = ServerId::new("XPCO", Uuid::now_v7());
        let camera = Fqid::new(recorder.clone(), Uuid::now_v7(), Kind::Camera);
        let registry = MemoryConfiguration::new()
            .with_item(Item::new(Fqid::server(recorder.clone()), "Recorder"))
            .with_item(Item::new(camera.clone(), "Lobby"));

        let view = Arc::new(registry.clone());
        let mut sessions = HashMap::new();
        for user in ["alice", "bob"] {
            let session = Session::new(user, view.clone());
            sessions.insert(session.id().clone(), session);
        }

        Fixture {
            recorder,
            camera,
            registry,
            sessions,
        }
    }

    fn excluded() -> Vec<String> {
        vec!["XP".to_string()]
    }

    #[test]
    fn test_child_resolves_to_owning_server() {
        let f = fixture();
        let mut pending = PendingMap::new();

        let stats = accumulate(&[f.camera.clone()], &f.sessions, &mut pending, &f.registry, &excluded());

        assert_eq!(stats.added, 2);
        for session_id in f.sessions.keys() {
            let set = &pending[session_id];
            assert_eq!(set.len(), 1);
            assert!(set.contains(&Fqid::server(f.recorder.clone())));
        }
    }

    #[test]
    fn test_duplicate_ids_collapse() {
        let f = fixture();
        let mut pending = PendingMap::new();
        let batch = vec![f.camera.clone(), f.camera.clone(), Fqid::server(f.recorder.clone())];

        let stats = accumulate(&batch, &f.sessions, &mut pending, &f.registry, &excluded());

        assert_eq!(stats.added, 2);
        assert!(pending.values().all(|set| set.len() == 1));
    }

    #[test]
    fn test_excluded_server_type_skipped() {
        let f = fixture();
        let mut pending = PendingMap::new();
        let legacy = Fqid::server(ServerId::new("XP", Uuid::now_v7()));

        let stats = accumulate(&[legacy], &f.sessions, &mut pending, &f.registry, &excluded());

        assert_eq!(stats.excluded, 1);
        assert!(pending.is_empty());
    }

    #[test]
    fn test_unknown_owner_is_dropped() {
        let f = fixture();
        let mut pending = PendingMap::new();
        let orphan = Fqid::new(ServerId::new("XPCO", Uuid::now_v7()), Uuid::now_v7(), Kind::Camera);

        let stats = accumulate(&[orphan], &f.sessions, &mut pending, &f.registry, &excluded());

        assert_eq!(stats.unresolved, 1);
        assert!(pending.is_empty());
    }

    #[test]
    fn test_server_id_owns_itself_even_when_uncached() {
        let f = fixture();
        let mut pending = PendingMap::new();
        let unknown = Fqid::server(ServerId::new("XPCO", Uuid::now_v7()));

        accumulate(&[unknown.clone()], &f.sessions, &mut pending, &f.registry, &excluded());

        assert!(pending.values().all(|set| set.contains(&unknown)));
    }

    #[test]
    fn test_cached_item_parent_fallback() {
        let f = fixture();
        // A server id addressed through a child reference: the object id is
        // unknown to the view but the parent is the recorder itself
        let child_ref = Fqid::new(f.recorder.clone(), Uuid::now_v7(), Kind::Server).with_parent(f.recorder.id);

        let item = cached_item(&f.registry, &child_ref).unwrap();
        assert_eq!(item.fqid, Fqid::server(f.recorder.clone()));
        assert_eq!(owning_server(&f.registry, &child_ref), Some(child_ref));
    }

    #[test]
    fn test_cached_item_no_fallback_for_other_kinds() {
        let f = fixture();
        let camera_ref = Fqid::new(f.recorder.clone(), Uuid::now_v7(), Kind::Camera).with_parent(f.camera.object_id);
        assert!(cached_item(&f.registry, &camera_ref).is_none());
    }

    #[test]
    fn test_no_sessions_no_pending() {
        let f = fixture();
        let mut pending = PendingMap::new();
        let stats = accumulate(&[f.camera], &HashMap::new(), &mut pending, &f.registry, &excluded());
        assert_eq!(stats.added, 0);
        assert!(pending.is_empty());
    }
}
