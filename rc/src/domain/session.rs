//! Sessions (user contexts) and the items their configuration views return
//!
//! Session IDs use the format: `{12-char-hex}-session-{slug}`
//! Example: `8c1d2e0f4a7b-session-operator-1`
//!
//! The hex part is taken from the random tail of a UUIDv7, so two sessions
//! for the same user never share an id.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::id::Fqid;
use crate::view::ConfigurationView;

/// A configuration object as seen through a configuration view
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub fqid: Fqid,
    pub name: String,
}

impl Item {
    pub fn new(fqid: Fqid, name: impl Into<String>) -> Self {
        Self {
            fqid,
            name: name.into(),
        }
    }
}

/// Slugify a user name for use in session IDs
fn slugify(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// Session ID wrapper for type-safe ID handling
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a new, unique session ID for a user
    pub fn generate(user: &str) -> Self {
        let uuid = uuid::Uuid::now_v7().simple().to_string();
        // The leading digits are the timestamp; the trailing ones are random
        let hex_suffix = &uuid[uuid.len() - 12..];
        Self(format!("{}-session-{}", hex_suffix, slugify(user)))
    }

    /// Create from an existing ID string
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle to one user's independent view of the configuration
///
/// Cheap to clone. The coordinator tracks membership only and never owns
/// the lifetime of the underlying view.
#[derive(Clone)]
pub struct Session {
    id: SessionId,
    user: String,
    view: Arc<dyn ConfigurationView>,
}

impl Session {
    /// Create a session with a freshly generated id
    pub fn new(user: impl Into<String>, view: Arc<dyn ConfigurationView>) -> Self {
        let user = user.into();
        Self {
            id: SessionId::generate(&user),
            user,
            view,
        }
    }

    /// Create a session with a caller-chosen id
    pub fn with_id(id: SessionId, user: impl Into<String>, view: Arc<dyn ConfigurationView>) -> Self {
        Self {
            id,
            user: user.into(),
            view,
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    /// This session's cached configuration
    pub fn view(&self) -> &dyn ConfigurationView {
        self.view.as_ref()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}
