//! Domain types: resource ids, items and sessions

mod id;
mod session;

pub use id::{EXCLUDED_SERVER_TYPE, Fqid, Kind, ServerId};
pub use session::{Item, Session, SessionId};
