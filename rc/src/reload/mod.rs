//! Reload invocation seam
//!
//! The coordinator hands each (session, owning server) pair to a
//! [`ReloadInvoker`]. Invocations are fire-and-forget from the coordinator's
//! side: a failure is logged and counted, never retried.

use async_trait::async_trait;
use eyre::Result;
use tracing::info;

use crate::domain::{Fqid, Session};

/// Performs the actual configuration reload for one session
#[async_trait]
pub trait ReloadInvoker: Send + Sync {
    /// Reload the part of `session`'s configuration owned by `server`
    ///
    /// Must not call back into the coordinator that invoked it.
    async fn reload(&self, session: &Session, server: &Fqid) -> Result<()>;
}

/// Invoker that only records each reload as a tracing event
#[derive(Debug, Clone, Default)]
pub struct TracingInvoker;

#[async_trait]
impl ReloadInvoker for TracingInvoker {
    async fn reload(&self, session: &Session, server: &Fqid) -> Result<()> {
        info!(session = %session.id(), user = %session.user(), %server, "Reloading configuration");
        Ok(())
    }
}
