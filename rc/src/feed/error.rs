//! Notification feed errors

use thiserror::Error;

use super::SubscriptionId;
use crate::domain::ServerId;

/// Errors from notification feed operations
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("No feed connection for server {0}")]
    NotStarted(ServerId),

    #[error("Unknown subscription {id} on server {server}")]
    UnknownSubscription { server: ServerId, id: SubscriptionId },

    #[error("Feed connection closed")]
    Closed,
}
