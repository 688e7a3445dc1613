//! Reload coordinator
//!
//! Turns bursts of configuration change notifications into one deduplicated
//! reload pass per session:
//! - **Accumulate:** every changed id is resolved to its owning server and
//!   added to each registered session's pending set
//! - **Debounce:** each notification re-schedules a single-shot flush
//! - **Flush:** pending sets are drained into reload calls, then the timer
//!   stays idle until the next notification

mod config;
mod core;
mod handle;
mod messages;
mod resolve;
mod timer;

pub use config::CoordinatorConfig;
pub use handle::ReloadCoordinator;
pub use messages::{
    CONFIGURATION_RELOADED_MESSAGE, CoordinatorMetrics, EVENT_RECEIVED_MESSAGE, PendingSnapshot, ReloadEvent,
};
