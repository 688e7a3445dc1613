//! Reload coordinator configuration

use eyre::{Result, eyre};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::domain::EXCLUDED_SERVER_TYPE;

/// Reload coordinator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Delay before the warm-up flush that follows start, in milliseconds
    #[serde(rename = "warmup-delay-ms", default = "default_warmup_delay_ms")]
    pub warmup_delay_ms: u64,

    /// Delay between a change notification and the flush it schedules, in milliseconds
    #[serde(rename = "debounce-ms", default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Server types whose change notifications are dropped
    #[serde(rename = "excluded-server-types", default = "default_excluded_server_types")]
    pub excluded_server_types: Vec<String>,

    /// Channel buffer size for coordinator requests
    #[serde(rename = "channel-buffer", default = "default_channel_buffer")]
    pub channel_buffer: usize,

    /// Capacity of the outbound event channel
    #[serde(rename = "event-capacity", default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_warmup_delay_ms() -> u64 {
    debug!("default_warmup_delay_ms: called");
    0
}

fn default_debounce_ms() -> u64 {
    debug!("default_debounce_ms: called");
    0
}

fn default_excluded_server_types() -> Vec<String> {
    debug!("default_excluded_server_types: called");
    vec![EXCLUDED_SERVER_TYPE.to_string()]
}

fn default_channel_buffer() -> usize {
    debug!("default_channel_buffer: called");
    256
}

fn default_event_capacity() -> usize {
    debug!("default_event_capacity: called");
    64
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        debug!("CoordinatorConfig::default: called");
        Self {
            warmup_delay_ms: default_warmup_delay_ms(),
            debounce_ms: default_debounce_ms(),
            excluded_server_types: default_excluded_server_types(),
            channel_buffer: default_channel_buffer(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl CoordinatorConfig {
    /// Reject settings the coordinator cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.channel_buffer == 0 {
            return Err(eyre!("channel-buffer must be at least 1"));
        }
        if self.event_capacity == 0 {
            return Err(eyre!("event-capacity must be at least 1"));
        }
        Ok(())
    }

    /// Get the warm-up delay as a Duration
    pub fn warmup_delay(&self) -> Duration {
        Duration::from_millis(self.warmup_delay_ms)
    }

    /// Get the debounce window as a Duration
    pub fn debounce(&self) -> Duration {
        debug!(debounce_ms = %self.debounce_ms, "CoordinatorConfig::debounce: called");
        Duration::from_millis(self.debounce_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.warmup_delay_ms, 0);
        assert_eq!(config.debounce_ms, 0);
        assert_eq!(config.excluded_server_types, vec!["XP".to_string()]);
        assert_eq!(config.channel_buffer, 256);
        assert_eq!(config.event_capacity, 64);
    }

    #[test]
    fn test_debounce_duration() {
        let config = CoordinatorConfig {
            debounce_ms: 250,
            ..Default::default()
        };
        assert_eq!(config.debounce(), Duration::from_millis(250));
        assert_eq!(config.warmup_delay(), Duration::ZERO);
    }

    #[test]
    fn test_validate_rejects_zero_capacities() {
        assert!(CoordinatorConfig::default().validate().is_ok());

        let config: CoordinatorConfig = serde_yaml::from_str("channel-buffer: 0\n").unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("channel-buffer"));

        let config: CoordinatorConfig = serde_yaml::from_str("event-capacity: 0\n").unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("event-capacity"));
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: CoordinatorConfig = serde_yaml::from_str("debounce-ms: 500\n").unwrap();
        assert_eq!(config.debounce_ms, 500);
        assert_eq!(config.excluded_server_types, vec!["XP".to_string()]);
        assert_eq!(config.channel_buffer, 256);
    }
}
