//! Reloadcoord configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::coordinator::CoordinatorConfig;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Reload coordinator settings
    pub coordinator: CoordinatorConfig,

    /// Log output settings
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration with fallback chain
    ///
    /// An explicit path must load. Otherwise the first readable, valid file
    /// from [`search_paths`](Self::search_paths) wins, and defaults apply when
    /// there is none.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        for candidate in Self::search_paths() {
            if !candidate.exists() {
                continue;
            }
            match Self::load_from_file(&candidate) {
                Ok(config) => return Ok(config),
                Err(e) => warn!("Skipping config {}: {:#}", candidate.display(), e),
            }
        }

        info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Implicit config locations, in priority order
    ///
    /// `.reloadcoord.yml` in the working directory, then
    /// `~/.config/reloadcoord/reloadcoord.yml`.
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(".reloadcoord.yml")];
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("reloadcoord").join("reloadcoord.yml"));
        }
        paths
    }

    /// Check every section
    pub fn validate(&self) -> Result<()> {
        self.coordinator.validate().context("Invalid coordinator section")
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        config.validate()?;

        info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Log output configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Directory for the log file (defaults to the user data dir)
    #[serde(rename = "log-dir", skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,
}

impl LoggingConfig {
    /// Resolve the log directory
    pub fn log_dir(&self) -> PathBuf {
        self.log_dir.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("reloadcoord")
                .join("logs")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.coordinator.debounce_ms, 0);
        assert!(config.logging.log_dir.is_none());
        assert!(config.logging.log_dir().ends_with("logs"));
    }

    #[test]
    fn test_load_explicit_path() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "coordinator:\n  debounce-ms: 200\n  excluded-server-types: [XP, XPE]\nlogging:\n  log-dir: /tmp/rc-logs"
        )
        .unwrap();

        let config = Config::load(Some(&file.path().to_path_buf())).unwrap();
        assert_eq!(config.coordinator.debounce_ms, 200);
        assert_eq!(config.coordinator.excluded_server_types, vec!["XP", "XPE"]);
        assert_eq!(config.coordinator.channel_buffer, 256);
        assert_eq!(config.logging.log_dir(), PathBuf::from("/tmp/rc-logs"));
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let path = PathBuf::from("/nonexistent/reloadcoord.yml");
        let err = Config::load(Some(&path)).unwrap_err();
        assert!(err.to_string().contains("Failed to load config"));
    }

    #[test]
    fn test_load_rejects_zero_event_capacity() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "coordinator:\n  event-capacity: 0").unwrap();

        let err = Config::load(Some(&file.path().to_path_buf())).unwrap_err();
        assert!(format!("{:#}", err).contains("event-capacity"));
    }

    #[test]
    fn test_search_paths_start_with_local_file() {
        let paths = Config::search_paths();
        assert_eq!(paths[0], PathBuf::from(".reloadcoord.yml"));
        assert!(paths.iter().skip(1).all(|p| p.ends_with("reloadcoord/reloadcoord.yml")));
    }

    #[test]
    fn test_load_invalid_yaml_fails() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "coordinator: [not, a, map]").unwrap();
        assert!(Config::load(Some(&file.path().to_path_buf())).is_err());
    }
}
