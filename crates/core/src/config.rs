//! Configuration management for the virtual services host.

use crate::Result;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable to override the host service name
const SERVICE_NAME_ENV: &str = "VSF_SERVICE_NAME";
/// Environment variable to override the configuration folder
const CONFIG_DIR_ENV: &str = "VSF_CONFIG_DIR";
/// Environment variable to override where the service unit is installed
const UNIT_DIR_ENV: &str = "VSF_UNIT_DIR";
/// Environment variable to override the address endpoints bind to
const BIND_HOST_ENV: &str = "VSF_BIND_HOST";
const OPEN_TIMEOUT_ENV: &str = "VSF_OPEN_TIMEOUT_SECS";
const CLOSE_TIMEOUT_ENV: &str = "VSF_CLOSE_TIMEOUT_SECS";
const HOOK_TIMEOUT_ENV: &str = "VSF_HOOK_TIMEOUT_SECS";

pub const DEFAULT_SERVICE_NAME: &str = "vsfhost";
pub const DEFAULT_DISPLAY_NAME: &str = "Virtual Services Framework Host";
pub const DEFAULT_DESCRIPTION: &str = "Provides simple hosting framework for virtual services.";

/// Deadlines applied to every endpoint and lifecycle hook call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Bound on opening a service endpoint
    pub open: Duration,
    /// Bound on closing a service endpoint, applied per service
    pub close: Duration,
    /// Bound on a single `start`/`stop`/`report` hook call
    pub hook: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            open: Duration::from_secs(5),
            close: Duration::from_secs(5),
            hook: Duration::from_secs(10),
        }
    }
}

/// Configuration for the virtual services host.
///
/// Built once at process entry and handed to the manager and host adapter.
#[derive(Debug, Clone)]
pub struct Config {
    /// Name the host process is installed under
    pub service_name: String,
    /// Human-readable name of the host
    pub display_name: String,
    /// Description written into the installed unit
    pub description: String,
    /// Folder holding the registry document
    pub config_dir: PathBuf,
    /// State file describing the running daemon
    pub state_file: PathBuf,
    /// Folder the service unit is installed into
    pub unit_dir: PathBuf,
    /// Host that service endpoints bind to
    pub bind_host: String,
    /// Endpoint and hook deadlines
    pub timeouts: Timeouts,
}

impl Config {
    /// Load configuration from default locations and environment overrides.
    ///
    /// Nothing is created on disk; see [`Config::ensure_config_dir`].
    pub fn load() -> Self {
        let config_dir = std::env::var(CONFIG_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| Self::default_config_dir());

        let mut config = Self::with_config_dir(config_dir);

        if let Ok(name) = std::env::var(SERVICE_NAME_ENV) {
            if !name.trim().is_empty() {
                config.service_name = name.trim().to_string();
            }
        }

        if let Ok(dir) = std::env::var(UNIT_DIR_ENV) {
            config.unit_dir = PathBuf::from(dir);
        }

        if let Ok(host) = std::env::var(BIND_HOST_ENV) {
            config.bind_host = host;
        }

        config.timeouts.open = env_secs(OPEN_TIMEOUT_ENV).unwrap_or(config.timeouts.open);
        config.timeouts.close = env_secs(CLOSE_TIMEOUT_ENV).unwrap_or(config.timeouts.close);
        config.timeouts.hook = env_secs(HOOK_TIMEOUT_ENV).unwrap_or(config.timeouts.hook);

        config
    }

    /// Create the configuration folder if it doesn't exist.
    pub fn ensure_config_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.config_dir)?;
        Ok(())
    }

    /// Build a configuration rooted at `config_dir` with every other value defaulted.
    pub fn with_config_dir(config_dir: impl Into<PathBuf>) -> Self {
        let config_dir = config_dir.into();
        let unit_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("systemd")
            .join("user");

        Self {
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            display_name: DEFAULT_DISPLAY_NAME.to_string(),
            description: DEFAULT_DESCRIPTION.to_string(),
            state_file: config_dir.join("host-state.json"),
            config_dir,
            unit_dir,
            bind_host: "127.0.0.1".to_string(),
            timeouts: Timeouts::default(),
        }
    }

    /// Point the configuration at another folder, moving the state file with it.
    pub fn set_config_dir(&mut self, config_dir: impl Into<PathBuf>) {
        self.config_dir = config_dir.into();
        self.state_file = self.config_dir.join("host-state.json");
    }

    /// Data directory: ~/.vsf
    fn default_config_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".vsf")
    }
}

fn env_secs(key: &str) -> Option<Duration> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse::<u64>() {
        Ok(secs) => Some(Duration::from_secs(secs)),
        Err(_) => {
            tracing::warn!("Ignoring {}={:?}: not a number of seconds", key, raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_dir_moves_state_file() {
        let mut config = Config::with_config_dir("/tmp/a");
        assert_eq!(config.state_file, PathBuf::from("/tmp/a/host-state.json"));

        config.set_config_dir("/tmp/b");
        assert_eq!(config.config_dir, PathBuf::from("/tmp/b"));
        assert_eq!(config.state_file, PathBuf::from("/tmp/b/host-state.json"));
    }

    #[test]
    fn config_dir_is_created_on_request_only() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let config = Config::with_config_dir(temp_dir.path().join("nested").join("vsf"));
        assert!(!config.config_dir.exists());

        config.ensure_config_dir().unwrap();
        assert!(config.config_dir.is_dir());
        config.ensure_config_dir().unwrap();
    }

    #[test]
    fn defaults_match_host_identity() {
        let config = Config::with_config_dir("/tmp/a");
        assert_eq!(config.service_name, DEFAULT_SERVICE_NAME);
        assert_eq!(config.bind_host, "127.0.0.1");
        assert_eq!(config.timeouts.open, Duration::from_secs(5));
        assert_eq!(config.timeouts.close, Duration::from_secs(5));
    }
}
