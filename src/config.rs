use crate::tunnel::{HostKeyPolicy, SshOptions};
use anyhow::{Context, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_FILE: &str = "config.json";

/// Application settings, persisted as JSON in an explicitly supplied
/// directory and passed into the supervisor and profile store constructors.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub ssh_program: String,
    pub elevate: bool,
    pub host_key_policy: HostKeyPolicy,
    pub auto_reconnect: bool,
    pub max_reconnect_attempts: u32,
    pub reconnect_backoff_secs: u64,
    pub probe_interval_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            ssh_program: "ssh".to_string(),
            elevate: false,
            host_key_policy: HostKeyPolicy::default(),
            auto_reconnect: false,
            max_reconnect_attempts: 3,
            reconnect_backoff_secs: 5,
            probe_interval_secs: 2,
        }
    }
}

impl AppConfig {
    /// Load from `dir/config.json`; a missing or unreadable file yields the
    /// defaults.
    pub fn load(dir: &Path) -> Self {
        let path = dir.join(CONFIG_FILE);
        match fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!("could not parse {}: {e}, using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                debug!("no config at {}, using defaults", path.display());
                Self::default()
            }
        }
    }

    pub fn save(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create config dir {}", dir.display()))?;
        let path = dir.join(CONFIG_FILE);
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&path, json).with_context(|| format!("failed to write {}", path.display()))
    }

    pub fn ssh_options(&self) -> SshOptions {
        SshOptions {
            program: self.ssh_program.clone(),
            elevate: self.elevate,
            host_key_policy: self.host_key_policy,
            backoff_base: Duration::from_secs(self.reconnect_backoff_secs.max(1)),
            probe_interval: Duration::from_secs(self.probe_interval_secs.max(1)),
        }
    }
}

/// Default per-user data directory.
pub fn default_data_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("culvert")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn roundtrip() {
        let dir = tempdir().unwrap();
        let mut config = AppConfig::default();
        config.elevate = true;
        config.host_key_policy = HostKeyPolicy::AcceptAny;
        config.save(dir.path()).unwrap();

        let loaded = AppConfig::load(dir.path());
        assert!(loaded.elevate);
        assert_eq!(loaded.host_key_policy, HostKeyPolicy::AcceptAny);
    }

    #[test]
    fn missing_or_corrupt_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let loaded = AppConfig::load(dir.path());
        assert_eq!(loaded.ssh_program, "ssh");

        fs::write(dir.path().join(CONFIG_FILE), "not json").unwrap();
        let loaded = AppConfig::load(dir.path());
        assert_eq!(loaded.max_reconnect_attempts, 3);
    }
}
