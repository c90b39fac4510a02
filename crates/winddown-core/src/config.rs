use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

pub const SETTINGS_FILE: &str = "settings.toml";
pub const SOCKET_FILE: &str = "winddown.sock";
pub const PID_FILE: &str = "winddown.pid";
pub const LOG_FILE: &str = "winddown.log";
const CONFIG_FILE: &str = "config.toml";

/// Get the local data directory for winddown.
///
/// # Errors
///
/// Returns an error if the local data directory cannot be determined.
pub fn get_data_dir() -> Result<PathBuf> {
    let mut path =
        dirs::data_local_dir().ok_or_else(|| anyhow::anyhow!("Failed to get local data dir"))?;
    path.push("winddown");
    Ok(path)
}

/// Static daemon configuration, read once at start-up from `config.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Seconds between schedule evaluations
    pub tick_interval_secs: u64,
    /// The hosts file the domain block section is written into
    pub hosts_path: PathBuf,
    /// How often the process table is diffed for new launches
    pub launch_poll_millis: u64,
    pub desktop_notifications: bool,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 60,
            hosts_path: PathBuf::from("/etc/hosts"),
            launch_poll_millis: 1000,
            desktop_notifications: true,
        }
    }
}

impl DaemonConfig {
    /// Load `config.toml` from `data_dir`, falling back to defaults when the
    /// file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(CONFIG_FILE);
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let text = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("Malformed config {}", path.display()))
    }
}
