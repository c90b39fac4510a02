//! Error types for the enforcement backends and the settings boundary.

use std::path::PathBuf;
use thiserror::Error;

/// Failures reported by the domain and process enforcers.
#[derive(Error, Debug)]
pub enum BlockingError {
    /// Reading or staging the hosts file failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The elevation helper was denied or exited non-zero
    #[error("Failed to modify hosts file: {0}")]
    PrivilegedWriteFailed(String),

    /// The hosts worker task is no longer running
    #[error("Hosts worker is not running")]
    WorkerGone,
}

/// Failures at the settings boundary.
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Invalid time of day {hour:02}:{minute:02}")]
    InvalidTime { hour: u32, minute: u32 },

    #[error("Invalid time format '{0}', expected HH:MM")]
    TimeFormat(String),

    #[error("Invalid weekday '{0}'")]
    InvalidWeekday(String),

    #[error("Warning threshold must be between 1 and 120 minutes, got {0}")]
    InvalidWarningMinutes(u32),

    #[error("Failed to read settings from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write settings to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed settings file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to encode settings: {0}")]
    Encode(#[from] toml::ser::Error),
}
