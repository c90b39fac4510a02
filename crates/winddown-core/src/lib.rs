pub mod app_blocker;
pub mod blocklist;
pub mod config;
pub mod coordinator;
pub mod daemon;
pub mod error;
pub mod hosts;
pub mod ipc;
pub mod monitor;
pub mod notifier;
pub mod schedule;
pub mod settings;

#[cfg(test)]
mod testing;

pub use blocklist::{BlockSet, BlockedApp, BlockedWebsite};
pub use coordinator::{LockCoordinator, LockSnapshot, LockState, StatusReport};
pub use daemon::Daemon;
pub use error::{BlockingError, SettingsError};
pub use schedule::{TimeOfDay, Weekday, WeeklySchedule};
pub use settings::{Settings, SettingsProvider, SettingsStore};
