use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tokio::sync::watch;

use crate::{blocklist::BlockSet, error::SettingsError, schedule::WeeklySchedule};

pub const DEFAULT_WARNING_MINUTES: u32 = 15;
const MAX_WARNING_MINUTES: u32 = 120;

/// User-editable settings, persisted as `settings.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub schedule: WeeklySchedule,
    pub block_set: BlockSet,
    /// Minutes before the window starts at which the warning state begins
    pub warning_minutes: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            schedule: WeeklySchedule::default(),
            block_set: BlockSet::default(),
            warning_minutes: DEFAULT_WARNING_MINUTES,
        }
    }
}

impl Settings {
    /// Load settings from `path`, or defaults if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or holds
    /// out-of-range values.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let settings: Self = toml::from_str(&text)?;
        validate_warning_minutes(settings.warning_minutes)?;
        Ok(settings)
    }

    /// Write settings to `path`, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or writing fails.
    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        let text = toml::to_string_pretty(self)?;
        let write_err = |source| SettingsError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        fs::write(path, text).map_err(write_err)
    }
}

fn validate_warning_minutes(minutes: u32) -> Result<(), SettingsError> {
    if minutes == 0 || minutes > MAX_WARNING_MINUTES {
        return Err(SettingsError::InvalidWarningMinutes(minutes));
    }
    Ok(())
}

/// Observable source of the values the lock coordinator reacts to.
///
/// Each value is observed independently so that a block list edit does not
/// trigger a schedule re-evaluation and vice versa.
pub trait SettingsProvider: Send + Sync {
    fn schedule(&self) -> watch::Receiver<WeeklySchedule>;
    fn block_set(&self) -> watch::Receiver<BlockSet>;
    fn warning_minutes(&self) -> watch::Receiver<u32>;
}

/// Settings held in watch channels and optionally mirrored to disk.
pub struct SettingsStore {
    schedule: watch::Sender<WeeklySchedule>,
    block_set: watch::Sender<BlockSet>,
    warning_minutes: watch::Sender<u32>,
    path: Option<PathBuf>,
}

impl SettingsStore {
    /// In-memory store, nothing is persisted
    #[must_use]
    pub fn new(settings: Settings) -> Self {
        Self {
            schedule: watch::Sender::new(settings.schedule),
            block_set: watch::Sender::new(settings.block_set),
            warning_minutes: watch::Sender::new(settings.warning_minutes),
            path: None,
        }
    }

    /// Store backed by the file at `path`
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be loaded.
    pub fn open(path: &Path) -> Result<Self, SettingsError> {
        let settings = Settings::load(path)?;
        log::info!("Loaded settings from {}", path.display());
        let mut store = Self::new(settings);
        store.path = Some(path.to_path_buf());
        Ok(store)
    }

    #[must_use]
    pub fn snapshot(&self) -> Settings {
        Settings {
            schedule: self.schedule.borrow().clone(),
            block_set: self.block_set.borrow().clone(),
            warning_minutes: *self.warning_minutes.borrow(),
        }
    }

    /// Replace the schedule; subscribers are notified only on change.
    ///
    /// # Errors
    ///
    /// Returns an error if persisting fails.
    pub fn set_schedule(&self, schedule: WeeklySchedule) -> Result<(), SettingsError> {
        let changed = self.schedule.send_if_modified(|current| {
            if *current == schedule {
                return false;
            }
            *current = schedule;
            true
        });
        if changed {
            log::info!("Schedule updated: {}", self.schedule.borrow().describe());
            self.persist()?;
        }
        Ok(())
    }

    /// Replace the whole block list.
    ///
    /// # Errors
    ///
    /// Returns an error if persisting fails.
    pub fn set_block_set(&self, block_set: BlockSet) -> Result<(), SettingsError> {
        self.update_block_set(|current| {
            if *current == block_set {
                return false;
            }
            *current = block_set;
            true
        })
        .map(|_| ())
    }

    /// Edit the block list in place. `edit` returns whether it changed
    /// anything; only then are subscribers notified.
    ///
    /// # Errors
    ///
    /// Returns an error if persisting fails.
    pub fn update_block_set(
        &self,
        edit: impl FnOnce(&mut BlockSet) -> bool,
    ) -> Result<bool, SettingsError> {
        let changed = self.block_set.send_if_modified(edit);
        if changed {
            log::info!("Block list updated");
            self.persist()?;
        }
        Ok(changed)
    }

    /// # Errors
    ///
    /// Returns an error if `minutes` is out of range or persisting fails.
    pub fn set_warning_minutes(&self, minutes: u32) -> Result<(), SettingsError> {
        validate_warning_minutes(minutes)?;
        let changed = self.warning_minutes.send_if_modified(|current| {
            let changed = *current != minutes;
            *current = minutes;
            changed
        });
        if changed {
            self.persist()?;
        }
        Ok(())
    }

    fn persist(&self) -> Result<(), SettingsError> {
        match &self.path {
            Some(path) => self.snapshot().save(path),
            None => Ok(()),
        }
    }
}

impl SettingsProvider for SettingsStore {
    fn schedule(&self) -> watch::Receiver<WeeklySchedule> {
        self.schedule.subscribe()
    }

    fn block_set(&self) -> watch::Receiver<BlockSet> {
        self.block_set.subscribe()
    }

    fn warning_minutes(&self) -> watch::Receiver<u32> {
        self.warning_minutes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocklist::{BlockedApp, BlockedWebsite};
    use crate::schedule::TimeOfDay;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(&dir.path().join("settings.toml")).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.warning_minutes, 15);
    }

    #[test]
    fn test_store_persists_every_mutation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/settings.toml");
        let store = SettingsStore::open(&path).unwrap();

        store
            .update_block_set(|set| set.add_website(BlockedWebsite::new("slack.com", "Slack")))
            .unwrap();
        store.set_warning_minutes(10).unwrap();

        let reloaded = Settings::load(&path).unwrap();
        assert_eq!(reloaded.warning_minutes, 10);
        assert_eq!(reloaded.block_set.websites[0].domain, "slack.com");
    }

    #[test]
    fn test_warning_minutes_range_checked() {
        let store = SettingsStore::new(Settings::default());
        assert!(store.set_warning_minutes(0).is_err());
        assert!(store.set_warning_minutes(121).is_err());
        assert!(store.set_warning_minutes(30).is_ok());
        assert_eq!(store.snapshot().warning_minutes, 30);
    }

    #[test]
    fn test_out_of_range_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        fs::write(&path, "warning_minutes = 0\n").unwrap();
        assert!(matches!(
            Settings::load(&path),
            Err(SettingsError::InvalidWarningMinutes(0))
        ));
    }

    #[tokio::test]
    async fn test_subscribers_see_changes_independently() {
        let store = SettingsStore::new(Settings::default());
        let mut schedule_rx = store.schedule();
        let mut block_rx = store.block_set();

        store
            .update_block_set(|set| set.add_app(BlockedApp::new("slack", "Slack")))
            .unwrap();
        assert!(block_rx.has_changed().unwrap());
        assert!(!schedule_rx.has_changed().unwrap());
        block_rx.borrow_and_update();

        let mut schedule = store.snapshot().schedule;
        schedule.start = TimeOfDay::new(20, 0).unwrap();
        store.set_schedule(schedule.clone()).unwrap();
        assert!(schedule_rx.has_changed().unwrap());
        schedule_rx.borrow_and_update();

        // Writing the same value again is not a change
        store.set_schedule(schedule).unwrap();
        assert!(!schedule_rx.has_changed().unwrap());
        assert!(!block_rx.has_changed().unwrap());
    }
}
