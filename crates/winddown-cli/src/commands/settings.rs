/// Settings commands: schedule, block list and warning threshold.
///
/// Edits go through the daemon when it is running so that they take effect
/// immediately, and straight to `settings.toml` otherwise.
use anyhow::Result;
use std::path::Path;
use winddown_core::{
    config::{SETTINGS_FILE, SOCKET_FILE},
    ipc::{IpcClient, IpcRequest, IpcResponse},
    BlockSet, BlockedApp, BlockedWebsite, Settings, SettingsStore, TimeOfDay, WeeklySchedule,
};

use super::helpers::{parse_days, print_block_set};

enum SettingsTarget {
    Daemon(IpcClient),
    File(SettingsStore),
}

impl SettingsTarget {
    async fn connect(data_dir: &Path) -> Result<Self> {
        let sock_path = data_dir.join(SOCKET_FILE);
        if sock_path.exists() {
            let client = IpcClient::new(&sock_path);
            if client.send_command(IpcRequest::GetSettings).await.is_ok() {
                return Ok(Self::Daemon(client));
            }
            log::warn!("Daemon socket present but not answering, editing settings file directly");
        }
        Ok(Self::File(SettingsStore::open(&data_dir.join(SETTINGS_FILE))?))
    }

    async fn snapshot(&self) -> Result<Settings> {
        match self {
            Self::Daemon(client) => match client.send_command(IpcRequest::GetSettings).await? {
                IpcResponse::Settings(settings) => Ok(settings),
                other => anyhow::bail!("Unexpected response from daemon: {other:?}"),
            },
            Self::File(store) => Ok(store.snapshot()),
        }
    }

    async fn set_schedule(&self, schedule: WeeklySchedule) -> Result<()> {
        match self {
            Self::Daemon(client) => expect_ok(client, IpcRequest::UpdateSchedule(schedule)).await,
            Self::File(store) => Ok(store.set_schedule(schedule)?),
        }
    }

    async fn set_warning_minutes(&self, minutes: u32) -> Result<()> {
        match self {
            Self::Daemon(client) => expect_ok(client, IpcRequest::SetWarningMinutes(minutes)).await,
            Self::File(store) => Ok(store.set_warning_minutes(minutes)?),
        }
    }

    /// Apply `edit` to the current block list; returns whether it changed
    async fn edit_block_set(&self, edit: impl FnOnce(&mut BlockSet) -> bool) -> Result<bool> {
        match self {
            Self::Daemon(client) => {
                let mut block_set = self.snapshot().await?.block_set;
                if !edit(&mut block_set) {
                    return Ok(false);
                }
                expect_ok(client, IpcRequest::UpdateBlockSet(block_set)).await?;
                Ok(true)
            }
            Self::File(store) => Ok(store.update_block_set(edit)?),
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            Self::Daemon(_) => "applied by the running daemon",
            Self::File(_) => "saved, takes effect when the daemon starts",
        }
    }
}

async fn expect_ok(client: &IpcClient, request: IpcRequest) -> Result<()> {
    match client.send_command(request).await? {
        IpcResponse::Ok => Ok(()),
        IpcResponse::Error(message) => anyhow::bail!(message),
        other => anyhow::bail!("Unexpected response from daemon: {other:?}"),
    }
}

pub async fn show_schedule(data_dir: &Path) -> Result<()> {
    let settings = SettingsTarget::connect(data_dir).await?.snapshot().await?;
    println!("Schedule: {}", settings.schedule.describe());
    println!("Warning: {} minutes before blocking starts", settings.warning_minutes);
    print_block_set(&settings.block_set);
    Ok(())
}

/// Changes to apply to the schedule; `None` keeps the current value
pub struct ScheduleChange {
    pub start: Option<TimeOfDay>,
    pub end: Option<TimeOfDay>,
    pub days: Option<String>,
    pub enabled: Option<bool>,
}

impl ScheduleChange {
    fn apply(self, schedule: &mut WeeklySchedule) -> Result<()> {
        if let Some(start) = self.start {
            schedule.start = start;
        }
        if let Some(end) = self.end {
            schedule.end = end;
        }
        if let Some(days) = self.days {
            schedule.active_days = parse_days(&days)?;
        }
        if let Some(enabled) = self.enabled {
            schedule.enabled = enabled;
        }
        Ok(())
    }
}

pub async fn set_schedule(data_dir: &Path, change: ScheduleChange) -> Result<()> {
    let target = SettingsTarget::connect(data_dir).await?;
    let mut schedule = target.snapshot().await?.schedule;
    change.apply(&mut schedule)?;
    let description = schedule.describe();
    target.set_schedule(schedule).await?;
    println!("Schedule: {description} ({})", target.describe());
    Ok(())
}

pub async fn set_warning(data_dir: &Path, minutes: u32) -> Result<()> {
    let target = SettingsTarget::connect(data_dir).await?;
    target.set_warning_minutes(minutes).await?;
    println!("Warning threshold set to {minutes} minutes ({})", target.describe());
    Ok(())
}

pub async fn block_app(data_dir: &Path, app_id: String, name: String) -> Result<()> {
    let label = format!("{name} ({app_id})");
    let target = SettingsTarget::connect(data_dir).await?;
    let added = target
        .edit_block_set(|set| set.add_app(BlockedApp::new(app_id, name)))
        .await?;
    report(&target, added, &format!("Blocked app {label}"), "App is already on the block list");
    Ok(())
}

pub async fn block_site(
    data_dir: &Path,
    domain: String,
    name: String,
    aliases: Vec<String>,
) -> Result<()> {
    let label = format!("{name} ({domain})");
    let website = BlockedWebsite::new(domain, name).with_aliases(aliases);
    let target = SettingsTarget::connect(data_dir).await?;
    let added = target.edit_block_set(|set| set.add_website(website)).await?;
    report(&target, added, &format!("Blocked site {label}"), "Site is already on the block list");
    Ok(())
}

/// Which half of the block list an entry lives in
#[derive(Debug, Clone, Copy)]
pub enum EntryKind {
    App,
    Site,
}

pub async fn unblock(data_dir: &Path, kind: EntryKind, id: &str) -> Result<()> {
    let target = SettingsTarget::connect(data_dir).await?;
    let removed = target
        .edit_block_set(|set| match kind {
            EntryKind::App => set.remove_app(id),
            EntryKind::Site => set.remove_website(id),
        })
        .await?;
    report(&target, removed, &format!("Removed {id}"), &format!("{id} is not on the block list"));
    Ok(())
}

pub async fn toggle(data_dir: &Path, kind: EntryKind, id: &str, enabled: bool) -> Result<()> {
    let target = SettingsTarget::connect(data_dir).await?;
    let changed = target
        .edit_block_set(|set| match kind {
            EntryKind::App => set.toggle_app(id, enabled),
            EntryKind::Site => set.toggle_website(id, enabled),
        })
        .await?;
    let state = if enabled { "enabled" } else { "disabled" };
    report(
        &target,
        changed,
        &format!("{id} {state}"),
        &format!("{id} is not on the block list or already {state}"),
    );
    Ok(())
}

fn report(target: &SettingsTarget, changed: bool, done: &str, unchanged: &str) {
    if changed {
        println!("{done} ({})", target.describe());
    } else {
        println!("{unchanged}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use winddown_core::Weekday;

    #[test]
    fn test_schedule_change_keeps_unspecified_fields() {
        let mut schedule = WeeklySchedule::default();
        ScheduleChange {
            start: Some(TimeOfDay::new(20, 30).unwrap()),
            end: None,
            days: Some("weekend".to_string()),
            enabled: None,
        }
        .apply(&mut schedule)
        .unwrap();

        assert_eq!(schedule.start, TimeOfDay::new(20, 30).unwrap());
        assert_eq!(schedule.end, WeeklySchedule::default().end);
        assert_eq!(schedule.active_days, Weekday::weekend());
        assert!(schedule.enabled);
    }

    #[tokio::test]
    async fn test_offline_edits_land_in_settings_file() {
        let dir = tempfile::tempdir().unwrap();

        block_site(
            dir.path(),
            "slack.com".to_string(),
            "Slack".to_string(),
            vec!["app.slack.com".to_string()],
        )
        .await
        .unwrap();
        block_app(dir.path(), "Discord".to_string(), "Discord".to_string())
            .await
            .unwrap();
        toggle(dir.path(), EntryKind::App, "Discord", false).await.unwrap();
        set_warning(dir.path(), 5).await.unwrap();

        let settings = Settings::load(&dir.path().join(SETTINGS_FILE)).unwrap();
        assert_eq!(settings.warning_minutes, 5);
        assert_eq!(settings.block_set.websites[0].extra_aliases, vec!["app.slack.com"]);
        assert!(!settings.block_set.apps[0].enabled);

        unblock(dir.path(), EntryKind::Site, "slack.com").await.unwrap();
        let settings = Settings::load(&dir.path().join(SETTINGS_FILE)).unwrap();
        assert!(settings.block_set.websites.is_empty());
    }

    #[tokio::test]
    async fn test_offline_rejects_out_of_range_warning() {
        let dir = tempfile::tempdir().unwrap();
        assert!(set_warning(dir.path(), 500).await.is_err());
    }
}
