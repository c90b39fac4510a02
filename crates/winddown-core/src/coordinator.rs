use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};
use tokio::sync::{mpsc, watch};

use crate::{
    app_blocker::ProcessBlocker,
    blocklist::BlockSet,
    error::BlockingError,
    hosts::{DomainStatus, HostsHandle},
    monitor::ProcessInfo,
    notifier::Notifier,
    schedule::WeeklySchedule,
    settings::Settings,
};

/// The logical lock state shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockState {
    Unlocked,
    /// Blocking starts within the warning threshold
    Warning { minutes_remaining: u32 },
    Locked,
}

impl LockState {
    #[must_use]
    pub const fn is_blocking(&self) -> bool {
        matches!(self, Self::Locked)
    }

    #[must_use]
    pub fn status_text(&self) -> String {
        match self {
            Self::Unlocked => "Not blocking".to_string(),
            Self::Warning { minutes_remaining } => format!("Blocking in {minutes_remaining}m"),
            Self::Locked => "Blocking".to_string(),
        }
    }
}

impl fmt::Display for LockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.status_text())
    }
}

/// Who is in control of the lock. A manual lock is always `Locked`, so
/// "warning while manually locked" cannot be expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Auto(LockState),
    Manual,
}

impl Mode {
    const fn state(self) -> LockState {
        match self {
            Self::Auto(state) => state,
            Self::Manual => LockState::Locked,
        }
    }

    const fn is_locked(self) -> bool {
        self.state().is_blocking()
    }
}

/// Published view of the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockSnapshot {
    pub state: LockState,
    pub manual: bool,
}

impl From<Mode> for LockSnapshot {
    fn from(mode: Mode) -> Self {
        Self {
            state: mode.state(),
            manual: matches!(mode, Mode::Manual),
        }
    }
}

/// Everything a status query reports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub lock: LockSnapshot,
    pub schedule: String,
    pub next_transition: Option<DateTime<Local>>,
    pub apps_active: bool,
    pub blocked_apps: usize,
    pub domains: DomainStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainOperation {
    Activate,
    Deactivate,
    Update,
    /// Removal of a block left behind by a previous run
    Reconcile,
}

impl fmt::Display for DomainOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Activate => "activation",
            Self::Deactivate => "deactivation",
            Self::Update => "update",
            Self::Reconcile => "stale block cleanup",
        };
        f.write_str(name)
    }
}

/// Completion of a queued domain operation, delivered back to the control
/// loop
#[derive(Debug)]
pub struct DomainOutcome {
    pub operation: DomainOperation,
    pub result: Result<(), BlockingError>,
}

/// The lock state machine.
///
/// Every method must be called from one control task; the coordinator is
/// not shared. Domain operations are queued on the hosts worker and report
/// back as [`DomainOutcome`]s on the channel given to [`LockCoordinator::new`].
pub struct LockCoordinator {
    apps: ProcessBlocker,
    hosts: HostsHandle,
    notifier: Arc<dyn Notifier>,
    outcomes: mpsc::UnboundedSender<DomainOutcome>,
    schedule: WeeklySchedule,
    block_set: BlockSet,
    warning_minutes: u32,
    mode: Mode,
    /// Transition instant the warning notification was last sent for
    warned_for: Option<DateTime<Local>>,
    published: watch::Sender<LockSnapshot>,
}

impl LockCoordinator {
    #[must_use]
    pub fn new(
        apps: ProcessBlocker,
        hosts: HostsHandle,
        notifier: Arc<dyn Notifier>,
        settings: Settings,
        outcomes: mpsc::UnboundedSender<DomainOutcome>,
    ) -> Self {
        let mode = Mode::Auto(LockState::Unlocked);
        Self {
            apps,
            hosts,
            notifier,
            outcomes,
            schedule: settings.schedule,
            block_set: settings.block_set,
            warning_minutes: settings.warning_minutes,
            mode,
            warned_for: None,
            published: watch::Sender::new(mode.into()),
        }
    }

    #[must_use]
    pub fn state(&self) -> LockState {
        self.mode.state()
    }

    #[must_use]
    pub fn is_manual(&self) -> bool {
        self.mode == Mode::Manual
    }

    #[must_use]
    pub fn snapshot(&self) -> LockSnapshot {
        self.mode.into()
    }

    /// Subscribe to lock state changes
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<LockSnapshot> {
        self.published.subscribe()
    }

    #[must_use]
    pub fn status_report(&self, now: DateTime<Local>) -> StatusReport {
        StatusReport {
            lock: self.snapshot(),
            schedule: self.schedule.describe(),
            next_transition: self.schedule.next_transition(&now),
            apps_active: self.apps.is_active(),
            blocked_apps: self.apps.blocked_ids().len(),
            domains: self.hosts.status(),
        }
    }

    /// Start-up: clear a block left behind by an unclean exit, then settle
    /// into the state the schedule asks for.
    pub fn start(&mut self, now: DateTime<Local>) {
        log::info!("Lock coordinator starting ({})", self.schedule.describe());
        self.reconcile_stale_block(now);
        self.evaluate(now);
    }

    fn reconcile_stale_block(&mut self, now: DateTime<Local>) {
        if !self.hosts.block_present() {
            return;
        }
        if self.schedule.is_active(&now) {
            log::info!("Hosts block from a previous run matches the schedule, keeping it");
            return;
        }
        log::warn!("Removing stale hosts block left by a previous run");
        self.hosts
            .deactivate(self.report(DomainOperation::Reconcile));
    }

    /// Periodic timer tick
    pub fn tick(&mut self, now: DateTime<Local>) {
        self.evaluate(now);
    }

    pub fn on_schedule_changed(&mut self, schedule: WeeklySchedule, now: DateTime<Local>) {
        self.schedule = schedule;
        self.warned_for = None;
        self.evaluate(now);
    }

    pub fn on_warning_minutes_changed(&mut self, minutes: u32, now: DateTime<Local>) {
        self.warning_minutes = minutes;
        self.evaluate(now);
    }

    /// New block list. While locked, both enforcers switch over in place.
    pub fn on_block_set_changed(&mut self, block_set: BlockSet) {
        self.block_set = block_set;
        if !self.mode.is_locked() {
            return;
        }
        self.apps
            .update_blocked_set(self.block_set.enabled_app_ids());
        self.hosts.update_blocked_set(
            self.enabled_domains(),
            self.report(DomainOperation::Update),
        );
    }

    /// Lock now, regardless of the schedule. Automatic transitions are
    /// suspended until [`LockCoordinator::manual_unlock`].
    pub fn manual_lock(&mut self) {
        log::info!("Manual lock");
        if self.mode.is_locked() {
            self.set_mode(Mode::Manual);
        } else {
            self.lock(Mode::Manual);
        }
    }

    /// Unlock now and hand control back to the schedule, which takes over
    /// again on the next tick.
    pub fn manual_unlock(&mut self) {
        log::info!("Manual unlock");
        self.apps.deactivate();
        self.hosts
            .deactivate(self.report(DomainOperation::Deactivate));
        self.set_mode(Mode::Auto(LockState::Unlocked));
    }

    /// A process launch reported by the process source
    pub fn handle_launch(&self, process: &ProcessInfo) {
        if self.apps.handle_launch(process) {
            let name = self.block_set.app_name(&process.id).unwrap_or(&process.id);
            self.notifier.notify_app_blocked(name);
        }
    }

    pub fn on_domain_outcome(&self, outcome: DomainOutcome) {
        match outcome.result {
            Ok(()) => log::debug!("Domain {} completed", outcome.operation),
            Err(e) if self.mode.is_locked() && outcome.operation == DomainOperation::Activate => {
                log::error!("Domain blocking failed, only apps are blocked: {e}");
            }
            Err(e) => log::error!("Domain {} failed: {e}", outcome.operation),
        }
    }

    /// Best-effort release of both enforcers before exit
    pub async fn shutdown(&mut self) {
        log::info!("Releasing blocks before exit");
        self.apps.deactivate();
        if let Err(e) = self.hosts.deactivate_and_wait().await {
            log::warn!("Failed to remove hosts block on shutdown: {e}");
        }
    }

    fn evaluate(&mut self, now: DateTime<Local>) {
        if !self.schedule.enabled {
            match self.mode {
                Mode::Auto(LockState::Locked) => self.unlock(),
                Mode::Auto(_) => self.set_mode(Mode::Auto(LockState::Unlocked)),
                Mode::Manual => {}
            }
            return;
        }

        if self.mode == Mode::Manual {
            return;
        }

        let should_lock = self.schedule.is_active(&now);
        match (should_lock, self.mode.is_locked()) {
            (true, false) => self.lock(Mode::Auto(LockState::Locked)),
            (false, true) => self.unlock(),
            (false, false) => self.update_warning(now),
            (true, true) => {}
        }
    }

    fn update_warning(&mut self, now: DateTime<Local>) {
        let Some(next) = self.schedule.next_transition(&now) else {
            self.set_mode(Mode::Auto(LockState::Unlocked));
            return;
        };

        let minutes = (next - now).num_minutes();
        let threshold = i64::from(self.warning_minutes);
        if minutes <= 0 || minutes > threshold {
            self.set_mode(Mode::Auto(LockState::Unlocked));
            return;
        }

        let minutes_remaining = u32::try_from(minutes).unwrap_or(self.warning_minutes);
        self.set_mode(Mode::Auto(LockState::Warning { minutes_remaining }));
        if minutes_remaining == self.warning_minutes && self.warned_for != Some(next) {
            self.warned_for = Some(next);
            self.notifier.notify_warning(minutes_remaining);
        }
    }

    fn lock(&mut self, mode: Mode) {
        log::info!("Locking");
        self.apps.activate(self.block_set.enabled_app_ids());
        self.hosts
            .activate(self.enabled_domains(), self.report(DomainOperation::Activate));
        self.set_mode(mode);
        self.notifier.notify_locked();
    }

    fn unlock(&mut self) {
        log::info!("Unlocking");
        self.apps.deactivate();
        self.hosts
            .deactivate(self.report(DomainOperation::Deactivate));
        self.set_mode(Mode::Auto(LockState::Unlocked));
        self.notifier.notify_unlocked();
    }

    fn enabled_domains(&self) -> Vec<String> {
        self.block_set.enabled_domains().into_iter().collect()
    }

    fn set_mode(&mut self, mode: Mode) {
        if self.mode != mode {
            log::info!(
                "Lock state: {} -> {}{}",
                self.mode.state(),
                mode.state(),
                if mode == Mode::Manual { " (manual)" } else { "" }
            );
        }
        self.mode = mode;
        self.published.send_if_modified(|snapshot| {
            let next = LockSnapshot::from(mode);
            let changed = *snapshot != next;
            *snapshot = next;
            changed
        });
    }

    fn report(
        &self,
        operation: DomainOperation,
    ) -> impl FnOnce(Result<(), BlockingError>) + Send + 'static {
        let outcomes = self.outcomes.clone();
        move |result| {
            let _ = outcomes.send(DomainOutcome { operation, result });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocklist::{BlockedApp, BlockedWebsite};
    use crate::hosts::{add_block, spawn_hosts_worker, HostsBlocker, BLOCK_START_MARKER};
    use crate::testing::{
        FakeDnsFlusher, FakePrivilegedWriter, FakeProcessSource, Notification, RecordingNotifier,
    };
    use chrono::TimeZone;
    use std::fs;

    const BASE: &str = "127.0.0.1 localhost\n";
    const SLACK: &str = "com.tinyspeck.slackmacgap";
    // 2024-01-01 is a Monday
    const TUE: u32 = 2;
    const WED: u32 = 3;

    fn at(day: u32, hour: u32, minute: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 1, day, hour, minute, 0).unwrap()
    }

    fn settings() -> Settings {
        let mut settings = Settings::default();
        settings.block_set.add_app(BlockedApp::new(SLACK, "Slack"));
        settings
            .block_set
            .add_website(BlockedWebsite::new("slack.com", "Slack"));
        settings
    }

    struct Fixture {
        coordinator: LockCoordinator,
        source: Arc<FakeProcessSource>,
        writer: Arc<FakePrivilegedWriter>,
        notifier: Arc<RecordingNotifier>,
        outcomes: mpsc::UnboundedReceiver<DomainOutcome>,
        _launches: mpsc::UnboundedReceiver<ProcessInfo>,
        dir: tempfile::TempDir,
    }

    impl Fixture {
        fn new(hosts: &str, settings: Settings, running: &[(u32, &str)]) -> Self {
            Self::with_writer(hosts, settings, running, FakePrivilegedWriter::default())
        }

        fn with_writer(
            hosts: &str,
            settings: Settings,
            running: &[(u32, &str)],
            writer: FakePrivilegedWriter,
        ) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let hosts_path = dir.path().join("hosts");
            fs::write(&hosts_path, hosts).unwrap();

            let source = Arc::new(FakeProcessSource::with_running(running));
            let writer = Arc::new(writer);
            let notifier = Arc::new(RecordingNotifier::default());
            let (launch_tx, launches) = mpsc::unbounded_channel();
            let (outcome_tx, outcomes) = mpsc::unbounded_channel();

            let hosts = spawn_hosts_worker(HostsBlocker::new(
                hosts_path,
                writer.clone(),
                Arc::new(FakeDnsFlusher),
            ));
            let coordinator = LockCoordinator::new(
                ProcessBlocker::new(source.clone(), launch_tx),
                hosts,
                notifier.clone(),
                settings,
                outcome_tx,
            );

            Self {
                coordinator,
                source,
                writer,
                notifier,
                outcomes,
                _launches: launches,
                dir,
            }
        }

        async fn next_outcome(&mut self) -> DomainOutcome {
            self.outcomes.recv().await.unwrap()
        }

        fn hosts(&self) -> String {
            fs::read_to_string(self.dir.path().join("hosts")).unwrap()
        }
    }

    #[tokio::test]
    async fn test_locks_inside_overnight_window() {
        let mut f = Fixture::new(BASE, settings(), &[(10, SLACK), (11, "editor")]);

        f.coordinator.tick(at(TUE, 20, 0));

        assert_eq!(f.coordinator.state(), LockState::Locked);
        assert!(!f.coordinator.is_manual());
        assert_eq!(f.notifier.sent(), vec![Notification::Locked]);
        assert_eq!(f.source.terminated(), vec![10]);

        let outcome = f.next_outcome().await;
        assert_eq!(outcome.operation, DomainOperation::Activate);
        assert!(outcome.result.is_ok());
        assert!(f.hosts().contains("0.0.0.0 slack.com"));
        assert!(f.hosts().contains("::0 www.slack.com"));
    }

    #[tokio::test]
    async fn test_unlocks_after_window_ends() {
        let mut f = Fixture::new(BASE, settings(), &[]);
        f.coordinator.tick(at(TUE, 20, 0));
        f.next_outcome().await;

        f.coordinator.tick(at(WED, 10, 0));

        assert_eq!(f.coordinator.state(), LockState::Unlocked);
        assert_eq!(
            f.notifier.sent(),
            vec![Notification::Locked, Notification::Unlocked]
        );
        let outcome = f.next_outcome().await;
        assert_eq!(outcome.operation, DomainOperation::Deactivate);
        assert_eq!(f.hosts(), BASE);
    }

    #[tokio::test]
    async fn test_morning_tail_of_window_is_locked_without_warning() {
        let mut f = Fixture::new(BASE, settings(), &[]);

        f.coordinator.tick(at(WED, 8, 50));

        assert_eq!(f.coordinator.state(), LockState::Locked);
        assert_eq!(f.notifier.sent(), vec![Notification::Locked]);
    }

    #[tokio::test]
    async fn test_warning_is_sent_once_at_threshold() {
        let mut f = Fixture::new(BASE, settings(), &[]);

        f.coordinator.tick(at(WED, 17, 44));
        assert_eq!(f.coordinator.state(), LockState::Unlocked);

        f.coordinator.tick(at(WED, 17, 45));
        assert_eq!(
            f.coordinator.state(),
            LockState::Warning {
                minutes_remaining: 15
            }
        );
        assert_eq!(f.notifier.sent(), vec![Notification::Warning(15)]);

        f.coordinator.tick(at(WED, 17, 46));
        assert_eq!(
            f.coordinator.state(),
            LockState::Warning {
                minutes_remaining: 14
            }
        );

        // Re-evaluating at the threshold for the same start does not repeat it
        f.coordinator.on_warning_minutes_changed(15, at(WED, 17, 45));
        assert_eq!(f.notifier.sent(), vec![Notification::Warning(15)]);
        assert_eq!(f.writer.writes(), 0);
    }

    #[tokio::test]
    async fn test_warning_uses_configured_threshold() {
        let mut settings = settings();
        settings.warning_minutes = 10;
        let mut f = Fixture::new(BASE, settings, &[]);

        f.coordinator.tick(at(WED, 17, 45));
        assert_eq!(f.coordinator.state(), LockState::Unlocked);

        f.coordinator.tick(at(WED, 17, 50));
        assert_eq!(
            f.coordinator.state(),
            LockState::Warning {
                minutes_remaining: 10
            }
        );
        assert_eq!(f.notifier.sent(), vec![Notification::Warning(10)]);
    }

    #[tokio::test]
    async fn test_manual_lock_suppresses_schedule_until_unlocked() {
        let mut f = Fixture::new(BASE, settings(), &[(10, SLACK)]);

        f.coordinator.manual_lock();
        assert_eq!(
            f.coordinator.snapshot(),
            LockSnapshot {
                state: LockState::Locked,
                manual: true
            }
        );
        assert_eq!(f.source.terminated(), vec![10]);
        f.next_outcome().await;

        // Outside the window, but a manual lock wins
        f.coordinator.tick(at(WED, 12, 0));
        assert_eq!(f.coordinator.state(), LockState::Locked);

        f.coordinator.manual_unlock();
        assert_eq!(f.coordinator.state(), LockState::Unlocked);
        assert!(!f.coordinator.is_manual());
        f.next_outcome().await;
        assert_eq!(f.hosts(), BASE);

        f.coordinator.tick(at(WED, 12, 1));
        assert_eq!(f.coordinator.state(), LockState::Unlocked);
        assert_eq!(f.notifier.sent(), vec![Notification::Locked]);
    }

    #[tokio::test]
    async fn test_manual_lock_outlives_scheduled_end() {
        let mut f = Fixture::new(BASE, settings(), &[]);
        f.coordinator.tick(at(TUE, 20, 0));
        f.coordinator.manual_lock();
        f.notifier.clear();

        f.coordinator.tick(at(WED, 10, 0));

        assert_eq!(f.coordinator.state(), LockState::Locked);
        assert!(f.coordinator.is_manual());
        assert!(f.notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn test_manual_unlock_inside_window_relocks_on_next_tick() {
        let mut f = Fixture::new(BASE, settings(), &[]);
        f.coordinator.tick(at(TUE, 20, 0));

        f.coordinator.manual_unlock();
        assert_eq!(f.coordinator.state(), LockState::Unlocked);

        f.coordinator.tick(at(TUE, 20, 1));
        assert_eq!(f.coordinator.state(), LockState::Locked);
    }

    #[tokio::test]
    async fn test_disabling_schedule_releases_auto_lock_only() {
        let mut f = Fixture::new(BASE, settings(), &[]);
        f.coordinator.tick(at(TUE, 20, 0));
        let mut disabled = settings().schedule;
        disabled.enabled = false;

        f.coordinator.on_schedule_changed(disabled, at(TUE, 20, 1));
        assert_eq!(f.coordinator.state(), LockState::Unlocked);

        f.coordinator.manual_lock();
        f.coordinator.tick(at(TUE, 20, 2));
        assert_eq!(f.coordinator.state(), LockState::Locked);
        assert!(f.coordinator.is_manual());
    }

    #[tokio::test]
    async fn test_disabled_schedule_never_warns() {
        let mut settings = settings();
        settings.schedule.enabled = false;
        let mut f = Fixture::new(BASE, settings, &[]);

        f.coordinator.tick(at(WED, 17, 45));

        assert_eq!(f.coordinator.state(), LockState::Unlocked);
        assert!(f.notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn test_block_set_change_applies_while_locked() {
        let mut f = Fixture::new(BASE, settings(), &[(20, "com.discord")]);
        f.coordinator.tick(at(TUE, 20, 0));
        f.next_outcome().await;
        assert!(f.source.terminated().is_empty());

        let mut block_set = settings().block_set;
        block_set.add_app(BlockedApp::new("com.discord", "Discord"));
        block_set.add_website(BlockedWebsite::new("reddit.com", "Reddit"));
        f.coordinator.on_block_set_changed(block_set);

        assert_eq!(f.source.terminated(), vec![20]);
        let outcome = f.next_outcome().await;
        assert_eq!(outcome.operation, DomainOperation::Update);
        assert!(f.hosts().contains("0.0.0.0 reddit.com"));
        assert!(f.hosts().contains("0.0.0.0 slack.com"));
    }

    #[tokio::test]
    async fn test_block_set_change_while_unlocked_touches_nothing() {
        let mut f = Fixture::new(BASE, settings(), &[(20, "com.discord")]);
        let mut block_set = settings().block_set;
        block_set.add_app(BlockedApp::new("com.discord", "Discord"));

        f.coordinator.on_block_set_changed(block_set);

        assert!(f.source.terminated().is_empty());
        assert_eq!(f.writer.writes(), 0);
    }

    #[tokio::test]
    async fn test_launch_of_blocked_app_notifies_with_display_name() {
        let mut f = Fixture::new(BASE, settings(), &[]);
        f.coordinator.tick(at(TUE, 20, 0));
        f.notifier.clear();

        f.coordinator.handle_launch(&ProcessInfo {
            pid: 99,
            id: SLACK.to_string(),
        });
        f.coordinator.handle_launch(&ProcessInfo {
            pid: 100,
            id: "editor".to_string(),
        });

        assert_eq!(f.source.terminated(), vec![99]);
        assert_eq!(
            f.notifier.sent(),
            vec![Notification::AppBlocked("Slack".to_string())]
        );
    }

    #[tokio::test]
    async fn test_domain_failure_keeps_app_blocking() {
        let mut f = Fixture::with_writer(
            BASE,
            settings(),
            &[(10, SLACK)],
            FakePrivilegedWriter::denying("User canceled"),
        );

        f.coordinator.tick(at(TUE, 20, 0));
        let outcome = f.next_outcome().await;
        assert!(outcome.result.is_err());
        f.coordinator.on_domain_outcome(outcome);

        assert_eq!(f.coordinator.state(), LockState::Locked);
        assert_eq!(f.source.terminated(), vec![10]);
        let report = f.coordinator.status_report(at(TUE, 20, 1));
        assert!(report.apps_active);
        assert!(!report.domains.active);
        assert!(report.domains.last_error.unwrap().contains("User canceled"));
        assert_eq!(f.hosts(), BASE);
    }

    #[tokio::test]
    async fn test_start_removes_stale_block_outside_window() {
        let stale = add_block(BASE, &["reddit.com"]);
        let mut f = Fixture::new(&stale, settings(), &[]);

        f.coordinator.start(at(WED, 12, 0));

        let outcome = f.next_outcome().await;
        assert_eq!(outcome.operation, DomainOperation::Reconcile);
        assert!(outcome.result.is_ok());
        assert!(!f.hosts().contains(BLOCK_START_MARKER));
        assert_eq!(f.coordinator.state(), LockState::Unlocked);
    }

    #[tokio::test]
    async fn test_start_keeps_matching_block_inside_window() {
        let existing = add_block(BASE, &["slack.com"]);
        let mut f = Fixture::new(&existing, settings(), &[]);

        f.coordinator.start(at(TUE, 23, 0));

        let outcome = f.next_outcome().await;
        assert_eq!(outcome.operation, DomainOperation::Activate);
        assert_eq!(f.coordinator.state(), LockState::Locked);
        assert_eq!(f.hosts(), existing);
        assert_eq!(f.writer.writes(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_releases_both_enforcers() {
        let mut f = Fixture::new(BASE, settings(), &[]);
        f.coordinator.manual_lock();
        let mut lock_rx = f.coordinator.subscribe();
        assert!(lock_rx.borrow_and_update().manual);

        f.coordinator.shutdown().await;

        assert_eq!(f.hosts(), BASE);
        let report = f.coordinator.status_report(at(WED, 12, 0));
        assert!(!report.apps_active);
        assert!(!report.domains.active);
    }

    #[tokio::test]
    async fn test_shutdown_survives_failed_hosts_removal() {
        let blocked = add_block(BASE, &["slack.com"]);
        let mut f = Fixture::with_writer(
            &blocked,
            settings(),
            &[(10, SLACK)],
            FakePrivilegedWriter::denying("User canceled"),
        );
        f.coordinator.manual_lock();
        assert_eq!(f.source.terminated(), vec![10]);

        f.coordinator.shutdown().await;

        let report = f.coordinator.status_report(at(WED, 12, 0));
        assert!(!report.apps_active);
        assert!(report.domains.last_error.unwrap().contains("User canceled"));
        assert!(f.hosts().contains(BLOCK_START_MARKER));
    }
}
