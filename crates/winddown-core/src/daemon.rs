use crate::{
    app_blocker::ProcessBlocker,
    config::{DaemonConfig, SETTINGS_FILE, SOCKET_FILE},
    coordinator::{DomainOutcome, LockCoordinator},
    hosts::{create_privileged_writer, spawn_hosts_worker, HostsBlocker, HostsHandle, SystemDnsFlusher},
    ipc::{listen, IpcRequest, IpcResponse},
    monitor::{ProcessInfo, ProcessSource, SysinfoProcessSource},
    notifier::{DesktopNotifier, LogNotifier, Notifier},
    settings::{SettingsProvider, SettingsStore},
};
use anyhow::Result;
use chrono::Local;
use std::{
    fs,
    future::Future,
    io,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tokio::{
    signal::unix::{signal, Signal, SignalKind},
    sync::mpsc,
    time::interval,
};

/// Termination requests that end the control loop: SIGINT, SIGTERM and
/// SIGHUP. Once installed, none of them kills the process by default.
struct TerminationSignals {
    interrupt: Signal,
    terminate: Signal,
    hangup: Signal,
}

impl TerminationSignals {
    /// # Errors
    ///
    /// Returns an error if a signal handler cannot be registered.
    fn install() -> io::Result<Self> {
        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
            hangup: signal(SignalKind::hangup())?,
        })
    }

    /// Wait for the next termination request and return its name
    async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.interrupt.recv() => "SIGINT",
            _ = self.terminate.recv() => "SIGTERM",
            _ = self.hangup.recv() => "SIGHUP",
        }
    }
}

/// The enforcement daemon: one control loop that owns the lock coordinator
/// and feeds it timer ticks, settings changes, launch events, domain
/// outcomes and IPC requests, one at a time.
pub struct Daemon {
    settings: Arc<SettingsStore>,
    coordinator: LockCoordinator,
    launches: mpsc::UnboundedReceiver<ProcessInfo>,
    outcomes: mpsc::UnboundedReceiver<DomainOutcome>,
    sock_path: PathBuf,
    tick_interval: Duration,
}

impl Daemon {
    /// Wire up the platform components. Must be called inside a tokio
    /// runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings file exists but cannot be loaded.
    pub fn new(config: &DaemonConfig, data_dir: &Path) -> Result<Self> {
        let settings = Arc::new(SettingsStore::open(&data_dir.join(SETTINGS_FILE))?);
        let source: Arc<dyn ProcessSource> = Arc::new(SysinfoProcessSource::new(
            Duration::from_millis(config.launch_poll_millis),
        ));
        let hosts = spawn_hosts_worker(HostsBlocker::new(
            config.hosts_path.clone(),
            create_privileged_writer(),
            Arc::new(SystemDnsFlusher),
        ));
        let notifier: Arc<dyn Notifier> = if config.desktop_notifications {
            Arc::new(DesktopNotifier)
        } else {
            Arc::new(LogNotifier)
        };

        Ok(Self::with_components(
            settings,
            source,
            hosts,
            notifier,
            Duration::from_secs(config.tick_interval_secs),
            data_dir.join(SOCKET_FILE),
        ))
    }

    #[must_use]
    pub fn with_components(
        settings: Arc<SettingsStore>,
        source: Arc<dyn ProcessSource>,
        hosts: HostsHandle,
        notifier: Arc<dyn Notifier>,
        tick_interval: Duration,
        sock_path: PathBuf,
    ) -> Self {
        let (launch_tx, launches) = mpsc::unbounded_channel();
        let (outcome_tx, outcomes) = mpsc::unbounded_channel();
        let coordinator = LockCoordinator::new(
            ProcessBlocker::new(source, launch_tx),
            hosts,
            notifier,
            settings.snapshot(),
            outcome_tx,
        );

        Self {
            settings,
            coordinator,
            launches,
            outcomes,
            sock_path,
            tick_interval,
        }
    }

    /// Run until a termination signal or an IPC shutdown request, then
    /// release both enforcers.
    ///
    /// # Errors
    ///
    /// Returns an error if the signal handlers cannot be installed; failures
    /// inside the loop are logged.
    pub async fn run_with_signals(self) -> Result<()> {
        let mut signals = TerminationSignals::install()?;
        self.run_until(async move {
            let name = signals.recv().await;
            log::info!("Received {name}, shutting down...");
        })
        .await
    }

    /// Control loop, ended by `shutdown` completing or an IPC shutdown
    /// request
    ///
    /// # Errors
    ///
    /// Currently always returns `Ok`.
    pub async fn run_until(mut self, shutdown: impl Future<Output = ()>) -> Result<()> {
        tokio::pin!(shutdown);
        let (request_tx, mut requests) = mpsc::unbounded_channel();
        let sock_path = self.sock_path.clone();
        let listener = tokio::spawn(async move {
            if let Err(e) = listen(request_tx, &sock_path).await {
                log::error!("IPC listener failed: {e}");
            }
        });

        let mut schedule_rx = self.settings.schedule();
        let mut block_set_rx = self.settings.block_set();
        let mut warning_rx = self.settings.warning_minutes();

        self.coordinator.start(Local::now());
        let mut interval = interval(self.tick_interval);
        log::info!("Daemon started with signal handling and IPC");

        loop {
            tokio::select! {
                _ = interval.tick() => self.coordinator.tick(Local::now()),
                Ok(()) = schedule_rx.changed() => {
                    let schedule = schedule_rx.borrow_and_update().clone();
                    self.coordinator.on_schedule_changed(schedule, Local::now());
                }
                Ok(()) = block_set_rx.changed() => {
                    let block_set = block_set_rx.borrow_and_update().clone();
                    self.coordinator.on_block_set_changed(block_set);
                }
                Ok(()) = warning_rx.changed() => {
                    let minutes = *warning_rx.borrow_and_update();
                    self.coordinator.on_warning_minutes_changed(minutes, Local::now());
                }
                Some(process) = self.launches.recv() => self.coordinator.handle_launch(&process),
                Some(outcome) = self.outcomes.recv() => self.coordinator.on_domain_outcome(outcome),
                Some(pending) = requests.recv() => {
                    let requested_shutdown = matches!(pending.request, IpcRequest::Shutdown);
                    let response = self.handle_request(pending.request);
                    let _ = pending.reply.send(response);
                    if requested_shutdown {
                        log::info!("Shutdown requested over IPC");
                        break;
                    }
                }
                () = &mut shutdown => break,
            }
        }

        listener.abort();
        self.coordinator.shutdown().await;
        if self.sock_path.exists() {
            if let Err(e) = fs::remove_file(&self.sock_path) {
                log::warn!("Failed to remove socket {}: {e}", self.sock_path.display());
            }
        }
        log::info!("Daemon shut down gracefully.");
        Ok(())
    }

    fn handle_request(&mut self, request: IpcRequest) -> IpcResponse {
        let now = Local::now();
        let result = match request {
            IpcRequest::Status => return IpcResponse::Status(self.coordinator.status_report(now)),
            IpcRequest::GetSettings => return IpcResponse::Settings(self.settings.snapshot()),
            IpcRequest::Shutdown => return IpcResponse::Shutdown,
            IpcRequest::Lock => {
                self.coordinator.manual_lock();
                return IpcResponse::Status(self.coordinator.status_report(now));
            }
            IpcRequest::Unlock => {
                self.coordinator.manual_unlock();
                return IpcResponse::Status(self.coordinator.status_report(now));
            }
            IpcRequest::UpdateSchedule(schedule) => self.settings.set_schedule(schedule),
            IpcRequest::UpdateBlockSet(block_set) => self.settings.set_block_set(block_set),
            IpcRequest::SetWarningMinutes(minutes) => self.settings.set_warning_minutes(minutes),
        };

        match result {
            Ok(()) => IpcResponse::Ok,
            Err(e) => {
                log::warn!("Rejected settings update: {e}");
                IpcResponse::Error(e.to_string())
            }
        }
    }
}
