//! Fakes for the OS boundaries, shared by unit tests.

use async_trait::async_trait;
use std::{
    fs,
    path::Path,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
};
use tokio::sync::mpsc;

use crate::{
    error::BlockingError,
    hosts::{DnsFlusher, PrivilegedWriter},
    monitor::{LaunchWatch, ProcessInfo, ProcessSource},
    notifier::Notifier,
};

#[derive(Default)]
pub struct FakeProcessSource {
    running: Mutex<Vec<ProcessInfo>>,
    terminated: Mutex<Vec<u32>>,
    killed: Mutex<Vec<u32>>,
    watches: AtomicUsize,
    ignores_terminate: bool,
}

impl FakeProcessSource {
    pub fn with_running(processes: &[(u32, &str)]) -> Self {
        let source = Self::default();
        *source.running.lock().unwrap() = processes
            .iter()
            .map(|(pid, id)| ProcessInfo {
                pid: *pid,
                id: (*id).to_string(),
            })
            .collect();
        source
    }

    /// Graceful termination requests always fail
    pub fn stubborn(processes: &[(u32, &str)]) -> Self {
        Self {
            ignores_terminate: true,
            ..Self::with_running(processes)
        }
    }

    pub fn terminated(&self) -> Vec<u32> {
        self.terminated.lock().unwrap().clone()
    }

    pub fn killed(&self) -> Vec<u32> {
        self.killed.lock().unwrap().clone()
    }

    pub fn watch_count(&self) -> usize {
        self.watches.load(Ordering::SeqCst)
    }
}

impl ProcessSource for FakeProcessSource {
    fn running(&self) -> Vec<ProcessInfo> {
        self.running.lock().unwrap().clone()
    }

    fn terminate(&self, pid: u32) -> bool {
        self.terminated.lock().unwrap().push(pid);
        !self.ignores_terminate
    }

    fn force_kill(&self, pid: u32) -> bool {
        self.killed.lock().unwrap().push(pid);
        true
    }

    fn watch_launches(&self, _tx: mpsc::UnboundedSender<ProcessInfo>) -> LaunchWatch {
        self.watches.fetch_add(1, Ordering::SeqCst);
        LaunchWatch::detached()
    }
}

/// Copies the staged file directly, or refuses with a fixed message
#[derive(Default)]
pub struct FakePrivilegedWriter {
    writes: AtomicUsize,
    denial: Option<String>,
}

impl FakePrivilegedWriter {
    pub fn denying(message: &str) -> Self {
        Self {
            writes: AtomicUsize::new(0),
            denial: Some(message.to_string()),
        }
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PrivilegedWriter for FakePrivilegedWriter {
    async fn install(&self, staged: &Path, target: &Path) -> Result<(), BlockingError> {
        if let Some(message) = &self.denial {
            return Err(BlockingError::PrivilegedWriteFailed(message.clone()));
        }
        fs::copy(staged, target)?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeDnsFlusher;

#[async_trait]
impl DnsFlusher for FakeDnsFlusher {
    async fn flush(&self) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Warning(u32),
    Locked,
    Unlocked,
    AppBlocked(String),
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }

    fn push(&self, notification: Notification) {
        self.sent.lock().unwrap().push(notification);
    }
}

impl Notifier for RecordingNotifier {
    fn notify_warning(&self, minutes_remaining: u32) {
        self.push(Notification::Warning(minutes_remaining));
    }

    fn notify_locked(&self) {
        self.push(Notification::Locked);
    }

    fn notify_unlocked(&self) {
        self.push(Notification::Unlocked);
    }

    fn notify_app_blocked(&self, app_name: &str) {
        self.push(Notification::AppBlocked(app_name.to_string()));
    }
}
