use tokio::{sync::mpsc, task::JoinHandle};

mod sysinfo_source;

pub use sysinfo_source::SysinfoProcessSource;

/// A running process as seen by the process source
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProcessInfo {
    pub pid: u32,
    /// Stable identifier used for matching against the block list
    pub id: String,
}

/// Process table access for the app blocker.
///
/// `running` is a pull snapshot; `watch_launches` pushes every newly seen
/// process into `tx` until the returned guard is dropped.
pub trait ProcessSource: Send + Sync {
    /// Snapshot of the processes running right now
    fn running(&self) -> Vec<ProcessInfo>;

    /// Ask the process to exit. Returns `false` if the request could not be
    /// delivered.
    fn terminate(&self, pid: u32) -> bool;

    /// Kill the process without giving it a chance to clean up
    fn force_kill(&self, pid: u32) -> bool;

    /// Start pushing launch events into `tx`
    fn watch_launches(&self, tx: mpsc::UnboundedSender<ProcessInfo>) -> LaunchWatch;
}

/// Subscription guard for launch events; dropping it stops the watcher.
#[derive(Debug)]
pub struct LaunchWatch {
    task: Option<JoinHandle<()>>,
}

impl LaunchWatch {
    #[must_use]
    pub fn new(task: JoinHandle<()>) -> Self {
        Self { task: Some(task) }
    }

    /// A subscription with no background task behind it, for sources that
    /// deliver events some other way
    #[must_use]
    pub fn detached() -> Self {
        Self { task: None }
    }
}

impl Drop for LaunchWatch {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
