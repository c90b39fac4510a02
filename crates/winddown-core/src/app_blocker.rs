use std::{collections::HashSet, sync::Arc};
use tokio::sync::mpsc;

use crate::monitor::{LaunchWatch, ProcessInfo, ProcessSource};

/// Terminates blocked applications while active.
///
/// Termination is one-directional: deactivating or shrinking the set never
/// restores anything, it only stops future terminations.
pub struct ProcessBlocker {
    source: Arc<dyn ProcessSource>,
    launches: mpsc::UnboundedSender<ProcessInfo>,
    blocked_ids: HashSet<String>,
    watch: Option<LaunchWatch>,
}

impl ProcessBlocker {
    /// `launches` is where launch events are delivered while active; the
    /// owner feeds them back through [`ProcessBlocker::handle_launch`].
    #[must_use]
    pub fn new(
        source: Arc<dyn ProcessSource>,
        launches: mpsc::UnboundedSender<ProcessInfo>,
    ) -> Self {
        Self {
            source,
            launches,
            blocked_ids: HashSet::new(),
            watch: None,
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.watch.is_some()
    }

    #[must_use]
    pub fn blocked_ids(&self) -> &HashSet<String> {
        &self.blocked_ids
    }

    #[must_use]
    pub fn is_blocked(&self, id: &str) -> bool {
        self.is_active() && self.blocked_ids.contains(id)
    }

    pub fn activate(&mut self, ids: HashSet<String>) {
        if self.is_active() {
            return;
        }
        self.blocked_ids = ids;
        self.watch = Some(self.source.watch_launches(self.launches.clone()));
        let terminated = self.terminate_running();
        log::info!(
            "App blocking activated with {} blocked apps ({terminated} terminated)",
            self.blocked_ids.len()
        );
    }

    pub fn deactivate(&mut self) {
        if self.watch.take().is_none() {
            return;
        }
        self.blocked_ids.clear();
        log::info!("App blocking deactivated");
    }

    pub fn update_blocked_set(&mut self, ids: HashSet<String>) {
        self.blocked_ids = ids;
        if self.is_active() {
            let terminated = self.terminate_running();
            log::info!(
                "Blocked apps updated to {} entries ({terminated} terminated)",
                self.blocked_ids.len()
            );
        }
    }

    /// React to a launch event. Returns `true` if the process was blocked,
    /// in which case the caller should tell the user.
    pub fn handle_launch(&self, process: &ProcessInfo) -> bool {
        if !self.is_blocked(&process.id) {
            return false;
        }
        log::info!("Blocked app launched: {} (pid {})", process.id, process.pid);
        self.terminate(process);
        true
    }

    fn terminate_running(&self) -> usize {
        self.source
            .running()
            .iter()
            .filter(|process| self.blocked_ids.contains(&process.id))
            .inspect(|process| self.terminate(process))
            .count()
    }

    fn terminate(&self, process: &ProcessInfo) {
        if self.source.terminate(process.pid) {
            log::info!("Terminated {} (pid {})", process.id, process.pid);
            return;
        }
        if self.source.force_kill(process.pid) {
            log::info!("Force killed {} (pid {})", process.id, process.pid);
        } else {
            log::warn!("Failed to terminate {} (pid {})", process.id, process.pid);
        }
    }
}
