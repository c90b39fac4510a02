use std::{
    collections::HashSet,
    sync::{Mutex, PoisonError},
    time::Duration,
};
use sysinfo::{Pid, Signal, System};
use tokio::sync::mpsc;

use super::{LaunchWatch, ProcessInfo, ProcessSource};

/// Process source backed by `sysinfo`.
///
/// Launches are detected by diffing the process table every `poll_interval`;
/// the process name serves as the identifier.
pub struct SysinfoProcessSource {
    system: Mutex<System>,
    poll_interval: Duration,
}

impl SysinfoProcessSource {
    #[must_use]
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            system: Mutex::new(System::new()),
            poll_interval,
        }
    }

    fn with_process<T>(&self, pid: u32, f: impl FnOnce(&sysinfo::Process) -> T) -> Option<T> {
        let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        let pid = Pid::from_u32(pid);
        if !system.refresh_process(pid) {
            return None;
        }
        system.process(pid).map(f)
    }
}

fn snapshot(system: &System) -> Vec<ProcessInfo> {
    system
        .processes()
        .iter()
        .map(|(pid, process)| ProcessInfo {
            pid: pid.as_u32(),
            id: process.name().to_string(),
        })
        .collect()
}

impl ProcessSource for SysinfoProcessSource {
    fn running(&self) -> Vec<ProcessInfo> {
        let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        system.refresh_processes();
        snapshot(&system)
    }

    fn terminate(&self, pid: u32) -> bool {
        self.with_process(pid, |process| process.kill_with(Signal::Term))
            .flatten()
            .unwrap_or(false)
    }

    fn force_kill(&self, pid: u32) -> bool {
        self.with_process(pid, sysinfo::Process::kill)
            .unwrap_or(false)
    }

    fn watch_launches(&self, tx: mpsc::UnboundedSender<ProcessInfo>) -> LaunchWatch {
        let poll_interval = self.poll_interval;
        let task = tokio::spawn(async move {
            let mut system = System::new();
            system.refresh_processes();
            let mut known: HashSet<u32> = snapshot(&system).iter().map(|p| p.pid).collect();
            let mut interval = tokio::time::interval(poll_interval);
            log::debug!("Watching for process launches every {poll_interval:?}");

            loop {
                interval.tick().await;
                system.refresh_processes();
                let current = snapshot(&system);
                for process in &current {
                    if !known.contains(&process.pid) && tx.send(process.clone()).is_err() {
                        return;
                    }
                }
                known = current.into_iter().map(|p| p.pid).collect();
            }
        });
        LaunchWatch::new(task)
    }
}
