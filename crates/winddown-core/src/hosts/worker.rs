use serde::{Deserialize, Serialize};
use std::{io, path::PathBuf};
use tokio::sync::{mpsc, oneshot, watch};

use super::HostsBlocker;
use crate::error::BlockingError;

type Callback = Box<dyn FnOnce(Result<(), BlockingError>) + Send>;

enum Command {
    Activate(Vec<String>, Callback),
    Deactivate(Callback),
    Update(Vec<String>, Callback),
}

impl Command {
    fn into_callback(self) -> Callback {
        match self {
            Self::Activate(_, callback) | Self::Deactivate(callback) | Self::Update(_, callback) => {
                callback
            }
        }
    }
}

/// Observable state of the domain enforcer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainStatus {
    pub active: bool,
    pub domains: Vec<String>,
    /// Message of the most recent failed operation, cleared once the hosts
    /// file is written or verified successfully
    pub last_error: Option<String>,
}

/// Queue-backed handle to a [`HostsBlocker`] running on its own task.
///
/// Operations run strictly in submission order; each reports its outcome
/// through the callback it was submitted with. There is no cancellation, a
/// new operation waits behind the one in flight.
#[derive(Clone)]
pub struct HostsHandle {
    tx: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<DomainStatus>,
    hosts_path: PathBuf,
}

/// Move `blocker` onto a worker task and return a handle to it.
/// The worker exits once every handle is dropped.
#[must_use]
pub fn spawn_hosts_worker(mut blocker: HostsBlocker) -> HostsHandle {
    let (tx, mut rx) = mpsc::unbounded_channel::<Command>();
    let (status_tx, status_rx) = watch::channel(DomainStatus::default());
    let hosts_path = blocker.hosts_path().to_path_buf();

    tokio::spawn(async move {
        let mut last_error = None;
        while let Some(command) = rx.recv().await {
            let (result, callback, record_only) = match command {
                Command::Activate(domains, callback) => {
                    (blocker.activate(domains).await, callback, false)
                }
                Command::Deactivate(callback) => (blocker.deactivate().await, callback, false),
                Command::Update(domains, callback) => {
                    // Inactive updates only record the set, the file is untouched
                    let record_only = !blocker.is_active();
                    (blocker.update_blocked_set(domains).await, callback, record_only)
                }
            };

            match &result {
                Err(e) => {
                    log::error!("Hosts operation failed: {e}");
                    last_error = Some(e.to_string());
                }
                Ok(()) if !record_only => last_error = None,
                Ok(()) => {}
            }
            status_tx.send_replace(DomainStatus {
                active: blocker.is_active(),
                domains: blocker.blocked_domains().to_vec(),
                last_error: last_error.clone(),
            });
            callback(result);
        }
        log::debug!("Hosts worker stopped");
    });

    HostsHandle {
        tx,
        status: status_rx,
        hosts_path,
    }
}

impl HostsHandle {
    pub fn activate(
        &self,
        domains: Vec<String>,
        callback: impl FnOnce(Result<(), BlockingError>) + Send + 'static,
    ) {
        self.submit(Command::Activate(domains, Box::new(callback)));
    }

    pub fn deactivate(&self, callback: impl FnOnce(Result<(), BlockingError>) + Send + 'static) {
        self.submit(Command::Deactivate(Box::new(callback)));
    }

    pub fn update_blocked_set(
        &self,
        domains: Vec<String>,
        callback: impl FnOnce(Result<(), BlockingError>) + Send + 'static,
    ) {
        self.submit(Command::Update(domains, Box::new(callback)));
    }

    /// Queue a deactivation and wait for it to finish
    ///
    /// # Errors
    ///
    /// Returns the deactivation's error, or `WorkerGone` if the worker has
    /// stopped.
    pub async fn deactivate_and_wait(&self) -> Result<(), BlockingError> {
        let (tx, rx) = oneshot::channel();
        self.deactivate(move |result| {
            let _ = tx.send(result);
        });
        rx.await.unwrap_or(Err(BlockingError::WorkerGone))
    }

    #[must_use]
    pub fn status(&self) -> DomainStatus {
        self.status.borrow().clone()
    }

    /// Whether the hosts file currently contains a block section, regardless
    /// of what the worker believes
    #[must_use]
    pub fn block_present(&self) -> bool {
        super::block_present(&self.hosts_path)
    }

    /// # Errors
    ///
    /// Returns an error if the hosts file cannot be read.
    pub fn blocked_entries(&self) -> io::Result<Vec<String>> {
        super::blocked_entries(&self.hosts_path)
    }

    fn submit(&self, command: Command) {
        if let Err(mpsc::error::SendError(command)) = self.tx.send(command) {
            log::error!("Hosts worker is gone, dropping operation");
            (command.into_callback())(Err(BlockingError::WorkerGone));
        }
    }
}
