use async_trait::async_trait;
use std::{path::Path, sync::Arc};
use tokio::process::Command;

use crate::error::BlockingError;

/// Out-of-process elevation used to replace the hosts file.
#[async_trait]
pub trait PrivilegedWriter: Send + Sync {
    /// Copy `staged` over `target` with elevated privileges.
    ///
    /// May block for as long as the user takes to answer a credentials
    /// prompt.
    async fn install(&self, staged: &Path, target: &Path) -> Result<(), BlockingError>;
}

/// Clears the resolver cache after the hosts file changes.
#[async_trait]
pub trait DnsFlusher: Send + Sync {
    /// Best effort, failures are logged
    async fn flush(&self);
}

/// Create the platform's privileged writer
#[must_use]
pub fn create_privileged_writer() -> Arc<dyn PrivilegedWriter> {
    #[cfg(target_os = "macos")]
    {
        Arc::new(OsascriptWriter)
    }

    #[cfg(not(target_os = "macos"))]
    {
        Arc::new(PkexecWriter)
    }
}

async fn run_helper(cmd: &mut Command) -> Result<(), BlockingError> {
    let output = cmd.output().await?;
    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let message = if stderr.is_empty() {
        format!("helper exited with {}", output.status)
    } else {
        stderr
    };
    Err(BlockingError::PrivilegedWriteFailed(message))
}

/// macOS: `cp` run through AppleScript's administrator privileges prompt
#[derive(Debug, Default)]
pub struct OsascriptWriter;

impl OsascriptWriter {
    fn script(staged: &Path, target: &Path) -> String {
        format!(
            "do shell script \"cp '{}' '{}'\" with administrator privileges",
            staged.display(),
            target.display()
        )
    }
}

#[async_trait]
impl PrivilegedWriter for OsascriptWriter {
    async fn install(&self, staged: &Path, target: &Path) -> Result<(), BlockingError> {
        log::info!("Requesting administrator privileges to update {}", target.display());
        run_helper(
            Command::new("/usr/bin/osascript")
                .arg("-e")
                .arg(Self::script(staged, target)),
        )
        .await
    }
}

/// Linux: `cp` run through polkit's `pkexec`
#[derive(Debug, Default)]
pub struct PkexecWriter;

#[async_trait]
impl PrivilegedWriter for PkexecWriter {
    async fn install(&self, staged: &Path, target: &Path) -> Result<(), BlockingError> {
        log::info!("Requesting elevated privileges to update {}", target.display());
        run_helper(Command::new("pkexec").arg("cp").arg(staged).arg(target)).await
    }
}

/// Flushes the system resolver cache and announces the network change
#[derive(Debug, Default)]
pub struct SystemDnsFlusher;

impl SystemDnsFlusher {
    fn commands() -> Vec<Command> {
        if cfg!(target_os = "macos") {
            let mut flush = Command::new("/usr/bin/dscacheutil");
            flush.arg("-flushcache");
            let mut announce = Command::new("/usr/bin/notifyutil");
            announce.arg("-p").arg("com.apple.system.config.network_change");
            vec![flush, announce]
        } else {
            let mut flush = Command::new("resolvectl");
            flush.arg("flush-caches");
            vec![flush]
        }
    }
}

#[async_trait]
impl DnsFlusher for SystemDnsFlusher {
    async fn flush(&self) {
        for mut cmd in Self::commands() {
            match cmd.status().await {
                Ok(status) if status.success() => {}
                Ok(status) => log::warn!("DNS flush step {cmd:?} exited with {status}"),
                Err(e) => log::warn!("DNS flush step {cmd:?} failed: {e}"),
            }
        }
        log::debug!("DNS cache flushed");
    }
}
