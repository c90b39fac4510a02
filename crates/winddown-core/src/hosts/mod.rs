//! Domain blocking through a marker-delimited section of the hosts file.
//!
//! The section looks like this, with every alias sorted and listed against
//! three null/loopback targets so both IPv4 and IPv6 resolvers give up:
//!
//! ```text
//! # >>> WindDown Blocked Domains >>>
//! 0.0.0.0 slack.com
//! 127.0.0.1 slack.com
//! ::0 slack.com
//! 0.0.0.0 www.slack.com
//! 127.0.0.1 www.slack.com
//! ::0 www.slack.com
//! # <<< WindDown Blocked Domains <<<
//! ```
//!
//! Writes go through a [`PrivilegedWriter`], which may prompt the user for
//! credentials and may be denied.

use std::{
    collections::BTreeSet,
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::error::BlockingError;

mod privileged;
mod worker;

pub use privileged::{
    create_privileged_writer, DnsFlusher, OsascriptWriter, PkexecWriter, PrivilegedWriter,
    SystemDnsFlusher,
};
pub use worker::{spawn_hosts_worker, DomainStatus, HostsHandle};

pub const BLOCK_START_MARKER: &str = "# >>> WindDown Blocked Domains >>>";
pub const BLOCK_END_MARKER: &str = "# <<< WindDown Blocked Domains <<<";

const NULL_TARGETS: [&str; 3] = ["0.0.0.0", "127.0.0.1", "::0"];

/// Render the block section for `domains`, adding a `www.` variant for
/// every domain that does not already have one.
#[must_use]
pub fn block_section<S: AsRef<str>>(domains: &[S]) -> String {
    let mut aliases = BTreeSet::new();
    for domain in domains {
        let domain = domain.as_ref().trim();
        if domain.is_empty() {
            continue;
        }
        aliases.insert(domain.to_string());
        if !domain.starts_with("www.") {
            aliases.insert(format!("www.{domain}"));
        }
    }

    let mut lines = vec![BLOCK_START_MARKER.to_string()];
    for alias in &aliases {
        lines.extend(NULL_TARGETS.iter().map(|target| format!("{target} {alias}")));
    }
    lines.push(BLOCK_END_MARKER.to_string());
    lines.join("\n")
}

/// Strip the block section from `contents`.
///
/// Returns `contents` untouched when no well-formed section is present;
/// otherwise the remainder, trimmed of surrounding whitespace.
#[must_use]
pub fn remove_existing_block(contents: &str) -> String {
    let Some(start) = contents.find(BLOCK_START_MARKER) else {
        return contents.to_string();
    };
    let Some(end) = contents[start..]
        .find(BLOCK_END_MARKER)
        .map(|offset| start + offset + BLOCK_END_MARKER.len())
    else {
        return contents.to_string();
    };

    let mut remaining = String::with_capacity(contents.len());
    remaining.push_str(&contents[..start]);
    remaining.push_str(&contents[end..]);
    remaining.trim().to_string()
}

/// Replace any existing block section in `contents` with a fresh one for
/// `domains`, appended after a blank line.
#[must_use]
pub fn add_block<S: AsRef<str>>(contents: &str, domains: &[S]) -> String {
    let base = remove_existing_block(contents);
    format!("{}\n\n{}\n", base.trim(), block_section(domains))
}

/// The address lines currently inside the block section
#[must_use]
pub fn section_entries(contents: &str) -> Vec<String> {
    let Some(start) = contents.find(BLOCK_START_MARKER) else {
        return Vec::new();
    };
    let body_start = start + BLOCK_START_MARKER.len();
    let Some(end) = contents[body_start..].find(BLOCK_END_MARKER) else {
        return Vec::new();
    };
    contents[body_start..body_start + end]
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

fn with_trailing_newline(mut contents: String) -> String {
    if !contents.is_empty() && !contents.ends_with('\n') {
        contents.push('\n');
    }
    contents
}

/// The domain enforcer.
///
/// Operations are sequential and awaited; [`spawn_hosts_worker`] wraps a
/// blocker in a task so callers can queue operations without waiting on the
/// privilege prompt.
pub struct HostsBlocker {
    hosts_path: PathBuf,
    writer: Arc<dyn PrivilegedWriter>,
    flusher: Arc<dyn DnsFlusher>,
    active: bool,
    domains: Vec<String>,
}

impl HostsBlocker {
    #[must_use]
    pub fn new(
        hosts_path: PathBuf,
        writer: Arc<dyn PrivilegedWriter>,
        flusher: Arc<dyn DnsFlusher>,
    ) -> Self {
        Self {
            hosts_path,
            writer,
            flusher,
            active: false,
            domains: Vec::new(),
        }
    }

    #[must_use]
    pub fn hosts_path(&self) -> &Path {
        &self.hosts_path
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    #[must_use]
    pub fn blocked_domains(&self) -> &[String] {
        &self.domains
    }

    #[must_use]
    pub fn is_domain_blocked(&self, domain: &str) -> bool {
        self.active
            && self
                .domains
                .iter()
                .any(|d| d == domain || *d == format!("www.{domain}"))
    }

    /// Write the block section for `domains`.
    ///
    /// A no-op if already active, and skips the privileged write when the
    /// file already holds exactly this section.
    ///
    /// # Errors
    ///
    /// Returns an error if the hosts file cannot be read or the privileged
    /// write fails; the blocker stays inactive in that case.
    pub async fn activate(&mut self, domains: Vec<String>) -> Result<(), BlockingError> {
        if self.active {
            return Ok(());
        }

        let current = self.read()?;
        if current.contains(&block_section(&domains)) {
            log::info!("Block already present in hosts file, skipping write");
        } else {
            self.write(add_block(&current, &domains)).await?;
            self.flush_dns();
        }

        self.active = true;
        log::info!("Domain blocking activated with {} domains", domains.len());
        self.domains = domains;
        Ok(())
    }

    /// Remove the block section, whether or not this blocker wrote it.
    ///
    /// # Errors
    ///
    /// Returns an error if the hosts file cannot be read or the privileged
    /// write fails.
    pub async fn deactivate(&mut self) -> Result<(), BlockingError> {
        let current = self.read()?;
        if current.contains(BLOCK_START_MARKER) {
            self.write(with_trailing_newline(remove_existing_block(&current)))
                .await?;
            self.flush_dns();
        } else {
            log::debug!("No block section in hosts file, nothing to remove");
        }

        self.active = false;
        self.domains.clear();
        log::info!("Domain blocking deactivated");
        Ok(())
    }

    /// Swap the blocked domains. While inactive this only records the set.
    ///
    /// # Errors
    ///
    /// Returns an error if the hosts file cannot be read or the privileged
    /// write fails; the previous set stays in place in that case.
    pub async fn update_blocked_set(&mut self, domains: Vec<String>) -> Result<(), BlockingError> {
        if !self.active {
            self.domains = domains;
            return Ok(());
        }

        let current = self.read()?;
        if current.contains(&block_section(&domains)) {
            log::info!("Updated block already present in hosts file, skipping write");
        } else {
            self.write(add_block(&current, &domains)).await?;
            self.flush_dns();
        }

        log::info!("Blocked domains updated to {} entries", domains.len());
        self.domains = domains;
        Ok(())
    }

    fn read(&self) -> Result<String, BlockingError> {
        Ok(fs::read_to_string(&self.hosts_path)?)
    }

    async fn write(&self, contents: String) -> Result<(), BlockingError> {
        let mut staged = tempfile::Builder::new().prefix("hosts_temp_").tempfile()?;
        staged.write_all(contents.as_bytes())?;
        staged.flush()?;
        self.writer.install(staged.path(), &self.hosts_path).await
    }

    fn flush_dns(&self) {
        let flusher = self.flusher.clone();
        tokio::spawn(async move { flusher.flush().await });
    }
}

/// Whether `path` currently contains a block section.
/// Unreadable files count as not blocked.
#[must_use]
pub fn block_present(path: &Path) -> bool {
    match fs::read_to_string(path) {
        Ok(contents) => contents.contains(BLOCK_START_MARKER),
        Err(e) => {
            log::warn!("Failed to read {}: {e}", path.display());
            false
        }
    }
}

/// The address lines inside the block section of `path`
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub fn blocked_entries(path: &Path) -> io::Result<Vec<String>> {
    fs::read_to_string(path).map(|contents| section_entries(&contents))
}
