use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

/// An application that is terminated while blocking is active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockedApp {
    /// Process identifier as reported by the process source
    pub app_id: String,
    pub name: String,
    pub enabled: bool,
}

impl BlockedApp {
    #[must_use]
    pub fn new(app_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            name: name.into(),
            enabled: true,
        }
    }
}

/// A website whose domains are redirected while blocking is active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockedWebsite {
    pub domain: String,
    pub name: String,
    pub enabled: bool,
    #[serde(default)]
    pub extra_aliases: Vec<String>,
}

impl BlockedWebsite {
    #[must_use]
    pub fn new(domain: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            name: name.into(),
            enabled: true,
            extra_aliases: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_aliases(mut self, aliases: Vec<String>) -> Self {
        self.extra_aliases = aliases;
        self
    }

    /// The domain, its `www.` variant and any extra aliases, in that order
    /// and without duplicates
    #[must_use]
    pub fn all_domains(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        std::iter::once(self.domain.clone())
            .chain(std::iter::once(format!("www.{}", self.domain)))
            .chain(self.extra_aliases.iter().cloned())
            .filter(|domain| seen.insert(domain.clone()))
            .collect()
    }
}

/// The user's block list: apps and websites, each individually toggleable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSet {
    #[serde(default)]
    pub apps: Vec<BlockedApp>,
    #[serde(default)]
    pub websites: Vec<BlockedWebsite>,
}

impl BlockSet {
    pub fn enabled_apps(&self) -> impl Iterator<Item = &BlockedApp> {
        self.apps.iter().filter(|app| app.enabled)
    }

    pub fn enabled_websites(&self) -> impl Iterator<Item = &BlockedWebsite> {
        self.websites.iter().filter(|site| site.enabled)
    }

    #[must_use]
    pub fn enabled_app_ids(&self) -> HashSet<String> {
        self.enabled_apps().map(|app| app.app_id.clone()).collect()
    }

    /// Every alias of every enabled website, sorted and deduplicated
    #[must_use]
    pub fn enabled_domains(&self) -> BTreeSet<String> {
        self.enabled_websites()
            .flat_map(BlockedWebsite::all_domains)
            .collect()
    }

    /// Display name for a process identifier, if it is on the list
    #[must_use]
    pub fn app_name(&self, app_id: &str) -> Option<&str> {
        self.apps
            .iter()
            .find(|app| app.app_id == app_id)
            .map(|app| app.name.as_str())
    }

    /// Add an app unless one with the same identifier exists.
    /// Returns `true` if the list changed.
    pub fn add_app(&mut self, app: BlockedApp) -> bool {
        if self.apps.iter().any(|a| a.app_id == app.app_id) {
            return false;
        }
        self.apps.push(app);
        true
    }

    pub fn remove_app(&mut self, app_id: &str) -> bool {
        let before = self.apps.len();
        self.apps.retain(|a| a.app_id != app_id);
        self.apps.len() != before
    }

    pub fn toggle_app(&mut self, app_id: &str, enabled: bool) -> bool {
        match self.apps.iter_mut().find(|a| a.app_id == app_id) {
            Some(app) if app.enabled != enabled => {
                app.enabled = enabled;
                true
            }
            _ => false,
        }
    }

    /// Add a website unless one with the same domain exists.
    /// Returns `true` if the list changed.
    pub fn add_website(&mut self, website: BlockedWebsite) -> bool {
        if self.websites.iter().any(|w| w.domain == website.domain) {
            return false;
        }
        self.websites.push(website);
        true
    }

    pub fn remove_website(&mut self, domain: &str) -> bool {
        let before = self.websites.len();
        self.websites.retain(|w| w.domain != domain);
        self.websites.len() != before
    }

    pub fn toggle_website(&mut self, domain: &str, enabled: bool) -> bool {
        match self.websites.iter_mut().find(|w| w.domain == domain) {
            Some(site) if site.enabled != enabled => {
                site.enabled = enabled;
                true
            }
            _ => false,
        }
    }
}
