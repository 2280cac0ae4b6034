//! Integration lifecycle: forwards entries to platforms and drives polling.

use tokio::time::Instant;
use tracing::{error, info};

use crate::entry::{ConfigEntry, EntryError};
use crate::model::ProviderMeta;
use crate::ports::Platform;

/// Public entry point wiring config entries into their platforms.
pub struct Integration {
    meta: ProviderMeta,
    platforms: Vec<Box<dyn Platform>>,
}

impl Integration {
    /// Integration with no platforms attached yet.
    #[must_use]
    pub fn new(meta: ProviderMeta) -> Self {
        Self {
            meta,
            platforms: Vec::new(),
        }
    }

    /// Attach a platform.
    #[must_use]
    pub fn with_platform(mut self, platform: Box<dyn Platform>) -> Self {
        self.platforms.push(platform);
        self
    }

    /// Provider metadata.
    #[must_use]
    pub fn meta(&self) -> &ProviderMeta {
        &self.meta
    }

    /// Names of the attached platforms.
    pub fn platform_names(&self) -> impl Iterator<Item = &str> {
        self.platforms.iter().map(|platform| platform.name())
    }

    /// Set up an entry on every platform.
    ///
    /// # Errors
    ///
    /// Returns the first [`EntryError`] raised by a platform.
    pub async fn setup_entry(&mut self, entry: &ConfigEntry) -> Result<(), EntryError> {
        info!(
            domain = %self.meta.domain,
            title = %entry.title,
            address = %entry.data.address,
            "Setting up config entry"
        );

        for platform in &mut self.platforms {
            if let Err(err) = platform.setup_entry(entry).await {
                error!(platform = platform.name(), entry_id = %entry.entry_id, "Setup failed: {err}");
                return Err(err);
            }
        }
        Ok(())
    }

    /// Unload an entry from every platform. True only if all of them had it loaded.
    pub async fn unload_entry(&mut self, entry_id: &str) -> bool {
        let mut unload_ok = true;
        for platform in &mut self.platforms {
            unload_ok &= platform.unload_entry(entry_id).await;
        }

        if unload_ok {
            info!(domain = %self.meta.domain, entry_id, "Unloaded config entry");
        }
        unload_ok
    }

    /// Refresh everything that is due.
    pub async fn poll(&mut self, now: Instant) -> usize {
        let mut refreshed = 0;
        for platform in &mut self.platforms {
            refreshed += platform.poll(now).await;
        }
        refreshed
    }

    /// Earliest time any platform wants to be polled.
    #[must_use]
    pub fn next_poll(&self) -> Option<Instant> {
        self.platforms
            .iter()
            .filter_map(|platform| platform.next_poll())
            .min()
    }
}
