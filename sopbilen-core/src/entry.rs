//! Config entries: one persisted registration per address.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use ulid::Ulid;

use crate::model::{Address, UniqueKey};

/// Version written into the storage file.
pub const STORAGE_VERSION: u32 = 1;

#[derive(thiserror::Error, Debug)]
/// Errors raised while registering, storing, or loading entries.
pub enum EntryError {
    /// An entry with the same normalized address exists.
    #[error("Address already configured: {0}")]
    AlreadyConfigured(UniqueKey),
    /// No entry with the given id.
    #[error("Unknown config entry: {0}")]
    UnknownEntry(String),
    /// The entry carries no usable address.
    #[error("Config entry {0} has no address")]
    MissingAddress(String),
    /// Reading or writing the storage file failed.
    #[error("Storage error: {0}")]
    Io(#[from] std::io::Error),
    /// The storage file is not valid JSON for this schema.
    #[error("Storage format error: {0}")]
    Format(#[from] serde_json::Error),
    /// The storage file was written by an incompatible version.
    #[error("Unsupported storage version {0}")]
    UnsupportedVersion(u32),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Data persisted with an entry.
pub struct EntryData {
    /// Address as entered, trimmed but not lower-cased.
    pub address: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// A registered address-to-sensor binding.
pub struct ConfigEntry {
    /// Generated identifier.
    pub entry_id: String,
    /// Integration domain that owns the entry.
    pub domain: String,
    /// Display name.
    pub title: String,
    /// Persisted configuration.
    pub data: EntryData,
    /// Deduplication key derived from the address.
    pub unique_id: UniqueKey,
    /// Creation time.
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl ConfigEntry {
    /// Create an entry with a fresh id; the unique id is derived from the address.
    #[must_use]
    pub fn new<D: Into<String>, T: Into<String>>(domain: D, title: T, address: Address) -> Self {
        Self {
            entry_id: Ulid::new().to_string(),
            domain: domain.into(),
            title: title.into(),
            unique_id: address.unique_key(),
            data: EntryData { address },
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Default)]
/// In-memory set of entries, unique by normalized address.
pub struct EntryRegistry {
    entries: BTreeMap<String, ConfigEntry>,
}

impl EntryRegistry {
    /// Build a registry from previously stored entries.
    ///
    /// # Errors
    ///
    /// Returns [`EntryError::AlreadyConfigured`] if two entries share a unique id.
    pub fn from_entries(entries: Vec<ConfigEntry>) -> Result<Self, EntryError> {
        let mut registry = Self::default();
        for entry in entries {
            registry.insert(entry)?;
        }
        Ok(registry)
    }

    /// Whether an entry with this key already exists.
    #[must_use]
    pub fn is_configured(&self, key: &UniqueKey) -> bool {
        self.entries.values().any(|entry| &entry.unique_id == key)
    }

    /// Add an entry.
    ///
    /// # Errors
    ///
    /// Returns [`EntryError::AlreadyConfigured`] when its unique id is taken.
    pub fn insert(&mut self, entry: ConfigEntry) -> Result<(), EntryError> {
        if self.is_configured(&entry.unique_id) {
            return Err(EntryError::AlreadyConfigured(entry.unique_id));
        }
        self.entries.insert(entry.entry_id.clone(), entry);
        Ok(())
    }

    /// Remove an entry by id.
    ///
    /// # Errors
    ///
    /// Returns [`EntryError::UnknownEntry`] when no such entry exists.
    pub fn remove(&mut self, entry_id: &str) -> Result<ConfigEntry, EntryError> {
        self.entries
            .remove(entry_id)
            .ok_or_else(|| EntryError::UnknownEntry(entry_id.to_owned()))
    }

    /// Look up an entry by id.
    #[must_use]
    pub fn get(&self, entry_id: &str) -> Option<&ConfigEntry> {
        self.entries.get(entry_id)
    }

    /// Iterator over all entries, ordered by id.
    pub fn iter(&self) -> impl Iterator<Item = &ConfigEntry> {
        self.entries.values()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredEntries {
    version: u32,
    entries: Vec<ConfigEntry>,
}

/// JSON file holding all registered entries.
#[derive(Debug, Clone)]
pub struct EntryStore {
    path: PathBuf,
}

impl EntryStore {
    /// Store backed by the given file.
    #[must_use]
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    /// Location of the storage file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read all entries. A missing file yields an empty registry.
    ///
    /// # Errors
    ///
    /// Returns an [`EntryError`] when the file cannot be read or decoded.
    pub fn load(&self) -> Result<EntryRegistry, EntryError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No entry storage yet");
                return Ok(EntryRegistry::default());
            }
            Err(err) => return Err(err.into()),
        };

        let stored: StoredEntries = serde_json::from_str(&text)?;
        if stored.version != STORAGE_VERSION {
            return Err(EntryError::UnsupportedVersion(stored.version));
        }
        EntryRegistry::from_entries(stored.entries)
    }

    /// Write all entries, replacing the file.
    ///
    /// # Errors
    ///
    /// Returns an [`EntryError`] when the file cannot be written.
    pub fn save(&self, registry: &EntryRegistry) -> Result<(), EntryError> {
        if let Some(parent) = self.path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let stored = StoredEntries {
            version: STORAGE_VERSION,
            entries: registry.iter().cloned().collect(),
        };
        let encoded = serde_json::to_string_pretty(&stored)?;

        // write next to the target, then swap it in
        let staging = self.path.with_extension("tmp");
        fs::write(&staging, encoded)?;
        fs::rename(&staging, &self.path)?;

        debug!(path = %self.path.display(), count = registry.len(), "Saved config entries");
        Ok(())
    }
}
