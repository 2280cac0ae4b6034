//! Traits describing provider and platform capabilities plus their error types.

use async_trait::async_trait;
use reqwest::Error as ReqwestError;
use reqwest::StatusCode;
use serde_json::Error as JsonError;
use serde_json::Value;
use tokio::time::Instant;

use crate::entry::{ConfigEntry, EntryError};
use crate::model::{Address, ParseResult, ProviderMeta};

#[derive(thiserror::Error, Debug)]
/// Errors that end one update cycle of a sensor.
pub enum PortError {
    /// Connection, TLS, or timeout failure.
    #[error("Network error: {0}")]
    Transport(#[from] ReqwestError),
    /// The service answered with anything but 200.
    #[error("HTTP {0} from lookup service")]
    HttpStatus(StatusCode),
    /// The body was not valid JSON.
    #[error("Invalid JSON: {0}")]
    JsonDecode(#[from] JsonError),
    /// Valid JSON, but no category carried a parseable date.
    #[error("No valid ExecutionDate found")]
    NoValidDate,
    /// The address was empty.
    #[error("Address must not be empty")]
    EmptyAddress,
    /// Internal provider or scheduling error.
    #[error("Internal error: {0}")]
    Internal(String),
}

#[async_trait]
/// Backend that looks up pickup dates for an address.
pub trait CollectionPort: Send + Sync {
    /// Metadata describing the provider.
    fn meta(&self) -> &ProviderMeta;

    /// Issue a single request for the address and return the body text.
    ///
    /// # Errors
    ///
    /// Returns a [`PortError`] on transport failure or a non-200 status.
    async fn fetch(&self, address: &Address) -> Result<String, PortError>;

    /// Extract fractions and the earliest date from a decoded body.
    ///
    /// Malformed categories are skipped or kept without a date; this never fails.
    fn parse(&self, document: &Value) -> ParseResult;
}

#[async_trait]
/// Entity platform that config entries are forwarded to.
pub trait Platform: Send + Sync {
    /// Platform name, e.g. `sensor`.
    fn name(&self) -> &str;

    /// Create the entities belonging to an entry.
    ///
    /// # Errors
    ///
    /// Returns an [`EntryError`] when the entry cannot be set up.
    async fn setup_entry(&mut self, entry: &ConfigEntry) -> Result<(), EntryError>;

    /// Drop the entities belonging to an entry. Returns false if nothing was loaded.
    async fn unload_entry(&mut self, entry_id: &str) -> bool;

    /// Refresh every entity whose scan interval has elapsed; returns how many ran.
    async fn poll(&mut self, now: Instant) -> usize;

    /// When the next entity is due, if any are loaded.
    fn next_poll(&self) -> Option<Instant>;
}
