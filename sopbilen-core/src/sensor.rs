//! Waste collection sensor: holds the next pickup date and refreshes it on demand.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::entry::{ConfigEntry, EntryError};
use crate::model::{Address, Fractions};
use crate::ports::{CollectionPort, Platform, PortError};

/// Icon shown for the sensor.
pub const ICON: &str = "mdi:trash-can";
/// The sensor's state is a calendar date.
pub const DEVICE_CLASS: &str = "date";
/// Default time between refreshes.
pub const SCAN_INTERVAL: Duration = Duration::from_secs(60 * 60);

const RAW_PREVIEW_CHARS: usize = 300;

/// First `max_chars` characters of a response body, for log and debug output.
#[must_use]
pub fn raw_preview(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Whether the last refresh produced a date.
pub enum SensorState {
    /// The last refresh succeeded.
    Fresh,
    /// The last refresh failed, or none has run yet.
    Stale,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
/// Extra attributes published next to the date.
pub struct SensorAttributes {
    /// Address being tracked.
    pub address: Address,
    /// Fractions from the last decoded response.
    pub fractions: Fractions,
    /// Last decoded response body.
    pub raw_json: Option<Value>,
    /// Whether the last refresh succeeded.
    pub last_update_success: bool,
}

/// Sensor exposing the earliest upcoming pickup for one address.
pub struct WasteSensor {
    name: String,
    address: Address,
    port: Arc<dyn CollectionPort>,
    native_value: Option<NaiveDate>,
    fractions: Fractions,
    raw_json: Option<Value>,
    last_update_success: bool,
}

impl WasteSensor {
    /// A sensor with no value yet.
    #[must_use]
    pub fn new<N: Into<String>>(name: N, address: Address, port: Arc<dyn CollectionPort>) -> Self {
        Self {
            name: name.into(),
            address,
            port,
            native_value: None,
            fractions: Fractions::new(),
            raw_json: None,
            last_update_success: false,
        }
    }

    /// Stable id: provider domain followed by the address slug.
    #[must_use]
    pub fn unique_id(&self) -> String {
        format!("{}_{}", self.port.meta().domain, self.address.slug())
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Tracked address.
    #[must_use]
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Earliest upcoming pickup, if known.
    #[must_use]
    pub fn native_value(&self) -> Option<NaiveDate> {
        self.native_value
    }

    /// Fractions from the last decoded response.
    #[must_use]
    pub fn fractions(&self) -> &Fractions {
        &self.fractions
    }

    /// Last decoded response body.
    #[must_use]
    pub fn raw_json(&self) -> Option<&Value> {
        self.raw_json.as_ref()
    }

    /// Whether the last refresh succeeded.
    #[must_use]
    pub fn last_update_success(&self) -> bool {
        self.last_update_success
    }

    /// Current state derived from the failure flag.
    #[must_use]
    pub fn state(&self) -> SensorState {
        if self.last_update_success {
            SensorState::Fresh
        } else {
            SensorState::Stale
        }
    }

    /// Snapshot of the extra attributes.
    #[must_use]
    pub fn attributes(&self) -> SensorAttributes {
        SensorAttributes {
            address: self.address.clone(),
            fractions: self.fractions.clone(),
            raw_json: self.raw_json.clone(),
            last_update_success: self.last_update_success,
        }
    }

    /// Run one refresh cycle.
    ///
    /// Failures are logged here and leave the sensor stale; the returned error
    /// only tells the caller which kind of failure happened.
    ///
    /// # Errors
    ///
    /// Returns the [`PortError`] that ended the cycle.
    pub async fn update(&mut self) -> Result<NaiveDate, PortError> {
        self.last_update_success = false;
        debug!(address = %self.address, "Refreshing waste collection sensor");

        let text = match self.fetch().await {
            Ok(text) => text,
            Err(err) => {
                error!(address = %self.address, "Error fetching collection data: {err}");
                return Err(err);
            }
        };

        let document: Value = match serde_json::from_str(&text) {
            Ok(document) => document,
            Err(err) => {
                error!(
                    address = %self.address,
                    preview = %raw_preview(&text, RAW_PREVIEW_CHARS),
                    "Invalid JSON returned from lookup service"
                );
                return Err(err.into());
            }
        };

        let parsed = self.port.parse(&document);
        self.raw_json = Some(document);
        self.fractions = parsed.fractions;

        if let Some(date) = parsed.earliest_date {
            self.native_value = Some(date);
            self.last_update_success = true;
            info!(address = %self.address, %date, "Next pickup");
            Ok(date)
        } else {
            warn!(address = %self.address, "No valid ExecutionDate found");
            self.native_value = None;
            Err(PortError::NoValidDate)
        }
    }

    // The request runs on its own task so a slow lookup never stalls the scheduler.
    async fn fetch(&self) -> Result<String, PortError> {
        let port = Arc::clone(&self.port);
        let address = self.address.clone();
        tokio::spawn(async move { port.fetch(&address).await })
            .await
            .map_err(|err| PortError::Internal(format!("Fetch task failed: {err}")))?
    }
}

struct ScheduledSensor {
    sensor: WasteSensor,
    scan_interval: Duration,
    next_due: Instant,
}

/// Sensor platform: one sensor per entry plus sensors declared in configuration.
pub struct SensorPlatform {
    port: Arc<dyn CollectionPort>,
    scan_interval: Duration,
    sensors: BTreeMap<String, ScheduledSensor>,
}

impl SensorPlatform {
    /// Empty platform; `scan_interval` applies to entry-backed sensors.
    #[must_use]
    pub fn new(port: Arc<dyn CollectionPort>, scan_interval: Duration) -> Self {
        Self {
            port,
            scan_interval,
            sensors: BTreeMap::new(),
        }
    }

    /// Set up a sensor declared directly in configuration, without an entry.
    ///
    /// Returns false if a sensor for the same address already exists.
    pub async fn setup_configured(
        &mut self,
        name: &str,
        address: Address,
        scan_interval: Option<Duration>,
    ) -> bool {
        let address = Address::new(address.as_str().trim());
        info!(name, %address, "Setting up configured sensor");
        let sensor = WasteSensor::new(name, address, Arc::clone(&self.port));
        let key = format!("configured:{}", sensor.unique_id());
        let interval = scan_interval.unwrap_or(self.scan_interval);
        self.add_sensor(key, sensor, interval).await
    }

    /// Look up a sensor by entry id, or by `configured:<unique id>`.
    #[must_use]
    pub fn sensor(&self, key: &str) -> Option<&WasteSensor> {
        self.sensors.get(key).map(|scheduled| &scheduled.sensor)
    }

    /// All loaded sensors.
    pub fn sensors(&self) -> impl Iterator<Item = &WasteSensor> {
        self.sensors.values().map(|scheduled| &scheduled.sensor)
    }

    async fn add_sensor(&mut self, key: String, mut sensor: WasteSensor, interval: Duration) -> bool {
        let unique_id = sensor.unique_id();
        if self.sensors().any(|existing| existing.unique_id() == unique_id) {
            warn!(%unique_id, "Sensor already exists, skipping");
            return false;
        }

        // refresh before the sensor becomes visible
        if sensor.update().await.is_err() {
            debug!(%unique_id, "Sensor added without a value");
        }

        info!(%unique_id, icon = ICON, device_class = DEVICE_CLASS, "Sensor added");
        self.sensors.insert(
            key,
            ScheduledSensor {
                sensor,
                scan_interval: interval,
                next_due: Instant::now() + interval,
            },
        );
        true
    }
}

#[async_trait]
impl Platform for SensorPlatform {
    fn name(&self) -> &str {
        "sensor"
    }

    async fn setup_entry(&mut self, entry: &ConfigEntry) -> Result<(), EntryError> {
        let address = entry.data.address.clone();
        if address.is_blank() {
            return Err(EntryError::MissingAddress(entry.entry_id.clone()));
        }

        let name = if entry.title.is_empty() {
            self.port.meta().name.clone()
        } else {
            entry.title.clone()
        };

        info!(%name, %address, "Setting up sensor from config entry");
        let sensor = WasteSensor::new(name, address, Arc::clone(&self.port));
        if self
            .add_sensor(entry.entry_id.clone(), sensor, self.scan_interval)
            .await
        {
            Ok(())
        } else {
            Err(EntryError::AlreadyConfigured(entry.unique_id.clone()))
        }
    }

    async fn unload_entry(&mut self, entry_id: &str) -> bool {
        self.sensors.remove(entry_id).is_some()
    }

    async fn poll(&mut self, now: Instant) -> usize {
        let mut refreshed = 0;
        for scheduled in self.sensors.values_mut() {
            if scheduled.next_due > now {
                continue;
            }
            // failures are already logged by the sensor
            if scheduled.sensor.update().await.is_err() {
                debug!(address = %scheduled.sensor.address(), "Sensor stays stale until next cycle");
            }
            scheduled.next_due = now + scheduled.scan_interval;
            refreshed += 1;
        }
        refreshed
    }

    fn next_poll(&self) -> Option<Instant> {
        self.sensors.values().map(|scheduled| scheduled.next_due).min()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;
    use crate::model::{Fraction, ParseResult, ProviderMeta};

    struct StubPort {
        meta: ProviderMeta,
        responses: Mutex<VecDeque<Result<String, PortError>>>,
    }

    impl StubPort {
        fn with(responses: Vec<Result<String, PortError>>) -> Arc<Self> {
            Arc::new(Self {
                meta: ProviderMeta {
                    domain: "stockholm_sopbilen".to_owned(),
                    name: "Stockholm Sopbilen".to_owned(),
                },
                responses: Mutex::new(responses.into()),
            })
        }
    }

    #[async_trait]
    impl CollectionPort for StubPort {
        fn meta(&self) -> &ProviderMeta {
            &self.meta
        }

        async fn fetch(&self, _address: &Address) -> Result<String, PortError> {
            self.responses
                .lock()
                .expect("responses lock")
                .pop_front()
                .unwrap_or_else(|| Err(PortError::Internal("no response queued".to_owned())))
        }

        // {"<fraction>": "<YYYY-MM-DD>"}
        fn parse(&self, document: &Value) -> ParseResult {
            let mut result = ParseResult::default();
            for (name, value) in document.as_object().into_iter().flatten() {
                let raw = value.as_str().map(str::to_owned);
                if let Some(date) = raw
                    .as_deref()
                    .and_then(|text| NaiveDate::parse_from_str(text, "%Y-%m-%d").ok())
                {
                    result.earliest_date =
                        Some(result.earliest_date.map_or(date, |current| current.min(date)));
                }
                result.fractions.insert(
                    name.clone(),
                    Fraction {
                        execution_date: raw,
                        ..Fraction::default()
                    },
                );
            }
            result
        }
    }

    fn date(text: &str) -> NaiveDate {
        NaiveDate::parse_from_str(text, "%Y-%m-%d").expect("valid test date")
    }

    fn ok(body: &str) -> Result<String, PortError> {
        Ok(body.to_owned())
    }

    fn sensor(port: Arc<StubPort>) -> WasteSensor {
        WasteSensor::new("Home", Address::new("Main St 1, Stockholm"), port)
    }

    #[tokio::test]
    async fn successful_refresh_makes_sensor_fresh() {
        let mut sensor = sensor(StubPort::with(vec![ok(
            r#"{"paper": "2024-03-10", "food": "2024-03-05"}"#,
        )]));

        let result = sensor.update().await;

        assert_eq!(result.ok(), Some(date("2024-03-05")));
        assert_eq!(sensor.native_value(), Some(date("2024-03-05")));
        assert_eq!(sensor.state(), SensorState::Fresh);
        assert_eq!(sensor.fractions().len(), 2);
        assert!(sensor.raw_json().is_some());
    }

    #[tokio::test]
    async fn fetch_error_keeps_previous_value() {
        let mut sensor = sensor(StubPort::with(vec![
            ok(r#"{"paper": "2024-03-10"}"#),
            Err(PortError::HttpStatus(reqwest::StatusCode::INTERNAL_SERVER_ERROR)),
        ]));
        sensor.update().await.expect("first refresh");

        let result = sensor.update().await;

        assert!(matches!(result, Err(PortError::HttpStatus(_))));
        assert_eq!(sensor.native_value(), Some(date("2024-03-10")));
        assert_eq!(sensor.state(), SensorState::Stale);
        assert_eq!(sensor.raw_json(), Some(&json!({"paper": "2024-03-10"})));
    }

    #[tokio::test]
    async fn invalid_json_keeps_previous_state() {
        let mut sensor = sensor(StubPort::with(vec![
            ok(r#"{"paper": "2024-03-10"}"#),
            ok("<html>maintenance</html>"),
        ]));
        sensor.update().await.expect("first refresh");

        let result = sensor.update().await;

        assert!(matches!(result, Err(PortError::JsonDecode(_))));
        assert_eq!(sensor.native_value(), Some(date("2024-03-10")));
        assert!(!sensor.last_update_success());
        assert_eq!(sensor.fractions().len(), 1);
    }

    #[tokio::test]
    async fn response_without_dates_clears_value() {
        let mut sensor = sensor(StubPort::with(vec![
            ok(r#"{"paper": "2024-03-10"}"#),
            ok(r#"{"paper": "tomorrow", "glass": null}"#),
        ]));
        sensor.update().await.expect("first refresh");

        let result = sensor.update().await;

        assert!(matches!(result, Err(PortError::NoValidDate)));
        assert_eq!(sensor.native_value(), None);
        assert_eq!(sensor.state(), SensorState::Stale);
        assert_eq!(sensor.fractions().len(), 2);
        assert_eq!(
            sensor.raw_json(),
            Some(&json!({"paper": "tomorrow", "glass": null}))
        );
    }

    #[tokio::test]
    async fn attributes_expose_address_and_flag() {
        let mut sensor = sensor(StubPort::with(vec![ok(r#"{"paper": "2024-03-10"}"#)]));
        sensor.update().await.expect("refresh");

        let attributes = serde_json::to_value(sensor.attributes()).expect("attributes encode");

        assert_eq!(attributes["address"], "Main St 1, Stockholm");
        assert_eq!(attributes["last_update_success"], true);
        assert_eq!(attributes["fractions"]["paper"]["execution_date"], "2024-03-10");
        assert_eq!(attributes["raw_json"], json!({"paper": "2024-03-10"}));
    }

    #[test]
    fn unique_id_uses_domain_and_slug() {
        let sensor = sensor(StubPort::with(Vec::new()));

        assert_eq!(sensor.unique_id(), "stockholm_sopbilen_main_st_1_stockholm");
        assert_eq!(sensor.state(), SensorState::Stale);
    }

    #[test]
    fn raw_preview_counts_characters() {
        assert_eq!(raw_preview("åäö-rest", 3), "åäö");
        assert_eq!(raw_preview("ab", 10), "ab");
    }

    fn entry(address: &str) -> ConfigEntry {
        ConfigEntry::new("stockholm_sopbilen", "", Address::new(address))
    }

    #[tokio::test]
    async fn entry_setup_refreshes_before_adding() {
        let port = StubPort::with(vec![ok(r#"{"paper": "2024-03-10"}"#)]);
        let mut platform = SensorPlatform::new(port, SCAN_INTERVAL);
        let entry = entry("Main St 1");

        platform.setup_entry(&entry).await.expect("setup");

        let sensor = platform.sensor(&entry.entry_id).expect("sensor loaded");
        assert_eq!(sensor.name(), "Stockholm Sopbilen");
        assert_eq!(sensor.native_value(), Some(date("2024-03-10")));
    }

    #[tokio::test]
    async fn failed_initial_refresh_still_adds_sensor() {
        let mut platform = SensorPlatform::new(StubPort::with(Vec::new()), SCAN_INTERVAL);
        let entry = entry("Main St 1");

        platform.setup_entry(&entry).await.expect("setup");

        let sensor = platform.sensor(&entry.entry_id).expect("sensor loaded");
        assert_eq!(sensor.native_value(), None);
        assert_eq!(sensor.state(), SensorState::Stale);
    }

    #[tokio::test]
    async fn configured_sensor_for_same_address_is_skipped() {
        let mut platform = SensorPlatform::new(StubPort::with(Vec::new()), SCAN_INTERVAL);
        platform.setup_entry(&entry("Main St 1")).await.expect("setup");

        let added = platform
            .setup_configured("Other", Address::new("Main St 1"), None)
            .await;

        assert!(!added);
        assert_eq!(platform.sensors().count(), 1);
    }

    #[tokio::test]
    async fn configured_sensor_with_padded_address_matches_entry() {
        let mut platform = SensorPlatform::new(StubPort::with(Vec::new()), SCAN_INTERVAL);
        platform.setup_entry(&entry("Main St 1")).await.expect("setup");

        let added = platform
            .setup_configured("Other", Address::new("  Main St 1 "), None)
            .await;

        assert!(!added);
        assert_eq!(platform.sensors().count(), 1);
    }

    #[tokio::test]
    async fn configured_sensor_address_is_trimmed() {
        let mut platform = SensorPlatform::new(StubPort::with(Vec::new()), SCAN_INTERVAL);

        let added = platform
            .setup_configured("Home", Address::new(" Main St 1 "), None)
            .await;

        assert!(added);
        let sensor = platform
            .sensor("configured:stockholm_sopbilen_main_st_1")
            .expect("configured sensor");
        assert_eq!(sensor.address().as_str(), "Main St 1");
    }

    #[tokio::test]
    async fn unload_removes_only_known_entries() {
        let mut platform = SensorPlatform::new(StubPort::with(Vec::new()), SCAN_INTERVAL);
        let entry = entry("Main St 1");
        platform.setup_entry(&entry).await.expect("setup");

        assert!(platform.unload_entry(&entry.entry_id).await);
        assert!(!platform.unload_entry(&entry.entry_id).await);
        assert!(platform.next_poll().is_none());
    }

    #[tokio::test]
    async fn poll_only_refreshes_due_sensors() {
        let port = StubPort::with(vec![
            ok(r#"{"paper": "2024-03-10"}"#),
            ok(r#"{"paper": "2024-03-24"}"#),
        ]);
        let mut platform = SensorPlatform::new(port, SCAN_INTERVAL);
        let entry = entry("Main St 1");
        platform.setup_entry(&entry).await.expect("setup");
        let due = platform.next_poll().expect("sensor scheduled");

        assert_eq!(platform.poll(Instant::now()).await, 0);
        assert_eq!(platform.poll(due).await, 1);
        assert_eq!(
            platform.sensor(&entry.entry_id).and_then(WasteSensor::native_value),
            Some(date("2024-03-24"))
        );
        assert_eq!(platform.next_poll(), Some(due + SCAN_INTERVAL));
    }
}
