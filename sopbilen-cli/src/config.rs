//! TOML configuration for the command line front end.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use sopbilen_provider_stockholm::DEFAULT_NAME;

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct Config {
    pub system: SystemConfig,
    pub sensors: Vec<SensorConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct SystemConfig {
    pub log_level: String,
    pub storage_path: PathBuf,
    pub scan_interval_secs: u64,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            storage_path: PathBuf::from(".storage/sopbilen.config_entries.json"),
            scan_interval_secs: 3600,
        }
    }
}

/// A sensor declared in the file instead of registered through `add`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct SensorConfig {
    pub address: String,
    #[serde(default = "default_name")]
    pub name: String,
    pub scan_interval_secs: Option<u64>,
}

fn default_name() -> String {
    DEFAULT_NAME.to_owned()
}

impl SensorConfig {
    pub(crate) fn scan_interval(&self) -> Option<Duration> {
        self.scan_interval_secs.map(Duration::from_secs)
    }
}

impl Config {
    /// Load from `path`; a missing file means defaults.
    pub(crate) fn from_file(path: &Path) -> Result<Self> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => {
                return Err(err).with_context(|| format!("reading {}", path.display()));
            }
        };
        Self::from_toml(&text).with_context(|| format!("loading {}", path.display()))
    }

    pub(crate) fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub(crate) fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.system.scan_interval_secs)
    }

    fn validate(&self) -> Result<()> {
        if self.system.scan_interval_secs == 0 {
            bail!("system.scan_interval_secs must be positive");
        }
        for sensor in &self.sensors {
            if sensor.address.trim().is_empty() {
                bail!("sensors: address must not be empty");
            }
            if sensor.scan_interval_secs == Some(0) {
                bail!("sensors: scan_interval_secs for '{}' must be positive", sensor.address);
            }
        }
        Ok(())
    }
}

pub(crate) fn parse_log_level(level: &str) -> Option<tracing::Level> {
    match level.to_lowercase().as_str() {
        "trace" => Some(tracing::Level::TRACE),
        "debug" => Some(tracing::Level::DEBUG),
        "info" => Some(tracing::Level::INFO),
        "warn" | "warning" => Some(tracing::Level::WARN),
        "error" => Some(tracing::Level::ERROR),
        _ => None,
    }
}
