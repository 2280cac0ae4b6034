//! Bundle of a provider's metadata and its backend.

use std::sync::Arc;
use std::time::Duration;

use crate::model::ProviderMeta;
use crate::ports::CollectionPort;
use crate::sensor::SensorPlatform;

/// Everything the lifecycle needs from a provider.
pub struct ProviderPlugin {
    /// Static metadata describing the provider.
    pub meta: ProviderMeta,
    /// Implementation for fetching and parsing pickup dates.
    pub collection_port: Arc<dyn CollectionPort>,
}

impl ProviderPlugin {
    /// A fresh sensor platform bound to this provider's backend.
    #[must_use]
    pub fn sensor_platform(&self, scan_interval: Duration) -> SensorPlatform {
        SensorPlatform::new(Arc::clone(&self.collection_port), scan_interval)
    }
}
