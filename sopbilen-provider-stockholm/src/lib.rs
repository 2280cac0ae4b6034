//! Provider implementation for Stockholm using the Stockholm Vatten och Avfall pickup search.

mod parse;

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde_json::Value;
use tracing::debug;

use sopbilen_core::{
    model::{Address, ParseResult, ProviderMeta},
    plugin::ProviderPlugin,
    ports::{CollectionPort, PortError},
};

pub use parse::{parse_document, parse_execution_date};

const BASE_URL: &str = "https://www.stockholmvattenochavfall.se/villa-och-radhus/avfallstjanster/nar-kommer-sopbilen/Search";

/// Integration domain.
pub const DOMAIN: &str = "stockholm_sopbilen";
/// Display name used when none is given.
pub const DEFAULT_NAME: &str = "Stockholm Sopbilen";

/// Pickup date lookup for Stockholm addresses.
pub struct StockholmCollectionPort {
    client: Client,
    base_url: String,
    meta: ProviderMeta,
}

impl StockholmCollectionPort {
    /// Create a new port bound to the given HTTP client.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self::with_base_url(client, BASE_URL)
    }

    /// Create a port that queries another endpoint, e.g. a local mock.
    #[must_use]
    pub fn with_base_url<U: Into<String>>(client: Client, base_url: U) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            meta: provider_meta(),
        }
    }

    /// Search URL for an address, which ends up form-encoded in the `address` parameter.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::Internal`] if the base URL is malformed.
    pub fn request_url(&self, address: &Address) -> Result<Url, PortError> {
        Url::parse_with_params(&self.base_url, &[("address", address.as_str())])
            .map_err(|err| PortError::Internal(format!("Invalid lookup URL: {err}")))
    }
}

#[async_trait]
impl CollectionPort for StockholmCollectionPort {
    fn meta(&self) -> &ProviderMeta {
        &self.meta
    }

    async fn fetch(&self, address: &Address) -> Result<String, PortError> {
        if address.is_blank() {
            return Err(PortError::EmptyAddress);
        }

        let url = self.request_url(address)?;
        debug!(%url, "Fetching Sopbilen data");

        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        debug!(%status, "Sopbilen HTTP status");

        if status != StatusCode::OK {
            return Err(PortError::HttpStatus(status));
        }
        Ok(resp.text().await?)
    }

    fn parse(&self, document: &Value) -> ParseResult {
        parse_document(document)
    }
}

/// Build the plugin bundle for the Stockholm provider.
#[must_use]
pub fn plugin(client: Client) -> ProviderPlugin {
    ProviderPlugin {
        meta: provider_meta(),
        collection_port: Arc::new(StockholmCollectionPort::new(client)),
    }
}

fn provider_meta() -> ProviderMeta {
    ProviderMeta {
        domain: String::from(DOMAIN),
        name: String::from(DEFAULT_NAME),
    }
}
