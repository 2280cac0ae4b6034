//! Domain data structures for addresses, waste fractions, and parse results.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
/// Street address as typed by the user, sent verbatim to the lookup service.
pub struct Address(pub String);

impl Address {
    /// Wrap a raw address string.
    #[must_use]
    pub fn new<S: Into<String>>(raw: S) -> Self {
        Self(raw.into())
    }

    /// The address exactly as supplied.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the address has no content besides whitespace.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Key used to reject registering the same address twice.
    #[must_use]
    pub fn unique_key(&self) -> UniqueKey {
        UniqueKey(self.0.trim().to_lowercase())
    }

    /// Trimmed, lower-cased form with spaces turned into underscores and commas dropped.
    #[must_use]
    pub fn slug(&self) -> String {
        self.0.trim().to_lowercase().replace(' ', "_").replace(',', "")
    }
}

impl fmt::Display for Address {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
/// Normalized (trimmed, lower-cased) address.
pub struct UniqueKey(pub String);

impl fmt::Display for UniqueKey {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Metadata describing a provider and its default display name.
pub struct ProviderMeta {
    /// Integration domain, also the prefix of sensor unique ids.
    pub domain: String,
    /// Name used when the user does not pick one.
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
/// Next pickup for one waste category, as reported by the service.
pub struct Fraction {
    /// Date string in the service's own format.
    pub execution_date: Option<String>,
    /// Weekday as reported, passed through untouched.
    pub weekday: Option<Value>,
    /// Collection frequency as reported, passed through untouched.
    pub frequency: Option<Value>,
}

/// Fractions keyed by category name.
pub type Fractions = BTreeMap<String, Fraction>;

#[derive(Debug, Clone, Default, PartialEq)]
/// Outcome of parsing one response body.
pub struct ParseResult {
    /// Every category that had a record, including those without a usable date.
    pub fractions: Fractions,
    /// Minimum of all successfully parsed execution dates.
    pub earliest_date: Option<NaiveDate>,
}

impl ParseResult {
    /// True when no category was found at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fractions.is_empty()
    }
}
