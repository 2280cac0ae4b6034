//! Setup flow that asks for an address and a display name.

use std::collections::BTreeMap;

use tracing::info;

use crate::entry::{ConfigEntry, EntryRegistry};
use crate::model::{Address, ProviderMeta};

/// Form key for the address.
pub const CONF_ADDRESS: &str = "address";
/// Form key for the display name.
pub const CONF_NAME: &str = "name";
/// Id of the only step.
pub const STEP_USER: &str = "user";

#[derive(Debug, Clone, PartialEq, Eq)]
/// Values submitted by the user.
pub struct UserInput {
    /// Address, required.
    pub address: String,
    /// Display name, optional.
    pub name: Option<String>,
}

impl UserInput {
    /// Construct submitted form values.
    #[must_use]
    pub fn new<A: Into<String>, N: Into<String>>(address: A, name: Option<N>) -> Self {
        Self {
            address: address.into(),
            name: name.map(Into::into),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// One input on the form.
pub struct FormField {
    /// Key the value is submitted under.
    pub key: &'static str,
    /// Whether the form may be submitted without it.
    pub required: bool,
    /// Pre-filled value.
    pub default: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Why a flow ended without creating an entry.
pub enum AbortReason {
    /// The normalized address is already registered.
    AlreadyConfigured,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// What the host should do after a step.
pub enum FlowResult {
    /// Render (or re-render) the form.
    ShowForm {
        /// Step the form belongs to.
        step_id: &'static str,
        /// Inputs to render.
        fields: Vec<FormField>,
        /// Field key to error code.
        errors: BTreeMap<String, String>,
    },
    /// A new entry was registered.
    CreateEntry(ConfigEntry),
    /// The flow stopped.
    Abort(AbortReason),
}

/// Registration flow for one provider.
pub struct ConfigFlow<'a> {
    meta: &'a ProviderMeta,
}

impl<'a> ConfigFlow<'a> {
    /// Flow creating entries for the given provider.
    #[must_use]
    pub fn new(meta: &'a ProviderMeta) -> Self {
        Self { meta }
    }

    /// Handle the user step. Without input the empty form is returned.
    pub fn step_user(&self, registry: &mut EntryRegistry, input: Option<UserInput>) -> FlowResult {
        let Some(input) = input else {
            return self.form(BTreeMap::new());
        };

        let address = Address::new(input.address.trim());
        if address.is_blank() {
            let errors = BTreeMap::from([(CONF_ADDRESS.to_owned(), "required".to_owned())]);
            return self.form(errors);
        }

        if registry.is_configured(&address.unique_key()) {
            return FlowResult::Abort(AbortReason::AlreadyConfigured);
        }

        let name = input.name.as_deref().map(str::trim).unwrap_or_default();
        let title = if name.is_empty() {
            self.meta.name.as_str()
        } else {
            name
        };

        info!(name = title, %address, "Creating config entry");

        let entry = ConfigEntry::new(self.meta.domain.as_str(), title, address);
        match registry.insert(entry.clone()) {
            Ok(()) => FlowResult::CreateEntry(entry),
            Err(_already_configured) => FlowResult::Abort(AbortReason::AlreadyConfigured),
        }
    }

    fn form(&self, errors: BTreeMap<String, String>) -> FlowResult {
        FlowResult::ShowForm {
            step_id: STEP_USER,
            fields: vec![
                FormField {
                    key: CONF_ADDRESS,
                    required: true,
                    default: None,
                },
                FormField {
                    key: CONF_NAME,
                    required: false,
                    default: Some(self.meta.name.clone()),
                },
            ],
            errors,
        }
    }
}
