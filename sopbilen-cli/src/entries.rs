//! `add`, `remove`, and `list` against the persisted entry store.

use std::io::Write;

use anyhow::{Result, bail};
use sopbilen_core::{AbortReason, ConfigFlow, EntryStore, FlowResult, ProviderMeta, UserInput};

pub(crate) fn add<W: Write>(
    store: &EntryStore,
    meta: &ProviderMeta,
    input: UserInput,
    out: &mut W,
) -> Result<()> {
    let mut registry = store.load()?;

    match ConfigFlow::new(meta).step_user(&mut registry, Some(input)) {
        FlowResult::CreateEntry(entry) => {
            store.save(&registry)?;
            writeln!(
                out,
                "Added '{}' for '{}' ({})",
                entry.title, entry.data.address, entry.entry_id
            )?;
            Ok(())
        }
        FlowResult::Abort(AbortReason::AlreadyConfigured) => {
            bail!("this address is already configured")
        }
        FlowResult::ShowForm { errors, .. } => {
            let fields: Vec<&str> = errors.keys().map(String::as_str).collect();
            bail!("missing required input: {}", fields.join(", "))
        }
    }
}

pub(crate) fn remove<W: Write>(store: &EntryStore, entry_id: &str, out: &mut W) -> Result<()> {
    let mut registry = store.load()?;
    let entry = registry.remove(entry_id)?;
    store.save(&registry)?;
    writeln!(out, "Removed '{}' ({})", entry.title, entry.entry_id)?;
    Ok(())
}

pub(crate) fn list<W: Write>(store: &EntryStore, out: &mut W) -> Result<()> {
    let registry = store.load()?;
    if registry.is_empty() {
        writeln!(out, "No addresses configured.")?;
    }
    for entry in registry.iter() {
        writeln!(
            out,
            "{}  {}  {}",
            entry.entry_id, entry.title, entry.data.address
        )?;
    }
    Ok(())
}
