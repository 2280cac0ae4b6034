//! One-shot lookup that prints what the sensor would see.

use std::io::{self, Write};

use serde_json::Value;
use sopbilen_core::{Address, CollectionPort, raw_preview};

const RAW_PREVIEW_CHARS: usize = 400;

pub(crate) async fn debug_fetch<W: Write>(
    port: &dyn CollectionPort,
    address: &Address,
    out: &mut W,
) -> io::Result<()> {
    writeln!(out, "=== {} DEBUG ===", port.meta().name)?;
    writeln!(out, "Address: {address}")?;
    out.flush()?;

    let text = match port.fetch(address).await {
        Ok(text) => text,
        Err(err) => {
            writeln!(out, "Error contacting API: {err}")?;
            return Ok(());
        }
    };

    writeln!(out)?;
    writeln!(out, "--- Raw response preview (first {RAW_PREVIEW_CHARS} chars) ---")?;
    writeln!(out, "{}", raw_preview(&text, RAW_PREVIEW_CHARS))?;
    writeln!(out, "---------------------------------------------")?;
    writeln!(out)?;

    let Ok(document) = serde_json::from_str::<Value>(&text) else {
        writeln!(out, "Invalid JSON returned (see preview above)")?;
        return Ok(());
    };

    let parsed = port.parse(&document);

    writeln!(out, "Fractions parsed:")?;
    if parsed.fractions.is_empty() {
        writeln!(out, "  (No fractions found)")?;
    }
    for (name, fraction) in &parsed.fractions {
        writeln!(out, "  {name}")?;
        let date = fraction.execution_date.as_deref().unwrap_or("None");
        writeln!(out, "     Date:      {date}")?;
        writeln!(out, "     Weekday:   {}", display(fraction.weekday.clone()))?;
        writeln!(out, "     Frequency: {}", display(fraction.frequency.clone()))?;
        writeln!(out)?;
    }

    match parsed.earliest_date {
        Some(date) => writeln!(out, "Next pickup: {date}")?,
        None => writeln!(out, "No valid pickup dates found.")?,
    }
    Ok(())
}

// Strings print bare, other values as JSON, absent ones as "None".
fn display(value: Option<Value>) -> String {
    match value {
        None => "None".to_owned(),
        Some(Value::String(text)) => text,
        Some(other) => other.to_string(),
    }
}
