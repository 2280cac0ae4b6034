//! Long-running mode: set up every sensor and refresh on schedule until Ctrl+C.

use anyhow::Result;
use sopbilen_core::{Address, EntryStore, Integration, ProviderPlugin};
use tokio::time::{Instant, sleep_until};
use tracing::{error, info, warn};

use crate::config::Config;

pub(crate) async fn run(config: &Config, plugin: &ProviderPlugin) -> Result<()> {
    let registry = EntryStore::new(&config.system.storage_path).load()?;

    let mut sensors = plugin.sensor_platform(config.scan_interval());
    for sensor in &config.sensors {
        sensors
            .setup_configured(&sensor.name, Address::new(sensor.address.as_str()), sensor.scan_interval())
            .await;
    }

    let mut integration = Integration::new(plugin.meta.clone()).with_platform(Box::new(sensors));
    let mut loaded = Vec::new();
    for entry in registry.iter() {
        match integration.setup_entry(entry).await {
            Ok(()) => loaded.push(entry.entry_id.clone()),
            Err(err) => error!(entry_id = %entry.entry_id, "Skipping config entry: {err}"),
        }
    }

    info!("All sensors set up, entering main loop");
    info!("Press Ctrl+C to exit");

    loop {
        let Some(next) = integration.next_poll() else {
            warn!("No sensors configured, nothing to do");
            break;
        };

        tokio::select! {
            () = sleep_until(next) => {
                integration.poll(Instant::now()).await;
            }
            signal = tokio::signal::ctrl_c() => {
                match signal {
                    Ok(()) => info!("Received shutdown signal"),
                    Err(err) => error!("Failed to listen for shutdown signal: {err}"),
                }
                break;
            }
        }
    }

    for entry_id in &loaded {
        integration.unload_entry(entry_id).await;
    }
    info!("{} shutdown complete", plugin.meta.domain);
    Ok(())
}
