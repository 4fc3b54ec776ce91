mod bluetooth;
mod config;
mod error;
mod inventory;
mod models;
mod sync;
#[cfg(test)]
mod test_utils;
mod utils;

use log::{error, info, warn};
use std::io::{self, Write};
use std::process::ExitCode;

use bluetooth::{collect, start_scan, DiscoveryAggregator};
use config::SyncConfig;
use error::{RunError, ScanError};
use inventory::{InventoryClient, ReqwestTransport};
use models::DiscoveredDevice;
use sync::ReconciliationEngine;

const EXIT_SUCCESS: u8 = 0;
const EXIT_FAILURE: u8 = 1;

/// Scan for the configured window and return the deduplicated devices
async fn scan_devices(config: &SyncConfig) -> Result<Vec<DiscoveredDevice>, ScanError> {
    info!(
        "Scanning for Govee devices for {} seconds...",
        config.scan_duration.as_secs()
    );

    let (events, discovery_handle) = start_scan().await?;
    let aggregator = DiscoveryAggregator::new(config.mac_prefixes.clone(), config.offsets);
    let devices = collect(events, aggregator, config.scan_duration).await;

    // Stop discovery
    discovery_handle.abort();

    Ok(devices)
}

/// Write the discovered devices as a pretty-printed JSON array
fn write_devices(devices: &[DiscoveredDevice], out: &mut dyn Write) -> Result<(), RunError> {
    let json = serde_json::to_string_pretty(devices)?;
    writeln!(out, "{}", json)?;
    Ok(())
}

/// One scan-and-sync cycle
///
/// # Returns
/// `Ok(true)` if every attempted time-series post succeeded
async fn run_cycle(config: &SyncConfig) -> Result<bool, RunError> {
    info!("=== Scanning for Bluetooth devices ===");
    let scanned = scan_devices(config).await?;

    // Always emitted, `[]` when nothing was found
    write_devices(&scanned, &mut io::stdout())?;

    if scanned.is_empty() {
        info!("No Govee devices found.");
        return Ok(true);
    }

    let transport =
        ReqwestTransport::new(&config.api_url, &config.api_key, config.request_timeout)
            .map_err(RunError::Client)?;
    let client = InventoryClient::new(transport, config.retry_delay);
    let report = ReconciliationEngine::new(&client, config)
        .run(&scanned)
        .await?;

    for skip in &report.skipped {
        warn!("Skipped {}: {}", skip.address, skip.reason);
    }
    if report.points_posted == 0 && report.points_failed == 0 {
        warn!("No time-series data was posted during this run!");
    }

    Ok(report.is_success())
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging, RUST_LOG overrides the default level
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .format_timestamp_secs()
        .init();

    // Load configuration
    let config = match SyncConfig::new() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return ExitCode::from(EXIT_FAILURE);
        }
    };

    // Run the cycle or stop on Ctrl+C
    let result = tokio::select! {
        result = run_cycle(&config) => result,
        _ = tokio::signal::ctrl_c() => Err(RunError::Interrupted),
    };

    match result {
        Ok(true) => {
            info!("Program completed successfully");
            ExitCode::from(EXIT_SUCCESS)
        }
        Ok(false) => {
            error!("Some time-series data could not be posted");
            ExitCode::from(EXIT_FAILURE)
        }
        Err(e) => {
            error!("Fatal error: {}", e);
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::discovered;

    #[test]
    fn writes_devices_as_json_array() {
        let devices = vec![discovered(
            "AA:BB:CC:DD:EE:FF",
            "GVH5075_1234",
            23.5,
            45.0,
            88,
        )];

        let mut out = Vec::<u8>::new();
        write_devices(&devices, &mut out).unwrap();

        let out = String::from_utf8(out).unwrap();
        assert!(out.ends_with('\n'));
        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(
            parsed,
            serde_json::json!([{
                "mac": "AA:BB:CC:DD:EE:FF",
                "name": "GVH5075_1234",
                "temperature": 23.5,
                "humidity": 45.0,
                "battery": 88,
                "timestamp": "2024-03-01T12:30:05Z"
            }])
        );
    }

    #[test]
    fn writes_empty_array_for_no_devices() {
        let mut out = Vec::<u8>::new();
        write_devices(&[], &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "[]\n");
    }
}
