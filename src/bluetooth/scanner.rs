/// Bluetooth Low Energy scanning via BlueZ
use bluer::{Adapter, AdapterEvent, Address};
use futures_util::{pin_mut, StreamExt};
use log::{debug, error, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::bluetooth::aggregator::ScanEvent;
use crate::error::ScanError;

const SCAN_EVENT_BUFFER_SIZE: usize = 100;

/// Start LE discovery and stream advertisements as scan events
///
/// Every device that appears or changes its advertised properties is reported,
/// so repeated advertisements from the same sensor arrive as repeated events.
/// Discovery keeps running until the returned task is aborted or the receiver
/// is dropped.
///
/// # Returns
/// The event receiver and the handle of the task owning the Bluetooth session
pub async fn start_scan() -> Result<(mpsc::Receiver<ScanEvent>, JoinHandle<()>), ScanError> {
    // Initialize Bluetooth session
    let session = match bluer::Session::new().await {
        Ok(session) => session,
        Err(e) => {
            error!("Failed to create Bluetooth session: {}", e);
            return Err(e.into());
        }
    };

    // Get the default Bluetooth adapter
    let adapter = match session.default_adapter().await {
        Ok(adapter) => adapter,
        Err(e) => {
            error!("Failed to get default Bluetooth adapter: {}", e);
            return Err(e.into());
        }
    };

    // Ensure Bluetooth adapter is powered on
    if let Err(e) = adapter.set_powered(true).await {
        error!("Failed to power on adapter: {}", e);
        return Err(e.into());
    }

    // Low Energy only, and keep reporting devices whose advertisement changes
    let filter = bluer::DiscoveryFilter {
        transport: bluer::DiscoveryTransport::Le,
        duplicate_data: true,
        ..Default::default()
    };

    // Apply the discovery filter (warn if it fails, but continue)
    if let Err(e) = adapter.set_discovery_filter(filter).await {
        warn!("Failed to set discovery filter: {}", e);
    }

    let discovery_stream = match adapter.discover_devices_with_changes().await {
        Ok(stream) => stream,
        Err(e) => {
            error!("Failed to start device discovery: {}", e);
            return Err(e.into());
        }
    };

    let (tx, rx) = mpsc::channel(SCAN_EVENT_BUFFER_SIZE);

    let handle = tokio::spawn(async move {
        // Keep the session alive for as long as discovery runs
        let _session = session;
        pin_mut!(discovery_stream);

        while let Some(event) = discovery_stream.next().await {
            let AdapterEvent::DeviceAdded(address) = event else {
                continue;
            };

            match read_advertisement(&adapter, address).await {
                Ok(Some(scan_event)) => {
                    if tx.send(scan_event).await.is_err() {
                        break;
                    }
                }
                Ok(None) => {}
                Err(e) => debug!("Failed to read advertisement from {}: {}", address, e),
            }
        }
    });

    Ok((rx, handle))
}

/// Read name and manufacturer data of a discovered device
///
/// Devices without manufacturer data are skipped.
async fn read_advertisement(
    adapter: &Adapter,
    address: Address,
) -> Result<Option<ScanEvent>, bluer::Error> {
    let device = adapter.device(address)?;

    let Some(manufacturer_data) = device.manufacturer_data().await? else {
        return Ok(None);
    };
    let name = device.name().await?;

    Ok(Some(ScanEvent {
        address: address.to_string(),
        name,
        manufacturer_data,
    }))
}
