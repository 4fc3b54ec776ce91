/// Collection of scan events into a deduplicated set of discovered devices
use log::{debug, info};
use std::collections::HashMap;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tokio::time::sleep;

use crate::bluetooth::decoder::{
    decode, Variant, GOVEE_ALT_MANUFACTURER_ID, GOVEE_MANUFACTURER_ID,
};
use crate::config::Offsets;
use crate::models::DiscoveredDevice;
use crate::utils::{capture_timestamp, has_vendor_prefix, normalize_address};

/// Marker in the advertised name of H5074 sensors
const LEGACY_NAME_MARKER: &str = "H5074";

/// One advertisement as reported by the scanning layer.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanEvent {
    pub address: String,
    pub name: Option<String>,
    pub manufacturer_data: HashMap<u16, Vec<u8>>,
}

/// What happened to a single scan event.
#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    Recorded,
    AlreadyRecorded,
    Ineligible,
    NoMeasurement,
    Rejected(String),
}

/// Pick the wire format for an advertisement
///
/// The H5074/H5075 key wins over the H5179 key when both are present.
pub fn select_variant<'a>(
    name: &str,
    manufacturer_data: &'a HashMap<u16, Vec<u8>>,
) -> Option<(Variant, &'a [u8])> {
    if let Some(data) = manufacturer_data.get(&GOVEE_MANUFACTURER_ID) {
        let variant = if name.contains(LEGACY_NAME_MARKER) {
            Variant::Legacy
        } else {
            Variant::Packed
        };
        return Some((variant, data.as_slice()));
    }

    manufacturer_data
        .get(&GOVEE_ALT_MANUFACTURER_ID)
        .map(|data| (Variant::Alternate, data.as_slice()))
}

/// Records the first successfully decoded reading per address.
#[derive(Debug)]
pub struct DiscoveryAggregator {
    mac_prefixes: Vec<String>,
    offsets: Offsets,
    devices: HashMap<String, DiscoveredDevice>,
}

impl DiscoveryAggregator {
    pub fn new(mac_prefixes: Vec<String>, offsets: Offsets) -> Self {
        Self {
            mac_prefixes,
            offsets,
            devices: HashMap::new(),
        }
    }

    /// Apply one scan event, stamping a newly recorded device with `now`
    pub fn observe(&mut self, event: &ScanEvent, now: OffsetDateTime) -> Observation {
        let address = normalize_address(&event.address);
        if self.devices.contains_key(&address) {
            return Observation::AlreadyRecorded;
        }

        let Some(name) = event.name.as_deref().filter(|n| !n.is_empty()) else {
            return Observation::Ineligible;
        };
        if !has_vendor_prefix(&address, &self.mac_prefixes) {
            return Observation::Ineligible;
        }
        let Some((variant, data)) = select_variant(name, &event.manufacturer_data) else {
            return Observation::Ineligible;
        };

        let measurement = match decode(variant, data, self.offsets) {
            Ok(Some(measurement)) => measurement,
            Ok(None) => {
                debug!("No valid reading from {} ({}) this cycle", name, address);
                return Observation::NoMeasurement;
            }
            Err(e) => {
                return Observation::Rejected(format!("{} data: {}", variant.as_str(), e));
            }
        };

        info!("Found device: {} ({})", name, address);
        self.devices.insert(
            address.clone(),
            DiscoveredDevice {
                address,
                display_name: name.to_string(),
                measurement,
                captured_at: now,
            },
        );
        Observation::Recorded
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn finish(self) -> Vec<DiscoveredDevice> {
        self.devices.into_values().collect()
    }
}

/// Feed scan events into the aggregator until the window elapses
///
/// Ends early if the sender side goes away. An empty result is valid.
pub async fn collect(
    mut events: mpsc::Receiver<ScanEvent>,
    mut aggregator: DiscoveryAggregator,
    window: Duration,
) -> Vec<DiscoveredDevice> {
    let deadline = sleep(window);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => break,
            event = events.recv() => match event {
                Some(event) => {
                    if let Observation::Rejected(reason) =
                        aggregator.observe(&event, capture_timestamp())
                    {
                        debug!("Ignoring advertisement from {}: {}", event.address, reason);
                    }
                }
                None => break,
            },
        }
    }

    info!("Scan complete. Found {} device(s).", aggregator.len());
    aggregator.finish()
}
