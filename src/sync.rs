/// Reconciliation of discovered sensors against the homelab inventory
use log::{debug, error, info, warn};
use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::config::SyncConfig;
use crate::error::{SyncError, TransportError};
use crate::inventory::{HttpTransport, InventoryClient};
use crate::models::{DataPoint, DiscoveredDevice, RemoteDevice, RequiredParameter};
use crate::utils::{format_datetime, normalize_address};

/// Why a device or a single point was left out of a run.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    DeviceTypeUnresolved,
    DeviceCreationFailed(TransportError),
    DeviceNotMapped,
    ParameterCreationFailed {
        parameter: &'static str,
        error: TransportError,
    },
    ParameterNotMapped(&'static str),
    ParametersUnknown,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::DeviceTypeUnresolved => write!(f, "device type unresolved"),
            SkipReason::DeviceCreationFailed(e) => write!(f, "device creation failed: {}", e),
            SkipReason::DeviceNotMapped => write!(f, "device not in inventory"),
            SkipReason::ParameterCreationFailed { parameter, error } => {
                write!(f, "creating parameter '{}' failed: {}", parameter, error)
            }
            SkipReason::ParameterNotMapped(parameter) => {
                write!(f, "parameter '{}' not available", parameter)
            }
            SkipReason::ParametersUnknown => {
                write!(f, "device details unavailable, parameters not checked")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Skip {
    pub address: String,
    pub reason: SkipReason,
}

/// Outcome of one reconciliation run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    pub device_type_id: Option<i64>,
    pub devices_created: usize,
    pub parameters_created: usize,
    pub points_posted: usize,
    pub points_failed: usize,
    pub skipped: Vec<Skip>,
}

impl SyncReport {
    /// A run succeeds unless an attempted post exhausted its retries.
    /// Skips alone never fail a run.
    pub fn is_success(&self) -> bool {
        self.points_failed == 0
    }

    fn skip(&mut self, address: &str, reason: SkipReason) {
        self.skipped.push(Skip {
            address: address.to_string(),
            reason,
        });
    }
}

pub struct ReconciliationEngine<'a, T> {
    client: &'a InventoryClient<T>,
    device_type_name: &'a str,
    post_retries: u32,
}

impl<'a, T: HttpTransport> ReconciliationEngine<'a, T> {
    pub fn new(client: &'a InventoryClient<T>, config: &'a SyncConfig) -> Self {
        Self {
            client,
            device_type_name: &config.device_type_name,
            post_retries: config.post_retries,
        }
    }

    /// Make sure every discovered sensor exists remotely with its parameters,
    /// then post one point per sensor and parameter
    ///
    /// Only a failure to read the device inventory aborts the run; everything
    /// after that is handled per device or per point.
    pub async fn run(&self, discovered: &[DiscoveredDevice]) -> Result<SyncReport, SyncError> {
        let mut report = SyncReport::default();
        let discovered = unique_by_address(discovered);

        info!("=== Fetching devices from homelab API ===");
        let remote = self
            .client
            .list_devices_with_detail()
            .await
            .map_err(SyncError::RemoteState)?;
        info!("Found {} devices in API database.", remote.len());
        let mut by_address = index_by_address(remote);

        report.device_type_id = self.resolve_device_type().await;

        self.upsert_devices(&discovered, &mut by_address, &mut report)
            .await;

        info!("=== Checking device parameters ===");
        for device in &discovered {
            let address = normalize_address(&device.address);
            let Some(remote) = by_address.get_mut(&address) else {
                warn!("Skipping {} - not in database", address);
                continue;
            };
            self.upsert_parameters(&address, remote, &mut report).await;
        }

        info!("=== Insert time-series data ===");
        for device in &discovered {
            self.submit_points(device, &by_address, &mut report).await;
        }

        info!(
            "=== Processing complete: {} created device(s), {} created parameter(s), {} posted, {} failed, {} skipped ===",
            report.devices_created,
            report.parameters_created,
            report.points_posted,
            report.points_failed,
            report.skipped.len()
        );
        Ok(report)
    }

    async fn resolve_device_type(&self) -> Option<i64> {
        match self.client.lookup_device_type_id(self.device_type_name).await {
            Ok(Some(id)) => {
                debug!("Device type '{}' has id {}", self.device_type_name, id);
                Some(id)
            }
            Ok(None) => {
                warn!(
                    "Device type '{}' not found, new devices cannot be created",
                    self.device_type_name
                );
                None
            }
            Err(e) => {
                warn!(
                    "Failed to query device type '{}': {}",
                    self.device_type_name, e
                );
                None
            }
        }
    }

    async fn upsert_devices(
        &self,
        discovered: &[&DiscoveredDevice],
        by_address: &mut HashMap<String, RemoteDevice>,
        report: &mut SyncReport,
    ) {
        for device in discovered {
            let address = normalize_address(&device.address);
            if by_address.contains_key(&address) {
                continue;
            }
            info!("Device {} not found in database. Inserting...", address);

            let Some(type_id) = report.device_type_id else {
                warn!(
                    "Device type '{}' missing. Skipping insert of {}.",
                    self.device_type_name, address
                );
                report.skip(&address, SkipReason::DeviceTypeUnresolved);
                continue;
            };

            match self
                .client
                .create_device(&address, &device.display_name, type_id)
                .await
            {
                Ok(remote) => {
                    info!("Successfully inserted device {} (id {})", address, remote.id);
                    report.devices_created += 1;
                    by_address.insert(address, remote);
                }
                Err(e) => {
                    error!("Failed to insert device {}: {}", address, e);
                    report.skip(&address, SkipReason::DeviceCreationFailed(e));
                }
            }
        }
    }

    async fn upsert_parameters(
        &self,
        address: &str,
        remote: &mut RemoteDevice,
        report: &mut SyncReport,
    ) {
        debug!(
            "Check parameters for device {} (id {}, type {:?})",
            address, remote.id, remote.type_id
        );

        // A summary record may omit parameters that already exist
        if !remote.details_loaded {
            warn!(
                "Details for device {} unavailable. Not creating parameters.",
                address
            );
            report.skip(address, SkipReason::ParametersUnknown);
            return;
        }

        for parameter in RequiredParameter::ALL {
            let name = parameter.name();
            if remote.parameters.contains_key(name) {
                continue;
            }
            info!(
                "Parameter '{}' missing for device {}. Creating...",
                name, address
            );

            match self
                .client
                .create_parameter(remote.id, name, parameter.unit())
                .await
            {
                Ok(created) => {
                    info!(
                        "Successfully created parameter '{}' for device {}",
                        created.name, address
                    );
                    report.parameters_created += 1;
                    remote.parameters.insert(name.to_string(), created.id);
                }
                Err(e) => {
                    error!(
                        "Failed to create parameter '{}' for device {}: {}",
                        name, address, e
                    );
                    report.skip(
                        address,
                        SkipReason::ParameterCreationFailed {
                            parameter: name,
                            error: e,
                        },
                    );
                }
            }
        }
    }

    async fn submit_points(
        &self,
        device: &DiscoveredDevice,
        by_address: &HashMap<String, RemoteDevice>,
        report: &mut SyncReport,
    ) {
        let address = normalize_address(&device.address);
        let Some(remote) = by_address.get(&address) else {
            warn!("Skipping {} - no parameters available", address);
            report.skip(&address, SkipReason::DeviceNotMapped);
            return;
        };

        for parameter in RequiredParameter::ALL {
            let name = parameter.name();
            let Some(&parameter_id) = remote.parameters.get(name) else {
                warn!("Parameter '{}' not available for device {}", name, address);
                report.skip(&address, SkipReason::ParameterNotMapped(name));
                continue;
            };

            let point = DataPoint {
                value: parameter.value_of(&device.measurement),
                time: device.captured_at,
            };

            if self
                .client
                .post_timeseries_points(parameter_id, &[point], self.post_retries)
                .await
            {
                info!(
                    "Successfully posted {} data for device {} at {}",
                    name,
                    address,
                    format_datetime(&device.captured_at)
                );
                report.points_posted += 1;
            } else {
                error!("Failed to post {} data for device {}", name, address);
                report.points_failed += 1;
            }
        }
    }
}

/// Map remote devices by normalized serial number. Devices without one are left out.
fn index_by_address(devices: Vec<RemoteDevice>) -> HashMap<String, RemoteDevice> {
    devices
        .into_iter()
        .filter_map(|device| {
            let serial = device.serial_number.as_deref().map(normalize_address)?;
            if serial.is_empty() {
                return None;
            }
            Some((serial, device))
        })
        .collect()
}

fn unique_by_address(discovered: &[DiscoveredDevice]) -> Vec<&DiscoveredDevice> {
    let mut seen = HashSet::new();
    discovered
        .iter()
        .filter(|device| seen.insert(normalize_address(&device.address)))
        .collect()
}
