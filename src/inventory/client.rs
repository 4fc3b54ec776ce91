/// Operations on the homelab inventory: device types, devices, parameters
/// and time-series points
use log::{error, warn};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::sleep;

use crate::error::TransportError;
use crate::inventory::transport::{ApiRequest, HttpTransport};
use crate::models::{DataPoint, RemoteDevice, RemoteParameter};

const DEVICE_DESCRIPTION: &str = "Govee H5075 thermometer/hygrometer";

#[derive(Debug, Deserialize)]
struct DeviceTypeList {
    #[serde(default)]
    device_types: Vec<DeviceTypeRecord>,
}

#[derive(Debug, Deserialize)]
struct DeviceTypeRecord {
    id: i64,
    name: String,
}

#[derive(Debug, Deserialize)]
struct DeviceList {
    #[serde(default)]
    devices: Vec<DeviceRecord>,
}

#[derive(Debug, Deserialize)]
struct DeviceEnvelope {
    device: Option<DeviceRecord>,
}

#[derive(Debug, Clone, Deserialize)]
struct DeviceRecord {
    id: i64,
    #[serde(default)]
    serial_number: Option<String>,
    #[serde(default)]
    type_id: Option<i64>,
    #[serde(default)]
    parameters: Vec<ParameterRecord>,
}

#[derive(Debug, Deserialize)]
struct ParameterEnvelope {
    device_parameter: Option<ParameterRecord>,
}

#[derive(Debug, Clone, Deserialize)]
struct ParameterRecord {
    id: i64,
    name: String,
}

impl From<DeviceRecord> for RemoteDevice {
    fn from(record: DeviceRecord) -> Self {
        RemoteDevice {
            id: record.id,
            serial_number: record.serial_number,
            type_id: record.type_id,
            parameters: record
                .parameters
                .into_iter()
                .map(|p| (p.name.to_lowercase(), p.id))
                .collect(),
            details_loaded: true,
        }
    }
}

fn summary_only(record: DeviceRecord) -> RemoteDevice {
    RemoteDevice {
        details_loaded: false,
        ..RemoteDevice::from(record)
    }
}

impl From<ParameterRecord> for RemoteParameter {
    fn from(record: ParameterRecord) -> Self {
        RemoteParameter {
            id: record.id,
            name: record.name,
        }
    }
}

/// Client for the inventory API. Only time-series posts are retried.
pub struct InventoryClient<T> {
    transport: T,
    retry_delay: Duration,
}

impl<T: HttpTransport> InventoryClient<T> {
    pub fn new(transport: T, retry_delay: Duration) -> Self {
        Self {
            transport,
            retry_delay,
        }
    }

    /// Find the id of the device type with exactly this name
    pub async fn lookup_device_type_id(&self, name: &str) -> Result<Option<i64>, TransportError> {
        let response = self
            .transport
            .send(ApiRequest::get("/device-types"))
            .await?
            .error_for_status()?;
        let list: DeviceTypeList = response.json()?;

        Ok(list
            .device_types
            .into_iter()
            .find(|device_type| device_type.name == name)
            .map(|device_type| device_type.id))
    }

    /// List all devices with serial numbers and parameters
    ///
    /// The listing endpoint returns summaries only, so each device is fetched
    /// again. A failed detail fetch falls back to the summary for that device.
    pub async fn list_devices_with_detail(&self) -> Result<Vec<RemoteDevice>, TransportError> {
        let response = self
            .transport
            .send(ApiRequest::get("/devices"))
            .await?
            .error_for_status()?;
        let list: DeviceList = response.json()?;

        let mut devices = Vec::with_capacity(list.devices.len());
        for summary in list.devices {
            match self.fetch_device(summary.id).await {
                Ok(Some(detail)) => devices.push(detail.into()),
                Ok(None) => devices.push(summary_only(summary)),
                Err(e) => {
                    warn!("Could not fetch details for device {}: {}", summary.id, e);
                    devices.push(summary_only(summary));
                }
            }
        }

        Ok(devices)
    }

    async fn fetch_device(&self, id: i64) -> Result<Option<DeviceRecord>, TransportError> {
        let response = self
            .transport
            .send(ApiRequest::get(format!("/device/{}", id)))
            .await?
            .error_for_status()?;
        let envelope: DeviceEnvelope = response.json()?;
        Ok(envelope.device)
    }

    /// Register a sensor as a device, using its address as serial number
    pub async fn create_device(
        &self,
        address: &str,
        name: &str,
        type_id: i64,
    ) -> Result<RemoteDevice, TransportError> {
        let body = json!({
            "type_id": type_id,
            "name": name,
            "serial_number": address,
            "location": Value::Null,
            "description": DEVICE_DESCRIPTION,
            "is_active": true,
        });
        let response = self
            .transport
            .send(ApiRequest::post("/devices", body))
            .await?
            .error_for_status()?;
        let envelope: DeviceEnvelope = response.json()?;

        envelope
            .device
            .map(RemoteDevice::from)
            .ok_or_else(|| TransportError::InvalidResponse("missing 'device' in response".into()))
    }

    pub async fn create_parameter(
        &self,
        device_id: i64,
        name: &str,
        unit: &str,
    ) -> Result<RemoteParameter, TransportError> {
        let body = json!({
            "device_id": device_id,
            "name": name,
            "unit": unit,
            "alarm_type": "none",
        });
        let response = self
            .transport
            .send(ApiRequest::post("/device-parameters", body))
            .await?
            .error_for_status()?;
        let envelope: ParameterEnvelope = response.json()?;

        envelope
            .device_parameter
            .map(RemoteParameter::from)
            .ok_or_else(|| {
                TransportError::InvalidResponse("missing 'device_parameter' in response".into())
            })
    }

    /// Post time-series points for a parameter
    ///
    /// Retries up to `max_retries` additional times on transport failures and
    /// error statuses. An `errors` field in a successful response is logged
    /// but does not count as a failure.
    ///
    /// # Returns
    /// `true` once an attempt succeeds, `false` when all attempts failed
    pub async fn post_timeseries_points(
        &self,
        parameter_id: i64,
        points: &[DataPoint],
        max_retries: u32,
    ) -> bool {
        let body = json!({ "data": points });
        let path = format!("/device-parameters/{}/data", parameter_id);

        for attempt in 0..=max_retries {
            let result = self
                .transport
                .send(ApiRequest::post(path.clone(), body.clone()))
                .await;

            let error = match result {
                Ok(response) => {
                    log_reported_errors(parameter_id, &response.body);
                    match response.error_for_status() {
                        Ok(_) => return true,
                        Err(e) => e,
                    }
                }
                Err(e) => e,
            };

            if attempt == max_retries {
                error!(
                    "Error posting data to parameter {} after {} retries: {}",
                    parameter_id, max_retries, error
                );
                break;
            }

            warn!(
                "Retry {}/{} for parameter {}: {}",
                attempt + 1,
                max_retries,
                parameter_id,
                error
            );
            if !self.retry_delay.is_zero() {
                sleep(self.retry_delay).await;
            }
        }

        false
    }
}

fn log_reported_errors(parameter_id: i64, body: &str) {
    let Ok(Value::Object(fields)) = serde_json::from_str::<Value>(body) else {
        return;
    };
    if let Some(errors) = fields.get("errors") {
        warn!(
            "Errors occurred while posting data to parameter {}: {}",
            parameter_id, errors
        );
    }
}
