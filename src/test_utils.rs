//! In-memory stand-ins for the inventory API.

use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use time::macros::datetime;
use time::OffsetDateTime;

use crate::error::TransportError;
use crate::inventory::transport::{ApiRequest, ApiResponse, HttpTransport, Method};
use crate::models::{DiscoveredDevice, PhysicalMeasurement};

type SendFuture<'a> = Pin<Box<dyn Future<Output = Result<ApiResponse, TransportError>> + Send + 'a>>;

pub const TEST_CAPTURED_AT: OffsetDateTime = datetime!(2024-03-01 12:30:05 UTC);

/// Build a discovered device captured at [`TEST_CAPTURED_AT`].
pub fn discovered(
    address: &str,
    name: &str,
    temperature_c: f64,
    relative_humidity_pct: f64,
    battery_pct: u8,
) -> DiscoveredDevice {
    DiscoveredDevice {
        address: address.to_string(),
        display_name: name.to_string(),
        measurement: PhysicalMeasurement {
            temperature_c,
            relative_humidity_pct,
            battery_pct,
        },
        captured_at: TEST_CAPTURED_AT,
    }
}

#[derive(Debug, Default)]
struct InventoryState {
    next_id: i64,
    device_types: Vec<(i64, String)>,
    devices: BTreeMap<i64, Value>,
    parameters: BTreeMap<i64, Value>,
    points: BTreeMap<i64, Vec<Value>>,
    failing: HashSet<(Method, String)>,
    requests: Vec<ApiRequest>,
}

impl InventoryState {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn device_detail(&self, id: i64) -> Option<Value> {
        let mut device = self.devices.get(&id)?.clone();
        let parameters: Vec<Value> = self
            .parameters
            .values()
            .filter(|p| p["device_id"] == id)
            .cloned()
            .collect();
        device["parameters"] = Value::Array(parameters);
        Some(device)
    }
}

/// A homelab inventory kept in memory, speaking the same routes as the API.
#[derive(Debug, Clone, Default)]
pub struct FakeInventory {
    state: Arc<Mutex<InventoryState>>,
}

impl FakeInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_device_type(&self, id: i64, name: &str) {
        let mut state = self.state.lock().unwrap();
        state.device_types.push((id, name.to_string()));
        state.next_id = state.next_id.max(id);
    }

    pub fn add_device(&self, type_id: i64, serial_number: &str) -> i64 {
        let mut state = self.state.lock().unwrap();
        let id = state.allocate_id();
        state.devices.insert(
            id,
            json!({"id": id, "type_id": type_id, "name": serial_number, "serial_number": serial_number}),
        );
        id
    }

    pub fn add_parameter(&self, device_id: i64, name: &str, unit: &str) -> i64 {
        let mut state = self.state.lock().unwrap();
        let id = state.allocate_id();
        state.parameters.insert(
            id,
            json!({"id": id, "device_id": device_id, "name": name, "unit": unit}),
        );
        id
    }

    /// Make every request with this method and path answer 500
    pub fn fail_requests(&self, method: Method, path: &str) {
        let mut state = self.state.lock().unwrap();
        state.failing.insert((method, path.to_string()));
    }

    pub fn device_count(&self) -> usize {
        self.state.lock().unwrap().devices.len()
    }

    pub fn parameter_count(&self) -> usize {
        self.state.lock().unwrap().parameters.len()
    }

    /// Parameter id by device serial number and parameter name
    pub fn parameter_id(&self, serial_number: &str, name: &str) -> Option<i64> {
        let state = self.state.lock().unwrap();
        let device_id = state
            .devices
            .values()
            .find(|d| d["serial_number"] == serial_number)?["id"]
            .as_i64()?;
        state
            .parameters
            .values()
            .find(|p| p["device_id"] == device_id && p["name"] == name)?["id"]
            .as_i64()
    }

    pub fn points(&self, parameter_id: i64) -> Vec<Value> {
        let state = self.state.lock().unwrap();
        state.points.get(&parameter_id).cloned().unwrap_or_default()
    }

    pub fn total_points(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.points.values().map(Vec::len).sum()
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn count_requests(&self, method: Method, path_prefix: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.method == method && r.path.starts_with(path_prefix))
            .count()
    }

    fn handle(&self, request: ApiRequest) -> ApiResponse {
        let mut state = self.state.lock().unwrap();
        state.requests.push(request.clone());

        if state
            .failing
            .contains(&(request.method, request.path.clone()))
        {
            return respond(500, json!({"message": "internal error"}));
        }

        let segments: Vec<&str> = request.path.trim_start_matches('/').split('/').collect();
        let body = request.body.unwrap_or(Value::Null);

        match (request.method, segments.as_slice()) {
            (Method::Get, ["device-types"]) => {
                let device_types: Vec<Value> = state
                    .device_types
                    .iter()
                    .map(|(id, name)| json!({"id": id, "name": name}))
                    .collect();
                respond(200, json!({ "device_types": device_types }))
            }
            (Method::Get, ["devices"]) => {
                let devices: Vec<Value> = state
                    .devices
                    .values()
                    .map(|d| {
                        json!({
                            "id": d["id"],
                            "name": d["name"],
                            "serial_number": d["serial_number"],
                        })
                    })
                    .collect();
                respond(200, json!({ "devices": devices }))
            }
            (Method::Get, ["device", id]) => {
                match id.parse().ok().and_then(|id| state.device_detail(id)) {
                    Some(device) => respond(200, json!({ "device": device })),
                    None => respond(404, json!({"message": "not found"})),
                }
            }
            (Method::Post, ["devices"]) => {
                let id = state.allocate_id();
                let device = json!({
                    "id": id,
                    "type_id": body["type_id"],
                    "name": body["name"],
                    "serial_number": body["serial_number"],
                });
                state.devices.insert(id, device.clone());
                respond(201, json!({ "device": device }))
            }
            (Method::Post, ["device-parameters"]) => {
                let id = state.allocate_id();
                let parameter = json!({
                    "id": id,
                    "device_id": body["device_id"],
                    "name": body["name"],
                    "unit": body["unit"],
                });
                state.parameters.insert(id, parameter.clone());
                respond(201, json!({ "device_parameter": parameter }))
            }
            (Method::Post, ["device-parameters", id, "data"]) => {
                let Some(id) = id.parse::<i64>().ok().filter(|id| state.parameters.contains_key(id))
                else {
                    return respond(404, json!({"message": "not found"}));
                };
                let data = body["data"].as_array().cloned().unwrap_or_default();
                state.points.entry(id).or_default().extend(data);
                respond(200, json!({"message": "ok"}))
            }
            _ => respond(404, json!({"message": "no route"})),
        }
    }
}

fn respond(status: u16, body: Value) -> ApiResponse {
    ApiResponse {
        status,
        body: body.to_string(),
    }
}

impl HttpTransport for FakeInventory {
    fn send(&self, request: ApiRequest) -> SendFuture<'_> {
        let response = self.handle(request);
        Box::pin(async move { Ok(response) })
    }
}

/// Replays a fixed sequence of responses, one per request.
#[derive(Debug, Clone)]
pub struct ScriptedTransport {
    script: Arc<Mutex<VecDeque<Result<(u16, String), TransportError>>>>,
    attempts: Arc<Mutex<usize>>,
}

impl ScriptedTransport {
    pub fn new(script: Vec<Result<(u16, &str), TransportError>>) -> Self {
        let script = script
            .into_iter()
            .map(|step| step.map(|(status, body)| (status, body.to_string())))
            .collect();
        Self {
            script: Arc::new(Mutex::new(script)),
            attempts: Arc::new(Mutex::new(0)),
        }
    }

    pub fn attempts(&self) -> usize {
        *self.attempts.lock().unwrap()
    }
}

impl HttpTransport for ScriptedTransport {
    fn send(&self, _request: ApiRequest) -> SendFuture<'_> {
        *self.attempts.lock().unwrap() += 1;
        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Network("script exhausted".into())));
        Box::pin(async move { step.map(|(status, body)| ApiResponse { status, body }) })
    }
}
