use serde::Serialize;
use std::collections::HashMap;
use time::OffsetDateTime;

/// One decoded sensor reading. Temperature and humidity carry one decimal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PhysicalMeasurement {
    #[serde(rename = "temperature")]
    pub temperature_c: f64,
    #[serde(rename = "humidity")]
    pub relative_humidity_pct: f64,
    #[serde(rename = "battery")]
    pub battery_pct: u8,
}

/// A sensor seen during a scan window, stamped when it was first recorded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscoveredDevice {
    #[serde(rename = "mac")]
    pub address: String,
    #[serde(rename = "name")]
    pub display_name: String,
    #[serde(flatten)]
    pub measurement: PhysicalMeasurement,
    #[serde(rename = "timestamp", with = "time::serde::rfc3339")]
    pub captured_at: OffsetDateTime,
}

/// A device row in the homelab inventory.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteDevice {
    pub id: i64,
    pub serial_number: Option<String>,
    pub type_id: Option<i64>,
    /// Lowercased parameter name -> parameter id
    pub parameters: HashMap<String, i64>,
    /// False when only the listing summary was read, so `parameters` may be incomplete
    pub details_loaded: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemoteParameter {
    pub id: i64,
    pub name: String,
}

/// The time-series channels every sensor of this class must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequiredParameter {
    Temperature,
    Humidity,
    Battery,
}

impl RequiredParameter {
    pub const ALL: [RequiredParameter; 3] = [
        RequiredParameter::Temperature,
        RequiredParameter::Humidity,
        RequiredParameter::Battery,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            RequiredParameter::Temperature => "temperature",
            RequiredParameter::Humidity => "humidity",
            RequiredParameter::Battery => "battery",
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            RequiredParameter::Temperature => "°C",
            RequiredParameter::Humidity => "%",
            RequiredParameter::Battery => "%",
        }
    }

    /// The value of this channel in a measurement
    pub fn value_of(&self, measurement: &PhysicalMeasurement) -> PointValue {
        match self {
            RequiredParameter::Temperature => PointValue::Float(measurement.temperature_c),
            RequiredParameter::Humidity => PointValue::Float(measurement.relative_humidity_pct),
            RequiredParameter::Battery => PointValue::Integer(i64::from(measurement.battery_pct)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PointValue {
    Float(f64),
    Integer(i64),
}

/// A single time-series sample as posted to `/device-parameters/{id}/data`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataPoint {
    pub value: PointValue,
    #[serde(with = "time::serde::rfc3339")]
    pub time: OffsetDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn discovered_device_serializes_with_report_keys() {
        let device = DiscoveredDevice {
            address: "A4:C1:38:00:11:22".to_string(),
            display_name: "GVH5075_1122".to_string(),
            measurement: PhysicalMeasurement {
                temperature_c: 21.5,
                relative_humidity_pct: 48.7,
                battery_pct: 64,
            },
            captured_at: datetime!(2024-03-01 12:30:05 UTC),
        };

        let json = serde_json::to_value(&device).unwrap();
        assert_eq!(json["mac"], "A4:C1:38:00:11:22");
        assert_eq!(json["name"], "GVH5075_1122");
        assert_eq!(json["temperature"], 21.5);
        assert_eq!(json["humidity"], 48.7);
        assert_eq!(json["battery"], 64);
        assert_eq!(json["timestamp"], "2024-03-01T12:30:05Z");
    }

    #[test]
    fn data_point_keeps_battery_integral() {
        let measurement = PhysicalMeasurement {
            temperature_c: -3.2,
            relative_humidity_pct: 80.0,
            battery_pct: 88,
        };
        let point = DataPoint {
            value: RequiredParameter::Battery.value_of(&measurement),
            time: datetime!(2024-03-01 00:00:00 UTC),
        };

        let json = serde_json::to_string(&point).unwrap();
        assert_eq!(json, r#"{"value":88,"time":"2024-03-01T00:00:00Z"}"#);
    }

    #[test]
    fn required_parameters_are_fixed() {
        let names: Vec<_> = RequiredParameter::ALL.iter().map(|p| p.name()).collect();
        assert_eq!(names, ["temperature", "humidity", "battery"]);
        assert_eq!(RequiredParameter::Temperature.unit(), "°C");
    }
}
