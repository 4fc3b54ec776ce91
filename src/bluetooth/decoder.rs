/// Decoding of Govee thermometer/hygrometer manufacturer data
use crate::config::Offsets;
use crate::error::DecodeError;
use crate::models::PhysicalMeasurement;
use crate::utils::round_one_decimal;

// Govee manufacturer data keys
pub const GOVEE_MANUFACTURER_ID: u16 = 0xEC88; // H5074 and H5075
pub const GOVEE_ALT_MANUFACTURER_ID: u16 = 0x8801; // H5179

const H5074_MIN_LEN: usize = 6;
const H5075_MIN_LEN: usize = 5;
const H5179_MIN_LEN: usize = 9;

const PACKED_SIGN_BIT: u32 = 0x80_0000;
const PACKED_MAGNITUDE_MASK: u32 = 0x7F_FFFF;
// Anything above this encodes >= 100.0 °C, which the sensor uses for
// uninitialised or invalid readings (all-ones included)
const PACKED_MAX_MAGNITUDE: u32 = 999_999;

/// Wire format of a Govee advertisement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    /// H5074: little-endian i16 temperature and humidity in hundredths
    Legacy,
    /// H5075: temperature and humidity packed into one big-endian 24-bit value
    Packed,
    /// H5179: little-endian u16 fields at an offset, two's complement temperature
    Alternate,
}

impl Variant {
    pub fn as_str(&self) -> &'static str {
        match self {
            Variant::Legacy => "H5074",
            Variant::Packed => "H5075",
            Variant::Alternate => "H5179",
        }
    }
}

/// Decode a raw manufacturer payload for the given variant
///
/// Returns `Ok(None)` when the sensor reports its invalid-reading sentinel;
/// only the packed format has one. Offsets apply to the packed format only.
///
/// # Arguments
/// * `variant` - Wire format selected by the caller from name and manufacturer ID
/// * `data` - Manufacturer data bytes for that ID
/// * `offsets` - Calibration offsets for the packed format
pub fn decode(
    variant: Variant,
    data: &[u8],
    offsets: Offsets,
) -> Result<Option<PhysicalMeasurement>, DecodeError> {
    match variant {
        Variant::Legacy => decode_legacy(data).map(Some),
        Variant::Packed => decode_packed(data, offsets),
        Variant::Alternate => decode_alternate(data).map(Some),
    }
}

/// H5074 layout:
/// - Byte 0: reserved
/// - Bytes 1-2: temperature (signed 16-bit LE, 0.01 °C)
/// - Bytes 3-4: humidity (signed 16-bit LE, 0.01 %)
/// - Byte 5: battery percentage
fn decode_legacy(data: &[u8]) -> Result<PhysicalMeasurement, DecodeError> {
    ensure_len(Variant::Legacy, data, H5074_MIN_LEN)?;

    let temperature = f64::from(i16::from_le_bytes([data[1], data[2]])) / 100.0;
    let humidity = f64::from(i16::from_le_bytes([data[3], data[4]])) / 100.0;

    Ok(PhysicalMeasurement {
        temperature_c: round_one_decimal(temperature),
        relative_humidity_pct: round_one_decimal(humidity),
        battery_pct: battery(data[5])?,
    })
}

/// H5075 layout:
/// - Byte 0: reserved
/// - Bytes 1-3: packed reading (unsigned 24-bit BE)
/// - Byte 4: battery percentage
///
/// The packed value's top bit is the temperature sign. Of the remaining
/// magnitude, `magnitude / 1000` is temperature in tenths of a degree and
/// `magnitude % 1000` is humidity in tenths of a percent.
fn decode_packed(
    data: &[u8],
    offsets: Offsets,
) -> Result<Option<PhysicalMeasurement>, DecodeError> {
    ensure_len(Variant::Packed, data, H5075_MIN_LEN)?;

    let packed = u32::from_be_bytes([0, data[1], data[2], data[3]]);
    let negative = packed & PACKED_SIGN_BIT != 0;
    let magnitude = packed & PACKED_MAGNITUDE_MASK;
    if magnitude > PACKED_MAX_MAGNITUDE {
        return Ok(None);
    }

    let mut temperature = f64::from(magnitude / 1000) / 10.0;
    if negative {
        temperature = -temperature;
    }
    let humidity = f64::from(magnitude % 1000) / 10.0;

    Ok(Some(PhysicalMeasurement {
        temperature_c: round_one_decimal(temperature + offsets.temperature),
        relative_humidity_pct: round_one_decimal(humidity + offsets.humidity),
        battery_pct: battery(data[4])?,
    }))
}

/// H5179 layout:
/// - Bytes 0-3: reserved
/// - Bytes 4-5: temperature (unsigned 16-bit LE, two's complement, 0.01 °C)
/// - Bytes 6-7: humidity (unsigned 16-bit LE, 0.01 %)
/// - Byte 8: battery percentage
fn decode_alternate(data: &[u8]) -> Result<PhysicalMeasurement, DecodeError> {
    ensure_len(Variant::Alternate, data, H5179_MIN_LEN)?;

    let raw_temperature = i32::from(u16::from_le_bytes([data[4], data[5]]));
    let raw_temperature = if raw_temperature >= 0x8000 {
        raw_temperature - 0x1_0000
    } else {
        raw_temperature
    };
    let raw_humidity = u16::from_le_bytes([data[6], data[7]]);

    Ok(PhysicalMeasurement {
        temperature_c: round_one_decimal(f64::from(raw_temperature) / 100.0),
        relative_humidity_pct: round_one_decimal(f64::from(raw_humidity) / 100.0),
        battery_pct: battery(data[8])?,
    })
}

fn ensure_len(variant: Variant, data: &[u8], expected: usize) -> Result<(), DecodeError> {
    if data.len() < expected {
        return Err(DecodeError::TooShort {
            variant: variant.as_str(),
            expected,
            actual: data.len(),
        });
    }
    Ok(())
}

fn battery(raw: u8) -> Result<u8, DecodeError> {
    if raw > 100 {
        return Err(DecodeError::BatteryOutOfRange(raw));
    }
    Ok(raw)
}
