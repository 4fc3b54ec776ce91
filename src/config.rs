use std::env;
use std::str::FromStr;
use std::time::Duration;

use url::Url;

use crate::error::ConfigError;

pub const DEFAULT_API_URL: &str = "http://localhost:8080/api";
pub const DEFAULT_DEVICE_TYPE_NAME: &str = "Bluetooth device";
pub const DEFAULT_MAC_PREFIXES: &str = "A4:C1:38";
const DEFAULT_API_TIMEOUT_SECS: u64 = 10;
const DEFAULT_API_RETRIES: u32 = 1;
const DEFAULT_API_RETRY_DELAY_MS: u64 = 0;
const DEFAULT_SCAN_DURATION_SECS: u64 = 15;

/// Calibration offsets added to Govee H5075 readings before rounding.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Offsets {
    pub temperature: f64,
    pub humidity: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    pub api_url: String,
    pub api_key: String,
    pub device_type_name: String,
    pub request_timeout: Duration,
    pub post_retries: u32,
    pub retry_delay: Duration,
    pub scan_duration: Duration,
    pub mac_prefixes: Vec<String>,
    pub offsets: Offsets,
}

impl SyncConfig {
    pub fn new() -> Result<Self, ConfigError> {
        // Load environment variables, existing ones take precedence
        dotenv::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from any key/value source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup("HOMELAB_API_KEY")
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
            .ok_or(ConfigError::MissingApiKey)?;

        let api_url = lookup("HOMELAB_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string());
        Url::parse(&api_url).map_err(|e| ConfigError::InvalidValue {
            key: "HOMELAB_API_URL",
            value: api_url.clone(),
            reason: e.to_string(),
        })?;
        let api_url = api_url.trim_end_matches('/').to_string();

        let device_type_name = lookup("BLUETOOTH_DEVICE_TYPE_NAME")
            .map(|name| name.trim().trim_matches('"').to_string())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| DEFAULT_DEVICE_TYPE_NAME.to_string());

        let mac_prefixes: Vec<String> = lookup("GOVEE_MAC_PREFIXES")
            .unwrap_or_else(|| DEFAULT_MAC_PREFIXES.to_string())
            .split(',')
            .map(|prefix| prefix.trim().to_uppercase())
            .filter(|prefix| !prefix.is_empty())
            .collect();

        Ok(SyncConfig {
            api_url,
            api_key,
            device_type_name,
            request_timeout: Duration::from_secs(parse_or(
                &lookup,
                "API_TIMEOUT_SECS",
                DEFAULT_API_TIMEOUT_SECS,
            )?),
            post_retries: parse_or(&lookup, "API_RETRIES", DEFAULT_API_RETRIES)?,
            retry_delay: Duration::from_millis(parse_or(
                &lookup,
                "API_RETRY_DELAY_MS",
                DEFAULT_API_RETRY_DELAY_MS,
            )?),
            scan_duration: Duration::from_secs(parse_or(
                &lookup,
                "BT_SCAN_DURATION_SECS",
                DEFAULT_SCAN_DURATION_SECS,
            )?),
            mac_prefixes,
            offsets: Offsets {
                temperature: parse_or(&lookup, "GOVEE_TEMPERATURE_OFFSET", 0.0)?,
                humidity: parse_or(&lookup, "GOVEE_HUMIDITY_OFFSET", 0.0)?,
            },
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => {
            raw.trim()
                .parse()
                .map_err(|e: T::Err| ConfigError::InvalidValue {
                    key,
                    value: raw.clone(),
                    reason: e.to_string(),
                })
        }
        _ => Ok(default),
    }
}
