/// Error kinds for configuration, decoding, transport and sync runs
use thiserror::Error;

/// Configuration problems detected at startup, before any scan or request.
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("HOMELAB_API_KEY environment variable not set")]
    MissingApiKey,
    #[error("invalid value for {key}: '{value}' ({reason})")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// A malformed sensor payload. Scoped to a single advertisement.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("{variant} payload too short: expected at least {expected} bytes, got {actual}")]
    TooShort {
        variant: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("battery level out of range: expected 0-100, got {0}")]
    BatteryOutOfRange(u8),
}

/// Failure of a single request/response exchange with the inventory API.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),
    #[error("request timed out")]
    Timeout,
    #[error("HTTP status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else {
            TransportError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        TransportError::InvalidResponse(err.to_string())
    }
}

/// Bluetooth adapter or session failure.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Bluetooth error: {0}")]
    Bluetooth(String),
}

impl From<bluer::Error> for ScanError {
    fn from(err: bluer::Error) -> Self {
        ScanError::Bluetooth(err.to_string())
    }
}

/// Conditions that abort a reconciliation run.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("failed to read inventory: {0}")]
    RemoteState(#[source] TransportError),
}

/// Errors that end a scan-and-sync cycle with a failure exit status.
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error("failed to build API client: {0}")]
    Client(#[source] TransportError),
    #[error("failed to encode device report: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to write device report: {0}")]
    Output(#[from] std::io::Error),
    #[error("interrupted by user")]
    Interrupted,
}
