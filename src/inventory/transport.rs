/// HTTP plumbing for the homelab inventory API
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::error::TransportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
}

/// A request relative to the API base URL, e.g. `GET /device-types`.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            body: None,
        }
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            body: Some(body),
        }
    }
}

/// Status and raw body of a completed exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Fail with `TransportError::Status` unless the status is 2xx
    pub fn error_for_status(self) -> Result<Self, TransportError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(TransportError::Status {
                status: self.status,
                body: self.body,
            })
        }
    }

    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, TransportError> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

/// One request/response round trip. Implemented over `reqwest` in production
/// and by an in-memory inventory in tests.
pub trait HttpTransport: Send + Sync {
    fn send(
        &self,
        request: ApiRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ApiResponse, TransportError>> + Send + '_>>;
}

/// Bearer-authenticated JSON transport with a fixed per-request timeout.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    base_url: String,
}

impl ReqwestTransport {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, TransportError> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", api_key))
            .map_err(|e| TransportError::Network(format!("invalid API key header: {}", e)))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

impl HttpTransport for ReqwestTransport {
    fn send(
        &self,
        request: ApiRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ApiResponse, TransportError>> + Send + '_>> {
        Box::pin(async move {
            let url = self.url(&request.path);
            let builder = match request.method {
                Method::Get => self.client.get(&url),
                Method::Post => self.client.post(&url),
            };
            let builder = match &request.body {
                Some(body) => builder.json(body),
                None => builder,
            };

            let response = builder.send().await?;
            let status = response.status().as_u16();
            let body = response.text().await?;

            Ok(ApiResponse { status, body })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn joins_paths_onto_base_url() {
        let transport =
            ReqwestTransport::new("http://localhost:8080/api/", "key", Duration::from_secs(1))
                .unwrap();
        assert_eq!(
            transport.url("/device-types"),
            "http://localhost:8080/api/device-types"
        );
        assert_eq!(transport.url("device/3"), "http://localhost:8080/api/device/3");
    }

    #[test]
    fn error_for_status_keeps_body() {
        let response = ApiResponse {
            status: 503,
            body: "unavailable".to_string(),
        };
        assert_eq!(
            response.error_for_status(),
            Err(TransportError::Status {
                status: 503,
                body: "unavailable".to_string()
            })
        );
    }

    #[test]
    fn parses_json_body() {
        let response = ApiResponse {
            status: 200,
            body: json!({"device_types": []}).to_string(),
        };
        let value: Value = response.json().unwrap();
        assert_eq!(value["device_types"], json!([]));

        let broken = ApiResponse {
            status: 200,
            body: "<html>".to_string(),
        };
        assert!(matches!(
            broken.json::<Value>(),
            Err(TransportError::InvalidResponse(_))
        ));
    }

    #[test]
    fn rejects_api_key_with_control_characters() {
        assert!(ReqwestTransport::new("http://localhost", "bad\nkey", Duration::from_secs(1))
            .is_err());
    }
}
