//! HTTP client for the controller's REST API.
//!
//! [`HttpDeviceApi`] implements [`DeviceApi`] against the FastAPI server that
//! runs on the controller:
//!
//! | Operation | Request |
//! |-----------|---------|
//! | status | `GET /status` |
//! | history | `GET /history?hours=<h>&limit=<n>` |
//! | control | `POST /control` with `{"command": ..., "params": {...}}` |
//!
//! # Example
//!
//! ```no_run
//! use wpctl_core::{DeviceApi, HttpDeviceApi, map_status};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let api = HttpDeviceApi::new("http://raspberrypi.local:5000")?;
//! let status = map_status(&api.fetch_status().await?)?;
//! println!("Compressor: {}", status.compressor.state);
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde_json::Value;
use tracing::debug;

use wpctl_types::{CommandResult, ControlCommand};

use crate::api::{DeviceApi, HistoryQuery};
use crate::error::ApiError;
use crate::mapper::{encode_command, map_command_result};

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP implementation of [`DeviceApi`].
#[derive(Debug, Clone)]
pub struct HttpDeviceApi {
    client: Client,
    base_url: String,
    timeout: Duration,
}

/// Trim a trailing slash and require an `http(s)://` scheme.
fn normalize_base_url(base_url: &str) -> Result<String, ApiError> {
    let base_url = base_url.trim().trim_end_matches('/').to_string();
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ApiError::InvalidUrl(format!(
            "URL must start with http:// or https://, got: {}",
            base_url
        )));
    }
    Ok(base_url)
}

impl HttpDeviceApi {
    /// Create a client with the default 10 s timeout.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Controller API root (e.g. "http://raspberrypi.local:5000")
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        Self::with_timeout(base_url, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Create a client with a custom per-request timeout.
    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let base_url = normalize_base_url(base_url)?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Request(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            timeout,
        })
    }

    /// Create a client with a custom reqwest Client.
    pub fn with_client(base_url: &str, client: Client) -> Result<Self, ApiError> {
        Ok(Self {
            client,
            base_url: normalize_base_url(base_url)?,
            timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    // ======================================================================
    // Internal HTTP helpers
    // ======================================================================

    async fn send(&self, operation: &str, url: &str, request: RequestBuilder) -> Result<Value, ApiError> {
        debug!(operation, url, "Sending request");
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ApiError::timeout(operation, self.timeout)
            } else {
                ApiError::NotReachable {
                    url: url.to_string(),
                    message: e.to_string(),
                }
            }
        })?;

        self.handle_response(operation, response).await
    }

    async fn handle_response(&self, operation: &str, response: Response) -> Result<Value, ApiError> {
        let status = response.status();
        let body = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                ApiError::timeout(operation, self.timeout)
            } else {
                ApiError::Request(e.to_string())
            }
        })?;

        if status.is_success() {
            serde_json::from_slice(&body).map_err(|e| ApiError::Decode(e.to_string()))
        } else {
            Err(ApiError::Http {
                status: status.as_u16(),
                message: error_message(&body).unwrap_or_else(|| status.to_string()),
            })
        }
    }
}

/// FastAPI puts the reason in `detail`; other servers use `error`.
fn error_message(body: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(body).ok()?;
    ["detail", "error", "message"].iter().find_map(|key| match value.get(*key)? {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    })
}

#[async_trait]
impl DeviceApi for HttpDeviceApi {
    async fn fetch_status(&self) -> Result<Value, ApiError> {
        let url = self.url("/status");
        self.send("fetch_status", &url, self.client.get(&url)).await
    }

    async fn fetch_history(&self, query: HistoryQuery) -> Result<Value, ApiError> {
        let url = self.url("/history");
        let request = self
            .client
            .get(&url)
            .query(&[("hours", query.hours_back), ("limit", query.limit)]);
        self.send("fetch_history", &url, request).await
    }

    async fn submit_control(&self, command: &ControlCommand) -> Result<CommandResult, ApiError> {
        let url = self.url("/control");
        let body = encode_command(command);
        let reply = self
            .send("submit_control", &url, self.client.post(&url).json(&body))
            .await?;
        map_command_result(&reply).map_err(|e| ApiError::Decode(e.to_string()))
    }
}
