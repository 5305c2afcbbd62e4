//! Request/response transport to the management API.
//!
//! Everything above this module speaks in `ApiRequest`/`ApiResponse`;
//! `HttpTransport` puts them on the wire, `FakeFdm` answers them in memory.

use std::time::Duration;

use async_trait::async_trait;
use http::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use uplink_core::FirewallConfig;

use crate::error::{FdmError, FdmResult};

/// Path prefix of the FDM REST API.
pub const API_PREFIX: &str = "/api/fdm/latest";

#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Path below the API prefix, including any query string.
    pub path: String,
    pub bearer: Option<String>,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path, None)
    }

    pub fn post(path: impl Into<String>, body: Option<Value>) -> Self {
        Self::new(Method::POST, path, body)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path, None)
    }

    fn new(method: Method, path: impl Into<String>, body: Option<Value>) -> Self {
        Self {
            method,
            path: path.into(),
            bearer: None,
            body,
        }
    }

    pub fn with_bearer(mut self, token: &str) -> Self {
        self.bearer = Some(token.to_string());
        self
    }
}

#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: String,
}

impl ApiResponse {
    pub fn new(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Decode the body, attributing failures to `path`.
    pub fn json<T: DeserializeOwned>(&self, path: &str) -> FdmResult<T> {
        serde_json::from_str(&self.body).map_err(|e| FdmError::Decode {
            path: path.to_string(),
            message: e.to_string(),
        })
    }
}

/// Send a request to the management API and hand back status and body.
///
/// Implementations only fail for requests that never got a response;
/// HTTP error statuses are returned as responses.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: ApiRequest) -> FdmResult<ApiResponse>;
}

/// HTTPS transport backed by reqwest.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    /// Transport for `https://<address>/api/fdm/latest`.
    pub fn new(config: &FirewallConfig) -> FdmResult<Self> {
        let base_url = format!("https://{}{API_PREFIX}", config.address);
        Self::with_base_url(
            base_url,
            config.request_timeout(),
            config.accept_invalid_certs,
        )
    }

    pub fn with_base_url(
        base_url: impl Into<String>,
        timeout: Duration,
        accept_invalid_certs: bool,
    ) -> FdmResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(accept_invalid_certs)
            .user_agent(concat!("uplink/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FdmError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> FdmResult<ApiResponse> {
        let url = format!("{}{}", self.base_url, request.path);

        let mut builder = self
            .client
            .request(request.method.clone(), &url)
            .header(reqwest::header::ACCEPT, "application/json")
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            debug!(error = %e, method = %request.method, path = %request.path, "request failed");
            FdmError::Transport(e.to_string())
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| FdmError::Transport(e.to_string()))?;

        debug!(method = %request.method, path = %request.path, %status, "api call");
        Ok(ApiResponse { status, body })
    }
}
