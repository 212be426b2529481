//! reqwest-backed `RemoteClient`
//!
//! JSON in, JSON out. Non-2xx answers keep their status code so the engine
//! can classify them; the human readable part comes from the `message`
//! field of the API error body when there is one.

use crate::error::{HttpError, Result};
use async_trait::async_trait;
use converge_core::{Method, RemoteClient, TransportError};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

const ENDPOINT_ENV: &str = "CONVERGE_ENDPOINT";
const TOKEN_ENV: &str = "CONVERGE_TOKEN";
const TIMEOUT_ENV: &str = "CONVERGE_HTTP_TIMEOUT_SECS";

/// Per-request timeout when none is configured
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection settings for [`HttpClient`]
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Base URL every path is appended to
    pub endpoint: String,
    /// Bearer token sent as-is
    pub token: Option<String>,
    pub timeout: Duration,
}

impl ClientConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            token: None,
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Create ClientConfig from environment variables
    ///
    /// `CONVERGE_ENDPOINT` is required. `CONVERGE_TOKEN` and
    /// `CONVERGE_HTTP_TIMEOUT_SECS` are optional.
    pub fn from_env() -> Result<Self> {
        let endpoint =
            std::env::var(ENDPOINT_ENV).map_err(|_| HttpError::MissingEnvVar(ENDPOINT_ENV.to_string()))?;

        let mut config = Self::new(endpoint);
        if let Ok(token) = std::env::var(TOKEN_ENV)
            && !token.is_empty()
        {
            config.token = Some(token);
        }
        if let Ok(raw) = std::env::var(TIMEOUT_ENV) {
            let secs: u64 = raw
                .trim()
                .parse()
                .map_err(|_| HttpError::InvalidConfig(format!("{} must be whole seconds, got '{}'", TIMEOUT_ENV, raw)))?;
            config.timeout = Duration::from_secs(secs);
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if !(self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://")) {
            return Err(HttpError::InvalidConfig(format!(
                "endpoint must be an http(s) URL, got '{}'",
                self.endpoint
            )));
        }
        if self.timeout.is_zero() {
            return Err(HttpError::InvalidConfig("request timeout must be positive".to_string()));
        }
        Ok(())
    }
}

/// Error body returned by the API on non-2xx answers
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: Option<String>,
    #[serde(rename = "class")]
    error_class: Option<String>,
}

/// HTTP implementation of the engine's remote client
pub struct HttpClient {
    client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
}

impl HttpClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            token: config.token,
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(ClientConfig::from_env()?)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.endpoint, path)
        } else {
            format!("{}/{}", self.endpoint, path)
        }
    }

    async fn send(&self, method: Method, path: &str, body: Option<&Value>) -> std::result::Result<Value, TransportError> {
        let url = self.url(path);
        tracing::debug!(%method, %url, "Sending request");

        let mut request = self.client.request(to_reqwest(method), &url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| TransportError::network(method, path, e.to_string()))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| TransportError::network(method, path, e.to_string()))?;

        if !status.is_success() {
            let message = error_message(&text)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("Unknown error").to_string());
            tracing::debug!(%method, %url, status = status.as_u16(), %message, "Request failed");
            return Err(TransportError::http(method, path, status.as_u16(), message));
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text)
            .map_err(|e| TransportError::http(method, path, status.as_u16(), format!("invalid JSON body: {}", e)))
    }
}

#[async_trait]
impl RemoteClient for HttpClient {
    async fn get(&self, path: &str) -> std::result::Result<Value, TransportError> {
        self.send(Method::Get, path, None).await
    }

    async fn submit(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> std::result::Result<Value, TransportError> {
        self.send(method, path, body).await
    }
}

fn to_reqwest(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Delete => reqwest::Method::DELETE,
    }
}

/// Human readable part of an error body
fn error_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str::<ApiErrorBody>(trimmed) {
        Ok(ApiErrorBody {
            message: Some(message), ..
        }) => Some(message),
        Ok(ApiErrorBody {
            error_class: Some(class), ..
        }) => Some(class),
        Ok(_) => None,
        Err(_) => Some(trimmed.to_string()),
    }
}
