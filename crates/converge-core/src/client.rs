//! Remote API seam
//!
//! The engine only needs two primitives from the surrounding API layer: an
//! idempotent read and a mutating submit. Both surface the HTTP status so the
//! classifier can tell "not found" apart from other failures.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// HTTP method of a remote call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Post => write!(f, "POST"),
            Method::Put => write!(f, "PUT"),
            Method::Delete => write!(f, "DELETE"),
        }
    }
}

/// Failure of a single remote call
///
/// `status` is `None` when the request never produced an HTTP response.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{method} {path}: {}", describe(.status, .message))]
pub struct TransportError {
    pub method: Method,
    pub path: String,
    pub status: Option<u16>,
    pub message: String,
}

impl TransportError {
    pub fn http(method: Method, path: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            status: Some(status),
            message: message.into(),
        }
    }

    pub fn network(method: Method, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            status: None,
            message: message.into(),
        }
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn is_not_found(&self) -> bool {
        self.status == Some(404)
    }

    /// "METHOD path" of the failing call
    pub fn endpoint(&self) -> String {
        format!("{} {}", self.method, self.path)
    }
}

fn describe(status: &Option<u16>, message: &str) -> String {
    match status {
        Some(code) => format!("HTTP {}: {}", code, message),
        None => format!("request failed: {}", message),
    }
}

/// Remote API client consumed by the engine
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Idempotent read of `path`
    async fn get(&self, path: &str) -> Result<Value, TransportError>;

    /// Mutating call; the response is either the final resource state or a
    /// body carrying an operation/task identifier
    async fn submit(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, TransportError>;
}

#[async_trait]
impl<C: RemoteClient + ?Sized> RemoteClient for Arc<C> {
    async fn get(&self, path: &str) -> Result<Value, TransportError> {
        (**self).get(path).await
    }

    async fn submit(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, TransportError> {
        (**self).submit(method, path, body).await
    }
}
