//! Outbound request plumbing for the authenticated client
//!
//! Defines the request descriptor that travels through the dispatch/refresh
//! loop, the buffered response the classifier inspects, and the `Transport`
//! trait that decouples the coordinator from the HTTP stack. `HttpTransport`
//! is the reqwest-backed implementation; tests substitute scripted transports.

pub mod http;

pub use http::HttpTransport;

use bytes::Bytes;
use reqwest::Method;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::Deserialize;
use std::future::Future;
use std::pin::Pin;
use uuid::Uuid;

/// Errors raised before a response status is available.
///
/// These never reach the classifier: they are propagated to the caller
/// unchanged.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Result alias for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

/// One logical outbound call.
///
/// `retry_count` and `terminal` belong to the refresh loop: the coordinator
/// marks a descriptor terminal the first time it enters the refresh path and
/// bumps the counter on every refresh attempt. `credential_epoch` records
/// which stored credential generation the last send carried.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub id: Uuid,
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
    pub retry_count: u32,
    pub terminal: bool,
    pub credential_epoch: u64,
}

impl RequestDescriptor {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: None,
            retry_count: 0,
            terminal: false,
            credential_epoch: 0,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// Attach a JSON body and the matching content type.
    pub fn json(mut self, body: &serde_json::Value) -> Self {
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        self.body = Some(Bytes::from(body.to_string()));
        self
    }
}

/// Fully buffered upstream response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// The `{success, message}` envelope the API wraps most payloads in.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusPayload {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Parse the body as JSON. Non-JSON bodies yield `None`.
    pub fn json(&self) -> Option<serde_json::Value> {
        serde_json::from_slice(&self.body).ok()
    }

    /// Parse the `{success, message}` envelope, if the body carries one.
    pub fn status_payload(&self) -> Option<StatusPayload> {
        serde_json::from_slice(&self.body).ok()
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Abstraction over the wire.
///
/// Implementations send exactly once: no retries, no header injection.
/// Every status code, including 4xx/5xx, is returned as `Ok(ApiResponse)`;
/// `Err` is reserved for failures where no response exists.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility (`Arc<dyn Transport>`).
pub trait Transport: Send + Sync {
    /// Identifier for logging (e.g. "http")
    fn id(&self) -> &str;

    fn send<'a>(
        &'a self,
        request: &'a RequestDescriptor,
    ) -> Pin<Box<dyn Future<Output = Result<ApiResponse>> + Send + 'a>>;
}
