//! The raw transport primitive consumed by the http adapter
//!
//! Abstracts over how a request actually reaches the network (reqwest,
//! mock) so the adapter never depends on a specific client library.

use super::request::{CallSettings, Method};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

/// A request ready to hand to a transport.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRequest {
    pub method: Method,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
    pub timeout: Option<Duration>,
}

impl From<CallSettings> for RawRequest {
    fn from(call: CallSettings) -> Self {
        let mut headers = call.headers;
        if let Some(content_type) = call.content_type {
            headers.insert("Content-Type".to_string(), content_type);
        }
        if call.data_type == super::request::DataType::Json {
            headers
                .entry("Accept".to_string())
                .or_insert_with(|| "application/json".to_string());
        }
        Self {
            method: call.method,
            url: call.url,
            headers,
            body: call.body,
            timeout: call.timeout,
        }
    }
}

/// A completed exchange, whatever its status code.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub status_code: u16,
    pub status_text: String,
    /// Headers as a `name: value` block, one per line.
    pub raw_headers: String,
    pub body: String,
}

impl RawResponse {
    pub fn new(status_code: u16, status_text: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            status_code,
            status_text: status_text.into(),
            raw_headers: String::new(),
            body: body.into(),
        }
    }

    /// A `200 OK` response with the given body.
    pub fn ok(body: impl Into<String>) -> Self {
        Self::new(200, "OK", body)
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.raw_headers.push_str(name);
        self.raw_headers.push_str(": ");
        self.raw_headers.push_str(value);
        self.raw_headers.push('\n');
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

/// Failures below the HTTP level: nothing usable came back.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("request aborted")]
    Aborted,
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl TransportError {
    /// Textual classification used as the envelope status label.
    pub fn status_label(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "timeout",
            Self::Aborted => "abort",
            Self::Network(_) | Self::InvalidRequest(_) => "error",
        }
    }
}

/// The network primitive a transport adapter drives.
///
/// Implementations issue exactly one request per call and never retry.
/// Non-2xx statuses are ordinary `RawResponse`s; `Err` is reserved for
/// failures where no response exists.
#[async_trait]
pub trait RawTransport: Send + Sync {
    async fn issue(&self, request: &RawRequest) -> Result<RawResponse, TransportError>;
}
