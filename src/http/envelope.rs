//! Uniform response envelope for a completed transport call
//!
//! Whatever transport ran, callers see the same shape: status label, status
//! code and text, body, a lazy header lookup, and transport exports.

use super::abort::AbortHandle;
use super::headers::HeaderLookup;
use super::request::{DataType, Method};
use serde_json::Value;
use std::borrow::Cow;
use uuid::Uuid;

/// Response body as delivered by the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Empty,
    Text(String),
    /// Parsed JSON alongside the text it was parsed from.
    Json { value: Value, text: String },
    /// JSON was expected but the text did not parse.
    Malformed { text: String, reason: String },
}

impl ResponseBody {
    /// Decode raw text according to the expected data type.
    pub fn decode(text: String, data_type: DataType) -> Self {
        if text.is_empty() {
            return Self::Empty;
        }
        match data_type {
            DataType::Text => Self::Text(text),
            DataType::Json => match serde_json::from_str(&text) {
                Ok(value) => Self::Json { value, text },
                Err(e) => Self::Malformed {
                    text,
                    reason: e.to_string(),
                },
            },
        }
    }

    /// A JSON body built from a value rather than received text.
    pub fn json(value: Value) -> Self {
        let text = value.to_string();
        Self::Json { value, text }
    }

    /// Raw text, as the server sent it.
    pub fn from_text(text: String) -> Self {
        if text.is_empty() {
            Self::Empty
        } else {
            Self::Text(text)
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// The body as structured data, parsing text bodies on demand.
    pub fn as_json(&self) -> Option<Cow<'_, Value>> {
        match self {
            Self::Json { value, .. } => Some(Cow::Borrowed(value)),
            Self::Text(text) => serde_json::from_str(text).ok().map(Cow::Owned),
            Self::Empty | Self::Malformed { .. } => None,
        }
    }

    /// The body exactly as the server sent it.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Empty => None,
            Self::Text(text) | Self::Json { text, .. } | Self::Malformed { text, .. } => Some(text),
        }
    }
}

/// Identity of the request behind a response.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestInfo {
    pub id: Uuid,
    pub method: Method,
    pub url: String,
}

/// Transport-side state of a finished call: the status line, the raw
/// header block, and the call's abort capability.
#[derive(Debug, Clone)]
pub struct TransportHandle {
    pub request: RequestInfo,
    pub status_code: u16,
    pub status_text: String,
    pub raw_headers: Option<String>,
    pub abort: AbortHandle,
}

impl TransportHandle {
    pub fn get_all_response_headers(&self) -> Option<&str> {
        self.raw_headers.as_deref()
    }
}

/// Transport-specific handle exported alongside results and errors.
#[derive(Debug, Clone)]
pub struct AdapterExports {
    /// `None` when the envelope was built without a transport handle.
    pub request: Option<RequestInfo>,
    /// Always disarmed: a completed call cannot be aborted.
    pub abort: AbortHandle,
}

impl AdapterExports {
    pub fn detached() -> Self {
        let abort = AbortHandle::new();
        abort.disarm();
        Self { request: None, abort }
    }

    pub fn request_id(&self) -> Option<Uuid> {
        self.request.as_ref().map(|r| r.id)
    }
}

/// The uniform outcome of one transport call. Immutable once built.
#[derive(Debug, Clone)]
pub struct ResponseEnvelope {
    data: ResponseBody,
    status: String,
    status_code: u16,
    status_code_text: String,
    headers: HeaderLookup,
    adapter_exports: AdapterExports,
}

impl ResponseEnvelope {
    pub fn data(&self) -> &ResponseBody {
        &self.data
    }

    /// Textual classification: `"success"`, `"error"`, `"timeout"`, `"abort"`.
    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn status_code_text(&self) -> &str {
        &self.status_code_text
    }

    pub fn headers(&self) -> &HeaderLookup {
        &self.headers
    }

    /// Shorthand for `headers().get(name)`.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub fn adapter_exports(&self) -> &AdapterExports {
        &self.adapter_exports
    }

    pub fn into_parts(self) -> (ResponseBody, AdapterExports) {
        (self.data, self.adapter_exports)
    }
}

/// Wrap a completed call into an envelope.
///
/// A missing handle yields a zero-status envelope with no headers. The
/// handle's abort capability is disarmed before anything else, and the
/// header lookup is bound to the block present right now.
pub fn build_envelope(
    data: ResponseBody,
    status: impl Into<String>,
    handle: Option<TransportHandle>,
) -> ResponseEnvelope {
    let Some(handle) = handle else {
        return ResponseEnvelope {
            data,
            status: status.into(),
            status_code: 0,
            status_code_text: String::new(),
            headers: HeaderLookup::empty(),
            adapter_exports: AdapterExports::detached(),
        };
    };

    handle.abort.disarm();

    let headers = HeaderLookup::new(handle.get_all_response_headers());

    ResponseEnvelope {
        data,
        status: status.into(),
        status_code: handle.status_code,
        status_code_text: handle.status_text,
        headers,
        adapter_exports: AdapterExports {
            request: Some(handle.request),
            abort: handle.abort,
        },
    }
}
