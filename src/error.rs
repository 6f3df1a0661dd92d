//! Normalized errors
//!
//! Every failure an adapter reports (transport, unparseable body, server
//! application error, interpretation) is surfaced as one `NormalizedError`.
//! Server error bodies come in several shapes; `ErrorSource::decode` picks
//! the one that carries the message.

use crate::http::envelope::{AdapterExports, ResponseEnvelope};
use serde_json::Value;
use thiserror::Error;

/// What kind of failure a `NormalizedError` describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network/HTTP-level failure: no usable body or a non-2xx status.
    TransportFailure,
    /// A body was present but was not valid structured data.
    UnparseableBody,
    /// Metadata parsed but matched no known schema.
    UnrecognizedMetadataShape,
    /// A successful response whose payload flags an application error.
    ServerReportedError,
    /// Post-processing of a successful response failed.
    InterpretationError,
    /// Registry lookup or adapter binding failed.
    Configuration,
}

/// The single error shape adapters produce.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct NormalizedError {
    pub kind: ErrorKind,
    pub message: String,
    pub status: u16,
    pub status_text: String,
    pub response_text: Option<String>,
    pub detail: Option<Value>,
    pub adapter_exports: Option<AdapterExports>,
    prefixed: bool,
}

impl NormalizedError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: 0,
            status_text: String::new(),
            response_text: None,
            detail: None,
            adapter_exports: None,
            prefixed: false,
        }
    }

    /// Normalize a failed (or semantically erroneous) envelope.
    ///
    /// The message defaults to the transport's status text. When the body
    /// parses, it becomes `detail` and the message is taken from the error
    /// source: inner exception message, then message, then the raw body.
    pub fn from_envelope(envelope: &ResponseEnvelope) -> Self {
        let status_text = envelope.status_code_text().to_string();
        let default_message = if status_text.is_empty() {
            envelope.status().to_string()
        } else {
            status_text.clone()
        };

        let response_text = envelope.data().text().map(str::to_string);
        let detail = response_text
            .as_deref()
            .and_then(|text| serde_json::from_str::<Value>(text).ok());

        let message = match (&detail, &response_text) {
            (Some(detail), Some(text)) => ErrorSource::decode(detail)
                .message()
                .unwrap_or_else(|| text.clone()),
            _ => default_message,
        };

        Self {
            kind: ErrorKind::TransportFailure,
            message,
            status: envelope.status_code(),
            status_text,
            response_text,
            detail,
            adapter_exports: Some(envelope.adapter_exports().clone()),
            prefixed: false,
        }
    }

    pub fn with_kind(mut self, kind: ErrorKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Prepend an operation prefix: `"{prefix}; {message}"`.
    ///
    /// Applied at most once; later calls leave the message alone.
    pub fn with_prefix(mut self, prefix: &str) -> Self {
        if !self.prefixed {
            self.message = format!("{}; {}", prefix, self.message);
            self.prefixed = true;
        }
        self
    }
}

impl From<crate::registry::RegistryError> for NormalizedError {
    fn from(err: crate::registry::RegistryError) -> Self {
        NormalizedError::new(ErrorKind::Configuration, err.to_string())
    }
}

/// Where a parsed server error keeps its message.
#[derive(Debug, PartialEq)]
enum ErrorSource<'a> {
    InnerException(&'a Value),
    Outer(&'a Value),
}

impl<'a> ErrorSource<'a> {
    fn decode(payload: &'a Value) -> Self {
        match payload.get("InnerException") {
            Some(inner) if is_present(inner) => Self::InnerException(inner),
            _ => Self::Outer(payload),
        }
    }

    /// First present message field. Non-string values render as JSON text.
    fn message(&self) -> Option<String> {
        let source = match self {
            Self::InnerException(v) | Self::Outer(v) => *v,
        };
        ["ExceptionMessage", "Message"]
            .iter()
            .filter_map(|field| source.get(field))
            .find(|value| is_present(value))
            .map(|value| match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
    }
}

fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}
