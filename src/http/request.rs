//! Send requests and per-call settings resolution
//!
//! Settings are layered: built-in defaults < adapter defaults < request
//! settings. Resolution always produces a fresh `CallSettings`; nothing is
//! merged into shared state.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// What a send is for. Decides method, body encoding, and expected response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Metadata,
    Query,
    SaveChanges,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Metadata => "metadata",
            Self::Query => "query",
            Self::SaveChanges => "savechanges",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "metadata" => Ok(Self::Metadata),
            "query" => Ok(Self::Query),
            "savechanges" => Ok(Self::SaveChanges),
            other => Err(format!("unknown operation: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get => f.write_str("GET"),
            Self::Post => f.write_str("POST"),
        }
    }
}

/// How the response body should be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    #[default]
    Json,
    Text,
}

/// Partial transport settings. Every field is optional so layers can be
/// overlaid; `headers` merge key by key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportSettings {
    pub data_type: Option<DataType>,
    pub timeout_ms: Option<u64>,
    pub content_type: Option<String>,
    pub headers: BTreeMap<String, String>,
}

impl TransportSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data_type(mut self, data_type: DataType) -> Self {
        self.data_type = Some(data_type);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Layer `top` over `self`; `top` wins on conflicts.
    pub fn overlay(&self, top: &TransportSettings) -> TransportSettings {
        let mut headers = self.headers.clone();
        headers.extend(top.headers.iter().map(|(k, v)| (k.clone(), v.clone())));

        TransportSettings {
            data_type: top.data_type.or(self.data_type),
            timeout_ms: top.timeout_ms.or(self.timeout_ms),
            content_type: top.content_type.clone().or_else(|| self.content_type.clone()),
            headers,
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == TransportSettings::default()
    }
}

/// A single request to a transport adapter. Immutable once built.
#[derive(Debug, Clone)]
pub struct SendRequest {
    url: String,
    operation: Operation,
    payload: Option<Value>,
    adapter_settings: TransportSettings,
}

impl SendRequest {
    pub fn new(url: impl Into<String>, operation: Operation) -> Self {
        Self {
            url: url.into(),
            operation,
            payload: None,
            adapter_settings: TransportSettings::default(),
        }
    }

    pub fn metadata(url: impl Into<String>) -> Self {
        Self::new(url, Operation::Metadata)
    }

    pub fn query(url: impl Into<String>) -> Self {
        Self::new(url, Operation::Query)
    }

    pub fn save_changes(url: impl Into<String>, payload: Value) -> Self {
        Self::new(url, Operation::SaveChanges).with_payload(payload)
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_settings(mut self, settings: TransportSettings) -> Self {
        self.adapter_settings = settings;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn payload(&self) -> Option<&Value> {
        self.payload.as_ref()
    }

    pub fn adapter_settings(&self) -> &TransportSettings {
        &self.adapter_settings
    }
}

/// Fully resolved settings for one call.
#[derive(Debug, Clone, PartialEq)]
pub struct CallSettings {
    pub method: Method,
    pub url: String,
    pub data_type: DataType,
    pub content_type: Option<String>,
    pub timeout: Option<Duration>,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
}

const JSON_CONTENT_TYPE: &str = "application/json";

/// Resolve the settings for one call.
///
/// `defaults` must be a snapshot taken when the call is issued. Saves are
/// forced to a JSON POST carrying the encoded payload; metadata and query
/// are forced to GET.
pub fn resolve_call_settings(
    defaults: &TransportSettings,
    request: &SendRequest,
) -> Result<CallSettings, serde_json::Error> {
    let layered = builtin_defaults()
        .overlay(defaults)
        .overlay(request.adapter_settings());

    let timeout = layered.timeout_ms.map(Duration::from_millis);

    match request.operation() {
        Operation::SaveChanges => {
            let body = match request.payload() {
                Some(payload) => serde_json::to_string(payload)?,
                None => "{}".to_string(),
            };
            Ok(CallSettings {
                method: Method::Post,
                url: request.url().to_string(),
                data_type: DataType::Json,
                content_type: Some(JSON_CONTENT_TYPE.to_string()),
                timeout,
                headers: layered.headers,
                body: Some(body),
            })
        }
        Operation::Metadata | Operation::Query => Ok(CallSettings {
            method: Method::Get,
            url: request.url().to_string(),
            data_type: layered.data_type.unwrap_or_default(),
            content_type: layered.content_type,
            timeout,
            headers: layered.headers,
            body: None,
        }),
    }
}

fn builtin_defaults() -> TransportSettings {
    TransportSettings {
        data_type: Some(DataType::Json),
        ..TransportSettings::default()
    }
}
