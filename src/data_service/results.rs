//! Domain-shaped results of data-service operations

use crate::http::AdapterExports;
use serde_json::Value;
use std::fmt;

/// Outcome of a metadata fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataFetchResult {
    /// Another fetch imported this service's metadata first.
    AlreadyFetched,
    /// The payload that was imported.
    Fetched(Value),
}

impl MetadataFetchResult {
    pub fn is_already_fetched(&self) -> bool {
        matches!(self, Self::AlreadyFetched)
    }
}

impl fmt::Display for MetadataFetchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyFetched => f.write_str("already fetched"),
            Self::Fetched(metadata) => write!(f, "{}", metadata),
        }
    }
}

/// A query result set.
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub results: Value,
    /// Total matching rows, when the server reports it.
    pub inline_count: Option<u64>,
    pub adapter_exports: AdapterExports,
}

/// A successful save: the server's payload plus transport exports.
#[derive(Debug, Clone)]
pub struct SaveResult {
    pub body: Value,
    pub adapter_exports: AdapterExports,
}

/// What a save response body says.
#[derive(Debug, PartialEq)]
pub(crate) enum SaveResponse<'a> {
    /// The server flagged an application-level failure.
    ServerError(String),
    Saved(&'a Value),
}

impl<'a> SaveResponse<'a> {
    pub(crate) fn decode(body: &'a Value) -> Self {
        let flagged = ["Error", "error"]
            .iter()
            .find_map(|field| body.get(field).filter(|v| is_truthy(v)));

        match flagged {
            Some(Value::String(message)) => Self::ServerError(message.clone()),
            Some(other) => Self::ServerError(other.to_string()),
            None => Self::Saved(body),
        }
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

/// Read an inline-count header value as a base-10 integer.
///
/// Leading digits are taken, as a lenient integer parse would; a value
/// with no leading digits yields `None`.
pub(crate) fn parse_inline_count(raw: &str) -> Option<u64> {
    let trimmed = raw.trim_start();
    let trimmed = trimmed.strip_prefix('+').unwrap_or(trimmed);
    let end = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    trimmed[..end].parse().ok()
}
