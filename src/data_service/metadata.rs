//! Metadata endpoint derivation, payload shapes, and the store seam
//!
//! The metadata store belongs to the entity framework; this module only
//! defines the operations an adapter needs from it.

use super::traits::DataService;
use dashmap::{DashMap, DashSet};
use serde_json::Value;
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

const METADATA_SUFFIX: &str = "/Metadata";

/// Metadata endpoint for a service URL.
///
/// Strips one trailing `/`, then appends `/Metadata` unless already present.
pub fn metadata_url(service_name: &str) -> String {
    let base = service_name.strip_suffix('/').unwrap_or(service_name);
    if base.ends_with(METADATA_SUFFIX) {
        base.to_string()
    } else {
        format!("{}{}", base, METADATA_SUFFIX)
    }
}

/// The metadata formats a server may return.
#[derive(Debug, PartialEq)]
pub enum MetadataPayload<'a> {
    /// Native format: carries a structural type map.
    Native(&'a Value),
    /// Legacy CSDL-as-JSON: carries a `schema` field.
    LegacySchema(&'a Value),
    Unrecognized,
}

impl<'a> MetadataPayload<'a> {
    /// Try each known shape in priority order.
    pub fn decode(payload: &'a Value) -> Self {
        if is_present(payload.get("structuralTypeMap")) {
            Self::Native(payload)
        } else if let Some(schema) = payload.get("schema").filter(|s| is_present(Some(*s))) {
            Self::LegacySchema(schema)
        } else {
            Self::Unrecognized
        }
    }
}

fn is_present(value: Option<&Value>) -> bool {
    !matches!(value, None | Some(Value::Null) | Some(Value::Bool(false)))
}

/// Errors a metadata store raises while importing.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("invalid metadata: {0}")]
    Invalid(String),
    #[error("metadata import failed: {0}")]
    Import(String),
}

/// The metadata store operations an adapter relies on.
pub trait MetadataStore: Send + Sync {
    /// True once metadata for `service_name` has been imported.
    fn has_metadata_for(&self, service_name: &str) -> bool;

    /// Import a native-format payload.
    fn import_metadata(&self, metadata: &Value) -> Result<(), MetadataError>;

    /// Import a legacy schema for `service_name`.
    fn import_legacy_schema(&self, service_name: &str, schema: &Value) -> Result<(), MetadataError>;

    /// Record `service` as a known metadata source.
    fn add_data_service(&self, service: &DataService);
}

/// A `MetadataStore` that keeps imports in memory.
///
/// Native payloads that list `dataServices` register those services on
/// import, the way a full metadata document does.
#[derive(Debug, Default)]
pub struct InMemoryMetadataStore {
    services: DashSet<String>,
    native: Mutex<Vec<Value>>,
    schemas: DashMap<String, Value>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of imports performed, either format.
    pub fn import_count(&self) -> usize {
        self.native.lock().unwrap_or_else(PoisonError::into_inner).len() + self.schemas.len()
    }

    pub fn schema_for(&self, service_name: &str) -> Option<Value> {
        self.schemas.get(service_name).map(|r| r.clone())
    }

    pub fn services(&self) -> Vec<String> {
        let mut names: Vec<String> = self.services.iter().map(|s| s.key().clone()).collect();
        names.sort();
        names
    }
}

impl MetadataStore for InMemoryMetadataStore {
    fn has_metadata_for(&self, service_name: &str) -> bool {
        self.services.contains(service_name)
    }

    fn import_metadata(&self, metadata: &Value) -> Result<(), MetadataError> {
        if !metadata.is_object() {
            return Err(MetadataError::Invalid("expected a JSON object".to_string()));
        }
        if let Some(services) = metadata.get("dataServices").and_then(Value::as_array) {
            for name in services.iter().filter_map(|s| s.get("serviceName").and_then(Value::as_str)) {
                self.services.insert(name.to_string());
            }
        }
        self.native
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(metadata.clone());
        Ok(())
    }

    fn import_legacy_schema(&self, service_name: &str, schema: &Value) -> Result<(), MetadataError> {
        self.schemas.insert(service_name.to_string(), schema.clone());
        Ok(())
    }

    fn add_data_service(&self, service: &DataService) {
        self.services.insert(service.service_name.clone());
    }
}
