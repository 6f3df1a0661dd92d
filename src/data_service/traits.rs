//! DataServiceAdapter trait: the contract data-service adapters implement
//!
//! A data-service adapter translates domain operations (metadata, query,
//! save) into transport sends and interprets the envelopes that come back.

use super::metadata::MetadataStore;
use super::results::{MetadataFetchResult, QueryResult, SaveResult};
use crate::error::NormalizedError;
use crate::registry::{AdapterRegistry, RecompositionEvent, RegistryError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A remote data service, identified by its base URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataService {
    /// Base URL, usually ending in `/`.
    pub service_name: String,
}

impl DataService {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
        }
    }
}

/// The contract data-service adapters implement.
///
/// All three operations send through the bound transport adapter and
/// report every failure as a `NormalizedError` prefixed with the
/// operation's name.
#[async_trait]
pub trait DataServiceAdapter: Send + Sync {
    /// Registered name of this implementation.
    fn name(&self) -> &str;

    /// Bind collaborators from the registry. Called once after construction.
    fn initialize(&self, _registry: &AdapterRegistry) -> Result<(), RegistryError> {
        Ok(())
    }

    /// React to a different adapter becoming default for some kind.
    fn check_for_recomposition(&self, _event: &RecompositionEvent, _registry: &AdapterRegistry) {}

    /// Fetch and import the service's metadata into `store`.
    ///
    /// Resolves to `AlreadyFetched` when the store already knows the
    /// service by the time the response arrives.
    async fn fetch_metadata(
        &self,
        store: &dyn MetadataStore,
        service: &DataService,
    ) -> Result<MetadataFetchResult, NormalizedError>;

    /// Run a query. `query` is appended to the service URL verbatim.
    async fn execute_query(&self, service: &DataService, query: &str) -> Result<QueryResult, NormalizedError>;

    /// Post a save bundle to `resource_name` (default `SaveChanges`).
    async fn save_changes(
        &self,
        service: &DataService,
        resource_name: Option<&str>,
        payload: Value,
    ) -> Result<SaveResult, NormalizedError>;
}
