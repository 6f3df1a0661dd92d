//! Dataport: Pluggable Data-Access Adapters
//!
//! A client-side data-access layer that talks to a remote data service
//! through two kinds of pluggable adapters.
//!
//! # Core Concepts
//!
//! - **Transport adapters** (`http` kind): issue one network call per send and
//!   hand back a uniform [`ResponseEnvelope`] with lazily parsed headers and
//!   a per-call abort handle.
//! - **Data-service adapters** (`dataService` kind): fetch metadata, run
//!   queries, and post saves through the bound transport adapter.
//! - **Registry**: named adapters per kind, one instance per name, and a
//!   default per kind whose rebinding fires a recomposition event.
//!
//! Every failure is reported as one [`NormalizedError`].
//!
//! # Example
//!
//! ```
//! use dataport::{AdapterKind, AdapterRegistry};
//!
//! let registry = AdapterRegistry::standard();
//! assert_eq!(registry.default_name(AdapterKind::DataService).as_deref(), Some("webApi"));
//! ```

pub mod config;
pub mod data_service;
mod error;
pub mod http;
pub mod registry;

pub use config::{AdapterConfig, ConfigError};
pub use data_service::{
    DataService, DataServiceAdapter, InMemoryMetadataStore, MetadataFetchResult, MetadataStore, QueryResult,
    SaveResult, WebApiDataService,
};
pub use error::{ErrorKind, NormalizedError};
pub use http::{
    AbortHandle, AdapterExports, HttpAdapter, InFlight, ResponseBody, ResponseEnvelope, SendRequest,
    TransportAdapter, TransportSettings,
};
pub use registry::{AdapterKind, AdapterRegistry, RecompositionEvent, RegistryError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
