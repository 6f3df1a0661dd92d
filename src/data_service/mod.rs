//! Data-service layer: the `dataService` adapter kind
//!
//! A data-service adapter turns metadata fetches, queries, and saves into
//! transport sends, and interprets what comes back into domain results.

mod metadata;
mod results;
mod traits;
mod web_api;

pub use metadata::{metadata_url, InMemoryMetadataStore, MetadataError, MetadataPayload, MetadataStore};
pub use results::{MetadataFetchResult, QueryResult, SaveResult};
pub use traits::{DataService, DataServiceAdapter};
pub use web_api::{WebApiDataService, DEFAULT_SAVE_RESOURCE, INLINE_COUNT_HEADER};
