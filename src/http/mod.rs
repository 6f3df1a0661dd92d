//! Transport layer: the `http` adapter kind
//!
//! A transport adapter issues one network call per send and hands back a
//! uniform `ResponseEnvelope`, or a `NormalizedError` on failure.

mod abort;
mod adapter;
pub mod envelope;
pub mod headers;
mod mock;
pub mod request;
#[cfg(feature = "reqwest-transport")]
mod reqwest_transport;
mod transport;

pub use abort::AbortHandle;
pub use adapter::{HttpAdapter, InFlight, TransportAdapter};
pub use envelope::{build_envelope, AdapterExports, RequestInfo, ResponseBody, ResponseEnvelope, TransportHandle};
pub use headers::{parse_headers, HeaderLookup, ParsedHeaders};
pub use mock::MockTransport;
pub use request::{resolve_call_settings, CallSettings, DataType, Method, Operation, SendRequest, TransportSettings};
#[cfg(feature = "reqwest-transport")]
pub use reqwest_transport::ReqwestTransport;
pub use transport::{RawRequest, RawResponse, RawTransport, TransportError};
