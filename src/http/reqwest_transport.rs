//! `RawTransport` over reqwest
//!
//! The client is built lazily on first use and reused for every call.

use super::request::Method;
use super::transport::{RawRequest, RawResponse, RawTransport, TransportError};
use async_trait::async_trait;
use tokio::sync::OnceCell;

/// Production transport backed by a shared `reqwest::Client`.
#[derive(Debug, Default)]
pub struct ReqwestTransport {
    client: OnceCell<reqwest::Client>,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an existing client instead of building one.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client: OnceCell::new_with(Some(client)),
        }
    }

    async fn client(&self) -> Result<&reqwest::Client, TransportError> {
        self.client
            .get_or_try_init(|| async {
                reqwest::Client::builder()
                    .build()
                    .map_err(|e| TransportError::Network(e.to_string()))
            })
            .await
    }
}

#[async_trait]
impl RawTransport for ReqwestTransport {
    async fn issue(&self, request: &RawRequest) -> Result<RawResponse, TransportError> {
        let client = self.client().await?;

        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
        };
        let mut builder = client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await.map_err(classify)?;

        let status = response.status();
        let raw_headers = render_headers(response.headers());
        let body = response.text().await.map_err(classify)?;

        Ok(RawResponse {
            status_code: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            raw_headers,
            body,
        })
    }
}

fn classify(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(err.to_string())
    } else if err.is_builder() {
        TransportError::InvalidRequest(err.to_string())
    } else {
        TransportError::Network(err.to_string())
    }
}

/// Render a header map as a `name: value` block, one pair per line.
fn render_headers(headers: &reqwest::header::HeaderMap) -> String {
    let mut raw = String::new();
    for (name, value) in headers {
        raw.push_str(name.as_str());
        raw.push_str(": ");
        raw.push_str(&String::from_utf8_lossy(value.as_bytes()));
        raw.push('\n');
    }
    raw
}
