//! Authorized-fetch capability and its reqwest implementation

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::Client;
use tracing::{debug, instrument};
use url::Url;

use crate::error::{MonitorError, Result};

/// Body of a monitor response, chunk by chunk in transport order
pub type ChunkStream = BoxStream<'static, Result<Bytes>>;

/// Performs an authenticated request against the monitor endpoint
///
/// Implementations hold no per-controller state; one instance is shared by
/// every controller through an `Arc`. Credentials are the implementation's
/// concern, never the controller's.
#[async_trait]
pub trait AuthorizedFetch: Send + Sync {
    /// Open `path?query` and return its body as a chunk stream
    ///
    /// Streaming callers read the stream until they stop; paged callers
    /// read it to the end.
    async fn request(&self, path: &str, query: &[(String, String)]) -> Result<ChunkStream>;
}

/// Default connection timeout
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// reqwest-backed [`AuthorizedFetch`]
///
/// No overall request timeout is set, because a log stream stays open for
/// as long as the monitor runs. Only connecting is bounded.
#[derive(Debug, Clone)]
pub struct HttpFetch {
    client: Client,
    base_url: Url,
}

impl HttpFetch {
    /// Create an unauthenticated fetcher
    ///
    /// # Arguments
    /// * `base_url` - Base URL of the agent HTTP API (e.g., "http://localhost:4646")
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_config(base_url, DEFAULT_CONNECT_TIMEOUT, HeaderMap::new())
    }

    /// Create a fetcher that sends `Authorization: Bearer <token>` with every request
    pub fn with_bearer_token(base_url: &str, token: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let value = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|e| MonitorError::protocol(format!("Invalid auth token: {}", e)))?;
        headers.insert(AUTHORIZATION, value);
        Self::with_config(base_url, DEFAULT_CONNECT_TIMEOUT, headers)
    }

    /// Create a fetcher that sends the token in a custom header (e.g. `X-Nomad-Token`)
    pub fn with_token_header(base_url: &str, header: &str, token: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let name = HeaderName::from_bytes(header.as_bytes())
            .map_err(|e| MonitorError::protocol(format!("Invalid header name: {}", e)))?;
        let value = HeaderValue::from_str(token)
            .map_err(|e| MonitorError::protocol(format!("Invalid auth token: {}", e)))?;
        headers.insert(name, value);
        Self::with_config(base_url, DEFAULT_CONNECT_TIMEOUT, headers)
    }

    /// Create a fetcher with custom connect timeout and default headers
    pub fn with_config(
        base_url: &str,
        connect_timeout: Duration,
        headers: HeaderMap,
    ) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .default_headers(headers)
            .build()?;

        let base_url = Url::parse(base_url)?;

        Ok(Self { client, base_url })
    }

    /// Full URL for a path and query, as it will be requested
    pub fn url_for(&self, path: &str, query: &[(String, String)]) -> Result<Url> {
        let mut url = self.base_url.join(path)?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }
}

#[async_trait]
impl AuthorizedFetch for HttpFetch {
    #[instrument(skip(self, query))]
    async fn request(&self, path: &str, query: &[(String, String)]) -> Result<ChunkStream> {
        let url = self.url_for(path, query)?;
        debug!("Requesting {}", url);

        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(MonitorError::from_status(status, message.trim()));
        }

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(MonitorError::from))
            .boxed())
    }
}
