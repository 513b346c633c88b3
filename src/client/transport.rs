//! Transport layer for the agents service.
//!
//! Provides the [`Transport`] trait so the client can be driven by any HTTP
//! stack (or a scripted one in tests), and [`HttpTransport`], the standard
//! `reqwest` implementation.

use std::collections::HashMap;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{Stream, StreamExt};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use crate::connection::{auth_headers, ClusterConnection};
use crate::error::{AgentError, Result};

/// Endpoint paths, relative to `{agents_host}/agent`.
pub mod endpoints {
    /// Streaming ask / search (`mode` selects which).
    pub const STREAM_ASK: &str = "/stream_ask";
    /// Non-streaming ask.
    pub const ASK: &str = "/ask";
    /// Non-streaming, paginated search.
    pub const SEARCH_ONLY: &str = "/search_only";
}

/// Default agents service host.
pub const DEFAULT_AGENTS_HOST: &str = "https://api.agents.weaviate.io";

/// Raw response body chunks, as delivered by the network.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>>> + Send>>;

/// One request to the agents service.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentRequest {
    /// Endpoint path, e.g. [`endpoints::STREAM_ASK`].
    pub path: &'static str,
    /// JSON body.
    pub body: serde_json::Value,
}

/// Transport abstraction for the agents service.
///
/// Implementations perform exactly one HTTP exchange per call and never
/// retry. Non-2xx responses must be mapped with [`AgentError::from_status`].
#[async_trait]
pub trait Transport: Send + Sync {
    /// POST a request and parse the JSON response body.
    async fn send(&self, request: &AgentRequest) -> Result<serde_json::Value>;

    /// POST a request and return the raw `text/event-stream` body.
    ///
    /// Dropping the returned stream must release the connection.
    async fn send_stream(&self, request: &AgentRequest) -> Result<ByteStream>;
}

/// Configuration for [`HttpTransport`] and the streams it opens.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Base URL of the agents service.
    pub agents_host: String,
    /// Connection establishment timeout. Defaults to 10 seconds.
    pub connect_timeout: Duration,
    /// Whole-request timeout for unary calls, and the wait for response
    /// headers on streaming calls. Defaults to 60 seconds.
    pub request_timeout: Duration,
    /// Maximum silence between two chunks of an event stream. Defaults to 60 seconds.
    pub idle_timeout: Duration,
    /// Additional HTTP headers to include on every request.
    pub headers: HashMap<String, String>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            agents_host: DEFAULT_AGENTS_HOST.to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(60),
            idle_timeout: Duration::from_secs(60),
            headers: HashMap::new(),
        }
    }
}

/// `reqwest`-backed transport.
///
/// Authentication headers are taken from the [`ClusterConnection`] once, at
/// construction, and sent on every request.
///
/// # Example
///
/// ```no_run
/// use weaviate_agents::client::{HttpTransport, TransportConfig};
/// use weaviate_agents::connection::ClusterCredentials;
///
/// let creds = ClusterCredentials::new("https://my-cluster.weaviate.cloud").with_api_key("key");
/// let transport = HttpTransport::new(&creds, TransportConfig::default()).unwrap();
/// assert_eq!(transport.base_url(), "https://api.agents.weaviate.io/agent");
/// ```
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    request_timeout: Duration,
}

impl HttpTransport {
    /// Create a transport for the given cluster.
    pub fn new(connection: &dyn ClusterConnection, config: TransportConfig) -> Result<Self> {
        Self::with_headers(auth_headers(connection), config)
    }

    /// Create a transport sending `headers` (plus `config.headers`) on every request.
    pub fn with_headers(
        mut headers: HashMap<String, String>,
        config: TransportConfig,
    ) -> Result<Self> {
        headers.extend(config.headers.clone());

        let mut default_headers = HeaderMap::new();
        for (key, value) in &headers {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| AgentError::request(format!("invalid header name '{key}': {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| AgentError::request(format!("invalid value for header '{key}': {e}")))?;
            default_headers.insert(name, value);
        }

        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .default_headers(default_headers)
            .build()
            .map_err(|e| AgentError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self::with_client(&config, client))
    }

    /// Create a transport around an existing `reqwest::Client`.
    ///
    /// The client is used as-is: auth headers and the connect timeout must
    /// already be configured on it.
    pub fn with_client(config: &TransportConfig, client: reqwest::Client) -> Self {
        Self {
            client,
            base_url: format!("{}/agent", config.agents_host.trim_end_matches('/')),
            request_timeout: config.request_timeout,
        }
    }

    /// Returns the URL prefix every endpoint path is appended to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, request: &AgentRequest) -> String {
        format!("{}{}", self.base_url, request.path)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &AgentRequest) -> Result<serde_json::Value> {
        tracing::debug!(path = request.path, "sending unary request");

        let response = self
            .client
            .post(self.url(request))
            .timeout(self.request_timeout)
            .json(&request.body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(AgentError::from_status(status.as_u16(), body_text));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AgentError::Transport(format!("failed to read response body: {e}")))?;

        serde_json::from_slice(&bytes).map_err(|e| AgentError::Protocol {
            message: format!("failed to parse response body: {e}"),
            raw: Some(String::from_utf8_lossy(&bytes).into_owned()),
        })
    }

    async fn send_stream(&self, request: &AgentRequest) -> Result<ByteStream> {
        tracing::debug!(path = request.path, "opening event stream");

        let pending = self
            .client
            .post(self.url(request))
            .header("Accept", "text/event-stream")
            .json(&request.body)
            .send();

        let response = tokio::time::timeout(self.request_timeout, pending)
            .await
            .map_err(|_| {
                AgentError::Timeout(format!(
                    "no response headers within {:?}",
                    self.request_timeout
                ))
            })??;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(AgentError::from_status(status.as_u16(), body_text));
        }

        let bytes = response.bytes_stream().map(|chunk| {
            chunk
                .map(|b| b.to_vec())
                .map_err(|e| AgentError::Transport(format!("error reading event stream: {e}")))
        });
        Ok(Box::pin(bytes))
    }
}
