//! Builder for ergonomic construction of Query Agent clients.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::client::{HttpTransport, QueryAgent, Transport, TransportConfig, DEFAULT_LIMIT};
use crate::connection::{auth_headers, ClusterConnection};
use crate::error::Result;
use crate::types::{validate_collection_name, CollectionTarget};

/// Builder for constructing a [`QueryAgent`] with custom configuration.
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use weaviate_agents::builders::QueryAgentBuilder;
/// use weaviate_agents::connection::ClusterCredentials;
///
/// # fn example() -> Result<(), weaviate_agents::AgentError> {
/// let creds = ClusterCredentials::new("https://my-cluster.weaviate.cloud").with_api_key("key");
/// let agent = QueryAgentBuilder::new(&creds)
///     .with_collections(["Orders", "Customers"])
///     .with_system_prompt("Answer in one sentence.")
///     .with_idle_timeout(Duration::from_secs(30))
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct QueryAgentBuilder {
    auth_headers: HashMap<String, String>,
    forwarded_headers: HashMap<String, String>,
    config: TransportConfig,
    transport: Option<Arc<dyn Transport>>,
    collections: Vec<CollectionTarget>,
    system_prompt: Option<String>,
    limit: u32,
}

impl std::fmt::Debug for QueryAgentBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryAgentBuilder")
            .field("config", &self.config)
            .field("collections", &self.collections)
            .field("system_prompt", &self.system_prompt)
            .field("limit", &self.limit)
            .finish_non_exhaustive()
    }
}

impl QueryAgentBuilder {
    /// Create a builder for the given cluster.
    ///
    /// Credentials and forwarded headers are read from `connection` once.
    pub fn new(connection: &dyn ClusterConnection) -> Self {
        Self {
            auth_headers: auth_headers(connection),
            forwarded_headers: connection.additional_headers(),
            config: TransportConfig::default(),
            transport: None,
            collections: Vec::new(),
            system_prompt: None,
            limit: DEFAULT_LIMIT,
        }
    }

    /// Create a builder around a custom transport.
    ///
    /// The transport is responsible for authentication; timeouts other than
    /// the idle timeout are its concern too.
    pub fn from_transport(transport: Arc<dyn Transport>) -> Self {
        Self {
            auth_headers: HashMap::new(),
            forwarded_headers: HashMap::new(),
            config: TransportConfig::default(),
            transport: Some(transport),
            collections: Vec::new(),
            system_prompt: None,
            limit: DEFAULT_LIMIT,
        }
    }

    /// Use a custom transport instead of [`HttpTransport`].
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Set the agents service host.
    pub fn with_agents_host(mut self, host: impl Into<String>) -> Self {
        self.config.agents_host = host.into();
        self
    }

    /// Add a default target collection.
    pub fn with_collection(mut self, collection: impl Into<CollectionTarget>) -> Self {
        self.collections.push(collection.into());
        self
    }

    /// Add several default target collections.
    pub fn with_collections<I, C>(mut self, collections: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<CollectionTarget>,
    {
        self.collections
            .extend(collections.into_iter().map(Into::into));
        self
    }

    /// Set the default system prompt.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Set the connection establishment timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set the unary request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Set the maximum silence between chunks of an event stream.
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_timeout = timeout;
        self
    }

    /// Add a custom HTTP header.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.headers.insert(key.into(), value.into());
        self
    }

    /// Set the default per-search object limit.
    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    /// Build the async client.
    pub fn build(self) -> Result<QueryAgent> {
        let mut collections: Vec<CollectionTarget> = Vec::with_capacity(self.collections.len());
        for collection in self.collections {
            validate_collection_name(&collection.name)?;
            if !collections.iter().any(|c| c.name == collection.name) {
                collections.push(collection);
            }
        }

        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::with_headers(
                self.auth_headers,
                self.config.clone(),
            )?),
        };

        Ok(QueryAgent::from_parts(
            transport,
            collections,
            self.system_prompt,
            self.forwarded_headers,
            self.limit,
            self.config.idle_timeout,
        ))
    }

    /// Build the blocking client.
    #[cfg(feature = "blocking")]
    pub fn build_blocking(self) -> Result<crate::client::BlockingQueryAgent> {
        crate::client::BlockingQueryAgent::from_async(self.build()?)
    }
}
