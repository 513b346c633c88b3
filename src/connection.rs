//! Cluster connection details supplied by the database client.
//!
//! The agents service authenticates each request against a Weaviate Cloud
//! cluster. Whatever owns that connection (usually a database client)
//! implements [`ClusterConnection`]; [`ClusterCredentials`] is a plain
//! implementation for callers that only have a URL and an API key.

use std::collections::HashMap;

/// Header carrying the cluster URL.
pub const CLUSTER_URL_HEADER: &str = "X-Weaviate-Cluster-Url";

/// Header identifying the calling client library.
pub const REQUEST_ORIGIN_HEADER: &str = "X-Agent-Request-Origin";

/// Value sent in [`REQUEST_ORIGIN_HEADER`].
pub const REQUEST_ORIGIN: &str = "rust-client";

/// Source of cluster identity and credentials.
pub trait ClusterConnection: Send + Sync {
    /// URL of the cluster the agent operates on.
    fn cluster_url(&self) -> &str;

    /// Current bearer token, without the `Bearer ` prefix.
    fn bearer_token(&self) -> Option<String>;

    /// Extra headers the cluster needs (e.g. vectorizer API keys).
    ///
    /// These are forwarded inside the request body, not as HTTP headers.
    fn additional_headers(&self) -> HashMap<String, String> {
        HashMap::new()
    }
}

/// Static credentials for a cluster.
///
/// # Example
///
/// ```
/// use weaviate_agents::connection::{ClusterConnection, ClusterCredentials};
///
/// let creds = ClusterCredentials::new("https://my-cluster.weaviate.cloud:443")
///     .with_api_key("secret")
///     .with_header("X-OpenAI-Api-Key", "sk-...");
/// assert_eq!(creds.bearer_token().as_deref(), Some("secret"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct ClusterCredentials {
    cluster_url: String,
    api_key: Option<String>,
    headers: HashMap<String, String>,
}

impl ClusterCredentials {
    /// Credentials for the given cluster URL, with no API key.
    pub fn new(cluster_url: impl Into<String>) -> Self {
        Self {
            cluster_url: cluster_url.into(),
            api_key: None,
            headers: HashMap::new(),
        }
    }

    /// Set the API key sent as the bearer token.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Add a header forwarded to the cluster.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }
}

impl ClusterConnection for ClusterCredentials {
    fn cluster_url(&self) -> &str {
        &self.cluster_url
    }

    fn bearer_token(&self) -> Option<String> {
        self.api_key.clone()
    }

    fn additional_headers(&self) -> HashMap<String, String> {
        self.headers.clone()
    }
}

/// Cluster URL as the agents service expects it (explicit `:443` removed).
pub(crate) fn normalize_cluster_url(url: &str) -> String {
    url.replace(":443", "").trim_end_matches('/').to_string()
}

/// HTTP headers identifying the cluster and caller on every request.
pub(crate) fn auth_headers(connection: &dyn ClusterConnection) -> HashMap<String, String> {
    let mut headers = HashMap::new();
    if let Some(token) = connection.bearer_token() {
        headers.insert("Authorization".to_string(), format!("Bearer {token}"));
    }
    headers.insert(
        CLUSTER_URL_HEADER.to_string(),
        normalize_cluster_url(connection.cluster_url()),
    );
    headers.insert(REQUEST_ORIGIN_HEADER.to_string(), REQUEST_ORIGIN.to_string());
    headers
}
