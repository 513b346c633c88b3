//! The async Query Agent client.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::builders::QueryAgentBuilder;
use crate::connection::ClusterConnection;
use crate::error::{AgentError, Result};
use crate::types::{
    AgentResult, CollectionTarget, ExchangeState, FinalState, QueryMode, QueryPayload,
    QueryRequest, QuerySearch, SearchPagePayload,
};

use super::stream::EventStream;
use super::transport::{endpoints, AgentRequest, Transport};

/// Default number of objects retrieved per search.
pub const DEFAULT_LIMIT: u32 = 20;

/// Client for the Weaviate Query Agent.
///
/// Every call performs exactly one remote exchange with its own connection
/// and decoder state, so one client can serve concurrent calls.
///
/// # Example
///
/// ```no_run
/// use weaviate_agents::prelude::*;
///
/// # async fn example() -> Result<(), AgentError> {
/// let creds = ClusterCredentials::new("https://my-cluster.weaviate.cloud").with_api_key("key");
/// let agent = QueryAgent::builder(&creds)
///     .with_collection("Orders")
///     .build()?;
///
/// let result = agent.ask("How many orders exceeded $100 last month?").await?;
/// println!("{result}");
///
/// let mut events = agent.ask_stream("Which customers ordered twice?").await?;
/// while let Some(event) = events.next().await {
///     if let StreamEvent::Progress(tokens) = event? {
///         print!("{}", tokens.delta);
///     }
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct QueryAgent {
    transport: Arc<dyn Transport>,
    collections: Vec<CollectionTarget>,
    system_prompt: Option<String>,
    forwarded_headers: HashMap<String, String>,
    limit: u32,
    idle_timeout: Duration,
}

impl std::fmt::Debug for QueryAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryAgent")
            .field("collections", &self.collections)
            .field("system_prompt", &self.system_prompt)
            .field("limit", &self.limit)
            .field("idle_timeout", &self.idle_timeout)
            .finish_non_exhaustive()
    }
}

impl QueryAgent {
    /// Create a client for the given cluster with default settings.
    pub fn new(connection: &dyn ClusterConnection) -> Result<Self> {
        QueryAgentBuilder::new(connection).build()
    }

    /// Start configuring a client for the given cluster.
    pub fn builder(connection: &dyn ClusterConnection) -> QueryAgentBuilder {
        QueryAgentBuilder::new(connection)
    }

    pub(crate) fn from_parts(
        transport: Arc<dyn Transport>,
        collections: Vec<CollectionTarget>,
        system_prompt: Option<String>,
        forwarded_headers: HashMap<String, String>,
        limit: u32,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            collections,
            system_prompt,
            forwarded_headers,
            limit,
            idle_timeout,
        }
    }

    // ──────────────────────────────────────────────────
    // Collections
    // ──────────────────────────────────────────────────

    /// Default target collections.
    pub fn collections(&self) -> &[CollectionTarget] {
        &self.collections
    }

    /// Add a default collection. Ignored if one with the same name exists.
    pub fn add_collection(&mut self, collection: impl Into<CollectionTarget>) {
        let collection = collection.into();
        if !self.collections.iter().any(|c| c.name == collection.name) {
            self.collections.push(collection);
        }
    }

    /// Remove a default collection by name. Missing names are ignored.
    pub fn remove_collection(&mut self, name: &str) {
        self.collections.retain(|c| c.name != name);
    }

    /// Default per-search object limit.
    pub fn limit(&self) -> u32 {
        self.limit
    }

    // ──────────────────────────────────────────────────
    // Operations
    // ──────────────────────────────────────────────────

    /// Ask a question and wait for the complete answer.
    ///
    /// # Errors
    ///
    /// - [`AgentError::Request`] for invalid input, before any network call
    /// - transport errors ([`AgentError::Transport`], [`AgentError::Timeout`],
    ///   [`AgentError::Http`])
    /// - [`AgentError::Protocol`] if the stream ends without a final event
    /// - [`AgentError::Remote`] if the service reports a failure
    pub async fn ask(&self, request: impl Into<QueryRequest>) -> Result<AgentResult> {
        self.ask_stream(request).await?.collect_result().await
    }

    /// Ask a question and receive events as they are decoded.
    pub async fn ask_stream(&self, request: impl Into<QueryRequest>) -> Result<EventStream> {
        self.open_stream(&request.into(), QueryMode::Ask).await
    }

    /// Run only the searches for a question; the result carries no answer.
    pub async fn search(&self, request: impl Into<QueryRequest>) -> Result<AgentResult> {
        self.open_stream(&request.into(), QueryMode::Search)
            .await?
            .collect_result()
            .await
    }

    /// Ask a question using the non-streaming endpoint.
    pub async fn ask_unary(&self, request: impl Into<QueryRequest>) -> Result<AgentResult> {
        let body = self.build_body(&request.into(), QueryMode::Ask)?;
        let state = self.send_unary(endpoints::ASK, body).await?;
        Ok(AgentResult::from_final(
            QueryMode::Ask,
            state,
            String::new(),
            Vec::new(),
        ))
    }

    /// Fetch one page of search results.
    ///
    /// Pass the previous page as `previous` to re-run the same underlying
    /// searches, so that pages stay consistent with each other.
    pub async fn search_page(
        &self,
        request: impl Into<QueryRequest>,
        previous: Option<&AgentResult>,
        limit: u32,
        offset: u32,
    ) -> Result<AgentResult> {
        let searches = previous
            .map(|p| p.searches.as_slice())
            .filter(|s| !s.is_empty());
        let body = self.build_page_body(&request.into(), limit, offset, searches)?;
        let state = self.send_unary(endpoints::SEARCH_ONLY, body).await?;
        Ok(AgentResult::from_final(
            QueryMode::Search,
            state,
            String::new(),
            Vec::new(),
        ))
    }

    // ──────────────────────────────────────────────────
    // Internals
    // ──────────────────────────────────────────────────

    fn build_body(&self, request: &QueryRequest, mode: QueryMode) -> Result<serde_json::Value> {
        tracing::debug!(state = %ExchangeState::Building, %mode, "building request");
        let collections = request.resolve(&self.collections)?;

        let payload = QueryPayload {
            query: request.wire_query(),
            collections: &collections,
            headers: &self.forwarded_headers,
            limit: request.limit.unwrap_or(self.limit),
            mode,
            system_prompt: self.system_prompt_for(request),
        };
        to_body(&payload)
    }

    fn build_page_body(
        &self,
        request: &QueryRequest,
        limit: u32,
        offset: u32,
        searches: Option<&[QuerySearch]>,
    ) -> Result<serde_json::Value> {
        tracing::debug!(
            state = %ExchangeState::Building,
            offset,
            rerun = searches.is_some(),
            "building search page request"
        );
        let collections = request.resolve(&self.collections)?;

        let payload = SearchPagePayload {
            original_query: request.wire_query(),
            collections: &collections,
            headers: &self.forwarded_headers,
            limit,
            offset,
            // Re-running known searches generates nothing.
            system_prompt: match searches {
                Some(_) => None,
                None => self.system_prompt_for(request),
            },
            searches,
        };
        to_body(&payload)
    }

    fn system_prompt_for<'a>(&'a self, request: &'a QueryRequest) -> Option<&'a str> {
        request
            .system_prompt
            .as_deref()
            .or(self.system_prompt.as_deref())
    }

    async fn open_stream(&self, request: &QueryRequest, mode: QueryMode) -> Result<EventStream> {
        let body = self.build_body(request, mode)?;
        let request = AgentRequest {
            path: endpoints::STREAM_ASK,
            body,
        };

        tracing::debug!(state = %ExchangeState::Sent, %mode, "request sent");
        let bytes = self.transport.send_stream(&request).await.map_err(|e| {
            tracing::warn!(state = %ExchangeState::Failed, error = %e, "stream request failed");
            e
        })?;

        tracing::debug!(state = %ExchangeState::Streaming, %mode, "receiving events");
        Ok(EventStream::new(bytes, mode, self.idle_timeout))
    }

    async fn send_unary(&self, path: &'static str, body: serde_json::Value) -> Result<FinalState> {
        let request = AgentRequest { path, body };
        tracing::debug!(state = %ExchangeState::Sent, path, "request sent");

        let value = self.transport.send(&request).await.map_err(|e| {
            tracing::warn!(state = %ExchangeState::Failed, error = %e, "request failed");
            e
        })?;

        let raw = value.to_string();
        let state = serde_json::from_value(value).map_err(|e| AgentError::Protocol {
            message: format!("malformed response body: {e}"),
            raw: Some(raw),
        })?;
        tracing::debug!(state = %ExchangeState::Completed, path, "response received");
        Ok(state)
    }
}

fn to_body(payload: &impl serde::Serialize) -> Result<serde_json::Value> {
    serde_json::to_value(payload)
        .map_err(|e| AgentError::request(format!("failed to serialize request: {e}")))
}
