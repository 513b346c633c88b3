//! Query Agent types: requests, stream events and results.
//!
//! The wire format follows the Weaviate Agents service: snake_case JSON
//! bodies, Server-Sent Events tagged with `progress_message`,
//! `streamed_tokens`, `aggregation_result`, `final_state` and `error`.

use serde::ser::SerializeStruct;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;

use crate::error::{AgentError, Result};
use crate::filters::Filter;

// ============================================================================
// Enums
// ============================================================================

/// Which kind of answer the agent should produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryMode {
    /// Generate a natural-language answer with citations.
    Ask,
    /// Only run the searches; no generated answer.
    Search,
}

impl fmt::Display for QueryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryMode::Ask => write!(f, "ask"),
            QueryMode::Search => write!(f, "search"),
        }
    }
}

/// Lifecycle of one request/response exchange.
///
/// `Building → Sent → Streaming → {Completed | Failed}`. A request can also
/// fail straight out of `Building` (invalid input) or `Sent` (transport).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExchangeState {
    /// Validating input and assembling the request body.
    Building,
    /// Request handed to the transport, awaiting response headers.
    Sent,
    /// Decoding events from the response body.
    Streaming,
    /// A final event was received.
    Completed,
    /// Transport, protocol or remote failure.
    Failed,
}

impl ExchangeState {
    /// Whether no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExchangeState::Completed | ExchangeState::Failed)
    }
}

impl fmt::Display for ExchangeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExchangeState::Building => "building",
            ExchangeState::Sent => "sent",
            ExchangeState::Streaming => "streaming",
            ExchangeState::Completed => "completed",
            ExchangeState::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Author of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// The end user.
    User,
    /// The agent.
    Assistant,
}

// ============================================================================
// Request model
// ============================================================================

/// One prior turn of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who said it.
    pub role: ChatRole,
    /// What was said.
    pub content: String,
}

impl ChatMessage {
    /// A user turn.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    /// An assistant turn.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Named vector(s) to search on collections with multiple vectors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TargetVector {
    /// A single named vector.
    Single(String),
    /// Several named vectors.
    Many(Vec<String>),
}

/// A collection the agent may query, with optional per-collection settings.
///
/// Serialized as a bare name when no settings are present.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionTarget {
    /// Collection name.
    pub name: String,
    /// Tenant, for multi-tenant collections.
    pub tenant: Option<String>,
    /// Restrict the properties the agent may look at.
    pub view_properties: Option<Vec<String>>,
    /// Named vector(s) to search.
    pub target_vector: Option<TargetVector>,
    /// Filters AND-combined with whatever the agent chooses.
    pub additional_filters: Option<Filter>,
}

impl CollectionTarget {
    /// A target with only a name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tenant: None,
            view_properties: None,
            target_vector: None,
            additional_filters: None,
        }
    }

    /// Set the tenant.
    pub fn tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant = Some(tenant.into());
        self
    }

    /// Restrict viewable properties.
    pub fn view_properties<I, S>(mut self, properties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.view_properties = Some(properties.into_iter().map(Into::into).collect());
        self
    }

    /// Set the named vector(s) to search.
    pub fn target_vector(mut self, target: TargetVector) -> Self {
        self.target_vector = Some(target);
        self
    }

    /// Set additional filters, replacing any already present.
    pub fn additional_filters(mut self, filter: Filter) -> Self {
        self.additional_filters = Some(filter);
        self
    }

    fn is_bare(&self) -> bool {
        self.tenant.is_none()
            && self.view_properties.is_none()
            && self.target_vector.is_none()
            && self.additional_filters.is_none()
    }
}

impl From<&str> for CollectionTarget {
    fn from(name: &str) -> Self {
        CollectionTarget::new(name)
    }
}

impl From<String> for CollectionTarget {
    fn from(name: String) -> Self {
        CollectionTarget::new(name)
    }
}

impl Serialize for CollectionTarget {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        if self.is_bare() {
            return serializer.serialize_str(&self.name);
        }
        let mut state = serializer.serialize_struct("CollectionTarget", 5)?;
        state.serialize_field("name", &self.name)?;
        state.serialize_field("tenant", &self.tenant)?;
        state.serialize_field("view_properties", &self.view_properties)?;
        state.serialize_field("target_vector", &self.target_vector)?;
        state.serialize_field("additional_filters", &self.additional_filters)?;
        state.end()
    }
}

/// A natural-language question for the Query Agent.
///
/// # Example
///
/// ```
/// use weaviate_agents::filters::Filter;
/// use weaviate_agents::types::{ChatMessage, QueryRequest};
///
/// let request = QueryRequest::new("How many orders exceeded $100 last month?")
///     .collection("Orders")
///     .filter("Orders", Filter::by_property("status").equal("paid"))
///     .history([ChatMessage::user("Hi"), ChatMessage::assistant("Hello!")]);
/// assert_eq!(request.collections.len(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryRequest {
    /// The question.
    pub question: String,
    /// Earlier turns of the conversation, oldest first.
    pub history: Vec<ChatMessage>,
    /// Collections to target. Empty means "use the agent's defaults".
    pub collections: Vec<CollectionTarget>,
    /// Per-collection filters, keyed by collection name.
    pub filters: Vec<(String, Filter)>,
    /// Overrides the agent's system prompt for this request.
    pub system_prompt: Option<String>,
    /// Maximum number of objects retrieved per search.
    pub limit: Option<u32>,
}

impl QueryRequest {
    /// A request for the given question.
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            ..Default::default()
        }
    }

    /// Add a target collection.
    pub fn collection(mut self, collection: impl Into<CollectionTarget>) -> Self {
        self.collections.push(collection.into());
        self
    }

    /// Add several target collections.
    pub fn collections<I, C>(mut self, collections: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<CollectionTarget>,
    {
        self.collections
            .extend(collections.into_iter().map(Into::into));
        self
    }

    /// Attach a filter to one of the target collections.
    pub fn filter(mut self, collection: impl Into<String>, filter: Filter) -> Self {
        self.filters.push((collection.into(), filter));
        self
    }

    /// Set the conversation history preceding the question.
    pub fn history(mut self, history: impl IntoIterator<Item = ChatMessage>) -> Self {
        self.history = history.into_iter().collect();
        self
    }

    /// Override the system prompt.
    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Set the per-search object limit.
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Check the request and resolve its effective collections.
    ///
    /// Falls back to `defaults` when the request names no collections, then
    /// folds the per-collection filters into their targets.
    pub fn resolve(&self, defaults: &[CollectionTarget]) -> Result<Vec<CollectionTarget>> {
        if self.question.trim().is_empty() {
            return Err(AgentError::request("question must not be empty"));
        }

        let mut targets = if self.collections.is_empty() {
            defaults.to_vec()
        } else {
            self.collections.clone()
        };
        if targets.is_empty() {
            return Err(AgentError::request(
                "no collections provided to the query agent",
            ));
        }
        for target in &targets {
            validate_collection_name(&target.name)?;
        }

        for (name, filter) in &self.filters {
            let target = targets
                .iter_mut()
                .find(|t| &t.name == name)
                .ok_or_else(|| {
                    AgentError::request(format!(
                        "filter targets collection '{name}' which is not part of the request"
                    ))
                })?;
            target.additional_filters = Some(match target.additional_filters.take() {
                Some(existing) => existing & filter.clone(),
                None => filter.clone(),
            });
        }

        Ok(targets)
    }

    /// The `query` field of the wire body.
    pub(crate) fn wire_query(&self) -> serde_json::Value {
        if self.history.is_empty() {
            return serde_json::Value::String(self.question.clone());
        }
        let mut messages = self.history.clone();
        messages.push(ChatMessage::user(self.question.clone()));
        serde_json::json!({ "messages": messages })
    }
}

impl From<&str> for QueryRequest {
    fn from(question: &str) -> Self {
        QueryRequest::new(question)
    }
}

impl From<String> for QueryRequest {
    fn from(question: String) -> Self {
        QueryRequest::new(question)
    }
}

/// Check that a collection name is a valid class identifier.
pub fn validate_collection_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(AgentError::request(format!(
            "invalid collection name '{name}'"
        )))
    }
}

/// Request body sent to the agents service.
#[derive(Debug, Serialize)]
pub(crate) struct QueryPayload<'a> {
    pub query: serde_json::Value,
    pub collections: &'a [CollectionTarget],
    pub headers: &'a HashMap<String, String>,
    pub limit: u32,
    pub mode: QueryMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<&'a str>,
}

/// Request body for one page of the search-only endpoint.
///
/// Without `searches` the service plans new searches (and may use
/// `system_prompt`); with them it re-runs exactly those searches.
#[derive(Debug, Serialize)]
pub(crate) struct SearchPagePayload<'a> {
    pub original_query: serde_json::Value,
    pub collections: &'a [CollectionTarget],
    pub headers: &'a HashMap<String, String>,
    pub limit: u32,
    pub offset: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub searches: Option<&'a [QuerySearch]>,
}

// ============================================================================
// Response model: searches and aggregations performed by the agent
// ============================================================================

/// Operator in a filter chosen by the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComparisonOperator {
    /// `=`
    #[serde(rename = "=")]
    Equals,
    /// `<`
    #[serde(rename = "<")]
    LessThan,
    /// `>`
    #[serde(rename = ">")]
    GreaterThan,
    /// `<=`
    #[serde(rename = "<=")]
    LessEqual,
    /// `>=`
    #[serde(rename = ">=")]
    GreaterEqual,
    /// `!=`
    #[serde(rename = "!=")]
    NotEquals,
    /// `LIKE`
    #[serde(rename = "LIKE")]
    Like,
    /// `contains_any`
    #[serde(rename = "contains_any")]
    ContainsAny,
    /// `contains_all`
    #[serde(rename = "contains_all")]
    ContainsAll,
}

/// A filter type this client understands, tagged by `filter_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "filter_type", rename_all = "snake_case")]
pub enum KnownPropertyFilter {
    Integer {
        property_name: String,
        operator: ComparisonOperator,
        value: f64,
    },
    IntegerArray {
        property_name: String,
        operator: ComparisonOperator,
        value: Vec<f64>,
    },
    Text {
        property_name: String,
        operator: ComparisonOperator,
        value: String,
    },
    TextArray {
        property_name: String,
        operator: ComparisonOperator,
        value: Vec<String>,
    },
    Boolean {
        property_name: String,
        operator: ComparisonOperator,
        value: bool,
    },
    BooleanArray {
        property_name: String,
        operator: ComparisonOperator,
        value: Vec<bool>,
    },
    Date {
        property_name: String,
        operator: ComparisonOperator,
        value: String,
    },
    DateArray {
        property_name: String,
        operator: ComparisonOperator,
        value: Vec<String>,
    },
    Geo {
        property_name: String,
        latitude: f64,
        longitude: f64,
        max_distance_meters: f64,
    },
}

/// A filter the agent applied. Unrecognised filter types are kept verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyFilter {
    /// A filter type this client understands.
    Known(KnownPropertyFilter),
    /// A filter type added to the service after this client was built.
    Unknown(serde_json::Value),
}

impl PropertyFilter {
    /// The filtered property, when known.
    pub fn property_name(&self) -> Option<&str> {
        match self {
            PropertyFilter::Known(known) => Some(match known {
                KnownPropertyFilter::Integer { property_name, .. }
                | KnownPropertyFilter::IntegerArray { property_name, .. }
                | KnownPropertyFilter::Text { property_name, .. }
                | KnownPropertyFilter::TextArray { property_name, .. }
                | KnownPropertyFilter::Boolean { property_name, .. }
                | KnownPropertyFilter::BooleanArray { property_name, .. }
                | KnownPropertyFilter::Date { property_name, .. }
                | KnownPropertyFilter::DateArray { property_name, .. }
                | KnownPropertyFilter::Geo { property_name, .. } => property_name.as_str(),
            }),
            PropertyFilter::Unknown(raw) => raw.get("property_name").and_then(|v| v.as_str()),
        }
    }
}

/// How the filter groups of one search are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FilterCombinator {
    And,
    Or,
}

/// A search the agent ran against one collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySearch {
    #[serde(default)]
    pub collection: String,
    #[serde(default)]
    pub queries: Vec<String>,
    #[serde(default)]
    pub filters: Vec<Vec<PropertyFilter>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_operators: Option<FilterCombinator>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NumericMetric {
    Count,
    Maximum,
    Mean,
    Median,
    Minimum,
    Mode,
    Sum,
    Type,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TextMetric {
    Count,
    Type,
    TopOccurrences,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BooleanMetric {
    Count,
    Type,
    TotalTrue,
    TotalFalse,
    PercentageTrue,
    PercentageFalse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DateMetric {
    Count,
    Maximum,
    Median,
    Minimum,
    Mode,
}

/// An aggregation type this client understands, tagged by `aggregation_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "aggregation_type", rename_all = "snake_case")]
pub enum KnownPropertyAggregation {
    Integer {
        property_name: String,
        metrics: NumericMetric,
    },
    Text {
        property_name: String,
        metrics: TextMetric,
        #[serde(default)]
        top_occurrences_limit: Option<u32>,
    },
    Boolean {
        property_name: String,
        metrics: BooleanMetric,
    },
    Date {
        property_name: String,
        metrics: DateMetric,
    },
}

/// An aggregation the agent ran. Unrecognised types are kept verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyAggregation {
    Known(KnownPropertyAggregation),
    Unknown(serde_json::Value),
}

/// Aggregations the agent planned for one collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationSpec {
    #[serde(default)]
    pub collection: String,
    #[serde(default)]
    pub search_query: Option<String>,
    #[serde(default)]
    pub groupby_property: Option<String>,
    #[serde(default)]
    pub aggregations: Vec<PropertyAggregation>,
    #[serde(default)]
    pub filters: Vec<PropertyFilter>,
}

// ============================================================================
// Response model: final payload
// ============================================================================

/// Token / request accounting for one exchange.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default, deserialize_with = "lenient_count")]
    pub requests: Option<u64>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub request_tokens: Option<u64>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub response_tokens: Option<u64>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub total_tokens: Option<u64>,
    #[serde(default)]
    pub details: Option<HashMap<String, serde_json::Value>>,
}

/// Reference from an answer back to the object that supports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    /// Collection holding the object.
    pub collection: String,
    /// Object UUID.
    #[serde(alias = "uuid")]
    pub object_id: String,
    /// Property that matched, when reported.
    #[serde(
        default,
        alias = "matched_property",
        skip_serializing_if = "Option::is_none"
    )]
    pub property: Option<String>,
    /// Excerpt of the matched content, when reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
}

/// An object returned by a search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(default)]
    pub collection: String,
    #[serde(default, alias = "uuid")]
    pub object_id: String,
    #[serde(default)]
    pub properties: serde_json::Map<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// Payload of the `final_state` event (and of the non-streaming response).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FinalState {
    #[serde(default)]
    pub original_query: String,
    #[serde(default)]
    pub collection_names: Vec<String>,
    #[serde(default, deserialize_with = "flatten_nested")]
    pub searches: Vec<QuerySearch>,
    #[serde(default, deserialize_with = "flatten_nested")]
    pub aggregations: Vec<AggregationSpec>,
    #[serde(default)]
    pub usage: Usage,
    #[serde(default)]
    pub total_time: f64,
    #[serde(default)]
    pub aggregation_answer: Option<String>,
    #[serde(default)]
    pub has_aggregation_answer: bool,
    #[serde(default)]
    pub has_search_answer: bool,
    #[serde(default)]
    pub is_partial_answer: bool,
    #[serde(default)]
    pub missing_information: Vec<String>,
    /// Generated answer; absent in search mode.
    #[serde(default)]
    pub final_answer: Option<String>,
    #[serde(default, rename = "sources", alias = "citations")]
    pub citations: Vec<Citation>,
    #[serde(default)]
    pub search_results: Vec<SearchHit>,
}

// ============================================================================
// Stream events
// ============================================================================

/// A status update from the agent (planning, searching, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressMessage {
    pub message: String,
    #[serde(default)]
    pub details: serde_json::Value,
}

/// A fragment of the answer as it is generated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamedTokens {
    pub delta: String,
}

/// An intermediate aggregation result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
    /// Result values, e.g. `{"count": 42}`.
    #[serde(flatten)]
    pub values: serde_json::Map<String, serde_json::Value>,
}

/// One decoded event of a Query Agent stream.
///
/// A successful stream holds any number of `Status` / `Progress` /
/// `Aggregation` events followed by exactly one `Final`.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Progress status (`progress_message`, or any unrecognised tag).
    Status(ProgressMessage),
    /// Answer fragment (`streamed_tokens`).
    Progress(StreamedTokens),
    /// Intermediate aggregation result (`aggregation_result`).
    Aggregation(AggregationUpdate),
    /// Terminal result (`final_state`).
    Final(Box<FinalState>),
}

impl StreamEvent {
    /// Whether this is the terminal event.
    pub fn is_final(&self) -> bool {
        matches!(self, StreamEvent::Final(_))
    }
}

// ============================================================================
// AgentResult
// ============================================================================

/// Fully materialized outcome of `ask` / `search`.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentResult {
    pub mode: QueryMode,
    pub original_query: String,
    pub collection_names: Vec<String>,
    /// Generated answer. Always `None` for search mode.
    pub answer: Option<String>,
    /// `Progress` fragments concatenated in arrival order.
    pub streamed_text: String,
    pub citations: Vec<Citation>,
    pub searches: Vec<QuerySearch>,
    pub aggregations: Vec<AggregationSpec>,
    /// `Aggregation` events in arrival order.
    pub aggregation_updates: Vec<AggregationUpdate>,
    pub aggregation_answer: Option<String>,
    pub search_results: Vec<SearchHit>,
    pub usage: Usage,
    pub total_time: f64,
    pub is_partial_answer: bool,
    pub missing_information: Vec<String>,
}

impl AgentResult {
    /// Merge a final payload with what was streamed before it.
    ///
    /// In ask mode the final answer wins; the streamed text stands in when
    /// the final payload carries none.
    pub fn from_final(
        mode: QueryMode,
        state: FinalState,
        streamed_text: String,
        aggregation_updates: Vec<AggregationUpdate>,
    ) -> Self {
        let answer = match mode {
            QueryMode::Search => None,
            QueryMode::Ask => state
                .final_answer
                .filter(|a| !a.is_empty())
                .or_else(|| (!streamed_text.is_empty()).then(|| streamed_text.clone())),
        };
        Self {
            mode,
            original_query: state.original_query,
            collection_names: state.collection_names,
            answer,
            streamed_text,
            citations: state.citations,
            searches: state.searches,
            aggregations: state.aggregations,
            aggregation_updates,
            aggregation_answer: state.aggregation_answer,
            search_results: state.search_results,
            usage: state.usage,
            total_time: state.total_time,
            is_partial_answer: state.is_partial_answer,
            missing_information: state.missing_information,
        }
    }
}

impl fmt::Display for AgentResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Query: {}", self.original_query)?;
        if !self.collection_names.is_empty() {
            writeln!(f, "Collections: {}", self.collection_names.join(", "))?;
        }
        match &self.answer {
            Some(answer) => writeln!(f, "Answer: {answer}")?,
            None => writeln!(f, "Results: {} objects", self.search_results.len())?,
        }
        if self.is_partial_answer {
            writeln!(f, "(partial answer)")?;
        }
        if let Some(aggregation) = &self.aggregation_answer {
            writeln!(f, "Aggregation answer: {aggregation}")?;
        }
        for search in &self.searches {
            writeln!(
                f,
                "Searched {}: {}",
                search.collection,
                search.queries.join(" | ")
            )?;
        }
        for spec in &self.aggregations {
            writeln!(
                f,
                "Aggregated {}: {} metric(s)",
                spec.collection,
                spec.aggregations.len()
            )?;
        }
        if !self.missing_information.is_empty() {
            writeln!(f, "Missing information:")?;
            for item in &self.missing_information {
                writeln!(f, "  - {item}")?;
            }
        }
        if !self.citations.is_empty() {
            writeln!(f, "Sources:")?;
            for citation in &self.citations {
                writeln!(f, "  - {}/{}", citation.collection, citation.object_id)?;
            }
        }
        if let Some(total) = self.usage.total_tokens {
            writeln!(f, "Tokens: {total}")?;
        }
        write!(f, "Total time: {:.2}s", self.total_time)
    }
}

// ============================================================================
// Deserialization helpers
// ============================================================================

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

/// Accept `[a, b]`, `[[a], [b]]` or `null`, yielding a flat list.
fn flatten_nested<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    let items = Option::<Vec<OneOrMany<T>>>::deserialize(deserializer)?.unwrap_or_default();
    let mut flat = Vec::with_capacity(items.len());
    for item in items {
        match item {
            OneOrMany::Many(group) => flat.extend(group),
            OneOrMany::One(single) => flat.push(single),
        }
    }
    Ok(flat)
}

/// Counts may arrive as numbers or numeric strings.
fn lenient_count<'de, D>(deserializer: D) -> std::result::Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Count {
        Number(u64),
        Text(String),
    }

    Ok(match Option::<Count>::deserialize(deserializer)? {
        Some(Count::Number(n)) => Some(n),
        Some(Count::Text(s)) => s.trim().parse().ok(),
        None => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bare_collection_serializes_as_string() {
        let value = serde_json::to_value(CollectionTarget::new("Orders")).unwrap();
        assert_eq!(value, json!("Orders"));
    }

    #[test]
    fn configured_collection_serializes_as_object() {
        let target = CollectionTarget::new("Orders")
            .tenant("acme")
            .view_properties(["total", "status"])
            .target_vector(TargetVector::Single("body".into()));
        let value = serde_json::to_value(target).unwrap();
        assert_eq!(value["name"], "Orders");
        assert_eq!(value["tenant"], "acme");
        assert_eq!(value["view_properties"], json!(["total", "status"]));
        assert_eq!(value["target_vector"], "body");
        assert!(value["additional_filters"].is_null());
    }

    #[test]
    fn resolve_rejects_empty_question() {
        let err = QueryRequest::new("   ")
            .collection("Orders")
            .resolve(&[])
            .unwrap_err();
        assert!(matches!(err, AgentError::Request { .. }));
    }

    #[test]
    fn resolve_rejects_missing_collections() {
        let err = QueryRequest::new("q").resolve(&[]).unwrap_err();
        assert!(format!("{err}").contains("no collections"));
    }

    #[test]
    fn resolve_falls_back_to_defaults() {
        let defaults = vec![CollectionTarget::new("Products")];
        let targets = QueryRequest::new("q").resolve(&defaults).unwrap();
        assert_eq!(targets, defaults);

        let targets = QueryRequest::new("q")
            .collection("Orders")
            .resolve(&defaults)
            .unwrap();
        assert_eq!(targets[0].name, "Orders");
    }

    #[test]
    fn resolve_merges_filters_into_targets() {
        let base = Filter::by_property("region").equal("eu");
        let defaults = vec![CollectionTarget::new("Orders").additional_filters(base)];
        let targets = QueryRequest::new("q")
            .filter("Orders", Filter::by_property("total").greater_than(100))
            .resolve(&defaults)
            .unwrap();
        let merged = targets[0].additional_filters.as_ref().unwrap();
        assert_eq!(merged.targets(), vec!["region", "total"]);
    }

    #[test]
    fn resolve_rejects_filter_for_unknown_collection() {
        let err = QueryRequest::new("q")
            .collection("Orders")
            .filter("Customers", Filter::by_property("x").equal(1))
            .resolve(&[])
            .unwrap_err();
        assert!(format!("{err}").contains("Customers"));
    }

    #[test]
    fn collection_name_rules() {
        assert!(validate_collection_name("Orders").is_ok());
        assert!(validate_collection_name("_private_2").is_ok());
        assert!(validate_collection_name("").is_err());
        assert!(validate_collection_name("2fast").is_err());
        assert!(validate_collection_name("has space").is_err());
    }

    #[test]
    fn wire_query_with_history_appends_question() {
        let request = QueryRequest::new("and last year?")
            .history([ChatMessage::user("orders this year?"), ChatMessage::assistant("12")]);
        let query = request.wire_query();
        let messages = query["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[2], json!({"role": "user", "content": "and last year?"}));

        assert_eq!(QueryRequest::new("plain").wire_query(), json!("plain"));
    }

    #[test]
    fn final_state_accepts_nested_searches_and_sources() {
        let raw = json!({
            "original_query": "q",
            "collection_names": ["Orders"],
            "searches": [[{"collection": "Orders", "queries": ["big orders"], "filters": [], "filter_operators": "AND"}]],
            "aggregations": [],
            "usage": {"requests": "2", "total_tokens": 30},
            "total_time": 0.1,
            "final_answer": "done",
            "sources": [{"object_id": "123", "collection": "Orders"}]
        });
        let state: FinalState = serde_json::from_value(raw).unwrap();
        assert_eq!(state.searches.len(), 1);
        assert_eq!(state.searches[0].filter_operators, Some(FilterCombinator::And));
        assert_eq!(state.usage.requests, Some(2));
        assert_eq!(state.usage.total_tokens, Some(30));
        assert_eq!(state.citations[0].object_id, "123");
    }

    #[test]
    fn unknown_filter_type_is_preserved() {
        let raw = json!({"filter_type": "vector_range", "property_name": "emb", "radius": 0.3});
        let filter: PropertyFilter = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(filter, PropertyFilter::Unknown(raw));
        assert_eq!(filter.property_name(), Some("emb"));

        let known: PropertyFilter = serde_json::from_value(json!({
            "filter_type": "integer", "property_name": "total", "operator": ">", "value": 100
        }))
        .unwrap();
        assert!(matches!(
            known,
            PropertyFilter::Known(KnownPropertyFilter::Integer {
                operator: ComparisonOperator::GreaterThan,
                ..
            })
        ));
    }

    #[test]
    fn known_aggregation_parses_metrics() {
        let agg: PropertyAggregation = serde_json::from_value(json!({
            "aggregation_type": "text",
            "property_name": "status",
            "metrics": "TOP_OCCURRENCES",
            "top_occurrences_limit": 5
        }))
        .unwrap();
        assert_eq!(
            agg,
            PropertyAggregation::Known(KnownPropertyAggregation::Text {
                property_name: "status".into(),
                metrics: TextMetric::TopOccurrences,
                top_occurrences_limit: Some(5),
            })
        );
    }

    #[test]
    fn search_mode_result_has_no_answer() {
        let state = FinalState {
            final_answer: Some("should be dropped".into()),
            ..Default::default()
        };
        let result = AgentResult::from_final(QueryMode::Search, state, String::new(), vec![]);
        assert!(result.answer.is_none());
    }

    #[test]
    fn ask_result_falls_back_to_streamed_text() {
        let result = AgentResult::from_final(
            QueryMode::Ask,
            FinalState::default(),
            "42 orders".into(),
            vec![],
        );
        assert_eq!(result.answer.as_deref(), Some("42 orders"));
    }

    #[test]
    fn display_summarizes_result() {
        let state = FinalState {
            original_query: "How many orders?".into(),
            final_answer: Some("42".into()),
            citations: vec![Citation {
                collection: "Orders".into(),
                object_id: "abc".into(),
                property: None,
                snippet: None,
            }],
            ..Default::default()
        };
        let text = AgentResult::from_final(QueryMode::Ask, state, String::new(), vec![]).to_string();
        assert!(text.contains("Query: How many orders?"));
        assert!(text.contains("Answer: 42"));
        assert!(text.contains("Orders/abc"));
    }
}
