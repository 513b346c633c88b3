//! # weaviate-agents: Rust client for Weaviate Agents
//!
//! Weaviate Agents are hosted services that answer natural-language
//! questions over the collections of a Weaviate cluster. The planning,
//! searching and answer generation all happen remotely; this crate builds
//! well-formed requests, authenticates them, decodes the streamed progress
//! events and surfaces typed results and errors.
//!
//! ## Overview
//!
//! The Query Agent offers three operations:
//! - **ask**: answer a question, returning the complete [`AgentResult`]
//! - **ask_stream**: the same exchange, yielding each [`StreamEvent`] as it
//!   arrives (status updates, answer fragments, aggregation results, final)
//! - **search**: run only the searches, returning matched objects without a
//!   generated answer
//!
//! Every operation exists in an async form ([`client::QueryAgent`]) and a
//! blocking form ([`client::BlockingQueryAgent`]). Both share one request
//! builder and one event decoder, so they behave identically.
//!
//! ## Feature flags
//!
//! | Feature    | Default | Description |
//! |------------|---------|-------------|
//! | `blocking` | yes     | `BlockingQueryAgent`, driven by an owned current-thread runtime |
//!
//! ## Quick Start
//!
//! ```no_run
//! use weaviate_agents::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let creds = ClusterCredentials::new("https://my-cluster.weaviate.cloud")
//!         .with_api_key("WEAVIATE_API_KEY");
//!     let agent = QueryAgent::builder(&creds)
//!         .with_collections(["Orders", "Customers"])
//!         .build()?;
//!
//!     let request = QueryRequest::new("How many orders exceeded $100 last month?")
//!         .filter("Orders", Filter::by_property("status").equal("paid"));
//!     let result = agent.ask(request).await?;
//!     println!("{result}");
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Errors
//!
//! All operations return [`AgentError`]. Use [`AgentError::kind`] to tell
//! invalid input, transport failures, protocol violations and failures
//! reported by the service apart. The client never retries: each call is
//! exactly one remote exchange.
//!
//! ## Logging
//!
//! The crate logs through [`tracing`]. Install a subscriber to see request
//! state transitions and tolerated malformed events.

pub mod builders;
pub mod client;
pub mod connection;
pub mod error;
pub mod filters;
pub mod types;

/// Prelude module that re-exports commonly used types and traits.
///
/// ```
/// use weaviate_agents::prelude::*;
///
/// let request = QueryRequest::new("Which products are low on stock?").collection("Products");
/// assert_eq!(request.collections[0].name, "Products");
/// ```
pub mod prelude {
    pub use crate::types::{
        AgentResult, ChatMessage, Citation, CollectionTarget, FinalState, QueryMode,
        QueryRequest, StreamEvent,
    };

    pub use crate::error::{AgentError, ErrorKind, Result};

    pub use crate::builders::QueryAgentBuilder;
    pub use crate::client::{EventStream, QueryAgent};
    pub use crate::connection::{ClusterConnection, ClusterCredentials};
    pub use crate::filters::Filter;

    #[cfg(feature = "blocking")]
    pub use crate::client::{BlockingEventStream, BlockingQueryAgent};
}

// Re-export core types at crate root for convenience.
pub use builders::QueryAgentBuilder;
pub use error::{AgentError, ErrorKind, Result};
pub use types::{AgentResult, QueryRequest, StreamEvent};
