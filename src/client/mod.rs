//! Query Agent client: ask questions against remote collections.
//!
//! - [`QueryAgent`]: async client with `ask`, `ask_stream` and `search`
//! - [`BlockingQueryAgent`]: the same operations for synchronous code
//!   (feature `blocking`, on by default)
//! - [`EventStream`]: lazily decoded events of one exchange
//! - [`Transport`] / [`HttpTransport`]: pluggable transport layer
//! - [`SseDecoder`] / [`EventDecoder`]: incremental event-stream decoding
//!
//! # Quick Start
//!
//! ```no_run
//! use weaviate_agents::client::QueryAgent;
//! use weaviate_agents::connection::ClusterCredentials;
//! use weaviate_agents::types::StreamEvent;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let creds = ClusterCredentials::new("https://my-cluster.weaviate.cloud").with_api_key("key");
//! let agent = QueryAgent::builder(&creds).with_collection("Orders").build()?;
//!
//! // Wait for the whole answer:
//! let result = agent.ask("How many orders exceeded $100 last month?").await?;
//! println!("{:?}", result.answer);
//!
//! // Or watch it being produced:
//! let mut events = agent.ask_stream("Summarise last week's returns").await?;
//! while let Some(event) = events.next().await {
//!     match event? {
//!         StreamEvent::Status(status) => println!("[{}]", status.message),
//!         StreamEvent::Progress(tokens) => print!("{}", tokens.delta),
//!         StreamEvent::Aggregation(update) => println!("{:?}", update.values),
//!         StreamEvent::Final(state) => println!("\n{} sources", state.citations.len()),
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#[cfg(feature = "blocking")]
mod blocking;
mod collector;
mod query_agent;
pub mod sse;
mod stream;
mod transport;

#[cfg(feature = "blocking")]
pub use blocking::{BlockingEventStream, BlockingQueryAgent};
pub use collector::ResultCollector;
pub use query_agent::{QueryAgent, DEFAULT_LIMIT};
pub use sse::{EventDecoder, SseDecoder, SseFrame};
pub use stream::EventStream;
pub use transport::{
    endpoints, AgentRequest, ByteStream, HttpTransport, Transport, TransportConfig,
    DEFAULT_AGENTS_HOST,
};
