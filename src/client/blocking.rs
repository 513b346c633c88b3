//! Blocking wrapper around [`QueryAgent`].
//!
//! Each client owns a current-thread tokio runtime and drives the async
//! client on it, so request building, decoding and result collection are
//! the exact same code in both modes. Only the waiting differs: the calling
//! thread blocks instead of yielding.
//!
//! The blocking client must not be used from inside an async runtime; calls
//! made there fail with [`AgentError::Request`] instead of deadlocking.

use std::future::Future;
use std::sync::Arc;

use tokio::runtime::{Builder, Runtime};

use crate::connection::ClusterConnection;
use crate::error::{AgentError, Result};
use crate::types::{AgentResult, CollectionTarget, QueryRequest, StreamEvent};

use super::query_agent::QueryAgent;
use super::stream::EventStream;

fn block_on<F: Future>(runtime: &Runtime, future: F) -> Result<F::Output> {
    if tokio::runtime::Handle::try_current().is_ok() {
        return Err(AgentError::request(
            "blocking client used from within an async runtime; use QueryAgent instead",
        ));
    }
    Ok(runtime.block_on(future))
}

/// Blocking Query Agent client.
///
/// # Example
///
/// ```no_run
/// use weaviate_agents::client::BlockingQueryAgent;
/// use weaviate_agents::connection::ClusterCredentials;
///
/// # fn example() -> Result<(), weaviate_agents::AgentError> {
/// let creds = ClusterCredentials::new("https://my-cluster.weaviate.cloud").with_api_key("key");
/// let mut agent = BlockingQueryAgent::new(&creds)?;
/// agent.add_collection("Orders");
///
/// for event in agent.ask_stream("Which orders shipped late?")? {
///     println!("{:?}", event?);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct BlockingQueryAgent {
    inner: QueryAgent,
    runtime: Arc<Runtime>,
}

impl BlockingQueryAgent {
    /// Create a client for the given cluster with default settings.
    pub fn new(connection: &dyn ClusterConnection) -> Result<Self> {
        Self::from_async(QueryAgent::new(connection)?)
    }

    /// Wrap an async client.
    pub fn from_async(inner: QueryAgent) -> Result<Self> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| AgentError::Transport(format!("failed to start runtime: {e}")))?;
        Ok(Self {
            inner,
            runtime: Arc::new(runtime),
        })
    }

    /// The wrapped async client.
    pub fn as_async(&self) -> &QueryAgent {
        &self.inner
    }

    /// Default target collections.
    pub fn collections(&self) -> &[CollectionTarget] {
        self.inner.collections()
    }

    /// Add a default collection. Ignored if one with the same name exists.
    pub fn add_collection(&mut self, collection: impl Into<CollectionTarget>) {
        self.inner.add_collection(collection);
    }

    /// Remove a default collection by name. Missing names are ignored.
    pub fn remove_collection(&mut self, name: &str) {
        self.inner.remove_collection(name);
    }

    /// See [`QueryAgent::ask`].
    pub fn ask(&self, request: impl Into<QueryRequest>) -> Result<AgentResult> {
        block_on(&self.runtime, self.inner.ask(request))?
    }

    /// See [`QueryAgent::ask_stream`].
    pub fn ask_stream(&self, request: impl Into<QueryRequest>) -> Result<BlockingEventStream> {
        let stream = block_on(&self.runtime, self.inner.ask_stream(request))??;
        Ok(BlockingEventStream {
            inner: Some(stream),
            runtime: Arc::clone(&self.runtime),
        })
    }

    /// See [`QueryAgent::search`].
    pub fn search(&self, request: impl Into<QueryRequest>) -> Result<AgentResult> {
        block_on(&self.runtime, self.inner.search(request))?
    }

    /// See [`QueryAgent::ask_unary`].
    pub fn ask_unary(&self, request: impl Into<QueryRequest>) -> Result<AgentResult> {
        block_on(&self.runtime, self.inner.ask_unary(request))?
    }

    /// See [`QueryAgent::search_page`].
    pub fn search_page(
        &self,
        request: impl Into<QueryRequest>,
        previous: Option<&AgentResult>,
        limit: u32,
        offset: u32,
    ) -> Result<AgentResult> {
        block_on(
            &self.runtime,
            self.inner.search_page(request, previous, limit, offset),
        )?
    }
}

/// Blocking iterator over Query Agent events.
///
/// Each call to `next` blocks until the next event is decoded. Dropping the
/// iterator releases the connection.
pub struct BlockingEventStream {
    inner: Option<EventStream>,
    runtime: Arc<Runtime>,
}

impl std::fmt::Debug for BlockingEventStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockingEventStream")
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}

impl BlockingEventStream {
    /// Stop consuming and release the connection. Never fails.
    pub fn close(mut self) {
        self.release();
    }

    /// Drain the remaining events into one [`AgentResult`].
    pub fn collect_result(mut self) -> Result<AgentResult> {
        match self.inner.take() {
            Some(stream) => block_on(&self.runtime, stream.collect_result())?,
            None => Err(AgentError::protocol("event stream already closed")),
        }
    }

    fn release(&mut self) {
        if let Some(stream) = self.inner.take() {
            // Timers and connections belong to this runtime.
            let _guard = self.runtime.enter();
            stream.close();
        }
    }
}

impl Iterator for BlockingEventStream {
    type Item = Result<StreamEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        let stream = self.inner.as_mut()?;
        match block_on(&self.runtime, stream.next()) {
            Ok(Some(item)) => Some(item),
            Ok(None) => {
                self.release();
                None
            }
            Err(err) => {
                self.release();
                Some(Err(err))
            }
        }
    }
}

impl Drop for BlockingEventStream {
    fn drop(&mut self) {
        self.release();
    }
}
