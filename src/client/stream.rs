//! The lazy event sequence returned by `ask_stream`.

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::stream::{Stream, StreamExt};

use crate::error::{AgentError, Result};
use crate::types::{AgentResult, QueryMode, StreamEvent};

use super::collector::ResultCollector;
use super::sse::EventDecoder;
use super::transport::ByteStream;

/// A stream of Query Agent events.
///
/// Owns the response body of one exchange. Events are decoded only as they
/// are pulled, and nothing is yielded after the final event or a fatal
/// error. Dropping the stream (or calling [`close`](Self::close)) releases
/// the connection immediately, whether or not the exchange has finished.
///
/// Supports both pull-based (`next()`) and push-based (`Stream` trait)
/// consumption.
///
/// # Example
///
/// ```no_run
/// # async fn example(mut stream: weaviate_agents::client::EventStream) {
/// use weaviate_agents::types::StreamEvent;
///
/// while let Some(event) = stream.next().await {
///     match event {
///         Ok(StreamEvent::Progress(tokens)) => print!("{}", tokens.delta),
///         Ok(StreamEvent::Final(state)) => println!("\n{} sources", state.citations.len()),
///         Ok(_) => {}
///         Err(e) => eprintln!("stream error: {e}"),
///     }
/// }
/// # }
/// ```
pub struct EventStream {
    inner: Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>,
    mode: QueryMode,
}

impl std::fmt::Debug for EventStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream")
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl EventStream {
    /// Decode `bytes` lazily, failing if no chunk arrives within `idle_timeout`.
    pub fn new(mut bytes: ByteStream, mode: QueryMode, idle_timeout: Duration) -> Self {
        let inner = async_stream::stream! {
            let mut decoder = EventDecoder::new();
            loop {
                let next = match tokio::time::timeout(idle_timeout, bytes.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        decoder.fail();
                        yield Err(AgentError::Timeout(format!(
                            "no data received for {idle_timeout:?}"
                        )));
                        break;
                    }
                };

                let items = match next {
                    Some(Ok(chunk)) => decoder.feed(&chunk),
                    Some(Err(err)) => {
                        decoder.fail();
                        yield Err(err);
                        break;
                    }
                    None => decoder.finish(),
                };
                for item in items {
                    yield item;
                }
                if decoder.is_terminated() {
                    break;
                }
            }
            tracing::debug!(state = %decoder.state(), "event stream finished");
        };

        Self {
            inner: Box::pin(inner),
            mode,
        }
    }

    /// Which operation opened this stream.
    pub fn mode(&self) -> QueryMode {
        self.mode
    }

    /// Get the next event from the stream.
    ///
    /// Returns `None` once the stream is exhausted: after the final event,
    /// after a fatal error, or after [`close`](Self::close).
    pub async fn next(&mut self) -> Option<Result<StreamEvent>> {
        self.inner.next().await
    }

    /// Stop consuming and release the connection.
    ///
    /// Safe to call at any point, including after the stream has ended.
    pub fn close(self) {
        tracing::debug!(mode = %self.mode, "event stream closed by caller");
    }

    /// Drain the stream into one [`AgentResult`].
    ///
    /// Isolated malformed non-final events are skipped; any other error ends
    /// collection.
    pub async fn collect_result(mut self) -> Result<AgentResult> {
        let mut collector = ResultCollector::new(self.mode);
        while let Some(item) = self.next().await {
            if let Some(result) = collector.absorb_item(item)? {
                return Ok(result);
            }
        }
        Err(collector.incomplete())
    }
}

impl Stream for EventStream {
    type Item = Result<StreamEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}
