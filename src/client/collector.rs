//! Folds a stream of events into one [`AgentResult`].

use crate::error::{AgentError, Result};
use crate::types::{AgentResult, AggregationUpdate, QueryMode, StreamEvent};

/// Accumulates streamed fragments until the final event arrives.
#[derive(Debug)]
pub struct ResultCollector {
    mode: QueryMode,
    streamed_text: String,
    aggregation_updates: Vec<AggregationUpdate>,
    statuses: usize,
}

impl ResultCollector {
    /// Start collecting for the given mode.
    pub fn new(mode: QueryMode) -> Self {
        Self {
            mode,
            streamed_text: String::new(),
            aggregation_updates: Vec::new(),
            statuses: 0,
        }
    }

    /// Take one event. Returns the result once the final event is seen.
    pub fn absorb(&mut self, event: StreamEvent) -> Option<AgentResult> {
        match event {
            StreamEvent::Status(status) => {
                self.statuses += 1;
                tracing::debug!(message = %status.message, "agent status");
                None
            }
            StreamEvent::Progress(tokens) => {
                self.streamed_text.push_str(&tokens.delta);
                None
            }
            StreamEvent::Aggregation(update) => {
                self.aggregation_updates.push(update);
                None
            }
            StreamEvent::Final(state) => Some(AgentResult::from_final(
                self.mode,
                *state,
                std::mem::take(&mut self.streamed_text),
                std::mem::take(&mut self.aggregation_updates),
            )),
        }
    }

    /// Take one stream item.
    ///
    /// Non-fatal decode errors are logged and skipped; fatal errors are
    /// returned.
    pub fn absorb_item(&mut self, item: Result<StreamEvent>) -> Result<Option<AgentResult>> {
        match item {
            Ok(event) => Ok(self.absorb(event)),
            Err(err) if !err.is_fatal() => {
                tracing::warn!(error = %err, "skipping malformed event");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Called when the stream ends without yielding a final event.
    pub fn incomplete(&self) -> AgentError {
        AgentError::protocol(format!(
            "stream ended without a final_state event after {} status update(s)",
            self.statuses
        ))
    }
}
