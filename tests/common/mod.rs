//! Shared test utilities for integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::Response;
use axum::routing::post;
use axum::Router;

use weaviate_agents::client::{AgentRequest, ByteStream, QueryAgent, Transport};
use weaviate_agents::error::{AgentError, Result};
use weaviate_agents::QueryAgentBuilder;

/// Route library logs to the test output. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

// ---------------------------------------------------------------------------
// Event-stream fixtures
// ---------------------------------------------------------------------------

/// Format one SSE block.
pub fn sse(event: &str, data: &str) -> String {
    format!("event: {event}\ndata: {data}\n\n")
}

/// The "orders over $100" exchange: planning status, one aggregation, final answer.
pub fn orders_stream() -> String {
    [
        sse("progress_message", r#"{"message":"planning","details":{}}"#),
        sse("aggregation_result", r#"{"collection":"Orders","count":42}"#),
        sse(
            "final_state",
            r#"{"original_query":"How many orders exceeded $100 last month?","collection_names":["Orders"],"searches":[],"aggregations":[],"usage":{"requests":1,"total_tokens":120},"total_time":1.5,"final_answer":"42 orders exceeded $100 last month.","sources":[]}"#,
        ),
    ]
    .concat()
}

/// A stream with answer fragments, a citation and search results.
pub fn tokens_stream() -> String {
    [
        sse("progress_message", r#"{"message":"searching"}"#),
        sse("streamed_tokens", r#"{"delta":"Two "}"#),
        sse("streamed_tokens", r#"{"delta":"customers."}"#),
        sse(
            "final_state",
            r#"{"original_query":"q","collection_names":["Customers"],"searches":[[{"collection":"Customers","queries":["repeat buyers"],"filters":[],"filter_operators":"AND"}]],"aggregations":[],"usage":{"requests":"2"},"total_time":0.4,"final_answer":"Two customers.","sources":[{"object_id":"c-1","collection":"Customers"}],"search_results":[{"uuid":"c-1","collection":"Customers","properties":{"name":"Ada"}}]}"#,
        ),
    ]
    .concat()
}

/// Split `body` into chunks of `size` bytes.
pub fn chunked(body: &str, size: usize) -> Vec<Vec<u8>> {
    body.as_bytes().chunks(size.max(1)).map(<[u8]>::to_vec).collect()
}

// ---------------------------------------------------------------------------
// Scripted in-memory transport
// ---------------------------------------------------------------------------

struct ReleaseGuard(Arc<AtomicBool>);

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// A transport that replays canned chunks and records what it was asked.
#[derive(Default)]
pub struct ScriptedTransport {
    chunks: Vec<Vec<u8>>,
    delay: Option<Duration>,
    hang: bool,
    unary: Option<serde_json::Value>,
    failure: Option<AgentError>,
    requests: Mutex<Vec<AgentRequest>>,
    chunks_read: Arc<AtomicUsize>,
    released: Arc<AtomicBool>,
}

impl ScriptedTransport {
    /// Replay `chunks` as the body of every streaming call.
    pub fn new(chunks: Vec<Vec<u8>>) -> Self {
        Self {
            chunks,
            ..Default::default()
        }
    }

    /// Replay `body` as a single chunk.
    pub fn from_body(body: &str) -> Self {
        Self::new(vec![body.as_bytes().to_vec()])
    }

    /// Fail every call with `err`.
    pub fn failing(err: AgentError) -> Self {
        Self {
            failure: Some(err),
            ..Default::default()
        }
    }

    /// Wait before delivering each chunk.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Keep the body open forever after the last chunk.
    pub fn hanging(mut self) -> Self {
        self.hang = true;
        self
    }

    /// Response for unary calls.
    pub fn with_unary(mut self, value: serde_json::Value) -> Self {
        self.unary = Some(value);
        self
    }

    pub fn requests(&self) -> Vec<AgentRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn chunks_read(&self) -> usize {
        self.chunks_read.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: &AgentRequest) -> Result<serde_json::Value> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }
        Ok(self.unary.clone().unwrap_or(serde_json::Value::Null))
    }

    async fn send_stream(&self, request: &AgentRequest) -> Result<ByteStream> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }

        let chunks = self.chunks.clone();
        let delay = self.delay;
        let hang = self.hang;
        let counter = Arc::clone(&self.chunks_read);
        let guard = ReleaseGuard(Arc::clone(&self.released));

        let body = async_stream::stream! {
            let _guard = guard;
            for chunk in chunks {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                counter.fetch_add(1, Ordering::SeqCst);
                yield Ok::<_, AgentError>(chunk);
            }
            if hang {
                futures::future::pending::<()>().await;
            }
        };
        Ok(Box::pin(body))
    }
}

/// A client over `transport` with `Orders` as its default collection.
pub fn agent_with(transport: Arc<ScriptedTransport>) -> QueryAgent {
    QueryAgentBuilder::from_transport(transport)
        .with_collection("Orders")
        .with_idle_timeout(Duration::from_secs(2))
        .build()
        .unwrap()
}

// ---------------------------------------------------------------------------
// Mock agents service over HTTP
// ---------------------------------------------------------------------------

/// What the mock service answers with.
#[derive(Clone, Debug)]
pub struct MockResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub chunks: Vec<String>,
}

impl MockResponse {
    pub fn events(body: String) -> Self {
        Self {
            status: 200,
            content_type: "text/event-stream",
            chunks: vec![body],
        }
    }

    pub fn json(status: u16, body: serde_json::Value) -> Self {
        Self {
            status,
            content_type: "application/json",
            chunks: vec![body.to_string()],
        }
    }
}

/// One request the mock service received.
#[derive(Clone, Debug)]
pub struct Captured {
    pub path: String,
    pub headers: HashMap<String, String>,
    pub body: serde_json::Value,
}

#[derive(Clone)]
struct MockState {
    response: MockResponse,
    captured: Arc<Mutex<Vec<Captured>>>,
}

async fn handle(
    State(state): State<MockState>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let headers = headers
        .iter()
        .map(|(k, v)| (k.as_str().to_string(), v.to_str().unwrap_or_default().to_string()))
        .collect();
    state.captured.lock().unwrap().push(Captured {
        path: uri.path().to_string(),
        headers,
        body: serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null),
    });

    let chunks = state.response.chunks.clone();
    let stream = async_stream::stream! {
        for chunk in chunks {
            yield Ok::<_, std::convert::Infallible>(chunk);
        }
    };

    Response::builder()
        .status(StatusCode::from_u16(state.response.status).unwrap())
        .header("content-type", state.response.content_type)
        .body(Body::from_stream(stream))
        .unwrap()
}

/// Start a mock agents service on a random port.
///
/// Returns the host URL (to pass as the agents host) and the list of
/// captured requests.
pub async fn start_mock_agents(
    response: MockResponse,
) -> (String, Arc<Mutex<Vec<Captured>>>, tokio::task::JoinHandle<()>) {
    let captured = Arc::new(Mutex::new(Vec::new()));
    let state = MockState {
        response,
        captured: Arc::clone(&captured),
    };
    let app = Router::new()
        .route("/agent/stream_ask", post(handle))
        .route("/agent/ask", post(handle))
        .route("/agent/search_only", post(handle))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Brief wait for the server to start accepting connections.
    tokio::time::sleep(Duration::from_millis(50)).await;

    (format!("http://{addr}"), captured, handle)
}
