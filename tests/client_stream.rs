//! Integration tests for `ask_stream`: ordering, early release, timeouts.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{agent_with, chunked, init_tracing, orders_stream, sse, tokens_stream, ScriptedTransport};
use futures::StreamExt;
use weaviate_agents::types::StreamEvent;
use weaviate_agents::{AgentError, QueryAgentBuilder};

#[tokio::test]
async fn events_arrive_in_order_with_final_last() {
    let transport = Arc::new(ScriptedTransport::new(chunked(&tokens_stream(), 7)));
    let mut stream = agent_with(transport).ask_stream("q").await.unwrap();

    let mut kinds = Vec::new();
    while let Some(event) = stream.next().await {
        kinds.push(match event.unwrap() {
            StreamEvent::Status(_) => "status",
            StreamEvent::Progress(_) => "progress",
            StreamEvent::Aggregation(_) => "aggregation",
            StreamEvent::Final(_) => "final",
        });
    }
    assert_eq!(kinds, vec!["status", "progress", "progress", "final"]);
}

#[tokio::test]
async fn nothing_is_yielded_after_final() {
    let body = [
        orders_stream(),
        sse("progress_message", r#"{"message":"late"}"#),
        sse("final_state", "{}"),
    ]
    .concat();
    let transport = Arc::new(ScriptedTransport::from_body(&body));
    let events: Vec<_> = agent_with(transport)
        .ask_stream("q")
        .await
        .unwrap()
        .collect()
        .await;

    let finals = events
        .iter()
        .filter(|e| matches!(e, Ok(StreamEvent::Final(_))))
        .count();
    assert_eq!(events.len(), 3);
    assert_eq!(finals, 1);
    assert!(matches!(events.last(), Some(Ok(StreamEvent::Final(_)))));
}

#[tokio::test]
async fn dropping_stream_early_releases_connection() {
    let chunks = vec![
        sse("progress_message", r#"{"message":"planning"}"#).into_bytes(),
        sse("progress_message", r#"{"message":"searching"}"#).into_bytes(),
        sse("streamed_tokens", r#"{"delta":"x"}"#).into_bytes(),
        sse("final_state", "{}").into_bytes(),
    ];
    let transport = Arc::new(ScriptedTransport::new(chunks).with_delay(Duration::from_millis(10)));
    let mut stream = agent_with(transport.clone()).ask_stream("q").await.unwrap();

    let first = stream.next().await.unwrap().unwrap();
    assert!(matches!(first, StreamEvent::Status(_)));
    drop(stream);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(transport.released());
    assert_eq!(transport.chunks_read(), 1, "no bytes read after the consumer stopped");
}

#[tokio::test]
async fn close_before_first_event_releases_connection() {
    let transport = Arc::new(ScriptedTransport::from_body(&orders_stream()).hanging());
    let stream = agent_with(transport.clone()).ask_stream("q").await.unwrap();
    stream.close();
    assert!(transport.released());
    assert_eq!(transport.chunks_read(), 0);
}

#[tokio::test]
async fn close_after_completion_does_not_fail() {
    let transport = Arc::new(ScriptedTransport::from_body(&orders_stream()));
    let mut stream = agent_with(transport.clone()).ask_stream("q").await.unwrap();
    while let Some(event) = stream.next().await {
        if event.unwrap().is_final() {
            break;
        }
    }
    stream.close();
    assert!(transport.released());
}

#[tokio::test]
async fn close_racing_completion_does_not_fail() {
    let transport = Arc::new(
        ScriptedTransport::new(chunked(&orders_stream(), 16)).with_delay(Duration::from_millis(1)),
    );
    let agent = agent_with(transport.clone());
    for _ in 0..10 {
        let mut stream = agent.ask_stream("q").await.unwrap();
        let handle = tokio::spawn(async move {
            let _ = stream.next().await;
            stream.close();
        });
        handle.await.unwrap();
    }
    assert_eq!(transport.request_count(), 10);
}

#[tokio::test]
async fn idle_timeout_ends_stream() {
    init_tracing();
    let transport = Arc::new(
        ScriptedTransport::from_body(&sse("progress_message", r#"{"message":"planning"}"#))
            .hanging(),
    );
    let agent = QueryAgentBuilder::from_transport(transport.clone())
        .with_collection("Orders")
        .with_idle_timeout(Duration::from_millis(50))
        .build()
        .unwrap();

    let mut stream = agent.ask_stream("q").await.unwrap();
    assert!(matches!(stream.next().await, Some(Ok(StreamEvent::Status(_)))));
    assert!(matches!(stream.next().await, Some(Err(AgentError::Timeout(_)))));
    assert!(stream.next().await.is_none());
    drop(stream);
    assert!(transport.released());

    let err = agent.ask("q").await.unwrap_err();
    assert!(matches!(err, AgentError::Timeout(_)));
}

#[tokio::test]
async fn concurrent_asks_are_independent() {
    let transport = Arc::new(
        ScriptedTransport::new(chunked(&tokens_stream(), 5)).with_delay(Duration::from_millis(1)),
    );
    let agent = agent_with(transport.clone());

    let (a, b) = tokio::join!(agent.ask("first"), agent.ask("second"));
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_eq!(a, b);
    assert_eq!(a.streamed_text, "Two customers.");

    let questions: Vec<_> = transport
        .requests()
        .iter()
        .map(|r| r.body["query"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(questions.len(), 2);
    assert!(questions.contains(&"first".to_string()));
    assert!(questions.contains(&"second".to_string()));
}

#[tokio::test]
async fn collect_result_on_partially_consumed_stream() {
    let transport = Arc::new(ScriptedTransport::from_body(&tokens_stream()));
    let mut stream = agent_with(transport).ask_stream("q").await.unwrap();
    assert!(matches!(stream.next().await, Some(Ok(StreamEvent::Status(_)))));
    let result = stream.collect_result().await.unwrap();
    assert_eq!(result.answer.as_deref(), Some("Two customers."));
}
