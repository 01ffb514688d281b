// Claude client tests against a local HTTP server
//
// Exercises the real request path: headers, SSE decoding across the wire,
// and status-code classification.

use std::sync::Arc;

use futures::StreamExt;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use opencern_agent::agent::{AgentLoop, AutoApprovalGate, SessionContext, TurnOutcome};
use opencern_agent::claude::{
    ClaudeClient, Message, MessageRequest, StreamEvent, StreamingModel,
};
use opencern_agent::error::AgentError;
use opencern_agent::sandbox::SandboxExecutor;

fn sse_body() -> String {
    [
        json!({"type": "message_start", "message": {"usage": {"input_tokens": 10, "output_tokens": 1}}}),
        json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": ""}}),
        json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "Muon "}}),
        json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "tracks look clean."}}),
        json!({"type": "content_block_stop", "index": 0}),
        json!({"type": "message_delta", "delta": {"stop_reason": "end_turn"}, "usage": {"output_tokens": 9}}),
        json!({"type": "message_stop"}),
    ]
    .iter()
    .map(|frame| format!("data: {}\n\n", frame))
    .collect()
}

fn request() -> MessageRequest {
    MessageRequest::new("claude-sonnet-4-20250514", vec![Message::user("hello")])
}

#[tokio::test]
async fn test_streaming_decode_over_http() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/messages")
        .match_header("x-api-key", "test-key")
        .match_header("anthropic-version", "2023-06-01")
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(sse_body())
        .create_async()
        .await;

    let client = ClaudeClient::new("test-key".to_string())
        .unwrap()
        .with_base_url(format!("{}/v1/messages", server.url()));

    let mut stream = client.open_stream(&request()).await.unwrap();
    let mut events = Vec::new();
    while let Some(event) = stream.next().await {
        events.push(event.unwrap());
    }

    assert_eq!(
        events,
        vec![
            StreamEvent::Usage {
                input_tokens: 10,
                output_tokens: 1
            },
            StreamEvent::Token("Muon ".to_string()),
            StreamEvent::Token("tracks look clean.".to_string()),
            StreamEvent::Usage {
                input_tokens: 0,
                output_tokens: 9
            },
            StreamEvent::Done,
        ]
    );
    mock.assert_async().await;
}

#[tokio::test]
async fn test_auth_error_is_actionable() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/v1/messages")
        .with_status(401)
        .with_body(
            json!({"error": {"type": "authentication_error", "message": "invalid x-api-key"}})
                .to_string(),
        )
        .create_async()
        .await;

    let client = ClaudeClient::new("bad-key".to_string())
        .unwrap()
        .with_base_url(format!("{}/v1/messages", server.url()));

    match client.open_stream(&request()).await {
        Err(AgentError::Auth(message)) => {
            assert!(message.contains("invalid x-api-key"));
            assert!(message.contains("config.toml"));
        }
        other => panic!("expected Auth error, got {:?}", other.map(|_| "stream")),
    }
}

#[tokio::test]
async fn test_rate_limit_maps_to_its_own_variant() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/v1/messages")
        .with_status(429)
        .with_body(
            json!({"error": {"type": "rate_limit_error", "message": "rate limited"}}).to_string(),
        )
        .create_async()
        .await;

    let client = ClaudeClient::new("test-key".to_string())
        .unwrap()
        .with_base_url(format!("{}/v1/messages", server.url()));

    assert!(matches!(
        client.open_stream(&request()).await,
        Err(AgentError::RateLimited(_))
    ));
}

#[tokio::test]
async fn test_full_turn_through_the_http_client() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/messages")
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(sse_body())
        .expect(1)
        .create_async()
        .await;

    let client = ClaudeClient::new("test-key".to_string())
        .unwrap()
        .with_base_url(format!("{}/v1/messages", server.url()));

    let agent = AgentLoop::new(
        Arc::new(client),
        SandboxExecutor::new(),
        Arc::new(AutoApprovalGate),
    );
    let mut ctx = SessionContext::new();
    let (events, _rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();

    let outcome = agent
        .run_turn(&mut ctx, "how do the muon tracks look?", &events, &cancel)
        .await
        .unwrap();

    assert!(matches!(outcome, TurnOutcome::Completed { .. }));
    assert_eq!(ctx.history.message_count(), 2);
    assert_eq!(ctx.history.all()[1].text(), "Muon tracks look clean.");
    let usage = ctx.usage.snapshot();
    assert_eq!(usage.input_tokens, 10);
    assert_eq!(usage.output_tokens, 9);
    mock.assert_async().await;
}
