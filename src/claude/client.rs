// HTTP client for the Claude Messages API (streaming)

use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde::Deserialize;

use crate::error::{AgentError, Result};

use super::stream::{StreamDecoder, StreamEvent};
use super::types::MessageRequest;

const CLAUDE_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
// Streams stay open for the full model turn, well past a single exchange.
const REQUEST_TIMEOUT_SECS: u64 = 300;

/// Decoded events from one open model stream.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>;

/// Anything that can answer a message request with a stream of events.
/// The agent loop depends on this seam; tests script it.
#[async_trait]
pub trait StreamingModel: Send + Sync {
    async fn open_stream(&self, request: &MessageRequest) -> Result<EventStream>;
}

pub struct ClaudeClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl ClaudeClient {
    pub fn new(api_key: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            api_key,
            base_url: CLAUDE_API_URL.to_string(),
        })
    }

    /// Point the client at a different endpoint (tests use a local server).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn classify_status(status: reqwest::StatusCode, body: &str) -> AgentError {
        let message = serde_json::from_str::<ApiErrorBody>(body)
            .map(|parsed| parsed.error.message)
            .unwrap_or_else(|_| body.to_string());

        match status.as_u16() {
            401 | 403 => AgentError::Auth(format!(
                "{} - check the api_key in ~/.opencern/config.toml",
                message
            )),
            429 => AgentError::RateLimited(format!("{} - wait a moment and try again", message)),
            _ => AgentError::Api {
                status: status.as_u16(),
                message,
            },
        }
    }
}

#[async_trait]
impl StreamingModel for ClaudeClient {
    async fn open_stream(&self, request: &MessageRequest) -> Result<EventStream> {
        tracing::debug!(
            model = %request.model,
            messages = request.messages.len(),
            "Opening message stream"
        );

        let response = self
            .client
            .post(&self.base_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = %status, "Claude API request failed");
            return Err(Self::classify_status(status, &body));
        }

        Ok(decode_stream(response.bytes_stream()))
    }
}

/// Drive raw response bytes through the frame decoder.
fn decode_stream(
    bytes: impl Stream<Item = std::result::Result<bytes::Bytes, reqwest::Error>> + Send + 'static,
) -> EventStream {
    let state = (bytes.boxed(), StreamDecoder::new(), VecDeque::new());
    Box::pin(futures::stream::unfold(
        state,
        |(mut bytes, mut decoder, mut pending)| async move {
            loop {
                if let Some(event) = pending.pop_front() {
                    return Some((Ok(event), (bytes, decoder, pending)));
                }
                match bytes.next().await {
                    Some(Ok(chunk)) => pending.extend(decoder.feed(&chunk)),
                    Some(Err(e)) => {
                        return Some((Err(AgentError::Network(e)), (bytes, decoder, pending)))
                    }
                    None => return None,
                }
            }
        },
    ))
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(rename = "type", default)]
    _error_type: String,
    message: String,
}
