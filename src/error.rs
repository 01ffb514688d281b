// Engine error taxonomy
//
// Anything the model can react to (denials, failed executions, truncated
// output, blocked commands) is fed back as conversation content and never
// surfaces here. These variants are the conditions that make continuing a
// turn meaningless.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    /// Credential rejected by the API (401/403).
    #[error("invalid API key: {0}")]
    Auth(String),

    /// Too many requests (429). Not retried automatically.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Connection-level failure talking to the API.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Non-success HTTP status that is neither auth nor rate limiting.
    #[error("Claude API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// An `error` frame delivered inside an open stream.
    #[error("stream error: {0}")]
    Stream(String),

    /// The loop safety valve fired before the model stopped requesting tools.
    #[error("agent loop reached the iteration cap ({0}) without completing")]
    MaxIterations(usize),

    /// Bad or missing configuration.
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AgentError>;
