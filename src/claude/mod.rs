// Claude API integration: wire types, streaming decoder, HTTP client

pub mod client;
pub mod stream;
pub mod types;

pub use client::{ClaudeClient, EventStream, StreamingModel};
pub use stream::{StreamDecoder, StreamEvent};
pub use types::{
    ContentBlock, Message, MessageContent, MessageRequest, Role, ToolUse, DEFAULT_MAX_TOKENS,
    DEFAULT_MODEL,
};
