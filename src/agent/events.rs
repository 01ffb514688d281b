// Events surfaced to the caller while a turn runs

use super::approval::PendingToolCall;
use super::usage::SessionUsage;

/// Live progress of one agentic turn, in the order things happen: tokens as
/// they stream, each proposed call, the decision, its result, and finally
/// either completion or interruption.
#[derive(Debug, Clone)]
pub enum AgentEvent {
    /// A fragment of assistant text, forwarded as soon as it decodes.
    Token(String),
    /// A tool call awaiting approval.
    ToolCall(PendingToolCall),
    /// The human (or auto-approve) decided.
    ToolDecision { id: String, approved: bool },
    /// Outcome of one execution.
    ToolResult {
        id: String,
        success: bool,
        output: String,
        images: Vec<String>,
        duration_ms: u64,
    },
    /// The turn finished normally.
    Done { usage: SessionUsage },
    /// The turn was cancelled; partial text was preserved.
    Interrupted,
}
