// Human-in-the-loop approval boundary
//
// The loop presents exactly one proposed tool call at a time and awaits a
// decision before touching the next one. The channel-backed gate lets a UI
// task own the actual prompt: each request carries a oneshot responder, so
// "approve" and "deny" resolve the pending future directly.

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::claude::ToolUse;
use crate::sandbox::estimate_resources;
use crate::tools::{display_text, ToolKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalDecision {
    Approve,
    Deny,
}

/// Pipeline bookkeeping for one proposed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolCallStatus {
    Pending,
    Approved,
    Denied,
    Running,
    Success,
    Failed,
}

/// A proposed tool call as shown to the approver.
#[derive(Debug, Clone)]
pub struct PendingToolCall {
    pub id: String,
    pub kind: ToolKind,
    pub input: Value,
    pub display_text: String,
    pub resource_warning: Option<String>,
    pub status: ToolCallStatus,
}

impl PendingToolCall {
    pub fn from_tool_use(kind: ToolKind, tool_use: &ToolUse) -> Self {
        let resource_warning = match kind {
            ToolKind::Python => tool_use
                .input
                .get("code")
                .and_then(Value::as_str)
                .and_then(|code| estimate_resources(code).warning),
            _ => None,
        };

        Self {
            id: tool_use.id.clone(),
            kind,
            input: tool_use.input.clone(),
            display_text: display_text(kind, &tool_use.input),
            resource_warning,
            status: ToolCallStatus::Pending,
        }
    }
}

#[async_trait]
pub trait ApprovalGate: Send + Sync {
    /// Present one proposed call and block until the human decides.
    async fn review(&self, call: &PendingToolCall) -> ApprovalDecision;
}

/// One queued request for the UI side of the channel gate.
#[derive(Debug)]
pub struct ApprovalPrompt {
    pub call: PendingToolCall,
    pub respond: oneshot::Sender<ApprovalDecision>,
}

/// Gate that forwards requests to a UI task and awaits its answer.
pub struct ChannelApprovalGate {
    tx: mpsc::UnboundedSender<ApprovalPrompt>,
}

/// Create the gate plus the receiver the UI task drains.
pub fn approval_channel() -> (
    ChannelApprovalGate,
    mpsc::UnboundedReceiver<ApprovalPrompt>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ChannelApprovalGate { tx }, rx)
}

#[async_trait]
impl ApprovalGate for ChannelApprovalGate {
    async fn review(&self, call: &PendingToolCall) -> ApprovalDecision {
        let (respond, response) = oneshot::channel();
        let prompt = ApprovalPrompt {
            call: call.clone(),
            respond,
        };

        // A missing UI (closed channel or dropped responder) counts as deny.
        if self.tx.send(prompt).is_err() {
            return ApprovalDecision::Deny;
        }
        response.await.unwrap_or(ApprovalDecision::Deny)
    }
}

/// Approves everything. Tests and the --auto-approve flag.
pub struct AutoApprovalGate;

#[async_trait]
impl ApprovalGate for AutoApprovalGate {
    async fn review(&self, _call: &PendingToolCall) -> ApprovalDecision {
        ApprovalDecision::Approve
    }
}
