// Agentic engine: conversation state, approval boundary, bounded loop

pub mod approval;
pub mod events;
pub mod history;
pub mod runner;
pub mod session;
pub mod usage;

pub use approval::{
    approval_channel, ApprovalDecision, ApprovalGate, ApprovalPrompt, AutoApprovalGate,
    ChannelApprovalGate, PendingToolCall, ToolCallStatus,
};
pub use events::AgentEvent;
pub use history::ConversationHistory;
pub use runner::{AgentLoop, TurnOutcome, DEFAULT_MAX_ITERATIONS};
pub use session::{AnalysisContext, SessionContext};
pub use usage::{SessionUsage, UsageTracker};

/// Session persona sent as the system prompt unless overridden.
pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are a particle physics analysis assistant integrated into OpenCERN,
an open-source CERN data analysis platform. You have deep expertise in:
- Particle physics: Standard Model, LHC experiments (CMS, ATLAS, ALICE, LHCb)
- Data formats: ROOT files, HEP data formats, CERN Open Data Portal
- Analysis techniques: event selection, kinematic variables (pT, eta, phi, HT), invariant mass
- Statistics: significance, p-values, systematic uncertainties

You have access to tools for executing Python code, bash commands, and OpenCERN CLI operations.
Use tools when the user needs data analysis, computation, or file operations.
Always explain your reasoning before using a tool.

When analyzing data, use proper physics notation and terminology.
Suggest concrete next analysis steps.
Be concise but technically precise.";
