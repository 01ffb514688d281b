// Agent loop - bounded multi-turn orchestration
//
// One user request drives: model stream -> buffered tool calls -> approval
// -> sandboxed execution -> results appended -> next round, until the model
// stops asking for tools or the iteration cap fires. Tool calls are handled
// strictly sequentially, in emission order, with at most one pending
// approval at a time.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::claude::{
    ContentBlock, Message, MessageRequest, StreamEvent, StreamingModel, ToolUse,
    DEFAULT_MAX_TOKENS, DEFAULT_MODEL,
};
use crate::error::{AgentError, Result};
use crate::sandbox::{ExecutionKind, ExecutionRequest, ExecutionResult, SandboxExecutor};
use crate::tools::{builtin_tools, Timeouts, ToolKind};

use super::approval::{ApprovalDecision, ApprovalGate, PendingToolCall, ToolCallStatus};
use super::events::AgentEvent;
use super::session::SessionContext;

pub const DEFAULT_MAX_ITERATIONS: usize = 10;

const DENIED_MESSAGE: &str = "User denied this tool execution.";
const INTERRUPTED_MESSAGE: &str = "Interrupted before execution.";

/// How one turn ended (errors are returned separately).
#[derive(Debug)]
pub enum TurnOutcome {
    Completed { usage: super::usage::SessionUsage },
    /// Cancelled mid-turn; whatever text had streamed is kept in history.
    Interrupted { partial_text: String },
}

pub struct AgentLoop {
    model: Arc<dyn StreamingModel>,
    executor: SandboxExecutor,
    gate: Arc<dyn ApprovalGate>,
    model_id: String,
    max_tokens: u32,
    system_prompt: Option<String>,
    max_iterations: usize,
    timeouts: Timeouts,
}

impl AgentLoop {
    pub fn new(
        model: Arc<dyn StreamingModel>,
        executor: SandboxExecutor,
        gate: Arc<dyn ApprovalGate>,
    ) -> Self {
        Self {
            model,
            executor,
            gate,
            model_id: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            system_prompt: None,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            timeouts: Timeouts::default(),
        }
    }

    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = model_id.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Run one user request to completion, cancellation, or a terminal
    /// error. Token events are forwarded as they stream; the cancellation
    /// token is observed at every chunk read and at each tool boundary.
    pub async fn run_turn(
        &self,
        ctx: &mut SessionContext,
        user_input: &str,
        events: &mpsc::UnboundedSender<AgentEvent>,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome> {
        ctx.history.append(Message::user(user_input));

        for iteration in 0..self.max_iterations {
            debug!(session = %ctx.id, iteration, "Starting model round-trip");

            let round = match self.stream_round(ctx, events, cancel).await? {
                RoundResult::Finished(round) => round,
                RoundResult::Interrupted(partial_text) => {
                    // Mid-stream cancellation: keep what already streamed as
                    // the assistant's message.
                    info!("Turn interrupted mid-stream; preserving partial text");
                    if !partial_text.is_empty() {
                        ctx.history.append(Message::assistant(&partial_text));
                    }
                    let _ = events.send(AgentEvent::Interrupted);
                    return Ok(TurnOutcome::Interrupted { partial_text });
                }
            };

            ctx.usage
                .record_message(round.input_tokens, round.output_tokens);
            ctx.history.append(assemble_assistant_message(&round));

            if round.tool_uses.is_empty() {
                let usage = ctx.usage.snapshot();
                let _ = events.send(AgentEvent::Done {
                    usage: usage.clone(),
                });
                info!(iterations = iteration + 1, "Turn completed");
                return Ok(TurnOutcome::Completed { usage });
            }

            let interrupted = self
                .run_tool_phase(ctx, &round.tool_uses, events, cancel)
                .await;
            if interrupted {
                // The assistant message and synthesized results are already
                // in history; nothing more to append.
                info!("Turn interrupted at the tool boundary");
                let _ = events.send(AgentEvent::Interrupted);
                return Ok(TurnOutcome::Interrupted {
                    partial_text: round.text,
                });
            }
        }

        warn!(
            max_iterations = self.max_iterations,
            "Iteration cap reached"
        );
        Err(AgentError::MaxIterations(self.max_iterations))
    }

    /// Stream one model reply, forwarding tokens and buffering tool calls.
    async fn stream_round(
        &self,
        ctx: &SessionContext,
        events: &mpsc::UnboundedSender<AgentEvent>,
        cancel: &CancellationToken,
    ) -> Result<RoundResult> {
        let request = self.build_request(ctx);
        let mut stream = self.model.open_stream(&request).await?;

        let mut round = Round::default();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    return Ok(RoundResult::Interrupted(round.text));
                }
                event = stream.next() => {
                    let Some(event) = event else { break };
                    match event? {
                        StreamEvent::Token(token) => {
                            round.text.push_str(&token);
                            let _ = events.send(AgentEvent::Token(token));
                        }
                        StreamEvent::ToolCallStart { .. } | StreamEvent::ToolCallDelta { .. } => {}
                        StreamEvent::ToolCallStop(tool_use) => round.tool_uses.push(tool_use),
                        StreamEvent::Usage { input_tokens, output_tokens } => {
                            // message_start carries input, message_delta a
                            // running output total; keep the latest of each.
                            if input_tokens > 0 {
                                round.input_tokens = input_tokens;
                            }
                            if output_tokens > 0 {
                                round.output_tokens = output_tokens;
                            }
                        }
                        StreamEvent::Done => break,
                        StreamEvent::Error(message) => return Err(AgentError::Stream(message)),
                    }
                }
            }
        }
        Ok(RoundResult::Finished(round))
    }

    /// Approve and execute buffered calls in emission order. Returns true
    /// if cancellation cut the phase short (results for the remaining calls
    /// are still synthesized, so pairing with the assistant message holds).
    async fn run_tool_phase(
        &self,
        ctx: &mut SessionContext,
        tool_uses: &[ToolUse],
        events: &mpsc::UnboundedSender<AgentEvent>,
        cancel: &CancellationToken,
    ) -> bool {
        let mut results: Vec<ContentBlock> = Vec::with_capacity(tool_uses.len());
        let mut interrupted = false;

        for tool_use in tool_uses {
            if cancel.is_cancelled() {
                interrupted = true;
            }
            if interrupted {
                results.push(error_result(&tool_use.id, INTERRUPTED_MESSAGE));
                continue;
            }

            let Some(kind) = ToolKind::from_name(&tool_use.name) else {
                warn!(name = %tool_use.name, "Model requested an unknown tool");
                results.push(error_result(
                    &tool_use.id,
                    &format!("Unknown tool: {}", tool_use.name),
                ));
                continue;
            };

            let mut call = PendingToolCall::from_tool_use(kind, tool_use);
            let _ = events.send(AgentEvent::ToolCall(call.clone()));

            let decision = self.gate.review(&call).await;
            let approved = decision == ApprovalDecision::Approve;
            call.status = if approved {
                ToolCallStatus::Approved
            } else {
                ToolCallStatus::Denied
            };
            debug!(id = %call.id, status = ?call.status, "Approval decision recorded");
            let _ = events.send(AgentEvent::ToolDecision {
                id: call.id.clone(),
                approved,
            });

            if !approved {
                results.push(error_result(&tool_use.id, DENIED_MESSAGE));
                continue;
            }

            // Cancellation between approval and execution: skip the spawn.
            if cancel.is_cancelled() {
                interrupted = true;
                results.push(error_result(&tool_use.id, INTERRUPTED_MESSAGE));
                continue;
            }

            call.status = ToolCallStatus::Running;
            debug!(id = %call.id, status = ?call.status, "Executing tool call");
            let request = ExecutionRequest {
                kind: execution_kind(kind),
                code: tool_use
                    .input
                    .get(kind.input_field())
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                timeout_ms: kind.timeout_ms(&tool_use.input, &self.timeouts),
            };

            let result = self.executor.execute(&request).await;
            call.status = if result.success {
                ToolCallStatus::Success
            } else {
                ToolCallStatus::Failed
            };
            debug!(
                id = %call.id,
                status = ?call.status,
                duration_ms = result.duration_ms,
                "Tool execution finished"
            );
            ctx.usage.record_tool_call();

            let output = render_output(&result);
            let _ = events.send(AgentEvent::ToolResult {
                id: call.id.clone(),
                success: result.success,
                output: output.clone(),
                images: result.images.clone(),
                duration_ms: result.duration_ms,
            });

            results.push(ContentBlock::ToolResult {
                tool_use_id: tool_use.id.clone(),
                content: output,
                is_error: (!result.success).then_some(true),
            });
        }

        ctx.history.append(Message::tool_results(results));
        interrupted
    }

    fn build_request(&self, ctx: &SessionContext) -> MessageRequest {
        let mut request = MessageRequest::new(&self.model_id, ctx.history.all().to_vec())
            .with_tools(builtin_tools())
            .with_max_tokens(self.max_tokens);
        if let Some(system_prompt) = self.build_system_prompt(ctx) {
            request = request.with_system(system_prompt);
        }
        request
    }

    /// Base persona plus whatever analysis facts the session has recorded.
    fn build_system_prompt(&self, ctx: &SessionContext) -> Option<String> {
        match (&self.system_prompt, ctx.analysis.summary()) {
            (Some(base), Some(facts)) => {
                Some(format!("{}\n\nCurrent session context:\n{}", base, facts))
            }
            (Some(base), None) => Some(base.clone()),
            (None, Some(facts)) => Some(format!("Current session context:\n{}", facts)),
            (None, None) => None,
        }
    }
}

#[derive(Debug, Default)]
struct Round {
    text: String,
    tool_uses: Vec<ToolUse>,
    input_tokens: u64,
    output_tokens: u64,
}

enum RoundResult {
    Finished(Round),
    Interrupted(String),
}

fn assemble_assistant_message(round: &Round) -> Message {
    let mut blocks = Vec::new();
    if !round.text.is_empty() {
        blocks.push(ContentBlock::Text {
            text: round.text.clone(),
        });
    }
    for tool_use in &round.tool_uses {
        blocks.push(ContentBlock::ToolUse {
            id: tool_use.id.clone(),
            name: tool_use.name.clone(),
            input: tool_use.input.clone(),
        });
    }
    if blocks.is_empty() {
        // A stream can legally end without content; the API still requires
        // a non-empty assistant entry in the transcript.
        blocks.push(ContentBlock::Text {
            text: String::new(),
        });
    }
    Message::assistant_blocks(blocks)
}

fn execution_kind(kind: ToolKind) -> ExecutionKind {
    match kind {
        ToolKind::Python => ExecutionKind::Python,
        ToolKind::Bash => ExecutionKind::Bash,
        ToolKind::Cli => ExecutionKind::OpenCern,
    }
}

fn error_result(tool_use_id: &str, message: &str) -> ContentBlock {
    ContentBlock::ToolResult {
        tool_use_id: tool_use_id.to_string(),
        content: message.to_string(),
        is_error: Some(true),
    }
}

/// Combined stdout/stderr as fed back to the model.
fn render_output(result: &ExecutionResult) -> String {
    let mut output = String::new();
    if !result.stdout.is_empty() {
        output.push_str(&result.stdout);
    }
    if !result.stderr.is_empty() {
        if !output.is_empty() {
            output.push('\n');
        }
        output.push_str(&result.stderr);
    }
    if output.is_empty() {
        output = if result.success {
            "(no output)".to_string()
        } else {
            "(execution failed)".to_string()
        };
    }
    output
}
