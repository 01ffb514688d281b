// Interactive REPL driving the agent loop
//
// Thin front end: reads one user turn at a time, streams tokens to stdout,
// prompts for tool approval, and refuses new input while a turn is running
// (the readline only comes back once the loop settles).

use std::io::Write as _;
use std::sync::Arc;

use anyhow::Result;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::agent::{
    approval_channel, AgentEvent, AgentLoop, ApprovalDecision, ApprovalGate, ApprovalPrompt,
    AutoApprovalGate, PendingToolCall, SessionContext, TurnOutcome, DEFAULT_SYSTEM_PROMPT,
};
use crate::claude::ClaudeClient;
use crate::config::Config;
use crate::sandbox::SandboxExecutor;

pub struct Repl {
    agent: AgentLoop,
    ctx: SessionContext,
}

impl Repl {
    pub fn new(config: Config) -> Result<Self> {
        let client = ClaudeClient::new(config.api_key.clone())?;

        let mut executor = SandboxExecutor::new();
        if let Some(data_dir) = config.data_dir.clone() {
            executor = executor.with_data_dir(data_dir);
        }

        let gate: Arc<dyn ApprovalGate> = if config.features.auto_approve_tools {
            Arc::new(AutoApprovalGate)
        } else {
            let (gate, prompts) = approval_channel();
            spawn_approval_prompter(prompts);
            Arc::new(gate)
        };

        let agent = AgentLoop::new(Arc::new(client), executor, gate)
            .with_model(config.model)
            .with_max_tokens(config.max_tokens)
            .with_max_iterations(config.max_iterations)
            .with_timeouts(config.timeouts)
            .with_system_prompt(DEFAULT_SYSTEM_PROMPT);

        Ok(Self {
            agent,
            ctx: SessionContext::new(),
        })
    }

    pub async fn run(&mut self) -> Result<()> {
        let mut editor = DefaultEditor::new()?;
        println!(
            "OpenCERN analysis assistant. /usage /clear /experiment /quit, Ctrl-C cancels a turn."
        );

        loop {
            let line = match editor.readline("opencern> ") {
                Ok(line) => line,
                Err(ReadlineError::Interrupted) => continue,
                Err(ReadlineError::Eof) => break,
                Err(e) => return Err(e.into()),
            };

            let input = line.trim();
            if input.is_empty() {
                continue;
            }
            let _ = editor.add_history_entry(input);

            match input {
                "/quit" | "/exit" => break,
                "/clear" => {
                    self.ctx.clear();
                    println!("History cleared.");
                    continue;
                }
                "/usage" => {
                    for line in self.ctx.usage.formatted() {
                        println!("{}", line);
                    }
                    continue;
                }
                _ if input.starts_with("/experiment") => {
                    let name = input.trim_start_matches("/experiment").trim();
                    if name.is_empty() {
                        println!("Usage: /experiment <name>");
                    } else {
                        self.ctx.analysis.experiment = Some(name.to_string());
                        println!("Experiment set to {}.", name);
                    }
                    continue;
                }
                _ => {}
            }

            self.run_one_turn(input).await;
        }

        Ok(())
    }

    async fn run_one_turn(&mut self, input: &str) {
        let cancel = CancellationToken::new();
        let cancel_on_ctrl_c = cancel.clone();
        let signal_watcher = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                debug!("Ctrl-C received; cancelling turn");
                cancel_on_ctrl_c.cancel();
            }
        });

        let (events, event_rx) = mpsc::unbounded_channel();
        let printer = tokio::spawn(print_events(event_rx));

        let outcome = self
            .agent
            .run_turn(&mut self.ctx, input, &events, &cancel)
            .await;

        drop(events);
        let _ = printer.await;
        signal_watcher.abort();

        match outcome {
            Ok(TurnOutcome::Completed { .. }) => {}
            Ok(TurnOutcome::Interrupted { .. }) => println!("[turn interrupted]"),
            Err(e) => eprintln!("\nError: {}", e),
        }
        println!();
    }
}

/// Own the approval prompt: render each pending call and resolve its
/// responder from a y/N answer.
fn spawn_approval_prompter(mut prompts: mpsc::UnboundedReceiver<ApprovalPrompt>) {
    tokio::spawn(async move {
        while let Some(prompt) = prompts.recv().await {
            let decision = ask_on_stdin(&prompt.call).await;
            let _ = prompt.respond.send(decision);
        }
    });
}

async fn ask_on_stdin(call: &PendingToolCall) -> ApprovalDecision {
    println!("\n* Tool request: {}", call.kind.name());
    for line in call.display_text.lines() {
        println!("    {}", line);
    }
    if let Some(warning) = &call.resource_warning {
        println!("    ! {}", warning);
    }
    print!("  Approve? [y/N] ");
    let _ = std::io::stdout().flush();

    let answer = tokio::task::spawn_blocking(|| {
        let mut line = String::new();
        let _ = std::io::stdin().read_line(&mut line);
        line
    })
    .await
    .unwrap_or_default();

    match answer.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => ApprovalDecision::Approve,
        _ => ApprovalDecision::Deny,
    }
}

async fn print_events(mut events: mpsc::UnboundedReceiver<AgentEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            AgentEvent::Token(token) => {
                print!("{}", token);
                let _ = std::io::stdout().flush();
            }
            // The approval prompter renders the call itself.
            AgentEvent::ToolCall(_) => {}
            AgentEvent::ToolDecision { approved, .. } => {
                if !approved {
                    println!("  denied");
                }
            }
            AgentEvent::ToolResult {
                success,
                output,
                images,
                duration_ms,
                ..
            } => {
                println!("\n  [{} in {}ms]", if success { "ok" } else { "failed" }, duration_ms);
                for line in output.lines().take(20) {
                    println!("  {}", line);
                }
                if !images.is_empty() {
                    println!("  [{} plot(s) captured]", images.len());
                }
            }
            AgentEvent::Done { usage } => {
                println!("\n({} tokens this session)", usage.total_tokens);
            }
            AgentEvent::Interrupted => {}
        }
    }
}
