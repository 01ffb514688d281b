// Sandboxed code execution
//
// Runs one python/bash/CLI invocation per call inside an ephemeral
// workspace. The safety policy runs before anything is spawned; a run
// failure, a spawn error, and a timeout all come back as normal results so
// the conversation can carry them back to the model.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::policy;
use super::resources::estimate_resources;
use super::workspace::Workspace;

pub const STDOUT_CAP: usize = 10_000;
pub const STDERR_CAP: usize = 5_000;
const TRUNCATION_MARKER: &str = "...[truncated]";

// Exit code reported when the policy refuses to run a command.
const EXIT_BLOCKED: i32 = 126;
// Exit code reported when the wall-clock limit kills a run.
const EXIT_TIMED_OUT: i32 = 124;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionKind {
    Python,
    Bash,
    OpenCern,
}

#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub kind: ExecutionKind,
    pub code: String,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub duration_ms: u64,
    /// base64 data URIs of plots generated by the run
    pub images: Vec<String>,
    pub resource_warning: Option<String>,
}

impl ExecutionResult {
    fn failure(stderr: String, exit_code: i32, duration_ms: u64) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr,
            exit_code,
            duration_ms,
            images: Vec::new(),
            resource_warning: None,
        }
    }
}

pub struct SandboxExecutor {
    data_dir: Option<PathBuf>,
    cli_command: String,
}

impl SandboxExecutor {
    pub fn new() -> Self {
        Self {
            data_dir: None,
            cli_command: "opencern".to_string(),
        }
    }

    /// Directory exposed to runs via OPENCERN_DATA.
    pub fn with_data_dir(mut self, data_dir: PathBuf) -> Self {
        self.data_dir = Some(data_dir);
        self
    }

    /// Override the CLI binary invoked by the opencern_cli tool.
    pub fn with_cli_command(mut self, cli_command: impl Into<String>) -> Self {
        self.cli_command = cli_command.into();
        self
    }

    pub async fn execute(&self, request: &ExecutionRequest) -> ExecutionResult {
        match request.kind {
            ExecutionKind::Python => self.execute_python(&request.code, request.timeout_ms).await,
            ExecutionKind::Bash => self.execute_bash(&request.code, request.timeout_ms).await,
            ExecutionKind::OpenCern => self.execute_cli(&request.code, request.timeout_ms).await,
        }
    }

    pub async fn execute_python(&self, code: &str, timeout_ms: u64) -> ExecutionResult {
        let start = Instant::now();
        let workspace = match Workspace::create() {
            Ok(workspace) => workspace,
            Err(e) => return ExecutionResult::failure(e.to_string(), 1, elapsed_ms(start)),
        };

        let script = workspace.file_path("script.py");
        let source = format!("{}\n{}", python_preamble(workspace.path()), code);
        if let Err(e) = tokio::fs::write(&script, source).await {
            return ExecutionResult::failure(e.to_string(), 1, elapsed_ms(start));
        }

        let mut command = Command::new("python3");
        command
            .arg(&script)
            .current_dir(workspace.path())
            .env("PYTHONDONTWRITEBYTECODE", "1")
            .env("MPLBACKEND", "Agg");
        if let Some(data_dir) = &self.data_dir {
            command.env("OPENCERN_DATA", data_dir);
        }

        let mut result = run_capped(command, timeout_ms, start).await;
        result.images = workspace.collect_images();
        result.resource_warning = estimate_resources(code).warning;
        result
        // workspace drops here: script and directory are gone on every path
    }

    pub async fn execute_bash(&self, command_line: &str, timeout_ms: u64) -> ExecutionResult {
        let start = Instant::now();

        if let Some(reason) = policy::check_command(command_line) {
            return ExecutionResult::failure(format!("Blocked: {}", reason), EXIT_BLOCKED, 0);
        }

        let workspace = match Workspace::create() {
            Ok(workspace) => workspace,
            Err(e) => return ExecutionResult::failure(e.to_string(), 1, elapsed_ms(start)),
        };

        let mut command = Command::new("bash");
        command
            .arg("-c")
            .arg(command_line)
            .current_dir(workspace.path());
        if let Some(data_dir) = &self.data_dir {
            command.env("OPENCERN_DATA", data_dir);
        }

        let mut result = run_capped(command, timeout_ms, start).await;
        result.images = workspace.collect_images();
        result
    }

    /// CLI invocations go through the bash path so the same policy applies.
    pub async fn execute_cli(&self, args: &str, timeout_ms: u64) -> ExecutionResult {
        self.execute_bash(&format!("{} {}", self.cli_command, args), timeout_ms)
            .await
    }
}

impl Default for SandboxExecutor {
    fn default() -> Self {
        Self::new()
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

/// Preamble injected ahead of submitted python code: forces a non-interactive
/// plotting backend and reroutes plt.show() into workspace files.
fn python_preamble(out_dir: &Path) -> String {
    format!(
        r#"import os, sys
os.environ['MPLBACKEND'] = 'Agg'
_OPENCERN_OUT = '{}'
try:
    import matplotlib
    matplotlib.use('Agg')
    import matplotlib.pyplot as plt
    _orig_show = plt.show
    def _save_show(*a, **k):
        fig = plt.gcf()
        fig.savefig(os.path.join(_OPENCERN_OUT, 'fig_%d.png' % len(os.listdir(_OPENCERN_OUT))), dpi=150, bbox_inches='tight')
    plt.show = _save_show
except ImportError:
    pass
"#,
        out_dir.display()
    )
}

/// Spawn the prepared command, enforce the wall-clock limit, and capture
/// capped stdout/stderr. Whatever output arrived before a timeout is kept.
async fn run_capped(mut command: Command, timeout_ms: u64, start: Instant) -> ExecutionResult {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e) => {
            warn!("Failed to spawn subprocess: {}", e);
            return ExecutionResult::failure(e.to_string(), 1, elapsed_ms(start));
        }
    };

    let stdout = child.stdout.take().expect("stdout was piped");
    let stderr = child.stderr.take().expect("stderr was piped");
    let (stdout_task, stdout_buf) = spawn_reader(stdout, STDOUT_CAP);
    let (stderr_task, stderr_buf) = spawn_reader(stderr, STDERR_CAP);

    let (success, exit_code, grace) =
        match timeout(Duration::from_millis(timeout_ms), child.wait()).await {
            Ok(Ok(status)) => (
                status.success(),
                status.code().unwrap_or(-1),
                Duration::from_millis(500),
            ),
            Ok(Err(e)) => {
                warn!("Failed waiting on subprocess: {}", e);
                (false, 1, Duration::from_millis(100))
            }
            Err(_) => {
                debug!(timeout_ms, "Subprocess hit the wall-clock limit");
                let _ = child.kill().await;
                (false, EXIT_TIMED_OUT, Duration::from_millis(100))
            }
        };

    // A grandchild that inherited the pipe can keep it open past the
    // parent's exit; the grace period bounds how long we wait for EOF.
    settle(stdout_task, grace).await;
    settle(stderr_task, grace).await;

    let stdout = drain_buffer(&stdout_buf, STDOUT_CAP);
    let stderr = drain_buffer(&stderr_buf, STDERR_CAP);

    ExecutionResult {
        success,
        stdout,
        stderr,
        exit_code,
        duration_ms: elapsed_ms(start),
        images: Vec::new(),
        resource_warning: None,
    }
}

type SharedBuffer = std::sync::Arc<std::sync::Mutex<Vec<u8>>>;

/// Drain a pipe into a shared buffer, capping what is kept but always
/// reading so the child never stalls on a full pipe.
fn spawn_reader<R>(mut reader: R, cap: usize) -> (tokio::task::JoinHandle<()>, SharedBuffer)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let buffer: SharedBuffer = Default::default();
    let shared = buffer.clone();
    let task = tokio::spawn(async move {
        let mut chunk = [0u8; 4096];
        loop {
            match reader.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    let mut kept = shared.lock().expect("reader buffer lock");
                    if kept.len() <= cap {
                        kept.extend_from_slice(&chunk[..n]);
                    }
                }
            }
        }
    });
    (task, buffer)
}

async fn settle(mut task: tokio::task::JoinHandle<()>, grace: Duration) {
    if timeout(grace, &mut task).await.is_err() {
        task.abort();
    }
}

fn drain_buffer(buffer: &SharedBuffer, cap: usize) -> String {
    let bytes = buffer.lock().expect("reader buffer lock");
    truncate_output(&String::from_utf8_lossy(&bytes), cap)
}

fn truncate_output(text: &str, cap: usize) -> String {
    if text.len() <= cap {
        return text.to_string();
    }
    let mut end = cap;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}{}", &text[..end], TRUNCATION_MARKER)
}
