// Tool definitions and dispatch

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Tool definition (Claude API-compatible)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: ToolInputSchema,
}

/// JSON Schema for tool input parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInputSchema {
    #[serde(rename = "type")]
    pub schema_type: String,
    pub properties: Value,
    pub required: Vec<String>,
}

impl ToolInputSchema {
    fn object(properties: Value, required: &[&str]) -> Self {
        Self {
            schema_type: "object".to_string(),
            properties,
            required: required.iter().map(|name| name.to_string()).collect(),
        }
    }
}

/// The closed set of tools the engine can dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    Python,
    Bash,
    Cli,
}

impl ToolKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "execute_python" => Some(ToolKind::Python),
            "execute_bash" => Some(ToolKind::Bash),
            "opencern_cli" => Some(ToolKind::Cli),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ToolKind::Python => "execute_python",
            ToolKind::Bash => "execute_bash",
            ToolKind::Cli => "opencern_cli",
        }
    }

    /// The single required string field in this tool's input schema.
    pub fn input_field(&self) -> &'static str {
        match self {
            ToolKind::Python => "code",
            ToolKind::Bash => "command",
            ToolKind::Cli => "args",
        }
    }

    /// Effective wall-clock timeout: an explicit `timeout` in the input
    /// wins, otherwise the configured per-tool default applies.
    pub fn timeout_ms(&self, input: &Value, defaults: &Timeouts) -> u64 {
        input
            .get("timeout")
            .and_then(Value::as_u64)
            .unwrap_or(match self {
                ToolKind::Python => defaults.python_ms,
                ToolKind::Bash => defaults.bash_ms,
                ToolKind::Cli => defaults.cli_ms,
            })
    }
}

/// Per-tool default timeouts (milliseconds).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Timeouts {
    #[serde(default = "default_python_timeout")]
    pub python_ms: u64,
    #[serde(default = "default_shell_timeout")]
    pub bash_ms: u64,
    #[serde(default = "default_shell_timeout")]
    pub cli_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            python_ms: default_python_timeout(),
            bash_ms: default_shell_timeout(),
            cli_ms: default_shell_timeout(),
        }
    }
}

fn default_python_timeout() -> u64 {
    60_000
}

fn default_shell_timeout() -> u64 {
    30_000
}

/// The code or command text shown to the approver.
pub fn display_text(kind: ToolKind, input: &Value) -> String {
    let value = input.get(kind.input_field()).and_then(Value::as_str);
    match (kind, value) {
        (ToolKind::Cli, Some(args)) => format!("opencern {}", args),
        (_, Some(text)) => text.to_string(),
        // Input that never materialized (or lost its field) still has to
        // render for the approval prompt.
        (_, None) => input.to_string(),
    }
}

/// The tool list sent with every model request.
pub fn builtin_tools() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: "execute_python".to_string(),
            description: "Execute Python code for data analysis, visualization, or computation. \
                          Has access to numpy, pandas, matplotlib, scipy. Generated plots are \
                          captured automatically."
                .to_string(),
            input_schema: ToolInputSchema::object(
                json!({
                    "code": {
                        "type": "string",
                        "description": "Python code to execute"
                    },
                    "timeout": {
                        "type": "number",
                        "description": "Execution timeout in milliseconds (default: 60000)"
                    }
                }),
                &["code"],
            ),
        },
        ToolDefinition {
            name: "execute_bash".to_string(),
            description: "Execute a bash command. Restricted to safe operations - destructive \
                          commands are blocked."
                .to_string(),
            input_schema: ToolInputSchema::object(
                json!({
                    "command": {
                        "type": "string",
                        "description": "Bash command to execute"
                    },
                    "timeout": {
                        "type": "number",
                        "description": "Execution timeout in milliseconds (default: 30000)"
                    }
                }),
                &["command"],
            ),
        },
        ToolDefinition {
            name: "opencern_cli".to_string(),
            description: "Run an OpenCERN CLI command (e.g., download, process, status). Use \
                          this to interact with CERN data services programmatically."
                .to_string(),
            input_schema: ToolInputSchema::object(
                json!({
                    "args": {
                        "type": "string",
                        "description": "CLI arguments (e.g., \"download cms 2016\", \"process --file data.root\")"
                    }
                }),
                &["args"],
            ),
        },
    ]
}
