// Configuration structs

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::agent::DEFAULT_MAX_ITERATIONS;
use crate::claude::{DEFAULT_MAX_TOKENS, DEFAULT_MODEL};
use crate::tools::Timeouts;

/// Feature flags configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeaturesConfig {
    /// Approve every tool call without prompting. Tools can run arbitrary
    /// code, so this stays off unless explicitly requested.
    #[serde(default)]
    pub auto_approve_tools: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Anthropic API key
    #[serde(default)]
    pub api_key: String,

    /// Model id used for every request
    #[serde(default = "default_model")]
    pub model: String,

    /// Per-response token budget
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Model round-trips allowed per user request
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Directory exposed to sandboxed runs via OPENCERN_DATA
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    /// Per-tool execution timeouts
    #[serde(default)]
    pub timeouts: Timeouts,

    /// Feature flags (optional behaviors)
    #[serde(default)]
    pub features: FeaturesConfig,
}

impl Config {
    pub fn with_api_key(api_key: String) -> Self {
        Self {
            api_key,
            model: default_model(),
            max_tokens: default_max_tokens(),
            max_iterations: default_max_iterations(),
            data_dir: None,
            timeouts: Timeouts::default(),
            features: FeaturesConfig::default(),
        }
    }
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

fn default_max_iterations() -> usize {
    DEFAULT_MAX_ITERATIONS
}
