// Per-session state threaded explicitly through the loop

use uuid::Uuid;

use super::history::ConversationHistory;
use super::usage::UsageTracker;

/// Analysis facts accumulated during a session and surfaced to the model
/// through the system prompt.
#[derive(Debug, Clone, Default)]
pub struct AnalysisContext {
    pub experiment: Option<String>,
    pub downloaded_datasets: Vec<String>,
    pub processed_files: Vec<String>,
}

impl AnalysisContext {
    /// Bullet-list summary appended to the system prompt, or None when
    /// nothing has been recorded yet.
    pub fn summary(&self) -> Option<String> {
        let mut lines = Vec::new();
        if let Some(experiment) = &self.experiment {
            lines.push(format!("- Experiment: {}", experiment));
        }
        if !self.downloaded_datasets.is_empty() {
            lines.push(format!(
                "- Downloaded datasets: {}",
                self.downloaded_datasets.join(", ")
            ));
        }
        if !self.processed_files.is_empty() {
            lines.push(format!(
                "- Processed files: {}",
                self.processed_files.join(", ")
            ));
        }
        (!lines.is_empty()).then(|| lines.join("\n"))
    }
}

/// History plus usage for one session. Passed through the call chain so
/// independent sessions never share state.
#[derive(Debug)]
pub struct SessionContext {
    pub id: Uuid,
    pub history: ConversationHistory,
    pub usage: UsageTracker,
    pub analysis: AnalysisContext,
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionContext {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            history: ConversationHistory::new(),
            usage: UsageTracker::new(),
            analysis: AnalysisContext::default(),
        }
    }

    /// Atomic reset: drops the conversation and zeroes the usage counters.
    /// Analysis facts survive a clear; they describe the workspace, not the
    /// conversation.
    pub fn clear(&mut self) {
        self.history.clear();
        self.usage.reset();
    }
}
