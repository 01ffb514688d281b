// Session-level usage accounting

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Monotonic counters for one session; reset only by an explicit clear.
#[derive(Debug, Clone, Serialize)]
pub struct SessionUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    pub message_count: u64,
    pub tool_call_count: u64,
    pub session_start: DateTime<Utc>,
}

impl SessionUsage {
    fn fresh() -> Self {
        Self {
            input_tokens: 0,
            output_tokens: 0,
            total_tokens: 0,
            message_count: 0,
            tool_call_count: 0,
            session_start: Utc::now(),
        }
    }
}

#[derive(Debug)]
pub struct UsageTracker {
    usage: SessionUsage,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self {
            usage: SessionUsage::fresh(),
        }
    }

    /// Record one completed model round-trip.
    pub fn record_message(&mut self, input_tokens: u64, output_tokens: u64) {
        self.usage.input_tokens += input_tokens;
        self.usage.output_tokens += output_tokens;
        self.usage.total_tokens += input_tokens + output_tokens;
        self.usage.message_count += 1;
    }

    pub fn record_tool_call(&mut self) {
        self.usage.tool_call_count += 1;
    }

    pub fn snapshot(&self) -> SessionUsage {
        self.usage.clone()
    }

    pub fn reset(&mut self) {
        self.usage = SessionUsage::fresh();
    }

    /// Human-readable summary for the /usage command.
    pub fn formatted(&self) -> Vec<String> {
        let uptime = (Utc::now() - self.usage.session_start).num_seconds().max(0);
        let mins = uptime / 60;
        let secs = uptime % 60;

        vec![
            String::new(),
            "  Session Usage".to_string(),
            "  ----------------------------------------".to_string(),
            format!("  Input tokens      {}", self.usage.input_tokens),
            format!("  Output tokens     {}", self.usage.output_tokens),
            format!("  Total tokens      {}", self.usage.total_tokens),
            format!("  Messages          {}", self.usage.message_count),
            format!("  Tool executions   {}", self.usage.tool_call_count),
            format!("  Session uptime    {}m {}s", mins, secs),
            String::new(),
        ]
    }
}

impl Default for UsageTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let mut tracker = UsageTracker::new();
        tracker.record_message(100, 20);
        tracker.record_message(150, 30);
        tracker.record_tool_call();

        let usage = tracker.snapshot();
        assert_eq!(usage.input_tokens, 250);
        assert_eq!(usage.output_tokens, 50);
        assert_eq!(usage.total_tokens, 300);
        assert_eq!(usage.message_count, 2);
        assert_eq!(usage.tool_call_count, 1);
    }

    #[test]
    fn test_reset_zeroes_everything() {
        let mut tracker = UsageTracker::new();
        tracker.record_message(100, 20);
        tracker.record_tool_call();
        tracker.reset();

        let usage = tracker.snapshot();
        assert_eq!(usage.total_tokens, 0);
        assert_eq!(usage.message_count, 0);
        assert_eq!(usage.tool_call_count, 0);
    }

    #[test]
    fn test_formatted_includes_counts() {
        let mut tracker = UsageTracker::new();
        tracker.record_message(12, 34);
        let lines = tracker.formatted().join("\n");
        assert!(lines.contains("Input tokens      12"));
        assert!(lines.contains("Output tokens     34"));
        assert!(lines.contains("Total tokens      46"));
    }
}
