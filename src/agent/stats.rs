//! Session statistics.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Per-tool counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolUsage {
    pub count: u64,
    pub success: u64,
    pub failures: u64,
    /// Seconds.
    pub total_duration: f64,
}

/// Error counters by origin.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorCounts {
    pub api: u64,
    pub tool: u64,
    pub other: u64,
}

/// Aggregated usage for one session.
///
/// Written by the retry executor (API side) and the dispatcher (tool side);
/// everything else only reads it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsCollector {
    pub total_requests: u64,
    pub total_tokens: u64,
    /// Seconds spent waiting on successful API calls.
    pub total_api_time: f64,
    pub tool_usage: BTreeMap<String, ToolUsage>,
    pub errors: ErrorCounts,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_api_success(&mut self, elapsed: Duration, tokens: u64) {
        self.total_requests += 1;
        self.total_api_time += elapsed.as_secs_f64();
        self.total_tokens += tokens;
    }

    pub fn record_api_failure(&mut self) {
        self.total_requests += 1;
        self.errors.api += 1;
    }

    pub fn record_tool(&mut self, name: &str, success: bool, duration: Duration) {
        let usage = self.tool_usage.entry(name.to_string()).or_default();
        usage.count += 1;
        usage.total_duration += duration.as_secs_f64();
        if success {
            usage.success += 1;
        } else {
            usage.failures += 1;
            self.errors.tool += 1;
        }
    }

    pub fn record_other_error(&mut self) {
        self.errors.other += 1;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// One-line summary for the terminal.
    pub fn summary(&self) -> String {
        let tool_calls: u64 = self.tool_usage.values().map(|u| u.count).sum();
        format!(
            "{} requests, {} tokens, {:.1}s API, {} tool calls, errors api:{} tool:{} other:{}",
            self.total_requests,
            self.total_tokens,
            self.total_api_time,
            tool_calls,
            self.errors.api,
            self.errors.tool,
            self.errors.other
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_counters() {
        let mut stats = StatsCollector::new();
        stats.record_tool("bash", true, Duration::from_millis(500));
        stats.record_tool("bash", false, Duration::from_millis(250));

        let bash = &stats.tool_usage["bash"];
        assert_eq!(bash.count, 2);
        assert_eq!(bash.success, 1);
        assert_eq!(bash.failures, 1);
        assert!((bash.total_duration - 0.75).abs() < 1e-9);
        assert_eq!(stats.errors.tool, 1);
    }

    #[test]
    fn test_api_counters_and_reset() {
        let mut stats = StatsCollector::new();
        stats.record_api_failure();
        stats.record_api_success(Duration::from_secs(2), 120);
        assert_eq!(stats.total_requests, 2);
        assert_eq!(stats.total_tokens, 120);
        assert_eq!(stats.errors.api, 1);
        assert!(stats.summary().contains("120 tokens"));

        stats.reset();
        assert_eq!(stats, StatsCollector::default());
    }

    #[test]
    fn test_serialized_shape() {
        let mut stats = StatsCollector::new();
        stats.record_tool("bash", true, Duration::ZERO);
        let value = serde_json::to_value(&stats).unwrap();
        assert_eq!(value["tool_usage"]["bash"]["count"], 1);
        assert_eq!(value["errors"]["api"], 0);
    }
}
