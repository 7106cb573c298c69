//! Per-stage timing aggregation and the external reporting sink.
//!
//! The decomposition collaborator and the pipeline itself record
//! `(stage, seconds)` samples into a [`TimingCollector`]. Summaries are
//! normalized per page: one designated heartbeat stage is emitted exactly once
//! per processed page, and every stage's total is divided by the heartbeat
//! count rather than by its own sample count.

use std::collections::BTreeMap;
use std::io::Write;
use std::process::{Command, Stdio};

use log::warn;
use serde_json::Value;

/// Stage name emitted once per page by the decomposition step; its sample
/// count is the page count used for averaging.
pub const HEARTBEAT_STAGE: &str = "fg_partial_blur";

/// Accumulates per-stage timing samples.
#[derive(Debug, Default)]
pub struct TimingCollector {
    samples: Vec<(String, f64)>,
}

impl TimingCollector {
    /// Create an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one sample.
    pub fn add(&mut self, stage: &str, seconds: f64) {
        self.samples.push((stage.to_string(), seconds));
    }

    /// Whether any samples were recorded since the last reset.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Per-page average duration of every stage, in integer milliseconds.
    ///
    /// Stage totals are divided by the number of heartbeat samples. Returns
    /// an empty map when no heartbeat was seen (nothing to normalize by).
    pub fn summary(&self) -> BTreeMap<String, u64> {
        let heartbeats = self
            .samples
            .iter()
            .filter(|(stage, _)| stage == HEARTBEAT_STAGE)
            .count();

        let mut sums: BTreeMap<String, f64> = BTreeMap::new();
        for (stage, seconds) in &self.samples {
            *sums.entry(stage.clone()).or_insert(0.0) += seconds;
        }

        if heartbeats == 0 {
            return BTreeMap::new();
        }

        sums.into_iter()
            .map(|(stage, total)| (stage, (total / heartbeats as f64 * 1000.0) as u64))
            .collect()
    }

    /// Drop all accumulated samples, starting a fresh aggregation window.
    pub fn reset(&mut self) {
        self.samples.clear();
    }
}

/// External reporting sink: a subprocess fed one JSON document on stdin per
/// report. Fire-and-forget; sink failures are logged and never fatal.
#[derive(Debug, Clone)]
pub struct Reporter {
    command: Vec<String>,
}

impl Reporter {
    /// Create a reporter from a command line (program plus arguments).
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }

    /// Create a reporter from a whitespace-separated command string.
    pub fn from_str(command: &str) -> Option<Self> {
        let parts: Vec<String> = command.split_whitespace().map(String::from).collect();
        if parts.is_empty() {
            None
        } else {
            Some(Self::new(parts))
        }
    }

    /// Send one report document to the sink.
    pub fn report(&self, payload: &Value) {
        let data = payload.to_string();
        let result = Command::new(&self.command[0])
            .args(&self.command[1..])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .and_then(|mut child| {
                if let Some(stdin) = child.stdin.as_mut() {
                    stdin.write_all(data.as_bytes())?;
                }
                child.wait()
            });

        if let Err(err) = result {
            warn!("reporting sink '{}' failed: {}", self.command[0], err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_normalizes_by_heartbeat_count() {
        let mut timing = TimingCollector::new();
        // Two pages worth of samples.
        timing.add(HEARTBEAT_STAGE, 0.010);
        timing.add(HEARTBEAT_STAGE, 0.030);
        timing.add("bg_downsample", 0.100);
        timing.add("bg_downsample", 0.300);
        timing.add("mask_encode", 0.500);

        let summary = timing.summary();
        assert_eq!(summary[HEARTBEAT_STAGE], 20);
        assert_eq!(summary["bg_downsample"], 200);
        // Single sample still divided by the heartbeat count, not its own.
        assert_eq!(summary["mask_encode"], 250);
    }

    #[test]
    fn test_summary_without_heartbeat_is_empty() {
        let mut timing = TimingCollector::new();
        timing.add("bg_downsample", 1.0);
        assert!(timing.summary().is_empty());
    }

    #[test]
    fn test_reset_clears_window() {
        let mut timing = TimingCollector::new();
        timing.add(HEARTBEAT_STAGE, 1.0);
        timing.reset();
        assert!(timing.is_empty());
    }

    #[test]
    fn test_reporter_from_str() {
        assert!(Reporter::from_str("").is_none());
        let reporter = Reporter::from_str("statsd-report --flush").unwrap();
        assert_eq!(reporter.command, vec!["statsd-report", "--flush"]);
    }
}
