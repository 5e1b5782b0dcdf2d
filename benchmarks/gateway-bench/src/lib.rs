//! Gateway benchmark harness
//!
//! Measures the latency and payload size of gateway calls in two modes:
//!
//! - **warm**: one in-process socket round trip per iteration, the cost a
//!   long-lived caller pays once the daemon is up
//! - **cold**: one full client-process spawn per iteration, the cost of
//!   shelling out to the `toolgate` binary every time
//!
//! The gap between the two is the daemon's reason to exist, so the harness
//! reports them side by side.

pub mod reporter;
pub mod runner;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub use reporter::{OutputFormat, Reporter};
pub use runner::{BenchRunner, RunnerConfig};

/// Rough bytes-per-token ratio used for the token-cost estimate.
pub const BYTES_PER_TOKEN: f64 = 4.0;

/// Benchmarked request shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Workload {
    /// Smallest possible round trip
    UnreadCount,
    /// Record-listing path with the batched detail query behind it
    Recent,
    /// Composed multi-section response
    Bundle,
}

impl Workload {
    pub fn all() -> &'static [Workload] {
        &[Workload::UnreadCount, Workload::Recent, Workload::Bundle]
    }

    pub fn method(&self) -> &'static str {
        match self {
            Workload::UnreadCount => "unread_count",
            Workload::Recent => "recent",
            Workload::Bundle => "bundle",
        }
    }

    pub fn params(&self) -> Value {
        match self {
            Workload::UnreadCount => json!({}),
            Workload::Recent => json!({"limit": 10, "compact": true}),
            Workload::Bundle => json!({"minimal": true}),
        }
    }

    /// Argv for the thin client, for cold-mode runs.
    pub fn client_args(&self) -> Vec<&'static str> {
        match self {
            Workload::UnreadCount => vec!["unread-count"],
            Workload::Recent => vec!["recent", "--limit", "10", "--compact"],
            Workload::Bundle => vec!["bundle", "--minimal"],
        }
    }
}

impl std::str::FromStr for Workload {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unread_count" => Ok(Workload::UnreadCount),
            "recent" => Ok(Workload::Recent),
            "bundle" => Ok(Workload::Bundle),
            _ => Err(anyhow::anyhow!("unknown workload: {}", s)),
        }
    }
}

impl std::fmt::Display for Workload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.method())
    }
}

/// Execution mode for one measurement run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Warm,
    Cold,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Warm => write!(f, "warm"),
            Mode::Cold => write!(f, "cold"),
        }
    }
}

/// One measured iteration.
#[derive(Debug, Clone, Copy)]
pub struct Sample {
    pub elapsed_ms: f64,
    pub response_bytes: usize,
}

/// Aggregated statistics for one workload in one mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkloadStats {
    pub workload: Workload,
    pub mode: Mode,
    pub iterations: usize,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub mean_ms: f64,
    pub std_dev_ms: f64,
    pub mean_bytes: f64,
    /// `mean_bytes / BYTES_PER_TOKEN`, a proxy for consumer token cost
    pub est_tokens: f64,
}

impl WorkloadStats {
    pub fn from_samples(workload: Workload, mode: Mode, samples: &[Sample]) -> Self {
        let times: Vec<f64> = samples.iter().map(|s| s.elapsed_ms).collect();
        let bytes: Vec<f64> = samples.iter().map(|s| s.response_bytes as f64).collect();
        let mean_bytes = statistical::mean(&bytes);
        Self {
            workload,
            mode,
            iterations: samples.len(),
            p50_ms: percentile(&times, 50.0),
            p95_ms: percentile(&times, 95.0),
            mean_ms: statistical::mean(&times),
            std_dev_ms: if times.len() > 1 {
                statistical::standard_deviation(&times, None)
            } else {
                0.0
            },
            mean_bytes,
            est_tokens: mean_bytes / BYTES_PER_TOKEN,
        }
    }
}

/// Full run output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchSummary {
    pub timestamp: DateTime<Utc>,
    pub socket: String,
    pub iterations: usize,
    pub results: Vec<WorkloadStats>,
}

/// Nearest-rank percentile over an unsorted sample set.
pub fn percentile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let rank = (p / 100.0 * (sorted.len() - 1) as f64).round() as usize;
    sorted[rank.min(sorted.len() - 1)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentile_bounds() {
        let values = vec![5.0, 1.0, 3.0, 2.0, 4.0];
        assert_eq!(percentile(&values, 0.0), 1.0);
        assert_eq!(percentile(&values, 50.0), 3.0);
        assert_eq!(percentile(&values, 100.0), 5.0);
        assert_eq!(percentile(&[], 50.0), 0.0);
    }

    #[test]
    fn test_stats_from_samples() {
        let samples: Vec<Sample> = (1..=10)
            .map(|i| Sample {
                elapsed_ms: i as f64,
                response_bytes: 400,
            })
            .collect();
        let stats = WorkloadStats::from_samples(Workload::Recent, Mode::Warm, &samples);
        assert_eq!(stats.iterations, 10);
        assert_eq!(stats.mean_ms, 5.5);
        assert_eq!(stats.p95_ms, 10.0);
        assert_eq!(stats.mean_bytes, 400.0);
        assert_eq!(stats.est_tokens, 100.0);
    }

    #[test]
    fn test_workload_parse_round_trip() {
        for w in Workload::all() {
            let parsed: Workload = w.method().parse().unwrap();
            assert_eq!(parsed, *w);
        }
        assert!("warmup".parse::<Workload>().is_err());
    }
}
