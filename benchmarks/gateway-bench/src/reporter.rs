//! Benchmark result reporting
//!
//! Terminal output for humans, Markdown for commit messages and docs, JSON
//! for downstream tooling.

use anyhow::Result;

use crate::BenchSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Terminal,
    Markdown,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "terminal" | "term" | "console" => Ok(Self::Terminal),
            "md" | "markdown" => Ok(Self::Markdown),
            "json" => Ok(Self::Json),
            _ => Err(anyhow::anyhow!("unknown format: {}", s)),
        }
    }
}

pub struct Reporter {
    format: OutputFormat,
}

impl Reporter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn summary(&self, summary: &BenchSummary) -> String {
        match self.format {
            OutputFormat::Terminal => self.terminal(summary),
            OutputFormat::Markdown => self.markdown(summary),
            OutputFormat::Json => {
                serde_json::to_string_pretty(summary).unwrap_or_else(|e| format!("{{\"error\": \"{}\"}}", e))
            }
        }
    }

    fn terminal(&self, summary: &BenchSummary) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "gateway bench  socket={}  iterations={}\n\n",
            summary.socket, summary.iterations
        ));
        out.push_str(&format!(
            "{:<14} {:<6} {:>9} {:>9} {:>9} {:>10} {:>10}\n",
            "workload", "mode", "p50 ms", "p95 ms", "mean ms", "bytes", "~tokens"
        ));
        for r in &summary.results {
            out.push_str(&format!(
                "{:<14} {:<6} {:>9.2} {:>9.2} {:>9.2} {:>10.0} {:>10.0}\n",
                r.workload.to_string(),
                r.mode.to_string(),
                r.p50_ms,
                r.p95_ms,
                r.mean_ms,
                r.mean_bytes,
                r.est_tokens,
            ));
        }
        out
    }

    fn markdown(&self, summary: &BenchSummary) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "# Gateway benchmark\n\n- socket: `{}`\n- iterations: {}\n- run at: {}\n\n",
            summary.socket, summary.iterations, summary.timestamp
        ));
        out.push_str("| workload | mode | p50 ms | p95 ms | mean ms | std dev | bytes | ~tokens |\n");
        out.push_str("|---|---|---|---|---|---|---|---|\n");
        for r in &summary.results {
            out.push_str(&format!(
                "| {} | {} | {:.2} | {:.2} | {:.2} | {:.2} | {:.0} | {:.0} |\n",
                r.workload, r.mode, r.p50_ms, r.p95_ms, r.mean_ms, r.std_dev_ms, r.mean_bytes, r.est_tokens,
            ));
        }
        out
    }
}
