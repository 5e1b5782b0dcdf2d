//! Benchmark runner
//!
//! Warm mode performs socket round trips through [`DaemonClient`]. Cold mode
//! spawns the `toolgate` binary for every iteration, so the measurement
//! includes process startup, argument parsing, and connect. Both modes talk
//! to the same running daemon; the harness never starts one itself.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use chrono::Utc;

use gateway_common::DaemonClient;

use crate::{BenchSummary, Mode, Sample, Workload, WorkloadStats};

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub socket: PathBuf,
    /// Path to the thin client binary, for cold mode
    pub client_bin: PathBuf,
    pub iterations: usize,
    /// Unmeasured iterations before sampling starts
    pub warmup: usize,
}

pub struct BenchRunner {
    config: RunnerConfig,
}

impl BenchRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }

    /// Run the given workloads in the given modes against a live daemon.
    pub async fn run(&self, workloads: &[Workload], modes: &[Mode]) -> Result<BenchSummary> {
        let client = DaemonClient::new(self.config.socket.clone());
        if !client.is_listening().await {
            bail!(
                "no daemon listening on {}; start it with `toolgated start`",
                self.config.socket.display()
            );
        }

        let mut results = Vec::new();
        for &workload in workloads {
            for &mode in modes {
                tracing::info!(%workload, %mode, iterations = self.config.iterations, "running");
                let samples = match mode {
                    Mode::Warm => self.run_warm(&client, workload).await?,
                    Mode::Cold => self.run_cold(workload).await?,
                };
                results.push(WorkloadStats::from_samples(workload, mode, &samples));
            }
        }

        Ok(BenchSummary {
            timestamp: Utc::now(),
            socket: self.config.socket.display().to_string(),
            iterations: self.config.iterations,
            results,
        })
    }

    async fn run_warm(&self, client: &DaemonClient, workload: Workload) -> Result<Vec<Sample>> {
        for _ in 0..self.config.warmup {
            client.call(workload.method(), workload.params()).await?;
        }

        let mut samples = Vec::with_capacity(self.config.iterations);
        for _ in 0..self.config.iterations {
            let start = Instant::now();
            let resp = client.call(workload.method(), workload.params()).await?;
            let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
            if !resp.ok {
                bail!("daemon returned an error for {}", workload);
            }
            let response_bytes = serde_json::to_vec(&resp)?.len();
            samples.push(Sample {
                elapsed_ms,
                response_bytes,
            });
        }
        Ok(samples)
    }

    async fn run_cold(&self, workload: Workload) -> Result<Vec<Sample>> {
        let mut samples = Vec::with_capacity(self.config.iterations);
        for _ in 0..self.config.iterations {
            let start = Instant::now();
            let output = tokio::process::Command::new(&self.config.client_bin)
                .arg("--socket")
                .arg(&self.config.socket)
                .args(workload.client_args())
                .output()
                .await
                .with_context(|| {
                    format!("spawning client {}", self.config.client_bin.display())
                })?;
            let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
            if !output.status.success() {
                bail!(
                    "client exited with {} for {}: {}",
                    output.status,
                    workload,
                    String::from_utf8_lossy(&output.stderr).trim()
                );
            }
            samples.push(Sample {
                elapsed_ms,
                response_bytes: output.stdout.len(),
            });
        }
        Ok(samples)
    }
}
