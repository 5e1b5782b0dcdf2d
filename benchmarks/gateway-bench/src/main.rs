//! Gateway benchmark CLI
//!
//! Usage:
//!   cargo run -p gateway-bench -- --iterations 50
//!   cargo run -p gateway-bench -- --workload bundle --mode warm --output json

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use gateway_bench::{BenchRunner, Mode, OutputFormat, Reporter, RunnerConfig, Workload};

fn default_socket_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(".toolgate")
        .join("daemon.sock")
}

#[derive(Parser)]
#[command(name = "gateway-bench", about = "Warm vs cold gateway call benchmark")]
struct Cli {
    /// Daemon socket path
    #[arg(long, env = "TOOLGATE_SOCKET")]
    socket: Option<PathBuf>,

    /// Thin client binary to spawn in cold mode
    #[arg(long, default_value = "toolgate")]
    client_bin: PathBuf,

    /// Measured iterations per workload and mode
    #[arg(short, long, default_value_t = 50)]
    iterations: usize,

    /// Unmeasured warmup iterations
    #[arg(long, default_value_t = 3)]
    warmup: usize,

    /// Run a single workload: unread_count, recent, bundle
    #[arg(short, long)]
    workload: Option<String>,

    /// Run a single mode: warm or cold (default: both)
    #[arg(short, long)]
    mode: Option<String>,

    /// Output format: terminal, markdown, json
    #[arg(short, long, default_value = "terminal")]
    output: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    gateway_common::init_tracing("gateway-bench")?;

    let cli = Cli::parse();

    let workloads: Vec<Workload> = match cli.workload.as_deref() {
        Some(w) => vec![w.parse()?],
        None => Workload::all().to_vec(),
    };
    let modes: Vec<Mode> = match cli.mode.as_deref() {
        None => vec![Mode::Warm, Mode::Cold],
        Some("warm") => vec![Mode::Warm],
        Some("cold") => vec![Mode::Cold],
        Some(other) => anyhow::bail!("unknown mode: {}", other),
    };

    let runner = BenchRunner::new(RunnerConfig {
        socket: cli.socket.unwrap_or_else(default_socket_path),
        client_bin: cli.client_bin,
        iterations: cli.iterations.max(1),
        warmup: cli.warmup,
    });

    let format: OutputFormat = cli.output.parse()?;
    let summary = runner.run(&workloads, &modes).await?;
    print!("{}", Reporter::new(format).summary(&summary));
    Ok(())
}
