use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use toolgate_daemon::config::{
    default_db_path, default_pid_path, default_socket_path, DaemonConfig,
};
use toolgate_daemon::lifecycle;

#[derive(Parser)]
#[command(name = "toolgated", about = "Warm tool-call gateway daemon", version)]
struct Cli {
    /// Unix socket the daemon listens on
    #[arg(long, global = true, env = "TOOLGATE_SOCKET")]
    socket: Option<PathBuf>,

    /// Pidfile path
    #[arg(long, global = true, env = "TOOLGATE_PIDFILE")]
    pidfile: Option<PathBuf>,

    /// Message store database path
    #[arg(long, global = true, env = "TOOLGATE_DB")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the daemon (detached unless --foreground)
    Start {
        /// Run in the foreground instead of detaching
        #[arg(long)]
        foreground: bool,
    },
    /// Stop a running daemon
    Stop,
    /// Report daemon liveness and health
    Status,
}

impl Cli {
    fn config(&self) -> DaemonConfig {
        DaemonConfig::new(
            self.socket.clone().unwrap_or_else(default_socket_path),
            self.pidfile.clone().unwrap_or_else(default_pid_path),
            self.db.clone().unwrap_or_else(default_db_path),
        )
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    gateway_common::init_tracing("toolgated")?;

    let cli = Cli::parse();
    let config = cli.config();

    let code = match cli.command {
        Command::Start { foreground } => lifecycle::run_start(&config, foreground).await?,
        Command::Stop => lifecycle::run_stop(&config).await?,
        Command::Status => lifecycle::run_status(&config).await?,
    };
    Ok(ExitCode::from(code as u8))
}
