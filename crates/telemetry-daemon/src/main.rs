//! Telemetry Daemon
//!
//! Samples host metrics and serves them as JSON over a line-oriented TCP protocol.

mod collector;
mod config;
mod server;
mod sources;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use collector::Collector;
use config::Config;
use server::Server;
use sources::SourceSelection;

#[derive(Parser)]
#[command(name = "telemetryd")]
#[command(about = "Lightweight host telemetry daemon")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to bind (IP literal)
    #[arg(long)]
    host: Option<String>,

    /// TCP port to listen on
    #[arg(long)]
    port: Option<u16>,

    /// Minimum interval between two real collections in milliseconds
    #[arg(long)]
    throttle_ms: Option<u32>,

    /// Stop after this many milliseconds (0 = run until signalled)
    #[arg(long)]
    run_for_ms: Option<u64>,

    /// Metric sources to install
    #[arg(long, value_enum)]
    source: Option<SourceSelection>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    /// Loads the configuration file, if any, and applies command-line overrides.
    fn resolve_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => {
                let config = Config::load(path).context("Failed to load configuration")?;
                info!("Loaded configuration from: {}", path.display());
                config
            }
            None => Config::default(),
        };

        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(throttle_ms) = self.throttle_ms {
            config.throttle_ms = throttle_ms;
        }
        if let Some(run_for_ms) = self.run_for_ms {
            config.run_for_ms = run_for_ms;
        }
        if let Some(source) = self.source {
            config.source = source;
        }
        Ok(config)
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Setup logging
    let level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();

    match run(&args).await {
        Ok(()) => {
            info!("telemetryd stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("telemetryd failed: {:#}", e);
            ExitCode::from(exit_code(&e))
        }
    }
}

async fn run(args: &Args) -> Result<()> {
    let config = args.resolve_config()?;

    let mut collector = Collector::new();
    sources::add_default_sources(&mut collector, config.source);

    info!(
        "telemetryd starting: host={} port={} throttle_ms={} source={} sources=[{}]",
        config.host,
        config.port,
        config.throttle_ms,
        config.source,
        collector.source_names().join(", ")
    );
    if config.run_for_ms != 0 {
        info!("telemetryd will exit after run_for_ms={}", config.run_for_ms);
    }

    let server = Server::new(collector, config.server_config()).bind().await?;
    info!("Listening on {}", server.local_addr()?);

    server.serve(shutdown_signal()).await?;
    Ok(())
}

/// Maps a startup failure to a distinguishing process exit code.
fn exit_code(e: &anyhow::Error) -> u8 {
    match e.downcast_ref::<telemetry_core::Error>() {
        Some(err) => match err.code() {
            telemetry_core::StatusCode::InvalidArgument => 2,
            telemetry_core::StatusCode::IoError => 3,
            telemetry_core::StatusCode::Internal => 4,
            _ => 1,
        },
        None => 1,
    }
}

/// Resolves on SIGTERM or SIGINT.
#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut sigterm, mut sigint) = match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(term), Ok(int)) => (term, int),
        (Err(e), _) | (_, Err(e)) => {
            error!("Failed to install signal handlers: {}", e);
            return std::future::pending().await;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
        _ = sigint.recv() => info!("Received SIGINT, shutting down"),
    }
}

/// Resolves on Ctrl-C.
#[cfg(not(unix))]
async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Received Ctrl-C, shutting down");
    } else {
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("telemetryd.toml");
        std::fs::write(&path, "port = 9100\nthrottle_ms = 1000\n").unwrap();

        let args = Args::parse_from([
            "telemetryd",
            "--config",
            path.to_str().unwrap(),
            "--throttle-ms",
            "50",
            "--source",
            "simulated",
        ]);
        let config = args.resolve_config().unwrap();
        assert_eq!(config.port, 9100);
        assert_eq!(config.throttle_ms, 50);
        assert_eq!(config.source, SourceSelection::Simulated);
        assert_eq!(config.host, "0.0.0.0");
    }

    #[test]
    fn test_exit_codes() {
        let invalid = anyhow::Error::new(telemetry_core::Error::InvalidArgument("invalid host".into()));
        let io = anyhow::Error::new(telemetry_core::Error::Io("bind failed".into()));
        assert_eq!(exit_code(&invalid), 2);
        assert_eq!(exit_code(&io), 3);
        assert_eq!(exit_code(&anyhow::anyhow!("config unreadable")), 1);
    }
}
