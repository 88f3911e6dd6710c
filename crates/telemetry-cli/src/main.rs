//! Telemetry Control Tool
//!
//! CLI for querying the telemetry daemon over TCP.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::process::ExitCode;
use std::time::Duration;
use telemetry_client::{ClientConfig, MetricsResponse, Response, TelemetryClient};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

/// Shortest interval between two polls in watch mode.
const MIN_WATCH_INTERVAL_MS: u64 = 50;

#[derive(Parser)]
#[command(name = "telemetryctl")]
#[command(about = "Control tool for the telemetry daemon")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Daemon host
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Daemon port
    #[arg(long, default_value_t = 9000)]
    port: u16,

    /// Request timeout in milliseconds
    #[arg(long, default_value_t = 1000)]
    timeout_ms: u64,

    /// Print raw JSON responses
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch metrics once
    Once,
    /// Continuously fetch and display metrics
    Watch {
        /// Poll interval in milliseconds
        #[arg(long, default_value_t = 1000)]
        interval_ms: u64,
    },
    /// Check if the daemon is responding
    Ping,
    /// Request a service restart (acknowledged only)
    Restart,
    /// Set the daemon's throttle interval
    Throttle {
        /// Interval in milliseconds (0-60000)
        ms: u32,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let client = TelemetryClient::new(ClientConfig {
        host: cli.host.clone(),
        port: cli.port,
        timeout: Duration::from_millis(cli.timeout_ms),
        ..ClientConfig::default()
    });

    let result = match cli.command {
        Commands::Once => handle_once(&client, cli.json).await,
        Commands::Watch { interval_ms } => handle_watch(&client, interval_ms, cli.json).await,
        Commands::Ping => print_response(client.ping().await, &client, cli.json),
        Commands::Restart => print_response(client.restart().await, &client, cli.json),
        Commands::Throttle { ms } => print_response(client.throttle(ms).await, &client, cli.json),
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(2)
        }
    }
}

/// Prints one metrics response; returns its `ok` flag.
async fn handle_once(client: &TelemetryClient, json: bool) -> Result<bool> {
    let metrics = client
        .get_metrics()
        .await
        .with_context(|| format!("Failed to query daemon at {}. Is telemetryd running?", client.addr()))?;
    if !metrics.ok {
        warn!(
            "Daemon reported a failed collection: {} ({})",
            u8::from(metrics.status_code),
            metrics.status_code
        );
    }
    print_metrics(&metrics, json)?;
    Ok(metrics.ok)
}

async fn handle_watch(client: &TelemetryClient, interval_ms: u64, json: bool) -> Result<bool> {
    let interval = watch_interval(interval_ms);
    debug!("Watching {} every {:?}", client.addr(), interval);
    loop {
        handle_once(client, json).await?;
        if !json {
            println!();
        }
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = tokio::signal::ctrl_c() => return Ok(true),
        }
    }
}

/// Polling interval for `watch`, never below the minimum.
fn watch_interval(interval_ms: u64) -> Duration {
    if interval_ms < MIN_WATCH_INTERVAL_MS {
        warn!("Interval raised to the minimum of {} ms", MIN_WATCH_INTERVAL_MS);
    }
    Duration::from_millis(interval_ms.max(MIN_WATCH_INTERVAL_MS))
}

fn print_response(
    response: telemetry_client::Result<Response>,
    client: &TelemetryClient,
    json: bool,
) -> Result<bool> {
    let response = response
        .with_context(|| format!("Failed to query daemon at {}. Is telemetryd running?", client.addr()))?;

    if json {
        println!("{}", serde_json::to_string(&response)?);
    } else {
        match &response {
            Response::Ack { message, .. } => println!("OK: {}", message),
            Response::Error { error, .. } => println!("Error: {}", error),
            Response::Metrics(metrics) => print!("{}", format_metrics(metrics)),
        }
    }
    Ok(response.is_ok())
}

fn print_metrics(metrics: &MetricsResponse, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(metrics)?);
    } else {
        print!("{}", format_metrics(metrics));
    }
    Ok(())
}

/// Renders a metrics response as an aligned key/value table.
fn format_metrics(m: &MetricsResponse) -> String {
    let rows = [
        ("ok", m.ok.to_string()),
        ("status_code", format!("{} ({})", u8::from(m.status_code), m.status_code)),
        ("platform", m.platform.clone()),
        ("temperature_best_effort", m.temperature_best_effort.to_string()),
        ("ts_ms", m.ts_ms.to_string()),
        ("cpu_usage_pct", format!("{:.2}", m.cpu_usage_pct)),
        ("mem_total_kb", m.mem_total_kb.to_string()),
        ("mem_available_kb", m.mem_available_kb.to_string()),
        ("temperature_c", format!("{:.2}", m.temperature_c)),
        ("uptime_s", m.uptime_s.to_string()),
        ("throttle_ms", m.throttle_ms.to_string()),
    ];

    let mut out = String::from("Telemetry:\n");
    for (key, value) in rows {
        out.push_str(&format!("  {:<24} {}\n", key, value));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use telemetry_client::StatusCode;

    #[test]
    fn test_parse_throttle() {
        let cli = Cli::parse_from(["telemetryctl", "--port", "9100", "throttle", "500"]);
        assert_eq!(cli.port, 9100);
        assert!(matches!(cli.command, Commands::Throttle { ms: 500 }));
    }

    #[test]
    fn test_parse_watch_defaults() {
        let cli = Cli::parse_from(["telemetryctl", "watch"]);
        assert_eq!(cli.host, "127.0.0.1");
        assert_eq!(cli.timeout_ms, 1000);
        assert!(matches!(cli.command, Commands::Watch { interval_ms: 1000 }));
    }

    #[test]
    fn test_watch_interval_floor() {
        assert_eq!(watch_interval(0), Duration::from_millis(MIN_WATCH_INTERVAL_MS));
        assert_eq!(watch_interval(49), Duration::from_millis(50));
        assert_eq!(watch_interval(1000), Duration::from_millis(1000));
    }

    #[test]
    fn test_format_metrics() {
        let metrics = MetricsResponse {
            ok: false,
            status_code: StatusCode::IoError,
            platform: "linux".to_string(),
            temperature_best_effort: true,
            ts_ms: 1,
            cpu_usage_pct: 3.14159,
            mem_total_kb: 2,
            mem_available_kb: 3,
            temperature_c: 40.0,
            uptime_s: 4,
            throttle_ms: 250,
        };
        let table = format_metrics(&metrics);
        assert!(table.contains("status_code              3 (io-error)\n"));
        assert!(table.contains("cpu_usage_pct            3.14\n"));
        assert!(table.contains("throttle_ms              250\n"));
    }
}
