// Mule Metrics Collector - JMX metrics bridge
//
// Connects to a Mule server through its Jolokia agent, reads the numeric
// attributes of the configured MBean types and prints them as metric lines
// for the monitoring agent that invokes this binary on a timer.
//
// # Features
// - One stateless collection pass per invocation
// - MBean discovery by domain matcher and type, with excluded domains
// - Failure isolation per type and per MBean
// - JVM memory figures from the Mule context
// - Collection status metric for alerting on unreachable servers
//
// # Usage
// mule-metrics-collector [--config-file <path>]
//
// Example:
// mule-metrics-collector --config-file monitors/MuleESBMonitor/config.yml

use anyhow::{bail, Result};
use clap::Parser;
use std::collections::HashMap;
use std::env;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// Module declarations
mod collector;
mod config;
mod jmx;
mod metrics;
mod reporter;
mod task;

use config::CONFIG_ARG;
use jmx::jolokia::JolokiaConnector;
use reporter::LineMetricWriter;

/// Command-line arguments, forwarded to the task as its argument bag
#[derive(Debug, Parser)]
#[command(name = "mule-metrics-collector", version, about)]
struct Cli {
    /// Configuration file; relative paths that do not exist as given are
    /// resolved against the executable's directory
    #[arg(long = "config-file", default_value = "")]
    config_file: String,
}

impl Cli {
    fn task_args(&self) -> HashMap<String, String> {
        HashMap::from([(CONFIG_ARG.to_string(), self.config_file.clone())])
    }
}

/// Application entry point
///
/// This function:
/// 1. Parses command-line arguments
/// 2. Initializes logging
/// 3. Runs one collection task against the configured server
/// 4. Exits non-zero if the task failed
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging subsystem
    // Logs go to stderr; stdout carries the metric lines
    init_logging();

    info!(
        "Using {} version [{}]",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );

    let writer = LineMetricWriter::stdout();
    let outcome = task::execute(
        &cli.task_args(),
        &config::executable_dir(),
        JolokiaConnector::new(),
        &writer,
    )
    .await;

    match outcome {
        Ok(output) => {
            info!("{}", output.0);
            Ok(())
        }
        Err(e) => {
            error!("{}", e);
            bail!(e)
        }
    }
}

/// Initializes the logging subsystem
///
/// Sets up structured logging with:
/// - Log level and target module name
/// - Colored output when running in terminal
/// - JSON output when running as systemd service
///
/// # Log Levels
/// Default: INFO
/// Can be overridden with RUST_LOG environment variable
///
/// # Examples
/// ```bash
/// RUST_LOG=debug mule-metrics-collector ...  # Log every reported metric
/// RUST_LOG=warn mule-metrics-collector ...   # Only warnings and errors
/// ```
fn init_logging() {
    // Systemd sets INVOCATION_ID environment variable
    let is_systemd = env::var("INVOCATION_ID").is_ok();

    // Default to INFO level, but allow override via RUST_LOG
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if is_systemd {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_level(true)
                    .with_ansi(true),
            )
            .init();
    }
}
