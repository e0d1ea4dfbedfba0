//! Anomaly Reporter CLI
//!
//! A command-line tool for running detection on demand, previewing and
//! sending reports, and inspecting the tracked metrics and schedule.

mod commands;
mod config;
mod output;

use anyhow::Result;
use chrono::NaiveDateTime;
use clap::{Parser, Subcommand};
use commands::{detect, metrics, report, window};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Anomaly Reporter CLI
#[derive(Parser)]
#[command(name = "arctl")]
#[command(author, version, about = "CLI for the Anomaly Reporter", long_about = None)]
pub struct Cli {
    /// Path to the reporter configuration file (can also be set via REPORTER_CONFIG env var)
    #[arg(long, env = "REPORTER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    /// Enable verbose output
    #[arg(long, short)]
    pub verbose: bool,

    /// Evaluate as if the warehouse clock read this time (e.g. 2025-03-10T14:07:00)
    #[arg(long)]
    pub now: Option<NaiveDateTime>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run detection for the last completed bucket
    Detect {
        /// Only evaluate the metric with this name
        #[arg(long, short)]
        metric: Option<String>,
    },

    /// Build the report for the last completed bucket
    Report {
        /// Deliver the report to the chat (only when anomalies were found)
        #[arg(long)]
        send: bool,
    },

    /// List the tracked metric definitions
    Metrics,

    /// Show the bucket that would be evaluated and the next scheduled run
    Window,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .init();

    let settings = config::load(cli.config.as_deref())?;
    let now = cli.now.unwrap_or_else(|| settings.clock().now());

    // Execute command
    match cli.command {
        Commands::Detect { metric } => {
            detect::run_detection(&settings, metric.as_deref(), now, cli.format).await?;
        }
        Commands::Report { send } => {
            report::build_report(&settings, send, now, cli.format).await?;
        }
        Commands::Metrics => {
            metrics::list_metrics(&settings, cli.format)?;
        }
        Commands::Window => {
            window::show_window(&settings, now, cli.format)?;
        }
    }

    Ok(())
}
