//! Reporter process configuration

use anyhow::{Context, Result};
use clap::Parser;
use reporter_lib::ReporterConfig;
use std::path::PathBuf;

/// Scheduled product-metrics anomaly reporter
#[derive(Debug, Parser)]
#[command(name = "anomaly-reporter", version, about, long_about = None)]
pub struct Args {
    /// TOML configuration file; REPORTER_* environment variables override it
    #[arg(long, env = "REPORTER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Run a single cycle for the last completed bucket and exit
    #[arg(long)]
    pub once: bool,
}

impl Args {
    /// Load the reporter configuration named by these arguments
    pub fn load_config(&self) -> Result<ReporterConfig> {
        ReporterConfig::load(self.config.as_deref()).with_context(|| match &self.config {
            Some(path) => format!("Failed to load configuration from {}", path.display()),
            None => "Failed to load configuration from environment".to_string(),
        })
    }
}
