//! Anomaly Reporter - scheduled product-metrics anomaly detection
//!
//! Every cycle compares the last completed 15-minute bucket of each tracked
//! metric with its historical baseline and posts a chat report when
//! something is out of range.

use anyhow::{Context, Result};
use clap::Parser;
use reporter_lib::{
    api::{self, AppState},
    dispatch::TelegramSink,
    source::ClickHouseSource,
    AnomalyDetector, CycleRunner, Dispatcher, HealthRegistry, ReportFormatter, StructuredLogger,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;

const REPORTER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    let args = config::Args::parse();
    let config = args.load_config()?;

    let tracked_metrics = config
        .tracked_metrics()
        .context("Invalid metric definitions")?;
    let cadence = config.schedule.cadence().context("Invalid schedule")?;
    let clock = config.clock();

    let logger = StructuredLogger::new("anomaly-reporter");
    logger.log_startup(REPORTER_VERSION, tracked_metrics.len());
    info!(
        database = %config.clickhouse.database,
        chat_id = config.telegram.chat_id,
        "Reporter configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register_all().await;

    let source = Arc::new(ClickHouseSource::new(&config.clickhouse));
    let sink = Arc::new(TelegramSink::new(&config.telegram).context("Invalid notification sink")?);

    let runner = Arc::new(CycleRunner::new(
        AnomalyDetector::new(source, tracked_metrics.clone()),
        ReportFormatter::new(config.dashboard_url.clone()),
        Dispatcher::new(sink, logger.clone()),
        config.schedule.retry_policy(),
        logger.clone(),
        health_registry.clone(),
    ));

    if args.once {
        let report = runner.run_cycle(clock.now()).await?;
        info!(
            bucket = %report.bucket,
            anomalies = report.anomalies.len(),
            outcome = %report.outcome,
            "Single cycle finished"
        );
        return Ok(());
    }

    // Start health and metrics server
    let app_state = Arc::new(AppState::new(health_registry.clone(), tracked_metrics));
    let mut api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let loop_handle = tokio::spawn(runner.run(cadence, clock, shutdown_rx));
    health_registry.set_ready(true).await;

    // Wait for shutdown signal, or for the API server to exit
    let api_exit = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            logger.log_shutdown("SIGINT received");
            None
        }
        served = &mut api_handle => {
            logger.log_shutdown("API server stopped");
            Some(served)
        }
    };

    let _ = shutdown_tx.send(());
    loop_handle.await.context("Scheduler task panicked")?;

    match api_exit {
        Some(served) => served
            .context("API server task panicked")?
            .with_context(|| format!("API server on port {} failed", config.api_port))?,
        None => api_handle.abort(),
    }

    Ok(())
}
