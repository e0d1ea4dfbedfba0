//! Report preview and delivery

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use colored::Colorize;
use reporter_lib::{
    dispatch::TelegramSink, DispatchOutcome, Dispatcher, ReportFormatter, ReporterConfig,
    StructuredLogger,
};
use serde::Serialize;
use std::sync::Arc;

use super::warehouse_detector;
use crate::output::{print_info, print_json, print_success, print_warning, OutputFormat};

#[derive(Serialize)]
struct ReportOutput<'a> {
    anomalies: usize,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    outcome: Option<String>,
}

/// Detect, format and optionally deliver the report for one bucket
pub async fn build_report(
    settings: &ReporterConfig,
    send: bool,
    now: NaiveDateTime,
    format: OutputFormat,
) -> Result<()> {
    let detector = warehouse_detector(settings, None)?;
    let anomalies = detector.detect(now).await?;
    let message = ReportFormatter::new(settings.dashboard_url.clone()).format(&anomalies);

    let outcome = if send {
        let sink = TelegramSink::new(&settings.telegram).context("Cannot send report")?;
        let dispatcher = Dispatcher::new(Arc::new(sink), StructuredLogger::new("arctl"));
        Some(dispatcher.dispatch(&anomalies, &message).await?)
    } else {
        None
    };

    match format {
        OutputFormat::Json => print_json(&ReportOutput {
            anomalies: anomalies.len(),
            message: &message,
            outcome: outcome.map(|outcome| outcome.to_string()),
        })?,
        OutputFormat::Table => {
            println!("{}", "Report".bold());
            println!("{}", "=".repeat(60));
            println!("{}", message);
            println!();

            match outcome {
                Some(DispatchOutcome::Sent) => print_success("Report sent"),
                Some(DispatchOutcome::Suppressed) => {
                    print_warning("Nothing to report; message was not sent")
                }
                None => print_info("Preview only; pass --send to deliver"),
            }
        }
    }

    Ok(())
}
