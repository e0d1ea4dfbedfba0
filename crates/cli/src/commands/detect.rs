//! On-demand detection

use anyhow::Result;
use chrono::NaiveDateTime;
use colored::Colorize;
use reporter_lib::{last_completed_bucket, AnomalyRecord, ReporterConfig};
use tabled::Tabled;

use super::warehouse_detector;
use crate::output::{color_change, format_band, print_success, print_table, OutputFormat};

/// Row for the anomalies table
#[derive(Tabled)]
pub struct AnomalyRow {
    #[tabled(rename = "Metric")]
    metric: String,
    #[tabled(rename = "Bucket")]
    bucket: String,
    #[tabled(rename = "Observed")]
    observed: f64,
    #[tabled(rename = "Expected")]
    expected: f64,
    #[tabled(rename = "Change")]
    change: String,
    #[tabled(rename = "Relative")]
    relative: String,
    #[tabled(rename = "Band")]
    band: String,
}

impl From<&AnomalyRecord> for AnomalyRow {
    fn from(record: &AnomalyRecord) -> Self {
        Self {
            metric: record.metric_name.clone(),
            bucket: record.bucket_label(),
            observed: record.observed_value,
            expected: record.expected_value,
            change: color_change(record.change_percent),
            relative: format!("{:.3}", record.relative_deviation),
            band: format_band(record.lower_bound, record.upper_bound),
        }
    }
}

/// Run detection against the warehouse and print the flagged metrics
pub async fn run_detection(
    settings: &ReporterConfig,
    metric: Option<&str>,
    now: NaiveDateTime,
    format: OutputFormat,
) -> Result<()> {
    let detector = warehouse_detector(settings, metric)?;
    let anomalies = detector.detect(now).await?;

    match format {
        OutputFormat::Json => crate::output::print_json(&anomalies)?,
        OutputFormat::Table => {
            println!(
                "Bucket {} ({} metrics evaluated)",
                last_completed_bucket(now).to_string().cyan(),
                detector.metrics().len()
            );
            println!();

            if anomalies.is_empty() {
                print_success("All metrics within expected range");
                return Ok(());
            }

            let rows: Vec<AnomalyRow> = anomalies.iter().map(AnomalyRow::from).collect();
            print_table(&rows);
            println!("\nTotal: {} anomalies", anomalies.len());
        }
    }

    Ok(())
}
