//! Metric catalog listing

use anyhow::Result;
use reporter_lib::ReporterConfig;
use tabled::Tabled;

use crate::output::{print_json, print_table, OutputFormat};

/// Row for the metrics table
#[derive(Tabled)]
struct MetricRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Table")]
    table: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "k")]
    threshold: f64,
    #[tabled(rename = "Expression")]
    expression: String,
}

/// List the metrics the reporter tracks
pub fn list_metrics(settings: &ReporterConfig, format: OutputFormat) -> Result<()> {
    let metrics = settings.tracked_metrics()?;

    match format {
        OutputFormat::Json => print_json(&metrics)?,
        OutputFormat::Table => {
            let rows: Vec<MetricRow> = metrics
                .iter()
                .map(|metric| MetricRow {
                    name: metric.name.clone(),
                    table: metric.table.clone(),
                    kind: metric.kind.to_string(),
                    threshold: metric.threshold(),
                    expression: metric.value_expr.clone(),
                })
                .collect();
            print_table(&rows);
        }
    }

    Ok(())
}
