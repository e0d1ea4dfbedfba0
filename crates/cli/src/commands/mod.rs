//! CLI command implementations

pub mod detect;
pub mod metrics;
pub mod report;
pub mod window;

use anyhow::{Context, Result};
use reporter_lib::{source::ClickHouseSource, AnomalyDetector, MetricDefinition, ReporterConfig};
use std::sync::Arc;

/// Detector over the configured warehouse, optionally narrowed to one metric
pub fn warehouse_detector(
    settings: &ReporterConfig,
    only: Option<&str>,
) -> Result<AnomalyDetector> {
    let metrics = select_metrics(settings.tracked_metrics()?, only)?;
    let source = Arc::new(ClickHouseSource::new(&settings.clickhouse));
    Ok(AnomalyDetector::new(source, metrics))
}

/// Keep only the metric named `only`, if given
pub fn select_metrics(
    metrics: Vec<MetricDefinition>,
    only: Option<&str>,
) -> Result<Vec<MetricDefinition>> {
    let Some(name) = only else {
        return Ok(metrics);
    };

    let selected: Vec<_> = metrics
        .into_iter()
        .filter(|metric| metric.name.eq_ignore_ascii_case(name))
        .collect();

    (!selected.is_empty())
        .then_some(selected)
        .with_context(|| format!("Unknown metric '{}'; see `arctl metrics`", name))
}
