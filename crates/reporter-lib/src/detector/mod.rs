//! Anomaly detection over the tracked metrics
//!
//! The detector evaluates every metric definition against the same "now"
//! and concatenates the resulting records in definition order. A failing
//! source query fails the whole pass; a partial table is never returned.

mod baseline;
mod evaluator;


pub use baseline::{
    confidence_bands, daily_averages, relative_deviations, weekday_weights, weighted_baselines,
    Baseline, ConfidenceBand, RelativeDeviation,
};
pub use evaluator::{evaluate, MetricQuery};

use crate::error::Result;
use crate::models::{AnomalyRecord, MetricDefinition};
use crate::source::MetricSource;
use chrono::NaiveDateTime;
use std::sync::Arc;
use tracing::debug;

/// Runs detection for every tracked metric
pub struct AnomalyDetector {
    source: Arc<dyn MetricSource>,
    metrics: Vec<MetricDefinition>,
}

impl AnomalyDetector {
    pub fn new(source: Arc<dyn MetricSource>, metrics: Vec<MetricDefinition>) -> Self {
        Self { source, metrics }
    }

    pub fn metrics(&self) -> &[MetricDefinition] {
        &self.metrics
    }

    /// Detect anomalies in the bucket that completed last before `now`
    ///
    /// Metrics are queried one after another; the first error aborts the pass.
    pub async fn detect(&self, now: NaiveDateTime) -> Result<Vec<AnomalyRecord>> {
        let mut anomalies = Vec::new();

        for metric in &self.metrics {
            match MetricQuery::new(metric).run(self.source.as_ref(), now).await? {
                Some(record) => {
                    debug!(
                        metric = %record.metric_name,
                        bucket = %record.bucket_label(),
                        observed = record.observed_value,
                        expected = record.expected_value,
                        "Metric out of expected range"
                    );
                    anomalies.push(record);
                }
                None => debug!(metric = %metric.name, "Metric within expected range"),
            }
        }

        Ok(anomalies)
    }
}
