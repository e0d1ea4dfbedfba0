//! In-memory metric source
//!
//! Holds pre-bucketed samples per metric name. Used for replaying exported
//! history and in tests.

use super::{async_trait, MetricSource};
use crate::error::Result;
use crate::models::{BucketSample, CurrentObservation, MetricDefinition};
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    samples: HashMap<String, Vec<BucketSample>>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one bucket value for a metric
    pub fn push(&mut self, metric_name: &str, sample: BucketSample) {
        self.samples
            .entry(metric_name.to_string())
            .or_default()
            .push(sample);
    }

    /// Add many bucket values for a metric
    pub fn extend(&mut self, metric_name: &str, samples: impl IntoIterator<Item = BucketSample>) {
        self.samples
            .entry(metric_name.to_string())
            .or_default()
            .extend(samples);
    }

    pub fn with_samples(
        mut self,
        metric_name: &str,
        samples: impl IntoIterator<Item = BucketSample>,
    ) -> Self {
        self.extend(metric_name, samples);
        self
    }

    fn samples_for(&self, metric: &MetricDefinition) -> &[BucketSample] {
        self.samples
            .get(&metric.name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

#[async_trait]
impl MetricSource for InMemorySource {
    async fn history(
        &self,
        metric: &MetricDefinition,
        before: NaiveDate,
    ) -> Result<Vec<BucketSample>> {
        let mut history: Vec<BucketSample> = self
            .samples_for(metric)
            .iter()
            .filter(|s| s.date < before)
            .copied()
            .collect();
        history.sort_by_key(|s| (s.date, s.bucket));
        Ok(history)
    }

    async fn observation(
        &self,
        metric: &MetricDefinition,
        bucket_start: NaiveDateTime,
    ) -> Result<Option<CurrentObservation>> {
        Ok(self
            .samples_for(metric)
            .iter()
            .find(|s| s.date == bucket_start.date() && s.bucket == bucket_start.time())
            .map(|s| CurrentObservation {
                date: s.date,
                bucket: s.bucket,
                value: s.value,
            }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MetricKind;
    use chrono::NaiveTime;

    fn views() -> MetricDefinition {
        MetricDefinition::new("Views", "feed_actions", "count()", MetricKind::Count)
    }

    #[tokio::test]
    async fn test_history_is_strictly_before_day() {
        let t = NaiveTime::from_hms_opt(10, 0, 0).unwrap();
        let day = |d| NaiveDate::from_ymd_opt(2025, 3, d).unwrap();
        let source = InMemorySource::new().with_samples(
            "Views",
            [
                BucketSample::new(day(6), t, 3.0),
                BucketSample::new(day(4), t, 1.0),
                BucketSample::new(day(5), t, 2.0),
            ],
        );

        let history = source.history(&views(), day(6)).await.unwrap();
        let values: Vec<f64> = history.iter().map(|s| s.value).collect();
        assert_eq!(values, vec![1.0, 2.0]);
    }

    #[tokio::test]
    async fn test_missing_bucket_is_none() {
        let source = InMemorySource::new();
        let start = NaiveDate::from_ymd_opt(2025, 3, 6)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();

        assert!(source.observation(&views(), start).await.unwrap().is_none());
    }
}
