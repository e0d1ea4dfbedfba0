//! Per-metric anomaly evaluation
//!
//! Runs one metric definition against a source: fetch the history and the
//! last completed bucket, build the baseline, flag if out of band.

use super::baseline::Baseline;
use crate::error::Result;
use crate::models::{
    last_completed_bucket, round_to, AnomalyRecord, CurrentObservation, MetricDefinition,
};
use crate::source::MetricSource;
use chrono::NaiveDateTime;
use tracing::debug;

/// Detection for a single metric definition
pub struct MetricQuery<'a> {
    definition: &'a MetricDefinition,
}

impl<'a> MetricQuery<'a> {
    pub fn new(definition: &'a MetricDefinition) -> Self {
        Self { definition }
    }

    /// Evaluate the bucket that completed last before `now`
    ///
    /// History covers every date strictly before `now`'s date. A bucket
    /// without rows produces no record.
    pub async fn run(
        &self,
        source: &dyn MetricSource,
        now: NaiveDateTime,
    ) -> Result<Option<AnomalyRecord>> {
        self.definition.validate()?;

        let bucket_start = last_completed_bucket(now);
        let history = source.history(self.definition, now.date()).await?;
        let Some(observation) = source.observation(self.definition, bucket_start).await? else {
            debug!(
                metric = %self.definition.name,
                bucket = %bucket_start,
                "No rows for current bucket"
            );
            return Ok(None);
        };

        let baseline = Baseline::from_series(&history, self.definition.threshold());
        Ok(evaluate(self.definition, &baseline, &observation))
    }
}

/// Flag `observation` if its deviation from the weekday baseline falls
/// outside the bucket's confidence band
///
/// Returns `None` when the observation is in range or cannot be judged
/// (no band for the bucket, no usable baseline for the weekday).
pub fn evaluate(
    definition: &MetricDefinition,
    baseline: &Baseline,
    observation: &CurrentObservation,
) -> Option<AnomalyRecord> {
    if !observation.value.is_finite() {
        debug!(metric = %definition.name, "Observed value is not finite");
        return None;
    }

    let Some(level) = baseline
        .weekday_baseline(observation.weekday())
        .filter(|level| level.is_finite() && *level > 0.0)
    else {
        debug!(
            metric = %definition.name,
            weekday = %observation.weekday(),
            "No usable weekday baseline"
        );
        return None;
    };

    let Some(band) = baseline.band(observation.bucket) else {
        debug!(
            metric = %definition.name,
            bucket = %observation.bucket,
            "No confidence band for bucket"
        );
        return None;
    };

    let relative_deviation = observation.value / level;
    if band.contains(relative_deviation) {
        return None;
    }

    let precision = definition.kind.precision();
    let expected = band.mean * level;
    let change_percent = if expected > 0.0 {
        Some(round_to((observation.value / expected - 1.0) * 100.0, 2))
    } else {
        None
    };

    Some(AnomalyRecord {
        metric_name: definition.name.clone(),
        bucket: observation.bucket,
        relative_deviation,
        lower_bound: band.lower,
        upper_bound: band.upper,
        mean_relative_deviation: band.mean,
        expected_value: round_to(expected, precision),
        observed_value: round_to(observation.value, precision),
        change_percent,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::baseline::ConfidenceBand;
    use crate::models::MetricKind;
    use chrono::{NaiveDate, NaiveTime, Weekday};

    fn observation(value: f64) -> CurrentObservation {
        // 2025-03-06 is a Thursday
        CurrentObservation {
            date: NaiveDate::from_ymd_opt(2025, 3, 6).unwrap(),
            bucket: NaiveTime::from_hms_opt(10, 30, 0).unwrap(),
            value,
        }
    }

    fn baseline(level: f64) -> Baseline {
        let mut baseline = Baseline::default();
        baseline.weekday_baselines.insert(Weekday::Thu, level);
        baseline.bands.insert(
            NaiveTime::from_hms_opt(10, 30, 0).unwrap(),
            ConfidenceBand {
                mean: 1.0,
                std_dev: 1.0 / 30.0,
                lower: 0.9,
                upper: 1.1,
                samples: 14,
            },
        );
        baseline
    }

    fn views() -> MetricDefinition {
        MetricDefinition::new(
            "Number of User Views",
            "feed_actions",
            "countIf(action = 'view')",
            MetricKind::Count,
        )
    }

    #[test]
    fn test_drop_is_flagged() {
        let record = evaluate(&views(), &baseline(1000.0), &observation(500.0)).unwrap();

        assert_eq!(record.metric_name, "Number of User Views");
        assert_eq!(record.relative_deviation, 0.5);
        assert_eq!(record.expected_value, 1000.0);
        assert_eq!(record.observed_value, 500.0);
        assert_eq!(record.change_percent, Some(-50.0));
    }

    #[test]
    fn test_small_move_is_not_flagged() {
        assert!(evaluate(&views(), &baseline(1000.0), &observation(1005.0)).is_none());
    }

    #[test]
    fn test_zero_baseline_is_not_compared() {
        assert!(evaluate(&views(), &baseline(0.0), &observation(500.0)).is_none());
        assert!(evaluate(&views(), &baseline(f64::NAN), &observation(500.0)).is_none());
    }

    #[test]
    fn test_nan_observation_is_not_flagged() {
        assert!(evaluate(&views(), &baseline(1000.0), &observation(f64::NAN)).is_none());
    }

    #[test]
    fn test_missing_band_is_not_flagged() {
        let mut baseline = baseline(1000.0);
        baseline.bands.clear();
        assert!(evaluate(&views(), &baseline, &observation(10.0)).is_none());
    }

    #[test]
    fn test_ratio_precision() {
        let ctr = MetricDefinition::new(
            "User CTR",
            "feed_actions",
            "countIf(action = 'like') / countIf(action = 'view')",
            MetricKind::Ratio,
        );
        let record = evaluate(&ctr, &baseline(0.2), &observation(0.31234)).unwrap();

        assert_eq!(record.observed_value, 0.312);
        assert_eq!(record.expected_value, 0.2);
        assert_eq!(record.change_percent, Some(56.17));
    }
}
