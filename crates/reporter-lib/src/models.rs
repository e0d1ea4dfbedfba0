//! Core data models for the anomaly reporter

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::{ReporterError, Result};

/// Width of one aggregation bucket in minutes
pub const BUCKET_MINUTES: u32 = 15;

/// Shape of a metric's values, which fixes its band width and display precision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// Counts of users, events or messages
    Count,
    /// Ratio of two counts, e.g. click-through rate
    Ratio,
}

impl MetricKind {
    /// Number of standard deviations that bound the expected range
    pub fn default_threshold(&self) -> f64 {
        match self {
            MetricKind::Count => 3.0,
            MetricKind::Ratio => 2.0,
        }
    }

    /// Decimal places kept for observed and expected values
    pub fn precision(&self) -> u32 {
        match self {
            MetricKind::Count => 0,
            MetricKind::Ratio => 3,
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricKind::Count => write!(f, "count"),
            MetricKind::Ratio => write!(f, "ratio"),
        }
    }
}

/// A tracked metric: where it lives and how one bucket's value is computed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDefinition {
    /// Human-readable name used in reports
    pub name: String,
    /// Source table holding raw events with a `time` column
    pub table: String,
    /// Aggregate expression evaluated per 15-minute bucket
    pub value_expr: String,
    pub kind: MetricKind,
    /// Overrides the kind's default band width (k)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deviation_threshold: Option<f64>,
}

impl MetricDefinition {
    pub fn new(
        name: impl Into<String>,
        table: impl Into<String>,
        value_expr: impl Into<String>,
        kind: MetricKind,
    ) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            value_expr: value_expr.into(),
            kind,
            deviation_threshold: None,
        }
    }

    pub fn with_threshold(mut self, k: f64) -> Self {
        self.deviation_threshold = Some(k);
        self
    }

    /// Band width in standard deviations
    pub fn threshold(&self) -> f64 {
        self.deviation_threshold
            .unwrap_or_else(|| self.kind.default_threshold())
    }

    /// Reject definitions that cannot be safely spliced into a query
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| ReporterError::InvalidMetric {
            name: self.name.clone(),
            reason: reason.to_string(),
        };

        if self.name.trim().is_empty() {
            return Err(invalid("name is empty"));
        }
        if self.table.is_empty()
            || !self
                .table
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
        {
            return Err(invalid("table must be a plain identifier"));
        }
        if self.value_expr.trim().is_empty() {
            return Err(invalid("value expression is empty"));
        }
        if self.value_expr.contains(';') {
            return Err(invalid("value expression must be a single expression"));
        }
        let k = self.threshold();
        if !k.is_finite() || k <= 0.0 {
            return Err(invalid("deviation threshold must be positive"));
        }
        Ok(())
    }
}

/// One historical bucket value of a metric
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BucketSample {
    pub date: NaiveDate,
    /// Bucket start within the day
    pub bucket: NaiveTime,
    pub value: f64,
}

impl BucketSample {
    pub fn new(date: NaiveDate, bucket: NaiveTime, value: f64) -> Self {
        Self {
            date,
            bucket,
            value,
        }
    }
}

/// Value of the most recently completed bucket
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurrentObservation {
    pub date: NaiveDate,
    pub bucket: NaiveTime,
    pub value: f64,
}

impl CurrentObservation {
    pub fn weekday(&self) -> Weekday {
        self.date.weekday()
    }
}

/// A metric whose latest bucket fell outside its expected range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyRecord {
    pub metric_name: String,
    /// Start of the offending bucket
    pub bucket: NaiveTime,
    /// Observed value divided by the weekday baseline
    pub relative_deviation: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub mean_relative_deviation: f64,
    /// Expected absolute value, rounded to the metric's precision
    pub expected_value: f64,
    /// Observed absolute value, rounded to the metric's precision
    pub observed_value: f64,
    /// Percent change from expected, rounded to 2 decimals; `None` when
    /// the expected value is zero
    pub change_percent: Option<f64>,
}

impl AnomalyRecord {
    /// Bucket label as `HH:MM:SS`
    pub fn bucket_label(&self) -> String {
        bucket_label(self.bucket)
    }

    /// Report window as (`HH:MM`, `HH:MM`)
    pub fn window(&self) -> (String, String) {
        let end = self.bucket + Duration::minutes(i64::from(BUCKET_MINUTES));
        (
            self.bucket.format("%H:%M").to_string(),
            end.format("%H:%M").to_string(),
        )
    }

    /// Percent change as shown in reports
    pub fn change_display(&self) -> String {
        match self.change_percent {
            Some(change) => change.to_string(),
            None => "n/a".to_string(),
        }
    }
}

/// Format a bucket start as `HH:MM:SS`
pub fn bucket_label(bucket: NaiveTime) -> String {
    bucket.format("%H:%M:%S").to_string()
}

/// Truncate a timestamp to the start of its 15-minute bucket
pub fn truncate_to_bucket(ts: NaiveDateTime) -> NaiveDateTime {
    let minute = ts.minute() - ts.minute() % BUCKET_MINUTES;
    let time = NaiveTime::from_hms_opt(ts.hour(), minute, 0).unwrap_or(NaiveTime::MIN);
    ts.date().and_time(time)
}

/// Start of the last fully completed bucket before `now`
pub fn last_completed_bucket(now: NaiveDateTime) -> NaiveDateTime {
    truncate_to_bucket(now) - Duration::minutes(i64::from(BUCKET_MINUTES))
}

/// Round to `decimals` places, ties to even as the warehouse's `round` does for floats
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round_ties_even() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 6)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn test_truncate_to_bucket() {
        assert_eq!(truncate_to_bucket(at(10, 44, 59)), at(10, 30, 0));
        assert_eq!(truncate_to_bucket(at(10, 45, 0)), at(10, 45, 0));
        assert_eq!(truncate_to_bucket(at(0, 7, 3)), at(0, 0, 0));
    }

    #[test]
    fn test_last_completed_bucket_crosses_midnight() {
        let bucket = last_completed_bucket(at(0, 1, 0));
        assert_eq!(
            bucket,
            NaiveDate::from_ymd_opt(2025, 3, 5)
                .unwrap()
                .and_hms_opt(23, 45, 0)
                .unwrap()
        );
    }

    #[test]
    fn test_window_wraps_at_midnight() {
        let record = AnomalyRecord {
            metric_name: "Number of User Views".to_string(),
            bucket: NaiveTime::from_hms_opt(23, 45, 0).unwrap(),
            relative_deviation: 0.5,
            lower_bound: 0.9,
            upper_bound: 1.1,
            mean_relative_deviation: 1.0,
            expected_value: 1000.0,
            observed_value: 500.0,
            change_percent: Some(-50.0),
        };

        assert_eq!(record.window(), ("23:45".to_string(), "00:00".to_string()));
        assert_eq!(record.bucket_label(), "23:45:00");
        assert_eq!(record.change_display(), "-50");
    }

    #[test]
    fn test_threshold_defaults_by_kind() {
        let views = MetricDefinition::new("Views", "feed_actions", "count()", MetricKind::Count);
        let ctr = MetricDefinition::new("CTR", "feed_actions", "1", MetricKind::Ratio);

        assert_eq!(views.threshold(), 3.0);
        assert_eq!(ctr.threshold(), 2.0);
        assert_eq!(views.with_threshold(4.0).threshold(), 4.0);
    }

    #[test]
    fn test_validate_rejects_unsafe_table() {
        let metric = MetricDefinition::new(
            "Views",
            "feed_actions; DROP TABLE x",
            "count()",
            MetricKind::Count,
        );
        assert!(matches!(
            metric.validate(),
            Err(ReporterError::InvalidMetric { .. })
        ));

        let bad_k = MetricDefinition::new("Views", "feed_actions", "count()", MetricKind::Count)
            .with_threshold(0.0);
        assert!(bad_k.validate().is_err());
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(-49.996, 2), -50.0);
        assert_eq!(round_to(0.21349, 3), 0.213);
        assert_eq!(round_to(999.5, 0), 1000.0);
    }

    #[test]
    fn test_round_to_breaks_ties_to_even() {
        assert_eq!(round_to(2.5, 0), 2.0);
        assert_eq!(round_to(3.5, 0), 4.0);
        assert_eq!(round_to(1000.5, 0), 1000.0);
        assert_eq!(round_to(-0.5, 0), 0.0);
        assert_eq!(round_to(0.125, 2), 0.12);
    }
}
