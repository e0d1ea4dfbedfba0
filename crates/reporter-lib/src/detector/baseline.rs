//! Historical baseline for one metric
//!
//! From per-bucket history this derives:
//! - the mean value of every historical day
//! - each bucket's deviation relative to its day's mean
//! - a confidence band of relative deviation per bucket label
//! - a recency-weighted expected daily level per weekday

use crate::models::BucketSample;
use chrono::{Datelike, NaiveDate, NaiveTime, Weekday};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Minimum samples for a sample standard deviation
const MIN_SAMPLES_FOR_BAND: usize = 2;

/// A bucket value relative to its day's mean
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelativeDeviation {
    pub date: NaiveDate,
    pub bucket: NaiveTime,
    pub value: f64,
}

/// Acceptable range of relative deviation for one bucket label
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceBand {
    /// Mean relative deviation across historical days
    pub mean: f64,
    /// Sample standard deviation (Bessel's correction)
    pub std_dev: f64,
    pub lower: f64,
    pub upper: f64,
    pub samples: usize,
}

impl ConfidenceBand {
    /// Build a band of `k` standard deviations around the mean
    ///
    /// Returns `None` when fewer than two finite values are available.
    pub fn from_values(values: &[f64], k: f64) -> Option<Self> {
        let count = values.len();
        if count < MIN_SAMPLES_FOR_BAND {
            return None;
        }

        let mean = values.iter().sum::<f64>() / count as f64;
        let variance =
            values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (count - 1) as f64;
        let std_dev = variance.sqrt();

        if !mean.is_finite() || !std_dev.is_finite() {
            return None;
        }

        Some(Self {
            mean,
            std_dev,
            lower: mean - k * std_dev,
            upper: mean + k * std_dev,
            samples: count,
        })
    }

    /// Inclusive range check
    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }
}

/// Mean bucket value per historical date
///
/// Non-finite and negative samples are ignored.
pub fn daily_averages(series: &[BucketSample]) -> BTreeMap<NaiveDate, f64> {
    let mut sums: BTreeMap<NaiveDate, (f64, usize)> = BTreeMap::new();
    for sample in series.iter().filter(|s| is_usable(s.value)) {
        let entry = sums.entry(sample.date).or_insert((0.0, 0));
        entry.0 += sample.value;
        entry.1 += 1;
    }

    sums.into_iter()
        .map(|(date, (sum, count))| (date, sum / count as f64))
        .collect()
}

/// Each bucket value divided by its day's mean
///
/// Days whose mean is zero have no intra-day shape and are skipped.
pub fn relative_deviations(
    series: &[BucketSample],
    daily: &BTreeMap<NaiveDate, f64>,
) -> Vec<RelativeDeviation> {
    series
        .iter()
        .filter(|s| is_usable(s.value))
        .filter_map(|s| {
            let avg = *daily.get(&s.date)?;
            if avg <= 0.0 || !avg.is_finite() {
                return None;
            }
            Some(RelativeDeviation {
                date: s.date,
                bucket: s.bucket,
                value: s.value / avg,
            })
        })
        .collect()
}

/// Confidence band per bucket label
pub fn confidence_bands(
    deviations: &[RelativeDeviation],
    k: f64,
) -> BTreeMap<NaiveTime, ConfidenceBand> {
    let mut by_bucket: BTreeMap<NaiveTime, Vec<f64>> = BTreeMap::new();
    for deviation in deviations {
        by_bucket
            .entry(deviation.bucket)
            .or_default()
            .push(deviation.value);
    }

    by_bucket
        .into_iter()
        .filter_map(|(bucket, values)| {
            ConfidenceBand::from_values(&values, k).map(|band| (bucket, band))
        })
        .collect()
}

/// Rank of each date within its weekday, oldest = 1
pub fn weekday_weights(daily: &BTreeMap<NaiveDate, f64>) -> BTreeMap<NaiveDate, u32> {
    let mut next_rank: HashMap<Weekday, u32> = HashMap::new();

    // BTreeMap iterates dates in ascending order
    daily
        .keys()
        .map(|date| {
            let rank = next_rank.entry(date.weekday()).or_insert(0);
            *rank += 1;
            (*date, *rank)
        })
        .collect()
}

/// Recency-weighted mean of daily averages per weekday
pub fn weighted_baselines(
    daily: &BTreeMap<NaiveDate, f64>,
    weights: &BTreeMap<NaiveDate, u32>,
) -> HashMap<Weekday, f64> {
    let mut totals: HashMap<Weekday, (f64, f64)> = HashMap::new();
    for (date, avg) in daily {
        let Some(weight) = weights.get(date) else {
            continue;
        };
        let weight = f64::from(*weight);
        let entry = totals.entry(date.weekday()).or_insert((0.0, 0.0));
        entry.0 += avg * weight;
        entry.1 += weight;
    }

    totals
        .into_iter()
        .filter(|(_, (_, weight_sum))| *weight_sum > 0.0)
        .map(|(weekday, (weighted_sum, weight_sum))| (weekday, weighted_sum / weight_sum))
        .collect()
}

fn is_usable(value: f64) -> bool {
    value.is_finite() && value >= 0.0
}

/// Everything the evaluator needs to judge one observation
#[derive(Debug, Clone, Default)]
pub struct Baseline {
    pub daily_averages: BTreeMap<NaiveDate, f64>,
    pub bands: BTreeMap<NaiveTime, ConfidenceBand>,
    pub weekday_weights: BTreeMap<NaiveDate, u32>,
    pub weekday_baselines: HashMap<Weekday, f64>,
}

impl Baseline {
    /// Compute the baseline from historical bucket values with band width `k`
    pub fn from_series(series: &[BucketSample], k: f64) -> Self {
        let skipped = series.iter().filter(|s| !is_usable(s.value)).count();
        if skipped > 0 {
            debug!(skipped, "Ignoring non-finite or negative bucket values");
        }

        let daily_averages = daily_averages(series);
        let deviations = relative_deviations(series, &daily_averages);
        let bands = confidence_bands(&deviations, k);
        let weekday_weights = weekday_weights(&daily_averages);
        let weekday_baselines = weighted_baselines(&daily_averages, &weekday_weights);

        Self {
            daily_averages,
            bands,
            weekday_weights,
            weekday_baselines,
        }
    }

    pub fn band(&self, bucket: NaiveTime) -> Option<&ConfidenceBand> {
        self.bands.get(&bucket)
    }

    pub fn weekday_baseline(&self, weekday: Weekday) -> Option<f64> {
        self.weekday_baselines.get(&weekday).copied()
    }
}
