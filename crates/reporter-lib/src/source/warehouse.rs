//! ClickHouse-backed metric source
//!
//! Aggregation into 15-minute buckets happens in the warehouse; the
//! statistics over those buckets are computed by the detector.

use super::{async_trait, MetricSource};
use crate::error::{ReporterError, Result};
use crate::models::{BucketSample, CurrentObservation, MetricDefinition, BUCKET_MINUTES};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use clickhouse::{Client, Row};
use serde::Deserialize;
use tracing::debug;

/// Connection parameters for the warehouse
#[derive(Debug, Clone, Deserialize)]
pub struct ClickHouseConfig {
    /// HTTP endpoint, e.g. "https://clickhouse.example.com:8443"
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_database")]
    pub database: String,
}

fn default_url() -> String {
    "http://localhost:8123".to_string()
}

fn default_user() -> String {
    "default".to_string()
}

fn default_database() -> String {
    "simulator_20250120".to_string()
}

impl Default for ClickHouseConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            user: default_user(),
            password: String::new(),
            database: default_database(),
        }
    }
}

#[derive(Debug, Row, Deserialize)]
struct HistoryRow {
    date: String,
    bucket: String,
    value: f64,
}

#[derive(Debug, Row, Deserialize)]
struct ObservationRow {
    value: f64,
}

/// Metric source that reads raw event tables from ClickHouse
pub struct ClickHouseSource {
    client: Client,
}

impl ClickHouseSource {
    pub fn new(config: &ClickHouseConfig) -> Self {
        let client = Client::default()
            .with_url(&config.url)
            .with_user(&config.user)
            .with_password(&config.password)
            .with_database(&config.database);

        Self { client }
    }
}

fn bucket_expr() -> String {
    format!("toStartOfInterval(time, toIntervalMinute({}))", BUCKET_MINUTES)
}

/// Per-bucket history of one metric before `before`
pub fn history_query(metric: &MetricDefinition, before: NaiveDate) -> String {
    let bucket = bucket_expr();
    format!(
        "SELECT toString(toDate(time)) AS date, \
         formatDateTime({bucket}, '%H:%M:%S') AS bucket, \
         toFloat64({expr}) AS value \
         FROM {table} \
         WHERE toDate(time) < toDate('{before}') \
         GROUP BY toDate(time), {bucket} \
         ORDER BY toDate(time), {bucket}",
        bucket = bucket,
        expr = metric.value_expr,
        table = metric.table,
        before = before.format("%Y-%m-%d"),
    )
}

/// Value of one metric for the bucket starting at `bucket_start`
pub fn observation_query(metric: &MetricDefinition, bucket_start: NaiveDateTime) -> String {
    let bucket = bucket_expr();
    format!(
        "SELECT toFloat64({expr}) AS value \
         FROM {table} \
         WHERE {bucket} = toDateTime('{start}') \
         GROUP BY {bucket}",
        bucket = bucket,
        expr = metric.value_expr,
        table = metric.table,
        start = bucket_start.format("%Y-%m-%d %H:%M:%S"),
    )
}

fn parse_row(metric: &MetricDefinition, row: HistoryRow) -> Result<BucketSample> {
    let date = NaiveDate::parse_from_str(&row.date, "%Y-%m-%d").map_err(|e| {
        ReporterError::warehouse(&metric.name, format!("bad date '{}': {}", row.date, e))
    })?;
    let bucket = NaiveTime::parse_from_str(&row.bucket, "%H:%M:%S").map_err(|e| {
        ReporterError::warehouse(&metric.name, format!("bad bucket '{}': {}", row.bucket, e))
    })?;
    Ok(BucketSample::new(date, bucket, row.value))
}

#[async_trait]
impl MetricSource for ClickHouseSource {
    async fn history(
        &self,
        metric: &MetricDefinition,
        before: NaiveDate,
    ) -> Result<Vec<BucketSample>> {
        metric.validate()?;
        let sql = history_query(metric, before);

        let rows = self
            .client
            .query(&sql)
            .fetch_all::<HistoryRow>()
            .await
            .map_err(|e| ReporterError::warehouse(&metric.name, e))?;

        debug!(metric = %metric.name, rows = rows.len(), "Fetched metric history");

        rows.into_iter().map(|row| parse_row(metric, row)).collect()
    }

    async fn observation(
        &self,
        metric: &MetricDefinition,
        bucket_start: NaiveDateTime,
    ) -> Result<Option<CurrentObservation>> {
        metric.validate()?;
        let sql = observation_query(metric, bucket_start);

        let rows = self
            .client
            .query(&sql)
            .fetch_all::<ObservationRow>()
            .await
            .map_err(|e| ReporterError::warehouse(&metric.name, e))?;

        Ok(rows.first().map(|row| CurrentObservation {
            date: bucket_start.date(),
            bucket: bucket_start.time(),
            value: row.value,
        }))
    }
}
