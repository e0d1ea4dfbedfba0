//! Historical data sources for metric detection
//!
//! A source answers two questions per metric: the per-bucket history up to
//! (but excluding) a given day, and the value of one specific bucket.

mod memory;
mod warehouse;

pub use memory::InMemorySource;
pub use warehouse::{history_query, observation_query, ClickHouseConfig, ClickHouseSource};

use crate::error::Result;
use crate::models::{BucketSample, CurrentObservation, MetricDefinition};
use chrono::{NaiveDate, NaiveDateTime};

pub use async_trait::async_trait;

/// Trait for metric data source implementations
#[async_trait]
pub trait MetricSource: Send + Sync {
    /// All bucket values of `metric` on dates strictly before `before`
    async fn history(
        &self,
        metric: &MetricDefinition,
        before: NaiveDate,
    ) -> Result<Vec<BucketSample>>;

    /// Value of `metric` for the bucket starting at `bucket_start`, or
    /// `None` when the bucket has no rows
    async fn observation(
        &self,
        metric: &MetricDefinition,
        bucket_start: NaiveDateTime,
    ) -> Result<Option<CurrentObservation>>;
}
