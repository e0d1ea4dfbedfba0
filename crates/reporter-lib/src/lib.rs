//! Core library for the product-metrics anomaly reporter
//!
//! This crate provides:
//! - Per-metric baselines from warehouse history (daily shape bands and
//!   weekday-weighted levels)
//! - Detection of the last completed 15-minute bucket against them
//! - Report formatting and dispatch to a chat sink
//! - A scheduled cycle runner with fixed-delay retries
//! - Configuration, health checks and observability

pub mod api;
pub mod catalog;
pub mod detector;
pub mod dispatch;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod report;
pub mod schedule;
pub mod settings;
pub mod source;

pub use detector::AnomalyDetector;
pub use dispatch::{DispatchOutcome, Dispatcher, NotificationSink};
pub use error::{ReporterError, Result};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{ReporterMetrics, StructuredLogger};
pub use report::ReportFormatter;
pub use schedule::{Cadence, CycleReport, CycleRunner, RetryPolicy, WarehouseClock};
pub use settings::ReporterConfig;
pub use source::MetricSource;
