//! Error types shared by the reporter pipeline

use thiserror::Error;

/// Errors raised by the detection, formatting and dispatch stages
///
/// None of these are recovered locally. A failing step is retried by the
/// cycle runner and, once retries are exhausted, fails the whole cycle.
#[derive(Debug, Error)]
pub enum ReporterError {
    /// The analytics warehouse could not be reached or rejected a query
    #[error("warehouse query failed for {metric}: {message}")]
    Warehouse { metric: String, message: String },

    /// The notification sink could not deliver the report
    #[error("notification delivery failed: {0}")]
    Notification(String),

    /// A metric definition cannot be evaluated
    #[error("invalid metric definition '{name}': {reason}")]
    InvalidMetric { name: String, reason: String },

    /// Configuration is missing or malformed
    #[error("configuration error: {0}")]
    Config(String),
}

impl ReporterError {
    pub fn warehouse(metric: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Warehouse {
            metric: metric.into(),
            message: message.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ReporterError>;
