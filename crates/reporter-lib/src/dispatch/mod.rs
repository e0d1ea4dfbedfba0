//! Report dispatch
//!
//! Sends a non-empty report to the notification sink. Reports without
//! anomalies are only written to the log.

mod telegram;

pub use telegram::{TelegramConfig, TelegramSink};

use crate::error::Result;
use crate::models::AnomalyRecord;
use crate::observability::StructuredLogger;
use std::sync::Arc;

pub use async_trait::async_trait;

/// Trait for notification channel implementations
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Deliver one HTML-markup message to the configured destination
    async fn send(&self, text: &str) -> Result<()>;

    /// Short name used in logs
    fn name(&self) -> &str;
}

/// What the dispatcher did with a report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The report was delivered to the sink
    Sent,
    /// Nothing to report; the message was only logged
    Suppressed,
}

impl std::fmt::Display for DispatchOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DispatchOutcome::Sent => write!(f, "sent"),
            DispatchOutcome::Suppressed => write!(f, "suppressed"),
        }
    }
}

/// Routes formatted reports to the sink or the log
#[derive(Clone)]
pub struct Dispatcher {
    sink: Arc<dyn NotificationSink>,
    logger: StructuredLogger,
}

impl Dispatcher {
    pub fn new(sink: Arc<dyn NotificationSink>, logger: StructuredLogger) -> Self {
        Self { sink, logger }
    }

    /// Send `message` if `records` is non-empty, otherwise log it
    ///
    /// Safe to call again after a failure; nothing is recorded between calls.
    pub async fn dispatch(
        &self,
        records: &[AnomalyRecord],
        message: &str,
    ) -> Result<DispatchOutcome> {
        if records.is_empty() {
            self.logger.log_report_suppressed(message);
            return Ok(DispatchOutcome::Suppressed);
        }

        self.sink.send(message).await?;
        self.logger.log_report_sent(self.sink.name(), records.len());
        Ok(DispatchOutcome::Sent)
    }
}
