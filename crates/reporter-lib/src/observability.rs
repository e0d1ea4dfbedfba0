//! Observability infrastructure for the anomaly reporter
//!
//! Provides:
//! - Prometheus metrics (cycles, failures, retries, anomalies, reports, detection latency)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, Histogram, IntCounter,
    IntCounterVec,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for detection latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<ReporterMetricsInner> = OnceLock::new();

/// Inner metrics structure that holds the actual Prometheus metrics
struct ReporterMetricsInner {
    detection_latency_seconds: Histogram,
    cycles: IntCounter,
    cycle_failures: IntCounter,
    step_retries: IntCounterVec,
    anomalies_detected: IntCounterVec,
    reports_sent: IntCounter,
    reports_suppressed: IntCounter,
}

impl ReporterMetricsInner {
    fn new() -> Self {
        Self {
            detection_latency_seconds: register_histogram!(
                "anomaly_reporter_detection_latency_seconds",
                "Time spent querying and evaluating all tracked metrics",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register detection_latency_seconds"),

            cycles: register_int_counter!(
                "anomaly_reporter_cycles_total",
                "Total number of completed report cycles"
            )
            .expect("Failed to register cycles_total"),

            cycle_failures: register_int_counter!(
                "anomaly_reporter_cycle_failures_total",
                "Total number of cycles that failed after exhausting retries"
            )
            .expect("Failed to register cycle_failures_total"),

            step_retries: register_int_counter_vec!(
                "anomaly_reporter_step_retries_total",
                "Total number of retried pipeline steps",
                &["step"]
            )
            .expect("Failed to register step_retries_total"),

            anomalies_detected: register_int_counter_vec!(
                "anomaly_reporter_anomalies_detected_total",
                "Total number of anomalies detected per metric",
                &["metric"]
            )
            .expect("Failed to register anomalies_detected_total"),

            reports_sent: register_int_counter!(
                "anomaly_reporter_reports_sent_total",
                "Total number of reports delivered to the notification sink"
            )
            .expect("Failed to register reports_sent_total"),

            reports_suppressed: register_int_counter!(
                "anomaly_reporter_reports_suppressed_total",
                "Total number of cycles with nothing to report"
            )
            .expect("Failed to register reports_suppressed_total"),
        }
    }
}

/// Reporter metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct ReporterMetrics {
    _private: (),
}

impl Default for ReporterMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ReporterMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(ReporterMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &ReporterMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    pub fn observe_detection_latency(&self, duration_secs: f64) {
        self.inner().detection_latency_seconds.observe(duration_secs);
    }

    pub fn inc_cycles(&self) {
        self.inner().cycles.inc();
    }

    pub fn inc_cycle_failures(&self) {
        self.inner().cycle_failures.inc();
    }

    pub fn inc_step_retries(&self, step: &str) {
        self.inner().step_retries.with_label_values(&[step]).inc();
    }

    pub fn inc_anomalies_detected(&self, metric: &str) {
        self.inner()
            .anomalies_detected
            .with_label_values(&[metric])
            .inc();
    }

    pub fn inc_reports_sent(&self) {
        self.inner().reports_sent.inc();
    }

    pub fn inc_reports_suppressed(&self) {
        self.inner().reports_suppressed.inc();
    }

    /// Current number of completed cycles
    pub fn cycles(&self) -> u64 {
        self.inner().cycles.get()
    }
}

/// Structured logger for reporter events
///
/// Provides consistent JSON-formatted logging for cycles, anomalies
/// and report delivery.
#[derive(Clone)]
pub struct StructuredLogger {
    job: String,
}

impl StructuredLogger {
    pub fn new(job: impl Into<String>) -> Self {
        Self { job: job.into() }
    }

    /// Log one flagged metric
    pub fn log_anomaly(
        &self,
        metric: &str,
        bucket: &str,
        observed: f64,
        expected: f64,
        change_percent: Option<f64>,
    ) {
        warn!(
            event = "anomaly_detected",
            job = %self.job,
            metric = %metric,
            bucket = %bucket,
            observed = observed,
            expected = expected,
            change_percent = ?change_percent,
            "Anomaly detected"
        );
    }

    /// Log the report of a cycle with nothing to send
    pub fn log_report_suppressed(&self, message: &str) {
        info!(
            event = "report_suppressed",
            job = %self.job,
            message = %message,
            "Nothing to report"
        );
    }

    /// Log a delivered report
    pub fn log_report_sent(&self, sink: &str, anomalies: usize) {
        info!(
            event = "report_sent",
            job = %self.job,
            sink = %sink,
            anomalies = anomalies,
            "Report delivered"
        );
    }

    /// Log a failed step that will be retried
    pub fn log_step_retry(&self, step: &str, attempt: u32, max_retries: u32, error: &str) {
        warn!(
            event = "step_retry",
            job = %self.job,
            step = %step,
            attempt = attempt,
            max_retries = max_retries,
            error = %error,
            "Pipeline step failed, retrying"
        );
    }

    /// Log a completed cycle
    pub fn log_cycle_completed(&self, bucket: &str, anomalies: usize, outcome: &str, elapsed_ms: u128) {
        info!(
            event = "cycle_completed",
            job = %self.job,
            bucket = %bucket,
            anomalies = anomalies,
            outcome = %outcome,
            elapsed_ms = elapsed_ms as u64,
            "Report cycle completed"
        );
    }

    /// Log a cycle that failed after exhausting retries
    pub fn log_cycle_failed(&self, step: &str, error: &str) {
        warn!(
            event = "cycle_failed",
            job = %self.job,
            step = %step,
            error = %error,
            "Report cycle failed"
        );
    }

    /// Log reporter startup
    pub fn log_startup(&self, version: &str, metrics: usize) {
        info!(
            event = "reporter_started",
            job = %self.job,
            version = %version,
            tracked_metrics = metrics,
            "Anomaly reporter started"
        );
    }

    /// Log reporter shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "reporter_shutdown",
            job = %self.job,
            reason = %reason,
            "Anomaly reporter shutting down"
        );
    }
}
