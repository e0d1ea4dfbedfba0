//! Report cycle scheduling
//!
//! Runs detect → format → dispatch once per cadence tick. Detection and
//! dispatch are retried with a fixed delay; formatting cannot fail. Each
//! cycle recomputes everything from the warehouse, so a retried or
//! repeated cycle yields the same table for the same "now".

use crate::detector::AnomalyDetector;
use crate::dispatch::{DispatchOutcome, Dispatcher};
use crate::error::{ReporterError, Result};
use crate::health::{components, HealthRegistry};
use crate::models::{last_completed_bucket, AnomalyRecord};
use crate::observability::{ReporterMetrics, StructuredLogger};
use crate::report::ReportFormatter;
use chrono::{Duration as ChronoDuration, NaiveDateTime, NaiveTime, Timelike, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Default cadence: every 15 minutes
pub const DEFAULT_INTERVAL_MINUTES: u32 = 15;

/// Default offset so each run starts after its bucket has closed
pub const DEFAULT_OFFSET_MINUTES: u32 = 1;

/// Default retries per step
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default delay between retries (10 minutes)
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(10 * 60);

/// Wall-clock schedule: fire at minute `offset + n * interval` of each day
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cadence {
    interval_minutes: u32,
    offset_minutes: u32,
}

impl Default for Cadence {
    fn default() -> Self {
        Self {
            interval_minutes: DEFAULT_INTERVAL_MINUTES,
            offset_minutes: DEFAULT_OFFSET_MINUTES,
        }
    }
}

impl Cadence {
    pub fn new(interval_minutes: u32, offset_minutes: u32) -> Result<Self> {
        if interval_minutes == 0 || 24 * 60 % interval_minutes != 0 {
            return Err(ReporterError::Config(format!(
                "interval of {} minutes does not divide a day",
                interval_minutes
            )));
        }
        if offset_minutes >= interval_minutes {
            return Err(ReporterError::Config(format!(
                "offset {} must be below interval {}",
                offset_minutes, interval_minutes
            )));
        }
        Ok(Self {
            interval_minutes,
            offset_minutes,
        })
    }

    /// First fire time strictly after `now`
    pub fn next_after(&self, now: NaiveDateTime) -> NaiveDateTime {
        let minute_of_day = i64::from(now.hour() * 60 + now.minute());
        let interval = i64::from(self.interval_minutes);
        let offset = i64::from(self.offset_minutes);

        let slot = (minute_of_day - offset).div_euclid(interval) + 1;
        let midnight = now.date().and_time(NaiveTime::MIN);
        midnight + ChronoDuration::minutes(offset + slot * interval)
    }
}

/// Fixed-delay retry policy applied to each fallible step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

/// "Now" on the warehouse clock
///
/// An anchored clock starts at a fixed instant and then follows tokio's
/// timer, which makes it controllable under a paused runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct WarehouseClock {
    utc_offset_minutes: i32,
    anchor: Option<(NaiveDateTime, tokio::time::Instant)>,
}

impl WarehouseClock {
    pub fn new(utc_offset_minutes: i32) -> Self {
        Self {
            utc_offset_minutes,
            anchor: None,
        }
    }

    /// Clock reading `start` now and advancing with the tokio timer
    pub fn anchored(start: NaiveDateTime) -> Self {
        Self {
            utc_offset_minutes: 0,
            anchor: Some((start, tokio::time::Instant::now())),
        }
    }

    pub fn now(&self) -> NaiveDateTime {
        match self.anchor {
            Some((start, since)) => {
                let elapsed = ChronoDuration::from_std(since.elapsed())
                    .unwrap_or_else(|_| ChronoDuration::zero());
                start + elapsed
            }
            None => {
                Utc::now().naive_utc()
                    + ChronoDuration::minutes(i64::from(self.utc_offset_minutes))
            }
        }
    }
}

/// Outcome of one completed cycle
#[derive(Debug, Clone)]
pub struct CycleReport {
    /// Start of the evaluated bucket
    pub bucket: NaiveDateTime,
    pub anomalies: Vec<AnomalyRecord>,
    pub message: String,
    pub outcome: DispatchOutcome,
}

/// Runs the detect → format → dispatch pipeline
pub struct CycleRunner {
    detector: AnomalyDetector,
    formatter: ReportFormatter,
    dispatcher: Dispatcher,
    retry: RetryPolicy,
    metrics: ReporterMetrics,
    logger: StructuredLogger,
    health: HealthRegistry,
}

impl CycleRunner {
    pub fn new(
        detector: AnomalyDetector,
        formatter: ReportFormatter,
        dispatcher: Dispatcher,
        retry: RetryPolicy,
        logger: StructuredLogger,
        health: HealthRegistry,
    ) -> Self {
        Self {
            detector,
            formatter,
            dispatcher,
            retry,
            metrics: ReporterMetrics::new(),
            logger,
            health,
        }
    }

    /// Run one full cycle for the given "now"
    pub async fn run_cycle(&self, now: NaiveDateTime) -> Result<CycleReport> {
        let start = Instant::now();
        let bucket = last_completed_bucket(now);

        let detector = &self.detector;
        let anomalies = self
            .with_retry("detect", components::WAREHOUSE, || detector.detect(now))
            .await?;
        self.metrics
            .observe_detection_latency(start.elapsed().as_secs_f64());

        for record in &anomalies {
            self.metrics.inc_anomalies_detected(&record.metric_name);
            self.logger.log_anomaly(
                &record.metric_name,
                &record.bucket_label(),
                record.observed_value,
                record.expected_value,
                record.change_percent,
            );
        }

        let message = self.formatter.format(&anomalies);

        let dispatcher = &self.dispatcher;
        let outcome = self
            .with_retry("dispatch", components::NOTIFIER, || {
                dispatcher.dispatch(&anomalies, &message)
            })
            .await?;

        match outcome {
            DispatchOutcome::Sent => self.metrics.inc_reports_sent(),
            DispatchOutcome::Suppressed => self.metrics.inc_reports_suppressed(),
        }
        self.metrics.inc_cycles();
        self.logger.log_cycle_completed(
            &bucket.to_string(),
            anomalies.len(),
            &outcome.to_string(),
            start.elapsed().as_millis(),
        );

        Ok(CycleReport {
            bucket,
            anomalies,
            message,
            outcome,
        })
    }

    /// Run `op` until it succeeds or the retry budget is spent
    async fn with_retry<T, F, Fut>(&self, step: &str, component: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => {
                    self.health.set_healthy(component).await;
                    return Ok(value);
                }
                Err(e) if attempt < self.retry.max_retries => {
                    attempt += 1;
                    self.health.set_degraded(component, e.to_string()).await;
                    self.metrics.inc_step_retries(step);
                    self.logger
                        .log_step_retry(step, attempt, self.retry.max_retries, &e.to_string());
                    tokio::time::sleep(self.retry.delay).await;
                }
                Err(e) => {
                    self.health.set_unhealthy(component, e.to_string()).await;
                    self.metrics.inc_cycle_failures();
                    self.logger.log_cycle_failed(step, &e.to_string());
                    return Err(e);
                }
            }
        }
    }

    /// Run cycles on `cadence` until shutdown
    ///
    /// Every slot gets its own cycle, with the slot's fire time as "now".
    /// Cycles run on separate tasks, so one still retrying never delays the
    /// next slot; a slot reached late (e.g. after a suspend) runs at once.
    /// Failed cycles are logged and counted by the retry wrapper. In-flight
    /// cycles are aborted on shutdown.
    pub async fn run(
        self: Arc<Self>,
        cadence: Cadence,
        clock: WarehouseClock,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        info!(
            interval_minutes = cadence.interval_minutes,
            offset_minutes = cadence.offset_minutes,
            "Starting report scheduler"
        );
        self.health.set_healthy(components::SCHEDULER).await;

        let mut in_flight = JoinSet::new();
        let mut fire_at = cadence.next_after(clock.now());

        loop {
            let now = clock.now();
            let wait = (fire_at - now).to_std().unwrap_or_default();
            debug!(fire_at = %fire_at, wait_secs = wait.as_secs(), "Waiting for next cycle");

            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    let lag = clock.now() - fire_at;
                    if lag >= ChronoDuration::minutes(i64::from(cadence.interval_minutes)) {
                        warn!(
                            fire_at = %fire_at,
                            lag_secs = lag.num_seconds(),
                            "Report cycle starting late"
                        );
                    }

                    let runner = Arc::clone(&self);
                    in_flight.spawn(async move {
                        let _ = runner.run_cycle(fire_at).await;
                    });
                    fire_at = cadence.next_after(fire_at);
                }
                Some(joined) = in_flight.join_next() => {
                    if let Err(e) = joined {
                        warn!(error = %e, "Report cycle task did not complete");
                    }
                }
                _ = shutdown.recv() => {
                    info!(in_flight = in_flight.len(), "Shutting down report scheduler");
                    break;
                }
            }
        }

        in_flight.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{async_trait, NotificationSink};
    use crate::models::{BucketSample, MetricDefinition, MetricKind};
    use crate::source::InMemorySource;
    use chrono::NaiveDate;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    fn at(d: u32, h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, d)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn test_cadence_fires_after_bucket_close() {
        let cadence = Cadence::default();

        assert_eq!(cadence.next_after(at(6, 10, 0, 0)), at(6, 10, 1, 0));
        assert_eq!(cadence.next_after(at(6, 10, 1, 0)), at(6, 10, 16, 0));
        assert_eq!(cadence.next_after(at(6, 10, 1, 30)), at(6, 10, 16, 0));
        assert_eq!(cadence.next_after(at(6, 10, 46, 0)), at(6, 11, 1, 0));
        assert_eq!(cadence.next_after(at(6, 23, 50, 0)), at(7, 0, 1, 0));
        assert_eq!(cadence.next_after(at(6, 0, 0, 30)), at(6, 0, 1, 0));
    }

    #[test]
    fn test_cadence_validation() {
        assert!(Cadence::new(0, 0).is_err());
        assert!(Cadence::new(7, 0).is_err());
        assert!(Cadence::new(15, 15).is_err());
        assert!(Cadence::new(30, 5).is_ok());
    }

    /// Sink that fails a fixed number of times before succeeding
    struct FlakySink {
        failures_left: AtomicU32,
        attempts: AtomicU32,
        sent: Mutex<Vec<String>>,
    }

    impl FlakySink {
        fn failing(times: u32) -> Self {
            Self {
                failures_left: AtomicU32::new(times),
                attempts: AtomicU32::new(0),
                sent: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl NotificationSink for FlakySink {
        async fn send(&self, text: &str) -> Result<()> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                return Err(ReporterError::Notification("timeout".to_string()));
            }
            self.sent.lock().unwrap().push(text.to_string());
            Ok(())
        }

        fn name(&self) -> &str {
            "flaky"
        }
    }

    fn runner(source: InMemorySource, sink: Arc<FlakySink>, health: HealthRegistry) -> CycleRunner {
        let retry = RetryPolicy {
            max_retries: 3,
            delay: Duration::from_millis(1),
        };
        runner_with_retry(source, sink, health, retry)
    }

    fn runner_with_retry(
        source: InMemorySource,
        sink: Arc<FlakySink>,
        health: HealthRegistry,
        retry: RetryPolicy,
    ) -> CycleRunner {
        let metric =
            MetricDefinition::new("Number of Sent Messages", "message_actions", "count()", MetricKind::Count);
        let logger = StructuredLogger::new("test");
        CycleRunner::new(
            AnomalyDetector::new(Arc::new(source), vec![metric]),
            ReportFormatter::new("https://dash.example.com"),
            Dispatcher::new(sink, logger.clone()),
            retry,
            logger,
            health,
        )
    }

    /// Two weeks of 100 messages per bucket with ±10% alternation, and a
    /// current bucket at `current`
    fn messages_source(current: f64) -> InMemorySource {
        let mut source = InMemorySource::new();
        for d in 0..14i64 {
            let date = NaiveDate::from_ymd_opt(2025, 2, 20).unwrap() + ChronoDuration::days(d);
            for q in 0..96i64 {
                let bucket = NaiveTime::MIN + ChronoDuration::minutes(q * 15);
                let value = if (d + q) % 2 == 0 { 90.0 } else { 110.0 };
                source.push("Number of Sent Messages", BucketSample::new(date, bucket, value));
            }
        }
        source.push(
            "Number of Sent Messages",
            BucketSample::new(
                NaiveDate::from_ymd_opt(2025, 3, 6).unwrap(),
                NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
                current,
            ),
        );
        source
    }

    #[tokio::test]
    async fn test_quiet_cycle_is_suppressed() {
        let sink = Arc::new(FlakySink::failing(0));
        let runner = runner(messages_source(100.0), sink.clone(), HealthRegistry::new());

        let report = runner.run_cycle(at(6, 10, 16, 0)).await.unwrap();

        assert_eq!(report.bucket, at(6, 10, 0, 0));
        assert!(report.anomalies.is_empty());
        assert_eq!(report.outcome, DispatchOutcome::Suppressed);
        assert_eq!(sink.attempts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_sink_failures_are_retried() {
        let sink = Arc::new(FlakySink::failing(2));
        let runner = runner(messages_source(5.0), sink.clone(), HealthRegistry::new());

        let report = runner.run_cycle(at(6, 10, 16, 0)).await.unwrap();

        assert_eq!(report.outcome, DispatchOutcome::Sent);
        assert_eq!(sink.attempts.load(Ordering::SeqCst), 3);
        let sent = sink.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("Number of Sent Messages"));
        assert!(sent[0].contains("from <b>10:00</b> to <b>10:15</b>"));
    }

    #[tokio::test]
    async fn test_exhausted_retries_fail_the_cycle() {
        let sink = Arc::new(FlakySink::failing(10));
        let health = HealthRegistry::new();
        let runner = runner(messages_source(5.0), sink.clone(), health.clone());

        let result = runner.run_cycle(at(6, 10, 16, 0)).await;

        assert!(matches!(result, Err(ReporterError::Notification(_))));
        assert_eq!(sink.attempts.load(Ordering::SeqCst), 4);
        let status = health.health().await;
        assert_eq!(
            status.components[components::NOTIFIER].status,
            crate::health::ComponentStatus::Unhealthy
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_cycle_does_not_skip_next_slot() {
        let mut source = messages_source(5.0);
        source.push(
            "Number of Sent Messages",
            BucketSample::new(
                NaiveDate::from_ymd_opt(2025, 3, 6).unwrap(),
                NaiveTime::from_hms_opt(9, 45, 0).unwrap(),
                5.0,
            ),
        );

        // The 10:01 cycle fails twice and only delivers at 10:21, after the
        // 10:16 slot has come due
        let sink = Arc::new(FlakySink::failing(2));
        let runner = Arc::new(runner_with_retry(
            source,
            sink.clone(),
            HealthRegistry::new(),
            RetryPolicy::default(),
        ));

        let clock = WarehouseClock::anchored(at(6, 9, 59, 0));
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(runner.run(Cadence::default(), clock, shutdown_rx));

        tokio::time::sleep(Duration::from_secs(41 * 60)).await;
        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();

        assert_eq!(sink.attempts.load(Ordering::SeqCst), 4);
        let sent = sink.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert!(sent
            .iter()
            .any(|m| m.contains("from <b>09:45</b> to <b>10:00</b>")));
        assert!(sent
            .iter()
            .any(|m| m.contains("from <b>10:00</b> to <b>10:15</b>")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_anchored_clock_follows_tokio_time() {
        let clock = WarehouseClock::anchored(at(6, 10, 0, 0));
        tokio::time::sleep(Duration::from_secs(90)).await;
        assert_eq!(clock.now(), at(6, 10, 1, 30));
    }
}
