//! Reporter configuration
//!
//! Loaded once at startup from an optional TOML file overlaid with
//! `REPORTER_*` environment variables (nested keys use `__`, e.g.
//! `REPORTER_TELEGRAM__TOKEN`), then passed explicitly to every component.

use crate::catalog::tracked_metrics;
use crate::dispatch::TelegramConfig;
use crate::error::{ReporterError, Result};
use crate::models::MetricDefinition;
use crate::report::DEFAULT_DASHBOARD_URL;
use crate::schedule::{
    Cadence, RetryPolicy, WarehouseClock, DEFAULT_INTERVAL_MINUTES, DEFAULT_MAX_RETRIES,
    DEFAULT_OFFSET_MINUTES, DEFAULT_RETRY_DELAY,
};
use crate::source::ClickHouseConfig;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Cadence and retry settings
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u32,
    #[serde(default = "default_offset_minutes")]
    pub offset_minutes: u32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
}

fn default_interval_minutes() -> u32 {
    DEFAULT_INTERVAL_MINUTES
}

fn default_offset_minutes() -> u32 {
    DEFAULT_OFFSET_MINUTES
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_retry_delay_secs() -> u64 {
    DEFAULT_RETRY_DELAY.as_secs()
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_minutes: default_interval_minutes(),
            offset_minutes: default_offset_minutes(),
            max_retries: default_max_retries(),
            retry_delay_secs: default_retry_delay_secs(),
        }
    }
}

impl ScheduleConfig {
    pub fn cadence(&self) -> Result<Cadence> {
        Cadence::new(self.interval_minutes, self.offset_minutes)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            delay: Duration::from_secs(self.retry_delay_secs),
        }
    }
}

/// Complete reporter configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ReporterConfig {
    #[serde(default)]
    pub clickhouse: ClickHouseConfig,

    #[serde(default)]
    pub telegram: TelegramConfig,

    /// Dashboard linked from every non-empty report
    #[serde(default = "default_dashboard_url")]
    pub dashboard_url: String,

    #[serde(default)]
    pub schedule: ScheduleConfig,

    /// Offset of the warehouse clock from UTC in minutes
    #[serde(default)]
    pub utc_offset_minutes: i32,

    /// Port for health and metrics endpoints
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Replaces the built-in metric catalog when set
    #[serde(default)]
    pub metrics: Option<Vec<MetricDefinition>>,
}

fn default_dashboard_url() -> String {
    DEFAULT_DASHBOARD_URL.to_string()
}

fn default_api_port() -> u16 {
    8080
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            clickhouse: ClickHouseConfig::default(),
            telegram: TelegramConfig::default(),
            dashboard_url: default_dashboard_url(),
            schedule: ScheduleConfig::default(),
            utc_offset_minutes: 0,
            api_port: default_api_port(),
            metrics: None,
        }
    }
}

impl ReporterConfig {
    /// Load configuration from an optional file and the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix("REPORTER")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ReporterError::Config(e.to_string()))?;

        config
            .try_deserialize()
            .map_err(|e| ReporterError::Config(e.to_string()))
    }

    /// Metric definitions to track, validated
    pub fn tracked_metrics(&self) -> Result<Vec<MetricDefinition>> {
        let metrics = match &self.metrics {
            Some(custom) if custom.is_empty() => {
                return Err(ReporterError::Config("metric list is empty".to_string()))
            }
            Some(custom) => custom.clone(),
            None => tracked_metrics(),
        };

        for metric in &metrics {
            metric.validate()?;
        }
        Ok(metrics)
    }

    pub fn clock(&self) -> WarehouseClock {
        WarehouseClock::new(self.utc_offset_minutes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MetricKind;

    fn from_toml(text: &str) -> ReporterConfig {
        config::Config::builder()
            .add_source(config::File::from_str(text, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = from_toml("");

        assert_eq!(config.clickhouse.database, "simulator_20250120");
        assert_eq!(config.telegram.api_url, "https://api.telegram.org");
        assert_eq!(config.dashboard_url, DEFAULT_DASHBOARD_URL);
        assert_eq!(config.schedule.cadence().unwrap(), Cadence::default());
        assert_eq!(config.schedule.retry_policy(), RetryPolicy::default());
        assert_eq!(config.tracked_metrics().unwrap().len(), 6);
    }

    #[test]
    fn test_file_overrides() {
        let config = from_toml(
            r#"
            dashboard_url = "https://dash.example.com/r/7"
            utc_offset_minutes = 180

            [telegram]
            token = "123:abc"
            chat_id = -100500

            [schedule]
            interval_minutes = 30
            offset_minutes = 2
            retry_delay_secs = 60

            [[metrics]]
            name = "Orders"
            table = "orders"
            value_expr = "count()"
            kind = "count"
            deviation_threshold = 4.0
            "#,
        );

        assert_eq!(config.telegram.chat_id, -100500);
        assert_eq!(config.schedule.cadence().unwrap(), Cadence::new(30, 2).unwrap());
        assert_eq!(config.schedule.retry_policy().delay, Duration::from_secs(60));
        assert_eq!(config.schedule.retry_policy().max_retries, 3);

        let metrics = config.tracked_metrics().unwrap();
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].kind, MetricKind::Count);
        assert_eq!(metrics[0].threshold(), 4.0);
    }

    #[test]
    fn test_environment_overrides_nested_keys() {
        std::env::set_var("REPORTER_TELEGRAM__TOKEN", "222:from-env");
        std::env::set_var("REPORTER_TELEGRAM__CHAT_ID", "-4242");
        std::env::set_var("REPORTER_CLICKHOUSE__PASSWORD", "s3cret");
        std::env::set_var("REPORTER_API_PORT", "9191");

        let config = ReporterConfig::load(None).unwrap();

        for key in [
            "REPORTER_TELEGRAM__TOKEN",
            "REPORTER_TELEGRAM__CHAT_ID",
            "REPORTER_CLICKHOUSE__PASSWORD",
            "REPORTER_API_PORT",
        ] {
            std::env::remove_var(key);
        }

        assert_eq!(config.telegram.token, "222:from-env");
        assert_eq!(config.telegram.chat_id, -4242);
        assert_eq!(config.clickhouse.password, "s3cret");
        assert_eq!(config.api_port, 9191);
    }

    #[test]
    fn test_invalid_metric_is_rejected() {
        let config = from_toml(
            r#"
            [[metrics]]
            name = "Broken"
            table = "orders where 1"
            value_expr = "count()"
            kind = "count"
            "#,
        );
        assert!(config.tracked_metrics().is_err());
    }
}
