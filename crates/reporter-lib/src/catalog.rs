//! Metrics tracked by the reporter
//!
//! Each entry is one parameterized detection: a source table, an aggregate
//! expression evaluated per 15-minute bucket, and the metric's kind.

use crate::models::{MetricDefinition, MetricKind};

pub const FEED_ACTIONS: &str = "feed_actions";
pub const MESSAGE_ACTIONS: &str = "message_actions";

/// The default metric catalog, in report order
pub fn tracked_metrics() -> Vec<MetricDefinition> {
    vec![
        MetricDefinition::new(
            "Number of Active Feed Users",
            FEED_ACTIONS,
            "uniqExact(user_id)",
            MetricKind::Count,
        ),
        MetricDefinition::new(
            "Number of Active Messenger Users",
            MESSAGE_ACTIONS,
            "uniqExact(user_id)",
            MetricKind::Count,
        ),
        MetricDefinition::new(
            "Number of User Views",
            FEED_ACTIONS,
            "countIf(action = 'view')",
            MetricKind::Count,
        ),
        MetricDefinition::new(
            "Number of User Likes",
            FEED_ACTIONS,
            "countIf(action = 'like')",
            MetricKind::Count,
        ),
        MetricDefinition::new(
            "User CTR",
            FEED_ACTIONS,
            "countIf(action = 'like') / countIf(action = 'view')",
            MetricKind::Ratio,
        ),
        MetricDefinition::new(
            "Number of Sent Messages",
            MESSAGE_ACTIONS,
            "count()",
            MetricKind::Count,
        ),
    ]
}
