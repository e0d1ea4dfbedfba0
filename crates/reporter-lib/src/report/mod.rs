//! Report formatting
//!
//! Turns the anomaly table of one cycle into a single chat message using
//! the sink's HTML markup (bold values, one hyperlink to the dashboard).

use crate::models::AnomalyRecord;

/// Message used when nothing was flagged
pub const NO_ANOMALY_MESSAGE: &str = "No anomalies have been detected";

/// Dashboard embedded in every non-empty report
pub const DEFAULT_DASHBOARD_URL: &str = "http://superset.lab.karpov.courses/r/6292";

/// Builds report text from anomaly records
#[derive(Debug, Clone)]
pub struct ReportFormatter {
    dashboard_url: String,
}

impl Default for ReportFormatter {
    fn default() -> Self {
        Self::new(DEFAULT_DASHBOARD_URL)
    }
}

impl ReportFormatter {
    pub fn new(dashboard_url: impl Into<String>) -> Self {
        Self {
            dashboard_url: dashboard_url.into(),
        }
    }

    /// Format the records of one cycle
    ///
    /// One record gives a single paragraph; several give a header plus one
    /// bullet per distinct metric name (first occurrence wins). The header
    /// window is taken from the first record.
    pub fn format(&self, records: &[AnomalyRecord]) -> String {
        match records {
            [] => NO_ANOMALY_MESSAGE.to_string(),
            [record] => self.format_single(record),
            [first, ..] => self.format_multiple(first, records),
        }
    }

    fn format_single(&self, record: &AnomalyRecord) -> String {
        let (start, end) = record.window();
        format!(
            "An anomaly has been detected in {name} from <b>{start}</b> to <b>{end}</b>. \
             Current value is <b>{value}</b>, deviating by <b>{change}</b>% \
             from the average expected <b>{expected}</b>.\n\n\
             Click <a href=\"{link}\">the link</a> to view real-time metric changes.",
            name = escape_html(&record.metric_name),
            start = start,
            end = end,
            value = record.observed_value,
            change = record.change_display(),
            expected = record.expected_value,
            link = self.dashboard_url,
        )
    }

    fn format_multiple(&self, first: &AnomalyRecord, records: &[AnomalyRecord]) -> String {
        let (start, end) = first.window();

        let mut seen: Vec<&str> = Vec::new();
        let mut lines = String::new();
        for record in records {
            if seen.contains(&record.metric_name.as_str()) {
                continue;
            }
            seen.push(&record.metric_name);
            lines.push_str(&bullet_line(record));
        }

        format!(
            "Anomalies have been detected in several metrics from <b>{start}</b> to <b>{end}</b>:\n\
             {lines}\n\
             Click <a href=\"{link}\">the link</a> to view real-time metrics changes.",
            start = start,
            end = end,
            lines = lines,
            link = self.dashboard_url,
        )
    }
}

fn bullet_line(record: &AnomalyRecord) -> String {
    format!(
        "- {name}: current value is <b>{value}</b>, deviating by <b>{change}%</b> \
         from the expected <b>{expected}</b>\n",
        name = escape_html(&record.metric_name),
        value = record.observed_value,
        change = record.change_display(),
        expected = record.expected_value,
    )
}

/// Escape the characters that are markup in the sink's HTML mode
fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    fn record(name: &str, hour: u32, minute: u32, observed: f64, change: f64) -> AnomalyRecord {
        AnomalyRecord {
            metric_name: name.to_string(),
            bucket: NaiveTime::from_hms_opt(hour, minute, 0).unwrap(),
            relative_deviation: 0.5,
            lower_bound: 0.9,
            upper_bound: 1.1,
            mean_relative_deviation: 1.0,
            expected_value: 1000.0,
            observed_value: observed,
            change_percent: Some(change),
        }
    }

    #[test]
    fn test_empty_report() {
        let message = ReportFormatter::default().format(&[]);
        assert_eq!(message, NO_ANOMALY_MESSAGE);
        assert!(message.contains("No anomalies"));
    }

    #[test]
    fn test_single_report() {
        let formatter = ReportFormatter::new("https://dash.example.com/r/1");
        let message = formatter.format(&[record("Number of User Views", 10, 15, 500.0, -50.0)]);

        assert!(message.starts_with("An anomaly has been detected in Number of User Views"));
        assert!(message.contains("from <b>10:15</b> to <b>10:30</b>"));
        assert!(message.contains("Current value is <b>500</b>"));
        assert!(message.contains("deviating by <b>-50</b>%"));
        assert!(message.contains("average expected <b>1000</b>"));
        assert!(message.contains("<a href=\"https://dash.example.com/r/1\">the link</a>"));
    }

    #[test]
    fn test_single_report_keeps_record_precision() {
        let mut ctr = record("User CTR", 9, 0, 0.213, 12.34);
        ctr.expected_value = 0.19;
        let message = ReportFormatter::default().format(&[ctr]);

        assert!(message.contains("<b>0.213</b>"));
        assert!(message.contains("<b>12.34</b>%"));
        assert!(message.contains("<b>0.19</b>"));
    }

    #[test]
    fn test_multiple_report_lists_metrics_in_order() {
        let message = ReportFormatter::default().format(&[
            record("A", 23, 45, 10.0, -99.0),
            record("B", 23, 45, 3000.0, 200.0),
        ]);

        assert!(message.starts_with(
            "Anomalies have been detected in several metrics from <b>23:45</b> to <b>00:00</b>:\n"
        ));
        let a = message.find("- A: current value is <b>10</b>").unwrap();
        let b = message.find("- B: current value is <b>3000</b>").unwrap();
        assert!(a < b);
        assert!(message.contains("deviating by <b>200%</b> from the expected <b>1000</b>"));
        assert!(message.contains(DEFAULT_DASHBOARD_URL));
    }

    #[test]
    fn test_multiple_report_uses_first_occurrence() {
        let message = ReportFormatter::default().format(&[
            record("A", 10, 0, 1.0, -99.9),
            record("A", 10, 15, 2.0, -99.8),
        ]);

        assert_eq!(message.matches("- A:").count(), 1);
        assert!(message.contains("<b>-99.9%</b>"));
        assert!(message.contains("from <b>10:00</b> to <b>10:15</b>"));
    }

    #[test]
    fn test_unknown_change_is_rendered() {
        let mut zero = record("Number of Sent Messages", 4, 0, 12.0, 0.0);
        zero.expected_value = 0.0;
        zero.change_percent = None;

        let message = ReportFormatter::default().format(&[zero]);
        assert!(message.contains("deviating by <b>n/a</b>%"));
    }
}
