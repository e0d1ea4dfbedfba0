//! Evaluation window and schedule

use anyhow::Result;
use chrono::NaiveDateTime;
use colored::Colorize;
use reporter_lib::{last_completed_bucket, ReporterConfig, BUCKET_MINUTES};
use serde::Serialize;

use crate::output::{print_json, OutputFormat};

#[derive(Debug, Serialize, PartialEq)]
pub struct WindowInfo {
    pub now: NaiveDateTime,
    pub bucket_start: NaiveDateTime,
    pub bucket_end: NaiveDateTime,
    /// Last day of history that feeds the baseline
    pub history_until: chrono::NaiveDate,
    pub next_run: NaiveDateTime,
}

/// Compute what a cycle at `now` would evaluate
pub fn window_info(settings: &ReporterConfig, now: NaiveDateTime) -> Result<WindowInfo> {
    let cadence = settings.schedule.cadence()?;
    let bucket_start = last_completed_bucket(now);

    Ok(WindowInfo {
        now,
        bucket_start,
        bucket_end: bucket_start + chrono::Duration::minutes(i64::from(BUCKET_MINUTES)),
        history_until: now.date().pred_opt().unwrap_or(now.date()),
        next_run: cadence.next_after(now),
    })
}

/// Show the evaluated bucket and the next scheduled run
pub fn show_window(settings: &ReporterConfig, now: NaiveDateTime, format: OutputFormat) -> Result<()> {
    let info = window_info(settings, now)?;

    match format {
        OutputFormat::Json => print_json(&info)?,
        OutputFormat::Table => {
            println!("Now:            {}", info.now);
            println!(
                "Bucket:         {} - {}",
                info.bucket_start.to_string().cyan(),
                info.bucket_end.format("%H:%M:%S").to_string().cyan()
            );
            println!("History up to:  {}", info.history_until);
            println!("Next run:       {}", info.next_run.to_string().green());
        }
    }

    Ok(())
}
