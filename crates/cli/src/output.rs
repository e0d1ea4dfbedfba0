//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print a table from a list of rows
pub fn print_table<T: Tabled>(rows: &[T]) {
    let table = Table::new(rows).with(Style::rounded()).to_string();
    println!("{}", table);
}

/// Print any serializable value as pretty JSON
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Format a percent change, `n/a` when there is no expected value
pub fn format_change(change: Option<f64>) -> String {
    match change {
        Some(change) if change > 0.0 => format!("+{:.2}%", change),
        Some(change) => format!("{:.2}%", change),
        None => "n/a".to_string(),
    }
}

/// Color a percent change: drops red, spikes yellow
pub fn color_change(change: Option<f64>) -> String {
    let formatted = format_change(change);
    match change {
        Some(change) if change < 0.0 => formatted.red().to_string(),
        Some(_) => formatted.yellow().to_string(),
        None => formatted.dimmed().to_string(),
    }
}

/// Format a band as `[lower, upper]`
pub fn format_band(lower: f64, upper: f64) -> String {
    format!("[{:.3}, {:.3}]", lower, upper)
}
