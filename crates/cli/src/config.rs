//! Configuration management for the CLI

use anyhow::{Context, Result};
use reporter_lib::ReporterConfig;
use std::path::{Path, PathBuf};

/// Load the reporter configuration
///
/// An explicit path must exist. Without one, the per-user file is used when
/// present; environment variables apply in every case.
pub fn load(explicit: Option<&Path>) -> Result<ReporterConfig> {
    let path = resolve_path(explicit, default_config_path().as_deref());

    ReporterConfig::load(path.as_deref()).with_context(|| match &path {
        Some(path) => format!("Failed to load configuration from {}", path.display()),
        None => "Failed to load configuration from environment".to_string(),
    })
}

/// Pick the configuration file to read, if any
pub fn resolve_path(explicit: Option<&Path>, fallback: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    fallback.filter(|path| path.exists()).map(Path::to_path_buf)
}

/// Per-user configuration file path
fn default_config_path() -> Option<PathBuf> {
    let home = dirs_next::home_dir()?;
    Some(
        home.join(".config")
            .join("anomaly-reporter")
            .join("config.toml"),
    )
}
