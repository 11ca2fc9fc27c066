//! Shared helper functions used across CLI subcommands.
//!
//! Includes tracing initialization, configuration loading and environment
//! variable utilities.

use anyhow::{Context, Result};
use keyward_policy::{Preset, SecurityConfig, SecurityConfigInput};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::cli::ConfigSource;

/// Environment variable naming a configuration file.
pub const CONFIG_ENV: &str = "KEYWARD_CONFIG";

// ---------------------------------------------------------------------------
// Tracing
// ---------------------------------------------------------------------------

/// Initialize the tracing subscriber with the given default log level.
pub fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Resolve the security configuration selected on the command line.
///
/// Precedence: `--config`, `--preset`, `$KEYWARD_CONFIG`, default preset.
pub fn load_config(source: &ConfigSource) -> Result<SecurityConfig> {
    let input = if let Some(path) = &source.config {
        SecurityConfigInput::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?
    } else if let Some(name) = &source.preset {
        SecurityConfigInput::Preset(name.parse::<Preset>()?)
    } else if let Some(path) = env_non_empty(CONFIG_ENV) {
        SecurityConfigInput::load(&path)
            .with_context(|| format!("failed to load config {path} (from {CONFIG_ENV})"))?
    } else {
        SecurityConfigInput::default()
    };

    let config = input.resolve();
    info!(
        preset = config.preset.map_or("custom", |p| p.as_str()),
        "security config resolved"
    );
    Ok(config)
}

/// Read a non-empty environment variable, returning `None` if unset or empty.
pub fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// First non-blank line of a rule description.
pub fn summary_line(description: &str) -> &str {
    description
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("")
}
