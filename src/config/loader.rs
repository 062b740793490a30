/// Configuration loading from TOML file with environment overrides
use ::config::{Environment, File, FileFormat};
use std::collections::HashSet;
use std::path::Path;

use crate::error::{Result, SyncError};
use crate::types::Config;

/// Prefix for overrides such as `INDEXSYNC__PROVIDER__TOKEN`
const ENV_PREFIX: &str = "INDEXSYNC";

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .map_err(|e| SyncError::ConfigError(format!("Failed to read config file {}: {}", path.display(), e)))?;

    load_config_str(&content, true)
}

/// Parse configuration text, optionally layering environment overrides on top
pub fn load_config_str(content: &str, with_env: bool) -> Result<Config> {
    let mut builder = ::config::Config::builder().add_source(File::from_str(content, FileFormat::Toml));
    if with_env {
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__"),
        );
    }

    let config: Config = builder
        .build()
        .and_then(|c| c.try_deserialize())
        .map_err(|e| SyncError::ConfigError(format!("Failed to parse config: {}", e)))?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_config(config: &Config) -> Result<()> {
    if config.tz().is_none() {
        return Err(SyncError::ConfigError(format!("Unknown timezone: {}", config.timezone)));
    }

    if config.publish_cutoff_time().is_none() {
        return Err(SyncError::ConfigError(format!(
            "Invalid publish_cutoff: {} (expected HH:MM)",
            config.publish_cutoff
        )));
    }

    if config.data_dir.trim().is_empty() {
        return Err(SyncError::ConfigError("data_dir is empty".to_string()));
    }

    // Validate calendars
    let mut exchanges = HashSet::new();
    for exchange in &config.exchanges {
        if exchange.covered_from > exchange.covered_until {
            return Err(SyncError::ConfigError(format!(
                "Calendar {} covers an empty range {}..{}",
                exchange.code, exchange.covered_from, exchange.covered_until
            )));
        }
        if !exchanges.insert(exchange.code.as_str()) {
            return Err(SyncError::ConfigError(format!("Duplicate exchange: {}", exchange.code)));
        }
    }

    // Validate watch-list
    if config.watch_list.is_empty() {
        return Err(SyncError::ConfigError("watch_list is empty".to_string()));
    }
    let mut codes = HashSet::new();
    for instrument in &config.watch_list {
        if instrument.code.trim().is_empty() {
            return Err(SyncError::ConfigError("watch_list entry with empty code".to_string()));
        }
        if !codes.insert(instrument.code.as_str()) {
            return Err(SyncError::ConfigError(format!("Duplicate watch_list code: {}", instrument.code)));
        }
        if !exchanges.contains(instrument.exchange.as_str()) {
            return Err(SyncError::ConfigError(format!(
                "{} refers to exchange {} with no calendar",
                instrument.code, instrument.exchange
            )));
        }
    }

    if !config.is_watched(&config.benchmark) {
        return Err(SyncError::ConfigError(format!(
            "benchmark {} is not in the watch_list",
            config.benchmark
        )));
    }

    // Validate provider
    if config.provider.requests_per_minute == 0 {
        return Err(SyncError::ConfigError("provider.requests_per_minute must be > 0".to_string()));
    }
    if config.provider.timeout_sec == 0 {
        return Err(SyncError::ConfigError("provider.timeout_sec must be > 0".to_string()));
    }

    Ok(())
}
