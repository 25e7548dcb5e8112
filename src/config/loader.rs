// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::config::consts::{
    DEFAULT_EVENT_BUFFER, FALLBACK_CONCURRENCY, MAX_RETRY_ATTEMPTS, MAX_RETRY_BACKOFF_MS,
    MIN_EVENT_BUFFER,
};
use crate::errors::ConfigError;
use crate::protocol::Protocol;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Top-level protocol file: engine options plus the protocol definitions to load.
///
/// # Fields
/// * `engine` - Engine tuning (optional, every field has a default)
/// * `protocols` - Protocol definitions, loaded in file order
///
/// # Example
/// ```yaml
/// engine:
///   max_concurrency: 4
///   event_buffer: 512
///   retry:
///     max_attempts: 2
///     backoff_ms: 250
/// protocols:
///   - id: perimeter
///     name: Perimeter Check
///     steps:
///       - id: mark
///         action: mark_location
///         parameters: { position: [51.5, -0.12] }
/// ```
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineOptions,
    #[serde(default)]
    pub protocols: Vec<Protocol>,
}

/// Engine tuning options.
///
/// # Fields
/// * `max_concurrency` - Upper bound on step executions running at once across a fan-out
/// * `event_buffer` - Capacity of the lifecycle event channel; slow subscribers lag past it
/// * `retry` - Bounded retry for steps whose action fails
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EngineOptions {
    pub max_concurrency: Option<usize>,
    pub event_buffer: Option<usize>,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl EngineOptions {
    /// Configured concurrency, or the number of available cores. Never below one.
    pub fn get_max_concurrency(&self) -> usize {
        self.max_concurrency
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(FALLBACK_CONCURRENCY)
            })
            .max(1)
    }

    pub fn get_event_buffer(&self) -> usize {
        self.event_buffer
            .unwrap_or(DEFAULT_EVENT_BUFFER)
            .max(MIN_EVENT_BUFFER)
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = Some(max_concurrency);
        self
    }

    pub fn with_event_buffer(mut self, event_buffer: usize) -> Self {
        self.event_buffer = Some(event_buffer);
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

/// Retry behaviour for a step whose action reports an execution failure.
///
/// The default performs no retries: a failed step stays active and is picked up
/// again only by the next situation update. Values are clamped to
/// [`MAX_RETRY_ATTEMPTS`] and [`MAX_RETRY_BACKOFF_MS`].
///
/// # Example
/// ```
/// use tactical_protocols::config::RetryConfig;
/// use std::time::Duration;
///
/// let retry = RetryConfig::bounded(50, 120_000);
/// assert_eq!(retry.get_max_attempts(), 10);
/// assert_eq!(retry.get_backoff(), Duration::from_millis(60_000));
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: Option<u32>,
    pub backoff_ms: Option<u64>,
}

impl RetryConfig {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn bounded(max_attempts: u32, backoff_ms: u64) -> Self {
        Self {
            max_attempts: Some(max_attempts),
            backoff_ms: Some(backoff_ms),
        }
    }

    /// Additional attempts after the first failure.
    pub fn get_max_attempts(&self) -> u32 {
        self.max_attempts.unwrap_or(0).min(MAX_RETRY_ATTEMPTS)
    }

    pub fn get_backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms.unwrap_or(0).min(MAX_RETRY_BACKOFF_MS))
    }
}

/// Serialization format of a protocol file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Toml,
}

impl ConfigFormat {
    /// `.toml` files are TOML; everything else is read as YAML (which also covers JSON).
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => ConfigFormat::Toml,
            _ => ConfigFormat::Yaml,
        }
    }
}

pub fn parse_config(content: &str, format: ConfigFormat) -> Result<Config, ConfigError> {
    let cfg = match format {
        ConfigFormat::Yaml => serde_yaml::from_str(content)?,
        ConfigFormat::Toml => toml::from_str(content)?,
    };
    Ok(cfg)
}

/// Load a protocol file without validating its protocols.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_config(&content, ConfigFormat::from_path(path))
}

/// Load a protocol file and validate every protocol in it.
///
/// All violations across all protocols are reported together rather than
/// stopping at the first one.
pub fn load_and_validate_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let cfg = load_config(path)?;

    let mut seen = HashSet::new();
    for protocol in &cfg.protocols {
        if !seen.insert(protocol.id.as_str()) {
            return Err(ConfigError::DuplicateProtocolId(protocol.id.clone()));
        }
    }

    let violations: Vec<_> = cfg
        .protocols
        .iter()
        .flat_map(crate::config::find_violations)
        .collect();

    if !violations.is_empty() {
        return Err(ConfigError::Invalid(violations));
    }

    Ok(cfg)
}
