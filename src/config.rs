//! Configuration for decorators and pipelines
//!
//! Every decorator takes plain values; these structs only bundle them so a
//! whole pipeline can be described in one place, built in code, read from
//! `EFFECTOR_*` environment variables, or loaded from TOML.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Circuit breaker configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Consecutive failures tolerated before backoff starts
    pub threshold: u32,

    /// Backoff unit; a breaker `n` failures past the threshold stays shut
    /// for `base_backoff * 2^n` after the last attempt
    pub base_backoff: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            threshold: 5,
            base_backoff: Duration::from_secs(2),
        }
    }
}

impl BreakerConfig {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold,
            ..Default::default()
        }
    }

    /// How long the breaker stays shut `overflow` failures past the threshold.
    pub fn backoff(&self, overflow: u32) -> Duration {
        let factor = 1u32.checked_shl(overflow).unwrap_or(u32::MAX);
        self.base_backoff.saturating_mul(factor)
    }
}

/// Retry configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt
    pub retries: usize,

    /// Fixed wait between attempts
    pub delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            retries: 3,
            delay: Duration::from_millis(100),
        }
    }
}

/// Token bucket configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottleConfig {
    /// Bucket capacity, also the initial token count
    pub max: u32,

    /// Tokens added per period
    pub refill: u32,

    /// Refill period; zero is treated as one millisecond
    pub period: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            max: 10,
            refill: 1,
            period: Duration::from_secs(1),
        }
    }
}

impl ThrottleConfig {
    pub(crate) fn tick(&self) -> Duration {
        self.period.max(Duration::from_millis(1))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DebounceMode {
    /// First call of a burst runs, the rest get its cached result
    First,
    /// One call runs after the burst goes quiet
    Last,
}

/// Debounce configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DebounceConfig {
    pub mode: DebounceMode,
    pub window: Duration,
}

/// Configuration of a whole decorator pipeline
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    pub breaker: BreakerConfig,
    pub retry: RetryConfig,
    pub throttle: ThrottleConfig,

    /// Optional debounce applied closest to the base operation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debounce: Option<DebounceConfig>,

    /// Optional deadline for a whole pipeline call, retries included
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
}

/// Configuration builder
pub struct ConfigBuilder {
    config: ResilienceConfig,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: ResilienceConfig::default(),
        }
    }

    pub fn breaker_threshold(mut self, threshold: u32) -> Self {
        self.config.breaker.threshold = threshold;
        self
    }

    pub fn breaker_backoff(mut self, base: Duration) -> Self {
        self.config.breaker.base_backoff = base;
        self
    }

    pub fn retries(mut self, retries: usize) -> Self {
        self.config.retry.retries = retries;
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.config.retry.delay = delay;
        self
    }

    pub fn throttle(mut self, max: u32, refill: u32, period: Duration) -> Self {
        self.config.throttle = ThrottleConfig {
            max,
            refill,
            period,
        };
        self
    }

    pub fn debounce(mut self, mode: DebounceMode, window: Duration) -> Self {
        self.config.debounce = Some(DebounceConfig { mode, window });
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = Some(timeout);
        self
    }

    pub fn build(self) -> ResilienceConfig {
        self.config
    }
}

/// Load configuration from `EFFECTOR_*` environment variables
pub fn from_env() -> ResilienceConfig {
    from_vars(|key| std::env::var(key).ok())
}

/// Same as [`from_env`] with an arbitrary variable source. Unparseable
/// values are ignored and the default is kept.
pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> ResilienceConfig {
    let mut config = ResilienceConfig::default();
    let number = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());
    let millis = |key: &str| number(key).map(Duration::from_millis);

    if let Some(threshold) = number("EFFECTOR_BREAKER_THRESHOLD") {
        config.breaker.threshold = threshold.min(u32::MAX as u64) as u32;
    }
    if let Some(base) = millis("EFFECTOR_BREAKER_BACKOFF_MS") {
        config.breaker.base_backoff = base;
    }
    if let Some(retries) = number("EFFECTOR_RETRIES") {
        config.retry.retries = retries as usize;
    }
    if let Some(delay) = millis("EFFECTOR_RETRY_DELAY_MS") {
        config.retry.delay = delay;
    }
    if let Some(max) = number("EFFECTOR_THROTTLE_MAX") {
        config.throttle.max = max.min(u32::MAX as u64) as u32;
    }
    if let Some(refill) = number("EFFECTOR_THROTTLE_REFILL") {
        config.throttle.refill = refill.min(u32::MAX as u64) as u32;
    }
    if let Some(period) = millis("EFFECTOR_THROTTLE_PERIOD_MS") {
        config.throttle.period = period;
    }
    if let Some(timeout) = millis("EFFECTOR_TIMEOUT_MS") {
        config.timeout = Some(timeout);
    }

    let mode = lookup("EFFECTOR_DEBOUNCE").and_then(|m| match m.to_lowercase().as_str() {
        "first" => Some(DebounceMode::First),
        "last" => Some(DebounceMode::Last),
        _ => None,
    });
    if let Some(mode) = mode {
        config.debounce = Some(DebounceConfig {
            mode,
            window: millis("EFFECTOR_DEBOUNCE_MS").unwrap_or(Duration::from_secs(1)),
        });
    }

    config
}

/// Load configuration from a TOML file
pub fn from_file(path: impl AsRef<Path>) -> Result<ResilienceConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&contents)?)
}

/// Helper for tests and callers that already hold variables in a map.
pub fn from_map(vars: &HashMap<String, String>) -> ResilienceConfig {
    from_vars(|key| vars.get(key).cloned())
}
