//! # Orchestrator Configuration
//!
//! YAML-driven configuration with environment overrides, mirroring the layout
//! of `config/speech-config.yaml`. Every section carries defaults, so a partial
//! file (or no file at all, via [`OrchestratorConfig::default`]) is valid.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use speech_orchestrator::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let retries = manager.config().retry.max_retries;
//! let pacing = manager.config().scheduler.rate_limit_delay();
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use crate::constants::defaults;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration structure mirroring speech-config.yaml
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Success and failure cache sizing
    pub cache: CacheConfig,

    /// Retry ceiling and backoff shape
    pub retry: RetryConfig,

    /// Breaker threshold and background probing
    pub health: HealthConfig,

    /// Dispatch pacing and primary call timeout
    pub scheduler: SchedulerConfig,

    /// Fallback tier toggles and timeouts
    pub fallback: FallbackConfig,

    /// Voice defaults
    pub voice: VoiceConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    pub success_capacity: usize,
    pub failure_capacity: usize,
    pub success_ttl_ms: u64,
    pub failure_ttl_ms: u64,
    /// Remember non-retryable and retry-exhausted failures per key
    pub cache_failed_requests: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            success_capacity: defaults::SUCCESS_CACHE_CAPACITY,
            failure_capacity: defaults::FAILURE_CACHE_CAPACITY,
            success_ttl_ms: defaults::SUCCESS_TTL_MS,
            failure_ttl_ms: defaults::FAILURE_TTL_MS,
            cache_failed_requests: true,
        }
    }
}

impl CacheConfig {
    pub fn success_ttl(&self) -> Duration {
        Duration::from_millis(self.success_ttl_ms)
    }

    pub fn failure_ttl(&self) -> Duration {
        Duration::from_millis(self.failure_ttl_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    pub enabled: bool,
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: defaults::MAX_RETRIES,
            base_delay_ms: defaults::RETRY_BASE_DELAY_MS,
            max_delay_ms: defaults::RETRY_MAX_DELAY_MS,
            jitter_factor: defaults::RETRY_JITTER_FACTOR,
        }
    }
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// Retries actually permitted, taking the `enabled` switch into account
    pub fn effective_max_retries(&self) -> u32 {
        if self.enabled {
            self.max_retries
        } else {
            0
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthConfig {
    pub probe_enabled: bool,
    pub probe_interval_ms: u64,
    pub initial_probe_delay_ms: u64,
    pub probe_timeout_ms: u64,
    pub max_consecutive_failures: u32,
    pub latency_ema_weight: f64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            probe_enabled: true,
            probe_interval_ms: defaults::PROBE_INTERVAL_MS,
            initial_probe_delay_ms: defaults::INITIAL_PROBE_DELAY_MS,
            probe_timeout_ms: defaults::PROBE_TIMEOUT_MS,
            max_consecutive_failures: defaults::MAX_CONSECUTIVE_FAILURES,
            latency_ema_weight: defaults::LATENCY_EMA_WEIGHT,
        }
    }
}

impl HealthConfig {
    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }

    pub fn initial_probe_delay(&self) -> Duration {
        Duration::from_millis(self.initial_probe_delay_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Minimum spacing between two primary dispatches
    pub rate_limit_delay_ms: u64,
    /// Request-level bound on each primary call
    pub primary_timeout_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            rate_limit_delay_ms: defaults::RATE_LIMIT_DELAY_MS,
            primary_timeout_ms: defaults::PRIMARY_TIMEOUT_MS,
        }
    }
}

impl SchedulerConfig {
    pub fn rate_limit_delay(&self) -> Duration {
        Duration::from_millis(self.rate_limit_delay_ms)
    }

    pub fn primary_timeout(&self) -> Duration {
        Duration::from_millis(self.primary_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FallbackConfig {
    pub enabled: bool,
    pub clip_timeout_ms: u64,
    pub local_timeout_ms: u64,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            clip_timeout_ms: defaults::CLIP_TIMEOUT_MS,
            local_timeout_ms: defaults::LOCAL_TIMEOUT_MS,
        }
    }
}

impl FallbackConfig {
    pub fn clip_timeout(&self) -> Duration {
        Duration::from_millis(self.clip_timeout_ms)
    }

    pub fn local_timeout(&self) -> Duration {
        Duration::from_millis(self.local_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// Mood used when a request does not name one
    pub default_mood: String,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            default_mood: defaults::DEFAULT_MOOD.to_string(),
        }
    }
}

impl OrchestratorConfig {
    /// Reject values that would make the orchestrator misbehave
    pub fn validate(&self) -> ConfigResult<()> {
        if self.cache.success_capacity == 0 {
            return Err(ConfigurationError::invalid_value(
                "cache.success_capacity",
                "0",
                "success cache must hold at least one entry",
            ));
        }
        if self.cache.failure_capacity == 0 {
            return Err(ConfigurationError::invalid_value(
                "cache.failure_capacity",
                "0",
                "failure cache must hold at least one entry",
            ));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(ConfigurationError::invalid_value(
                "retry.base_delay_ms",
                self.retry.base_delay_ms.to_string(),
                format!(
                    "base delay exceeds max_delay_ms ({})",
                    self.retry.max_delay_ms
                ),
            ));
        }
        if !(0.0..=1.0).contains(&self.retry.jitter_factor) {
            return Err(ConfigurationError::invalid_value(
                "retry.jitter_factor",
                self.retry.jitter_factor.to_string(),
                "jitter factor must be within [0.0, 1.0]",
            ));
        }
        if self.health.max_consecutive_failures == 0 {
            return Err(ConfigurationError::invalid_value(
                "health.max_consecutive_failures",
                "0",
                "breaker threshold must be at least 1",
            ));
        }
        if self.health.probe_enabled && self.health.probe_interval_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "health.probe_interval_ms",
                "0",
                "probe interval must be positive when probing is enabled",
            ));
        }
        let weight = self.health.latency_ema_weight;
        if !(weight > 0.0 && weight <= 1.0) {
            return Err(ConfigurationError::invalid_value(
                "health.latency_ema_weight",
                weight.to_string(),
                "moving-average weight must be within (0.0, 1.0]",
            ));
        }
        if self.scheduler.primary_timeout_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "scheduler.primary_timeout_ms",
                "0",
                "primary timeout must be positive",
            ));
        }
        if self.voice.default_mood.trim().is_empty() {
            return Err(ConfigurationError::validation_error(
                "voice.default_mood must not be empty",
            ));
        }
        Ok(())
    }
}
