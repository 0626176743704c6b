//! # System Constants
//!
//! Core enums and default values that define the operational boundaries of the
//! speech orchestrator: error classes, request priorities, serving tiers and
//! provider health states.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Default tunables. Configuration sections fall back to these values.
pub mod defaults {
    /// Success cache capacity (entries)
    pub const SUCCESS_CACHE_CAPACITY: usize = 50;
    /// Failure cache capacity (entries)
    pub const FAILURE_CACHE_CAPACITY: usize = 100;
    /// Failure cache TTL: one hour
    pub const FAILURE_TTL_MS: u64 = 60 * 60 * 1000;
    /// Success cache TTL: one hour
    pub const SUCCESS_TTL_MS: u64 = 60 * 60 * 1000;

    pub const MAX_RETRIES: u32 = 3;
    pub const RETRY_BASE_DELAY_MS: u64 = 1_000;
    pub const RETRY_MAX_DELAY_MS: u64 = 10_000;
    /// Jitter is drawn uniformly from `[0, JITTER_FACTOR)` of the computed delay
    pub const RETRY_JITTER_FACTOR: f64 = 0.3;

    pub const MAX_CONSECUTIVE_FAILURES: u32 = 5;
    pub const PROBE_INTERVAL_MS: u64 = 30_000;
    pub const INITIAL_PROBE_DELAY_MS: u64 = 1_000;
    pub const PROBE_TIMEOUT_MS: u64 = 10_000;
    /// Weight given to the newest latency sample in the moving average
    pub const LATENCY_EMA_WEIGHT: f64 = 0.3;

    pub const RATE_LIMIT_DELAY_MS: u64 = 100;
    pub const PRIMARY_TIMEOUT_MS: u64 = 30_000;

    pub const CLIP_TIMEOUT_MS: u64 = 5_000;
    pub const LOCAL_TIMEOUT_MS: u64 = 30_000;

    pub const DEFAULT_MOOD: &str = "neutral";
}

/// Error classes produced by the primary provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Connectivity problems, timeouts, dropped connections
    Network,
    /// Bad or revoked credentials
    Authentication,
    /// Quota or request-rate exhaustion
    RateLimit,
    /// Missing voice or other 404-equivalent
    Resource,
    Unknown,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::Network => "network",
            ErrorClass::Authentication => "authentication",
            ErrorClass::RateLimit => "rate_limit",
            ErrorClass::Resource => "resource",
            ErrorClass::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request priority. Ordering is `High > Normal > Low`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low = 0,
    #[default]
    Normal = 1,
    High = 2,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::Low => write!(f, "low"),
            Priority::Normal => write!(f, "normal"),
            Priority::High => write!(f, "high"),
        }
    }
}

/// Which backend served a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Primary,
    SecondaryClip,
    TertiaryLocal,
    /// Every tier failed
    Exhausted,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Primary => "primary",
            Tier::SecondaryClip => "secondary_clip",
            Tier::TertiaryLocal => "tertiary_local",
            Tier::Exhausted => "exhausted",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provider availability as seen by the health monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    /// No call or probe has completed yet
    Unknown,
    Available,
    /// Recent failures below the breaker threshold
    Degraded,
    /// Breaker open: no primary dispatch until a success is observed
    Unavailable,
}

impl HealthState {
    /// Whether the scheduler may dispatch to the primary provider
    pub fn allows_dispatch(&self) -> bool {
        !matches!(self, HealthState::Unavailable)
    }
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthState::Unknown => write!(f, "unknown"),
            HealthState::Available => write!(f, "available"),
            HealthState::Degraded => write!(f, "degraded"),
            HealthState::Unavailable => write!(f, "unavailable"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::High > Priority::Normal);
        assert!(Priority::Normal > Priority::Low);
        assert_eq!(Priority::default(), Priority::Normal);
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(
            serde_json::to_string(&ErrorClass::RateLimit).unwrap(),
            "\"rate_limit\""
        );
        assert_eq!(
            serde_json::to_string(&Tier::SecondaryClip).unwrap(),
            "\"secondary_clip\""
        );
        let p: Priority = serde_json::from_str("\"high\"").unwrap();
        assert_eq!(p, Priority::High);
    }

    #[test]
    fn test_only_unavailable_blocks_dispatch() {
        assert!(HealthState::Unknown.allows_dispatch());
        assert!(HealthState::Available.allows_dispatch());
        assert!(HealthState::Degraded.allows_dispatch());
        assert!(!HealthState::Unavailable.allows_dispatch());
    }
}
