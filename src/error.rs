//! # Error Types
//!
//! Error taxonomy for the orchestrator. Collaborator errors (`ProviderError`,
//! `ClipError`, `LocalSynthesisError`) stay inside the crate: callers of
//! `speak` only ever observe [`FallbackExhausted`].

use crate::config::ConfigurationError;
use crate::constants::{ErrorClass, Tier};
use crate::types::FailureRecord;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Typed error raised by the primary provider client.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{class} error: {message}")]
pub struct ProviderError {
    pub class: ErrorClass,
    pub message: String,
}

impl ProviderError {
    pub fn new(class: ErrorClass, message: impl Into<String>) -> Self {
        Self {
            class,
            message: message.into(),
        }
    }

    /// Build an error from an untyped provider message, classifying it by content.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let class = crate::retry::classify_message(&message);
        Self { class, message }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Network, message)
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Authentication, message)
    }

    pub fn rate_limit(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::RateLimit, message)
    }

    pub fn resource(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Resource, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Unknown, message)
    }

    /// A call that exceeded its request-level timeout counts as a network failure.
    pub fn timeout(after: Duration) -> Self {
        Self::network(format!("request timed out after {}ms", after.as_millis()))
    }
}

/// Errors from the canned clip source.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClipError {
    #[error("no clip registered for tag '{tag}'")]
    NotFound { tag: String },

    #[error("clip source failure: {0}")]
    Failed(String),
}

/// Errors from the local synthesizer.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("local synthesis failed: {message}")]
pub struct LocalSynthesisError {
    pub message: String,
}

impl LocalSynthesisError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Why a request left the primary tier.
#[derive(Debug, Clone, PartialEq)]
pub enum FallbackCause {
    /// The primary provider failed (after any retries)
    Provider(ProviderError),
    /// A failure for the same key is still cached
    CachedFailure(FailureRecord),
    /// The health monitor had the provider marked unavailable
    ProviderUnavailable { consecutive_failures: u32 },
    /// The dispatch loop stopped before the request completed
    Cancelled,
}

impl FallbackCause {
    /// Error class of the underlying primary failure, when there is one
    pub fn error_class(&self) -> Option<ErrorClass> {
        match self {
            FallbackCause::Provider(err) => Some(err.class),
            FallbackCause::CachedFailure(record) => Some(record.error_class),
            _ => None,
        }
    }
}

impl fmt::Display for FallbackCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackCause::Provider(err) => write!(f, "{err}"),
            FallbackCause::CachedFailure(record) => write!(
                f,
                "cached {} failure: {}",
                record.error_class, record.last_error_message
            ),
            FallbackCause::ProviderUnavailable {
                consecutive_failures,
            } => write!(
                f,
                "primary provider unavailable after {consecutive_failures} consecutive failures"
            ),
            FallbackCause::Cancelled => write!(f, "request cancelled before dispatch completed"),
        }
    }
}

/// A single fallback tier's failure.
#[derive(Debug, Clone, PartialEq)]
pub struct TierFailure {
    pub tier: Tier,
    pub reason: String,
}

impl fmt::Display for TierFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.tier, self.reason)
    }
}

/// Every tier failed. This is the only error returned by `speak`.
#[derive(Debug, Clone, PartialEq, Error)]
pub struct FallbackExhausted {
    pub cause: FallbackCause,
    pub failures: Vec<TierFailure>,
}

impl FallbackExhausted {
    pub fn tier(&self) -> Tier {
        Tier::Exhausted
    }
}

impl fmt::Display for FallbackExhausted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "all speech tiers failed (original cause: {}", self.cause)?;
        for failure in &self.failures {
            write!(f, "; {failure}")?;
        }
        write!(f, ")")
    }
}

/// Crate-level errors for lifecycle and configuration operations.
#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Orchestrator is shutting down")]
    ShuttingDown,

    #[error("Unknown mood '{0}'")]
    UnknownMood(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, SpeechError>;
