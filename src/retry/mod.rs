//! # Retry Controller
//!
//! Error classification and retry policy for primary provider calls.
//!
//! | class            | retried                  |
//! |------------------|--------------------------|
//! | `network`        | up to `max_retries`      |
//! | `unknown`        | up to `max_retries`      |
//! | `rate_limit`     | up to `max_retries`, full backoff |
//! | `authentication` | never                    |
//! | `resource`       | never                    |
//!
//! Backoff is `min(base * 2^attempt * (1 + j), max_delay)` with `j` drawn
//! uniformly from `[0, jitter_factor)`.

use crate::config::RetryConfig;
use crate::constants::ErrorClass;
use crate::error::ProviderError;
use std::time::Duration;
use tracing::debug;

/// Classify an untyped provider error message by content
pub fn classify_message(message: &str) -> ErrorClass {
    let message = message.to_lowercase();
    let contains_any = |needles: &[&str]| needles.iter().any(|n| message.contains(n));

    if contains_any(&["quota", "limit", "429"]) {
        ErrorClass::RateLimit
    } else if contains_any(&["auth", "401", "403"]) {
        ErrorClass::Authentication
    } else if contains_any(&["network", "timeout", "connection"]) {
        ErrorClass::Network
    } else if contains_any(&["voice", "404"]) {
        ErrorClass::Resource
    } else {
        ErrorClass::Unknown
    }
}

/// Whether an error class may ever be retried
pub fn is_retryable(class: ErrorClass) -> bool {
    match class {
        ErrorClass::Network | ErrorClass::RateLimit | ErrorClass::Unknown => true,
        ErrorClass::Authentication | ErrorClass::Resource => false,
    }
}

/// Per-request retry bookkeeping
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetryState {
    /// Retries scheduled so far
    pub attempt: u32,
    /// Backoff chosen for the pending retry, if one is scheduled
    pub next_delay: Option<Duration>,
    /// Most recent provider failure for this request
    pub last_error: Option<ProviderError>,
}

impl RetryState {
    pub fn next_delay_ms(&self) -> Option<u64> {
        self.next_delay.map(|d| d.as_millis() as u64)
    }
}

/// What to do after a failed primary attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAfter(Duration),
    GiveUp,
}

#[derive(Debug, Clone)]
pub struct RetryController {
    config: RetryConfig,
}

impl RetryController {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub fn max_retries(&self) -> u32 {
        self.config.effective_max_retries()
    }

    pub fn classify(&self, error: &ProviderError) -> ErrorClass {
        error.class
    }

    /// `attempt` counts retries already performed for this request
    pub fn should_retry(&self, class: ErrorClass, attempt: u32, max_retries: u32) -> bool {
        is_retryable(class) && attempt < max_retries
    }

    /// Backoff before retry number `attempt + 1`
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let jitter = if self.config.jitter_factor > 0.0 {
            fastrand::f64() * self.config.jitter_factor
        } else {
            0.0
        };
        self.delay_with_jitter(attempt, jitter)
    }

    /// Lowest and highest delay `next_delay(attempt)` can produce
    pub fn delay_bounds(&self, attempt: u32) -> (Duration, Duration) {
        (
            self.delay_with_jitter(attempt, 0.0),
            self.delay_with_jitter(attempt, self.config.jitter_factor),
        )
    }

    /// Record a failure in `state` and decide whether to retry
    pub fn on_failure(&self, state: &mut RetryState, error: &ProviderError) -> RetryDecision {
        let class = self.classify(error);
        let max_retries = self.max_retries();
        state.last_error = Some(error.clone());

        if self.should_retry(class, state.attempt, max_retries) {
            let delay = self.next_delay(state.attempt);
            state.attempt += 1;
            state.next_delay = Some(delay);
            debug!(
                error_class = %class,
                attempt = state.attempt,
                max_retries = max_retries,
                delay_ms = delay.as_millis() as u64,
                "Retry scheduled"
            );
            RetryDecision::RetryAfter(delay)
        } else {
            state.next_delay = None;
            debug!(
                error_class = %class,
                attempt = state.attempt,
                retryable = is_retryable(class),
                "Retries exhausted or not permitted"
            );
            RetryDecision::GiveUp
        }
    }

    fn delay_with_jitter(&self, attempt: u32, jitter: f64) -> Duration {
        let max_delay = self.config.max_delay();
        // 2^31 already dwarfs any sane max_delay
        let factor = 2f64.powi(attempt.min(31) as i32) * (1.0 + jitter);
        let millis = self.config.base_delay_ms as f64 * factor;
        if !millis.is_finite() || millis >= max_delay.as_millis() as f64 {
            return max_delay;
        }
        Duration::from_millis(millis as u64).min(max_delay)
    }
}

impl Default for RetryController {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_classify_message() {
        assert_eq!(classify_message("Quota exceeded for voice"), ErrorClass::RateLimit);
        assert_eq!(classify_message("HTTP 429"), ErrorClass::RateLimit);
        assert_eq!(classify_message("401 Unauthorized"), ErrorClass::Authentication);
        assert_eq!(classify_message("auth token revoked"), ErrorClass::Authentication);
        assert_eq!(classify_message("Connection reset by peer"), ErrorClass::Network);
        assert_eq!(classify_message("request timeout"), ErrorClass::Network);
        assert_eq!(classify_message("voice_id does not exist"), ErrorClass::Resource);
        assert_eq!(classify_message("something odd"), ErrorClass::Unknown);
    }

    #[test]
    fn test_auth_and_resource_are_never_retried() {
        let controller = RetryController::default();
        assert!(!controller.should_retry(ErrorClass::Authentication, 0, 3));
        assert!(!controller.should_retry(ErrorClass::Resource, 0, 3));
        assert!(controller.should_retry(ErrorClass::RateLimit, 0, 3));
        assert!(controller.should_retry(ErrorClass::Network, 2, 3));
        assert!(!controller.should_retry(ErrorClass::Network, 3, 3));
    }

    #[test]
    fn test_delay_without_jitter_doubles_then_caps() {
        let controller = RetryController::new(RetryConfig {
            jitter_factor: 0.0,
            ..Default::default()
        });
        let delays: Vec<u64> = (0..6)
            .map(|attempt| controller.next_delay(attempt).as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![1_000, 2_000, 4_000, 8_000, 10_000, 10_000]);
    }

    #[test]
    fn test_on_failure_tracks_state() {
        let controller = RetryController::new(RetryConfig {
            max_retries: 2,
            ..Default::default()
        });
        let mut state = RetryState::default();
        let err = ProviderError::network("connection reset");

        assert!(matches!(
            controller.on_failure(&mut state, &err),
            RetryDecision::RetryAfter(_)
        ));
        assert!(matches!(
            controller.on_failure(&mut state, &err),
            RetryDecision::RetryAfter(_)
        ));
        assert_eq!(controller.on_failure(&mut state, &err), RetryDecision::GiveUp);
        assert_eq!(state.attempt, 2);
        assert_eq!(state.next_delay, None);
        assert_eq!(state.last_error, Some(err));
    }

    #[test]
    fn test_last_error_follows_latest_failure() {
        let controller = RetryController::default();
        let mut state = RetryState::default();
        assert_eq!(state.last_error, None);

        controller.on_failure(&mut state, &ProviderError::network("connection reset"));
        controller.on_failure(&mut state, &ProviderError::rate_limit("429 too many requests"));
        assert_eq!(
            state.last_error.map(|e| e.class),
            Some(ErrorClass::RateLimit)
        );
    }

    #[test]
    fn test_disabled_retries_give_up_immediately() {
        let controller = RetryController::new(RetryConfig {
            enabled: false,
            ..Default::default()
        });
        let mut state = RetryState::default();
        assert_eq!(
            controller.on_failure(&mut state, &ProviderError::network("down")),
            RetryDecision::GiveUp
        );
    }

    proptest! {
        #[test]
        fn prop_delay_within_bounds(attempt in 0u32..64) {
            let controller = RetryController::default();
            let (low, high) = controller.delay_bounds(attempt);
            let delay = controller.next_delay(attempt);
            prop_assert!(delay >= low && delay <= high);
            prop_assert!(delay <= Duration::from_millis(10_000));
        }

        #[test]
        fn prop_bounds_never_shrink(attempt in 0u32..40) {
            let controller = RetryController::default();
            let (low_now, _) = controller.delay_bounds(attempt);
            let (low_next, _) = controller.delay_bounds(attempt + 1);
            prop_assert!(low_next >= low_now);
        }
    }
}
