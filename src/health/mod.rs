//! # Provider Health Monitor
//!
//! Passive failure accumulator plus a cancellable background prober for the
//! primary provider. Acts as the orchestrator's circuit breaker:
//!
//! - `Unknown` until the first call or probe completes
//! - `Available` after any success; the failure streak resets to zero
//! - `Degraded` while the failure streak is below the threshold
//! - `Unavailable` once the streak reaches `max_consecutive_failures`; only a
//!   successful live call or probe brings it back (no timeout-based recovery)

use crate::config::HealthConfig;
use crate::constants::{ErrorClass, HealthState};
use crate::error::ProviderError;
use crate::logging::log_health_transition;
use crate::providers::PrimaryProvider;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Point-in-time view of the primary provider's health
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderHealth {
    pub state: HealthState,
    pub consecutive_failures: u32,
    pub last_checked_at: Option<DateTime<Utc>>,
    /// Exponential moving average over successful call latencies
    pub avg_response_time_ms: Option<f64>,
    pub quota_exceeded: bool,
    pub last_error: Option<ErrorClass>,
    /// Requests served by a fallback tier (primary not used)
    pub fallback_served: u64,
    pub probes_run: u64,
}

impl Default for ProviderHealth {
    fn default() -> Self {
        Self {
            state: HealthState::Unknown,
            consecutive_failures: 0,
            last_checked_at: None,
            avg_response_time_ms: None,
            quota_exceeded: false,
            last_error: None,
            fallback_served: 0,
            probes_run: 0,
        }
    }
}

impl ProviderHealth {
    pub fn is_available(&self) -> bool {
        self.state.allows_dispatch()
    }
}

#[derive(Debug)]
pub struct HealthMonitor {
    health: Mutex<ProviderHealth>,
    max_consecutive_failures: u32,
    latency_ema_weight: f64,
}

impl HealthMonitor {
    pub fn new(config: &HealthConfig) -> Self {
        Self {
            health: Mutex::new(ProviderHealth::default()),
            max_consecutive_failures: config.max_consecutive_failures.max(1),
            latency_ema_weight: config.latency_ema_weight.clamp(f64::EPSILON, 1.0),
        }
    }

    pub fn snapshot(&self) -> ProviderHealth {
        self.health.lock().clone()
    }

    pub fn state(&self) -> HealthState {
        self.health.lock().state
    }

    /// Whether the primary provider may receive a call right now
    pub fn allows_dispatch(&self) -> bool {
        self.state().allows_dispatch()
    }

    pub fn max_consecutive_failures(&self) -> u32 {
        self.max_consecutive_failures
    }

    /// Feed one completed primary call (or probe) into the state machine
    pub fn record_outcome(
        &self,
        success: bool,
        latency: Duration,
        error_class: Option<ErrorClass>,
    ) -> HealthState {
        if success {
            self.record_success(latency)
        } else {
            self.record_failure(error_class.unwrap_or(ErrorClass::Unknown))
        }
    }

    pub fn record_success(&self, latency: Duration) -> HealthState {
        let (from, to, failures) = {
            let mut health = self.health.lock();
            let from = health.state;
            let sample = latency.as_secs_f64() * 1000.0;

            health.avg_response_time_ms = Some(match health.avg_response_time_ms {
                Some(avg) => self.latency_ema_weight * sample + (1.0 - self.latency_ema_weight) * avg,
                None => sample,
            });
            health.consecutive_failures = 0;
            health.quota_exceeded = false;
            health.last_error = None;
            health.last_checked_at = Some(Utc::now());
            health.state = HealthState::Available;
            (from, health.state, health.consecutive_failures)
        };

        if from != to {
            log_health_transition(from, to, failures, None);
        }
        to
    }

    pub fn record_failure(&self, error_class: ErrorClass) -> HealthState {
        let (from, to, failures) = {
            let mut health = self.health.lock();
            let from = health.state;

            health.consecutive_failures = health.consecutive_failures.saturating_add(1);
            health.last_error = Some(error_class);
            health.last_checked_at = Some(Utc::now());
            if error_class == ErrorClass::RateLimit {
                health.quota_exceeded = true;
            }
            health.state = if health.consecutive_failures >= self.max_consecutive_failures {
                HealthState::Unavailable
            } else {
                HealthState::Degraded
            };
            (from, health.state, health.consecutive_failures)
        };

        debug!(
            error_class = %error_class,
            consecutive_failures = failures,
            threshold = self.max_consecutive_failures,
            "Primary failure recorded"
        );
        if from != to {
            log_health_transition(from, to, failures, Some(error_class));
        }
        to
    }

    /// A fallback tier served a request; the primary was not used and the
    /// failure streak is left untouched.
    pub fn record_fallback_served(&self) {
        self.health.lock().fallback_served += 1;
    }

    /// Explicit reconfiguration: forget everything observed so far
    pub fn reset(&self) {
        let from = {
            let mut health = self.health.lock();
            let from = health.state;
            *health = ProviderHealth::default();
            from
        };
        info!(from = %from, "🔄 Provider health reset");
    }

    /// Run one capability check against the provider, bounded by `timeout`
    pub async fn probe_once(
        &self,
        provider: &dyn PrimaryProvider,
        timeout: Duration,
    ) -> HealthState {
        let started = Instant::now();
        let result = match tokio::time::timeout(timeout, provider.probe()).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::timeout(timeout)),
        };
        self.health.lock().probes_run += 1;

        match result {
            Ok(()) => {
                debug!(provider = provider.name(), "Health probe succeeded");
                self.record_success(started.elapsed())
            }
            Err(err) => {
                warn!(
                    provider = provider.name(),
                    error_class = %err.class,
                    error = %err.message,
                    "⚠️ Health probe failed"
                );
                self.record_failure(err.class)
            }
        }
    }

    /// Start the periodic prober. The first probe fires after
    /// `initial_probe_delay`, then every `probe_interval`.
    pub fn spawn_probe(
        self: &Arc<Self>,
        provider: Arc<dyn PrimaryProvider>,
        config: &HealthConfig,
    ) -> ProbeHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let monitor = Arc::clone(self);
        let period = config.probe_interval();
        let start = Instant::now() + config.initial_probe_delay();
        let timeout = config.probe_timeout();

        info!(
            interval_ms = period.as_millis() as u64,
            initial_delay_ms = config.initial_probe_delay_ms,
            "🩺 Starting provider health probe"
        );

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(start, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        monitor.probe_once(provider.as_ref(), timeout).await;
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            debug!("Provider health probe stopped");
        });

        ProbeHandle {
            shutdown_tx,
            handle: Some(handle),
        }
    }
}

/// Cancels the background probe when stopped or dropped
#[derive(Debug)]
pub struct ProbeHandle {
    shutdown_tx: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl ProbeHandle {
    pub async fn stop(mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.handle.take() {
            if let Err(err) = handle.await {
                if !err.is_cancelled() {
                    warn!(error = %err, "Health probe task ended abnormally");
                }
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for ProbeHandle {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = self.shutdown_tx.send(true);
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::MockPrimaryProvider;

    fn monitor(threshold: u32) -> HealthMonitor {
        HealthMonitor::new(&HealthConfig {
            max_consecutive_failures: threshold,
            ..Default::default()
        })
    }

    #[test]
    fn test_starts_unknown_and_dispatchable() {
        let monitor = monitor(5);
        let health = monitor.snapshot();
        assert_eq!(health.state, HealthState::Unknown);
        assert!(health.is_available());
        assert_eq!(health.avg_response_time_ms, None);
    }

    #[test]
    fn test_failures_degrade_then_open() {
        let monitor = monitor(3);
        assert_eq!(monitor.record_failure(ErrorClass::Network), HealthState::Degraded);
        assert_eq!(monitor.record_failure(ErrorClass::Network), HealthState::Degraded);
        assert_eq!(monitor.record_failure(ErrorClass::Unknown), HealthState::Unavailable);
        assert!(!monitor.allows_dispatch());

        // Further failures keep it open
        assert_eq!(monitor.record_failure(ErrorClass::Network), HealthState::Unavailable);
        assert_eq!(monitor.snapshot().consecutive_failures, 4);
    }

    #[test]
    fn test_success_closes_and_resets_streak() {
        let monitor = monitor(2);
        monitor.record_failure(ErrorClass::Network);
        monitor.record_failure(ErrorClass::Network);
        assert_eq!(monitor.state(), HealthState::Unavailable);

        assert_eq!(
            monitor.record_success(Duration::from_millis(120)),
            HealthState::Available
        );
        assert_eq!(monitor.snapshot().consecutive_failures, 0);
    }

    #[test]
    fn test_rate_limit_sets_quota_and_counts() {
        let monitor = monitor(5);
        monitor.record_failure(ErrorClass::RateLimit);
        let health = monitor.snapshot();
        assert!(health.quota_exceeded);
        assert_eq!(health.consecutive_failures, 1);
        assert_eq!(health.state, HealthState::Degraded);
    }

    #[test]
    fn test_latency_moving_average() {
        let monitor = monitor(5);
        monitor.record_success(Duration::from_millis(100));
        assert_eq!(monitor.snapshot().avg_response_time_ms, Some(100.0));

        monitor.record_success(Duration::from_millis(200));
        let avg = monitor.snapshot().avg_response_time_ms.unwrap();
        assert!((avg - 130.0).abs() < 1e-9);
    }

    #[test]
    fn test_fallback_served_does_not_recover() {
        let monitor = monitor(1);
        monitor.record_failure(ErrorClass::Network);
        monitor.record_fallback_served();
        let health = monitor.snapshot();
        assert_eq!(health.state, HealthState::Unavailable);
        assert_eq!(health.fallback_served, 1);
    }

    #[test]
    fn test_outcome_dispatch_and_reset() {
        let monitor = monitor(5);
        monitor.record_outcome(false, Duration::ZERO, Some(ErrorClass::Authentication));
        assert_eq!(monitor.snapshot().last_error, Some(ErrorClass::Authentication));
        monitor.reset();
        assert_eq!(monitor.snapshot(), ProviderHealth::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_recovers_unavailable_provider() {
        let monitor = Arc::new(monitor(1));
        monitor.record_failure(ErrorClass::Network);
        assert_eq!(monitor.state(), HealthState::Unavailable);

        let provider = MockPrimaryProvider::healthy();
        let config = HealthConfig {
            probe_interval_ms: 30_000,
            initial_probe_delay_ms: 1_000,
            ..Default::default()
        };
        let probe = monitor.spawn_probe(Arc::new(provider.clone()), &config);

        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert_eq!(provider.probe_count(), 1);
        assert_eq!(monitor.state(), HealthState::Available);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(provider.probe_count(), 2);

        probe.stop().await;
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(provider.probe_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_probes_feed_the_breaker() {
        let monitor = Arc::new(monitor(2));
        let provider = MockPrimaryProvider::healthy();
        provider.set_probe_error(Some(ProviderError::network("connection refused")));

        let config = HealthConfig {
            probe_interval_ms: 10_000,
            initial_probe_delay_ms: 0,
            ..Default::default()
        };
        let probe = monitor.spawn_probe(Arc::new(provider.clone()), &config);

        tokio::time::sleep(Duration::from_millis(10_500)).await;
        assert_eq!(provider.probe_count(), 2);
        assert_eq!(monitor.state(), HealthState::Unavailable);
        assert_eq!(monitor.snapshot().probes_run, 2);

        probe.stop().await;
    }
}
