//! Orchestrator counters
//!
//! Lock-free counters updated on the request path. Once every in-flight
//! request has resolved:
//! `total_requests == cache_hits + successful_requests + failed_requests` and
//! `failed_requests == fallback_hits + exhausted_requests`.

use crate::constants::ErrorClass;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug, Default)]
pub struct OrchestratorMetrics {
    total_requests: AtomicU64,
    successful_requests: AtomicU64,
    failed_requests: AtomicU64,
    cache_hits: AtomicU64,
    failure_cache_hits: AtomicU64,
    fallback_hits: AtomicU64,
    exhausted_requests: AtomicU64,
    primary_skipped: AtomicU64,
    primary_latency_micros: AtomicU64,
    connection_errors: AtomicU64,
    rate_limit_errors: AtomicU64,
    auth_errors: AtomicU64,
    resource_errors: AtomicU64,
    unknown_errors: AtomicU64,
}

/// Serializable copy of the counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    /// Requests served by a live primary call
    pub successful_requests: u64,
    /// Requests that left the primary tier for the fallback chain
    pub failed_requests: u64,
    pub cache_hits: u64,
    pub failure_cache_hits: u64,
    pub fallback_hits: u64,
    pub exhausted_requests: u64,
    pub primary_skipped: u64,
    /// Scheduled primary retries across all requests
    pub retry_attempts: u64,
    pub average_latency_ms: f64,
    pub connection_errors: u64,
    pub rate_limit_errors: u64,
    pub auth_errors: u64,
    pub resource_errors: u64,
    pub unknown_errors: u64,
}

impl OrchestratorMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_primary_success(&self, latency: Duration) {
        self.successful_requests.fetch_add(1, Ordering::Relaxed);
        self.primary_latency_micros
            .fetch_add(latency.as_micros() as u64, Ordering::Relaxed);
    }

    /// The primary tier failed with `class` after any retries
    pub fn record_primary_failure(&self, class: ErrorClass) {
        self.failed_requests.fetch_add(1, Ordering::Relaxed);
        let counter = match class {
            ErrorClass::Network => &self.connection_errors,
            ErrorClass::RateLimit => &self.rate_limit_errors,
            ErrorClass::Authentication => &self.auth_errors,
            ErrorClass::Resource => &self.resource_errors,
            ErrorClass::Unknown => &self.unknown_errors,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// A cached failure sent the request straight to fallback
    pub fn record_failure_cache_hit(&self) {
        self.failed_requests.fetch_add(1, Ordering::Relaxed);
        self.failure_cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// The breaker was open, or the dispatch loop was gone
    pub fn record_primary_skipped(&self) {
        self.failed_requests.fetch_add(1, Ordering::Relaxed);
        self.primary_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fallback_hit(&self) {
        self.fallback_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_exhausted(&self) {
        self.exhausted_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, retry_attempts: u64) -> MetricsSnapshot {
        let successful_requests = self.successful_requests.load(Ordering::Relaxed);
        let latency_micros = self.primary_latency_micros.load(Ordering::Relaxed);
        let average_latency_ms = if successful_requests == 0 {
            0.0
        } else {
            latency_micros as f64 / successful_requests as f64 / 1000.0
        };

        MetricsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            successful_requests,
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            failure_cache_hits: self.failure_cache_hits.load(Ordering::Relaxed),
            fallback_hits: self.fallback_hits.load(Ordering::Relaxed),
            exhausted_requests: self.exhausted_requests.load(Ordering::Relaxed),
            primary_skipped: self.primary_skipped.load(Ordering::Relaxed),
            retry_attempts,
            average_latency_ms,
            connection_errors: self.connection_errors.load(Ordering::Relaxed),
            rate_limit_errors: self.rate_limit_errors.load(Ordering::Relaxed),
            auth_errors: self.auth_errors.load(Ordering::Relaxed),
            resource_errors: self.resource_errors.load(Ordering::Relaxed),
            unknown_errors: self.unknown_errors.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_average_latency_over_primary_successes() {
        let metrics = OrchestratorMetrics::new();
        assert_eq!(metrics.snapshot(0).average_latency_ms, 0.0);

        metrics.record_primary_success(Duration::from_millis(100));
        metrics.record_primary_success(Duration::from_millis(300));
        let snapshot = metrics.snapshot(0);
        assert_eq!(snapshot.successful_requests, 2);
        assert!((snapshot.average_latency_ms - 200.0).abs() < 1e-9);
    }

    #[test]
    fn test_error_class_counters() {
        let metrics = OrchestratorMetrics::new();
        metrics.record_primary_failure(ErrorClass::Network);
        metrics.record_primary_failure(ErrorClass::Authentication);
        metrics.record_primary_failure(ErrorClass::RateLimit);
        metrics.record_failure_cache_hit();
        metrics.record_primary_skipped();

        let snapshot = metrics.snapshot(4);
        assert_eq!(snapshot.failed_requests, 5);
        assert_eq!(snapshot.connection_errors, 1);
        assert_eq!(snapshot.auth_errors, 1);
        assert_eq!(snapshot.rate_limit_errors, 1);
        assert_eq!(snapshot.failure_cache_hits, 1);
        assert_eq!(snapshot.primary_skipped, 1);
        assert_eq!(snapshot.retry_attempts, 4);
    }

    #[test]
    fn test_snapshot_serializes_camel_case() {
        let json = serde_json::to_value(OrchestratorMetrics::new().snapshot(0)).unwrap();
        assert!(json.get("totalRequests").is_some());
        assert!(json.get("averageLatencyMs").is_some());
        assert!(json.get("retryAttempts").is_some());
    }
}
