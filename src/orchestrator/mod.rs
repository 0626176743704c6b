//! # Speech Orchestrator
//!
//! Façade that turns `speak` calls into speech while the primary provider
//! misbehaves. A request moves through:
//!
//! ```text
//! Submitted ─▶ CacheCheck ─┬─▶ CacheHitSuccess ─────────────────────────▶ Resolved
//!                          ├─▶ CacheHitFailure ──────────────▶ Fallback ─┬▶ Resolved
//!                          └─▶ Queued ─▶ Dispatched ─┬─▶ Success ───────┘└▶ Exhausted
//!                                          ▲         ├─▶ RetryScheduled ─┐
//!                                          └─────────┼───────────────────┘
//!                                                    └─▶ Fallback
//! ```
//!
//! `speak` never fails unless every tier failed; that case surfaces as
//! [`FallbackExhausted`], carrying the primary cause and each tier's failure.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use speech_orchestrator::orchestrator::SpeechOrchestrator;
//! use speech_orchestrator::types::SpeakOptions;
//! # use speech_orchestrator::providers::PrimaryProvider;
//! # use std::sync::Arc;
//!
//! # async fn example(provider: Arc<dyn PrimaryProvider>) -> Result<(), Box<dyn std::error::Error>> {
//! let orchestrator = SpeechOrchestrator::builder(provider).build()?;
//! orchestrator.start();
//!
//! let outcome = orchestrator
//!     .speak("Hello world", SpeakOptions::new().with_mood("confident"))
//!     .await?;
//! println!("served by {}", outcome.tier);
//!
//! orchestrator.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod metrics;

use crate::cache::{RequestKey, ResponseCache};
use crate::config::{ConfigManager, OrchestratorConfig};
use crate::constants::{Priority, Tier};
use crate::error::{FallbackCause, FallbackExhausted, SpeechError};
use crate::fallback::FallbackChain;
use crate::health::{HealthMonitor, ProbeHandle, ProviderHealth};
use crate::logging::log_speech_outcome;
use crate::mood::{MoodSettingsUpdate, MoodTable};
use crate::providers::{ClipSource, LocalSynthesizer, PrimaryProvider};
use crate::retry::RetryController;
use crate::scheduler::{DispatchOutcome, Scheduler};
use crate::types::{
    FailureRecord, LocalVoiceParams, SpeakOptions, SpeakOutcome, SpeechPayload, SynthesisRequest,
};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub use metrics::{MetricsSnapshot, OrchestratorMetrics};

/// Which tiers could serve a request right now
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierAvailability {
    /// The breaker currently lets requests reach the primary provider
    pub primary: bool,
    pub secondary_clip: bool,
    pub tertiary_local: bool,
}

/// Point-in-time status report
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestratorStatus {
    pub queue_length: usize,
    pub pending_retries: usize,
    pub is_processing: bool,
    pub cache_size: usize,
    pub failed_cache_size: usize,
    pub provider_health: ProviderHealth,
    pub metrics: MetricsSnapshot,
    pub current_mood: String,
    pub tiers: TierAvailability,
    pub fallback_enabled: bool,
    pub config: OrchestratorConfig,
}

/// Builder for [`SpeechOrchestrator`]
pub struct SpeechOrchestratorBuilder {
    provider: Arc<dyn PrimaryProvider>,
    clips: Option<Arc<dyn ClipSource>>,
    local: Option<Arc<dyn LocalSynthesizer>>,
    config: OrchestratorConfig,
}

impl SpeechOrchestratorBuilder {
    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Take configuration from a loaded [`ConfigManager`]
    pub fn config_manager(mut self, manager: &ConfigManager) -> Self {
        self.config = manager.config().clone();
        self
    }

    pub fn clip_source(mut self, clips: Arc<dyn ClipSource>) -> Self {
        self.clips = Some(clips);
        self
    }

    pub fn local_synthesizer(mut self, local: Arc<dyn LocalSynthesizer>) -> Self {
        self.local = Some(local);
        self
    }

    pub fn build(self) -> Result<SpeechOrchestrator, SpeechError> {
        self.config.validate()?;
        let config = self.config;

        let moods = MoodTable::new();
        if !moods.is_known(&config.voice.default_mood) {
            warn!(
                mood = %config.voice.default_mood,
                "Configured default mood is unknown, using neutral"
            );
        }
        let current_mood = moods.resolve(&config.voice.default_mood);

        let cache = ResponseCache::from_config(&config.cache);
        let health = Arc::new(HealthMonitor::new(&config.health));
        let scheduler = Scheduler::new(
            Arc::clone(&self.provider),
            Arc::clone(&health),
            RetryController::new(config.retry.clone()),
            &config.scheduler,
        );
        let fallback = FallbackChain::new(
            self.clips,
            self.local,
            Arc::clone(&health),
            &config.fallback,
        );

        info!(
            provider = self.provider.name(),
            current_mood = %current_mood,
            clips_configured = fallback.clips_configured(),
            local_configured = fallback.local_configured(),
            "🎙️ Speech orchestrator created"
        );

        Ok(SpeechOrchestrator {
            provider: self.provider,
            cache,
            health,
            scheduler,
            fallback,
            moods: RwLock::new(moods),
            current_mood: RwLock::new(current_mood),
            metrics: OrchestratorMetrics::new(),
            probe: Mutex::new(None),
            shut_down: AtomicBool::new(false),
            config,
        })
    }
}

pub struct SpeechOrchestrator {
    config: OrchestratorConfig,
    provider: Arc<dyn PrimaryProvider>,
    cache: ResponseCache,
    health: Arc<HealthMonitor>,
    scheduler: Scheduler,
    fallback: FallbackChain,
    moods: RwLock<MoodTable>,
    current_mood: RwLock<String>,
    metrics: OrchestratorMetrics,
    probe: Mutex<Option<ProbeHandle>>,
    shut_down: AtomicBool,
}

impl std::fmt::Debug for SpeechOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeechOrchestrator")
            .field("provider", &self.provider.name())
            .field("scheduler", &self.scheduler)
            .field("fallback", &self.fallback)
            .field("current_mood", &*self.current_mood.read())
            .field("shut_down", &self.shut_down.load(Ordering::Relaxed))
            .finish()
    }
}

impl SpeechOrchestrator {
    pub fn builder(provider: Arc<dyn PrimaryProvider>) -> SpeechOrchestratorBuilder {
        SpeechOrchestratorBuilder {
            provider,
            clips: None,
            local: None,
            config: OrchestratorConfig::default(),
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Spawn the dispatch loop and, when enabled, the health probe.
    /// Must run inside a tokio runtime. Idempotent; a no-op after shutdown.
    pub fn start(&self) {
        if self.shut_down.load(Ordering::Acquire) {
            return;
        }
        self.scheduler.start();

        if self.config.health.probe_enabled {
            let mut probe = self.probe.lock();
            if probe.is_none() {
                *probe = Some(
                    self.health
                        .spawn_probe(Arc::clone(&self.provider), &self.config.health),
                );
            }
        }
    }

    /// Stop probing and dispatching. Requests still queued are released and
    /// resolved through the fallback chain; later `speak` calls go straight
    /// to fallback.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("🛑 Shutting down speech orchestrator");

        let probe = self.probe.lock().take();
        if let Some(probe) = probe {
            probe.stop().await;
        }
        self.scheduler.shutdown().await;
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Turn `text` into speech through the first tier that can serve it.
    pub async fn speak(
        &self,
        text: &str,
        options: SpeakOptions,
    ) -> Result<SpeakOutcome, FallbackExhausted> {
        // Nothing below awaits until the request is queued or resolved, so
        // submission order equals call order.
        self.start();
        self.metrics.record_request();
        let started = Instant::now();

        let (mood, voice, local_params) = {
            let moods = self.moods.read();
            let mood = match &options.mood_tag {
                Some(tag) => moods.resolve(tag),
                None => self.current_mood.read().clone(),
            };
            let voice = moods.voice_params(&mood);
            let local_params = moods.local_params(&mood);
            (mood, voice, local_params)
        };
        let priority = options.priority.unwrap_or(Priority::Normal);
        let request = SynthesisRequest::new(text, mood, priority);
        let key = RequestKey::derive(text, &request.mood_tag);

        if options.use_cache.unwrap_or(true) {
            if let Some(audio) = self.cache.get_success(&key) {
                self.metrics.record_cache_hit();
                let outcome = SpeakOutcome {
                    request_id: request.id,
                    tier: Tier::Primary,
                    payload: SpeechPayload::Audio(audio),
                    latency: started.elapsed(),
                    from_cache: true,
                };
                log_speech_outcome(
                    outcome.request_id,
                    &request.mood_tag,
                    outcome.tier,
                    outcome.latency_ms(),
                    true,
                );
                return Ok(outcome);
            }
        }

        if self.config.cache.cache_failed_requests {
            if let Some(record) = self.cache.get_failure(&key) {
                debug!(
                    request_id = %request.id,
                    key = %key,
                    error_class = %record.error_class,
                    "Cached failure, skipping primary"
                );
                self.metrics.record_failure_cache_hit();
                let cause = FallbackCause::CachedFailure(record);
                return self.fall_back(&request, &local_params, cause, started).await;
            }
        }

        if !self.health.allows_dispatch() {
            let consecutive_failures = self.health.snapshot().consecutive_failures;
            self.metrics.record_primary_skipped();
            let cause = FallbackCause::ProviderUnavailable {
                consecutive_failures,
            };
            return self.fall_back(&request, &local_params, cause, started).await;
        }

        let ticket = match self.scheduler.submit(request.clone(), key.clone(), voice) {
            Ok(ticket) => ticket,
            Err(err) => {
                debug!(request_id = %request.id, error = %err, "Dispatch loop unavailable");
                self.metrics.record_primary_skipped();
                return self
                    .fall_back(&request, &local_params, FallbackCause::Cancelled, started)
                    .await;
            }
        };

        match ticket.outcome().await {
            Some(DispatchOutcome::Success { audio, latency, .. }) => {
                self.metrics.record_primary_success(latency);
                self.cache
                    .put_success(key, audio.clone(), self.cache.success_ttl());
                let outcome = SpeakOutcome {
                    request_id: request.id,
                    tier: Tier::Primary,
                    payload: SpeechPayload::Audio(audio),
                    latency: started.elapsed(),
                    from_cache: false,
                };
                log_speech_outcome(
                    outcome.request_id,
                    &request.mood_tag,
                    outcome.tier,
                    outcome.latency_ms(),
                    false,
                );
                Ok(outcome)
            }
            Some(DispatchOutcome::Failed { error, attempts }) => {
                self.metrics.record_primary_failure(error.class);
                if self.config.cache.cache_failed_requests {
                    let record = FailureRecord::new(error.class, error.message.clone());
                    self.cache
                        .put_failure(key, record, self.cache.failure_ttl());
                }
                debug!(
                    request_id = %request.id,
                    attempts = attempts,
                    error_class = %error.class,
                    "Primary tier gave up"
                );
                self.fall_back(&request, &local_params, FallbackCause::Provider(error), started)
                    .await
            }
            Some(DispatchOutcome::Skipped {
                consecutive_failures,
            }) => {
                self.metrics.record_primary_skipped();
                let cause = FallbackCause::ProviderUnavailable {
                    consecutive_failures,
                };
                self.fall_back(&request, &local_params, cause, started).await
            }
            None => {
                self.metrics.record_primary_skipped();
                self.fall_back(&request, &local_params, FallbackCause::Cancelled, started)
                    .await
            }
        }
    }

    async fn fall_back(
        &self,
        request: &SynthesisRequest,
        local_params: &LocalVoiceParams,
        cause: FallbackCause,
        started: Instant,
    ) -> Result<SpeakOutcome, FallbackExhausted> {
        match self.fallback.resolve(request, local_params, cause).await {
            Ok(served) => {
                self.metrics.record_fallback_hit();
                let outcome = SpeakOutcome {
                    request_id: request.id,
                    tier: served.tier,
                    payload: served.payload,
                    latency: started.elapsed(),
                    from_cache: false,
                };
                log_speech_outcome(
                    outcome.request_id,
                    &request.mood_tag,
                    outcome.tier,
                    outcome.latency_ms(),
                    false,
                );
                Ok(outcome)
            }
            Err(exhausted) => {
                self.metrics.record_exhausted();
                Err(exhausted)
            }
        }
    }

    pub fn status(&self) -> OrchestratorStatus {
        let sizes = self.cache.sizes();
        OrchestratorStatus {
            queue_length: self.scheduler.queue_length(),
            pending_retries: self.scheduler.pending_retries(),
            is_processing: self.scheduler.is_processing(),
            cache_size: sizes.success,
            failed_cache_size: sizes.failure,
            provider_health: self.health.snapshot(),
            metrics: self.metrics_snapshot(),
            current_mood: self.current_mood(),
            tiers: TierAvailability {
                primary: self.health.allows_dispatch() && !self.is_shut_down(),
                secondary_clip: self.fallback.is_enabled() && self.fallback.clips_configured(),
                tertiary_local: self.fallback.is_enabled() && self.fallback.local_configured(),
            },
            fallback_enabled: self.fallback.is_enabled(),
            config: self.config.clone(),
        }
    }

    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics
            .snapshot(self.scheduler.stats().retries_scheduled)
    }

    pub fn provider_health(&self) -> ProviderHealth {
        self.health.snapshot()
    }

    pub fn current_mood(&self) -> String {
        self.current_mood.read().clone()
    }

    /// Set the mood used when a request names none. Unknown moods are
    /// rejected and the current mood is kept.
    pub fn set_mood(&self, mood: &str) -> Result<(), SpeechError> {
        let resolved = {
            let moods = self.moods.read();
            if !moods.is_known(mood) {
                warn!(mood = %mood, "Unknown mood, keeping current mood");
                return Err(SpeechError::UnknownMood(mood.to_string()));
            }
            moods.resolve(mood)
        };

        let previous = std::mem::replace(&mut *self.current_mood.write(), resolved.clone());
        info!(from = %previous, to = %resolved, "🎭 Mood changed");
        Ok(())
    }

    /// Adjust primary voice parameters for a known mood
    pub fn update_mood_settings(
        &self,
        mood: &str,
        update: MoodSettingsUpdate,
    ) -> Result<(), SpeechError> {
        if self.moods.write().update(mood, &update) {
            info!(mood = %mood, update = ?update, "Mood settings updated");
            Ok(())
        } else {
            warn!(mood = %mood, "Cannot update settings for unknown mood");
            Err(SpeechError::UnknownMood(mood.to_string()))
        }
    }

    /// Empty both the success and the failure cache
    pub fn clear_cache(&self) {
        self.cache.clear();
        info!("🧹 Speech caches cleared");
    }

    /// Drop expired cache entries; returns how many were removed
    pub fn evict_expired(&self) -> usize {
        self.cache.evict_expired()
    }

    /// Forget observed provider health, e.g. after swapping credentials
    pub fn reset_health(&self) {
        self.health.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HealthConfig;
    use crate::constants::{ErrorClass, HealthState};
    use crate::error::ProviderError;
    use crate::test_helpers::{MockClipSource, MockLocalSynthesizer, MockPrimaryProvider};

    fn quiet_config() -> OrchestratorConfig {
        OrchestratorConfig {
            health: HealthConfig {
                probe_enabled: false,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn orchestrator(
        primary: &MockPrimaryProvider,
        clips: &MockClipSource,
        local: &MockLocalSynthesizer,
        config: OrchestratorConfig,
    ) -> SpeechOrchestrator {
        SpeechOrchestrator::builder(Arc::new(primary.clone()))
            .config(config)
            .clip_source(Arc::new(clips.clone()))
            .local_synthesizer(Arc::new(local.clone()))
            .build()
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_primary_success_is_cached() {
        let primary = MockPrimaryProvider::healthy();
        let orchestrator = orchestrator(
            &primary,
            &MockClipSource::default(),
            &MockLocalSynthesizer::default(),
            quiet_config(),
        );

        let first = orchestrator.speak("Good morning", SpeakOptions::new()).await.unwrap();
        assert_eq!(first.tier, Tier::Primary);
        assert!(!first.from_cache);

        let second = orchestrator.speak("Good morning", SpeakOptions::new()).await.unwrap();
        assert!(second.from_cache);
        assert_eq!(second.audio(), first.audio());
        assert_eq!(primary.call_count(), 1);

        let bypass = orchestrator
            .speak("Good morning", SpeakOptions::new().with_cache(false))
            .await
            .unwrap();
        assert!(!bypass.from_cache);
        assert_eq!(primary.call_count(), 2);

        let status = orchestrator.status();
        assert_eq!(status.cache_size, 1);
        assert_eq!(status.metrics.total_requests, 3);
        assert_eq!(status.metrics.cache_hits, 1);
        assert_eq!(status.metrics.successful_requests, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resource_failure_is_cached_and_short_circuits() {
        let primary = MockPrimaryProvider::failing(ProviderError::resource("voice not found"));
        let local = MockLocalSynthesizer::default();
        let orchestrator = orchestrator(&primary, &MockClipSource::default(), &local, quiet_config());

        let first = orchestrator.speak("Nice weather", SpeakOptions::new()).await.unwrap();
        assert_eq!(first.tier, Tier::TertiaryLocal);
        assert_eq!(primary.call_count(), 1);

        let second = orchestrator.speak("Nice weather", SpeakOptions::new()).await.unwrap();
        assert_eq!(second.tier, Tier::TertiaryLocal);
        assert_eq!(primary.call_count(), 1);

        let status = orchestrator.status();
        assert_eq!(status.failed_cache_size, 1);
        assert_eq!(status.metrics.failure_cache_hits, 1);
        assert_eq!(status.metrics.resource_errors, 1);
        assert_eq!(status.metrics.fallback_hits, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_mood_is_neutral() {
        let primary = MockPrimaryProvider::healthy();
        let orchestrator = orchestrator(
            &primary,
            &MockClipSource::default(),
            &MockLocalSynthesizer::default(),
            quiet_config(),
        );

        orchestrator
            .speak("Good morning", SpeakOptions::new().with_mood("ecstatic"))
            .await
            .unwrap();
        // Same key as an explicit neutral request
        let neutral = orchestrator
            .speak("Good morning", SpeakOptions::new().with_mood("neutral"))
            .await
            .unwrap();
        assert!(neutral.from_cache);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_mood_changes_default() {
        let orchestrator = orchestrator(
            &MockPrimaryProvider::healthy(),
            &MockClipSource::default(),
            &MockLocalSynthesizer::default(),
            quiet_config(),
        );
        assert_eq!(orchestrator.current_mood(), "neutral");

        orchestrator.set_mood("Excited").unwrap();
        assert_eq!(orchestrator.current_mood(), "excited");

        assert!(matches!(
            orchestrator.set_mood("sleepy"),
            Err(SpeechError::UnknownMood(_))
        ));
        assert_eq!(orchestrator.current_mood(), "excited");

        assert!(orchestrator
            .update_mood_settings(
                "excited",
                MoodSettingsUpdate {
                    stability: Some(0.1),
                    ..Default::default()
                }
            )
            .is_ok());
        assert!(orchestrator
            .update_mood_settings("sleepy", MoodSettingsUpdate::default())
            .is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_fallback_surfaces_primary_error() {
        let primary =
            MockPrimaryProvider::failing(ProviderError::authentication("401 invalid key"));
        let local = MockLocalSynthesizer::default();
        let mut config = quiet_config();
        config.fallback.enabled = false;
        let orchestrator = orchestrator(&primary, &MockClipSource::default(), &local, config);

        let err = orchestrator
            .speak("Hello", SpeakOptions::new())
            .await
            .unwrap_err();
        assert_eq!(err.cause.error_class(), Some(ErrorClass::Authentication));
        assert!(err.failures.is_empty());
        assert!(local.utterances().is_empty());
        assert_eq!(orchestrator.status().metrics.exhausted_requests, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_cache_and_reset_health() {
        let primary = MockPrimaryProvider::healthy();
        primary.push_failure(ProviderError::authentication("403 forbidden"));
        let orchestrator = orchestrator(
            &primary,
            &MockClipSource::default(),
            &MockLocalSynthesizer::default(),
            quiet_config(),
        );

        orchestrator.speak("a", SpeakOptions::new()).await.unwrap();
        orchestrator.speak("b", SpeakOptions::new()).await.unwrap();
        let status = orchestrator.status();
        assert_eq!(status.cache_size, 1);
        assert_eq!(status.failed_cache_size, 1);
        assert_eq!(status.provider_health.state, HealthState::Available);

        orchestrator.clear_cache();
        orchestrator.reset_health();
        let status = orchestrator.status();
        assert_eq!(status.cache_size, 0);
        assert_eq!(status.failed_cache_size, 0);
        assert_eq!(status.provider_health.state, HealthState::Unknown);
    }

    #[tokio::test(start_paused = true)]
    async fn test_speak_after_shutdown_uses_fallback() {
        let primary = MockPrimaryProvider::healthy();
        let clips = MockClipSource::with_clips(&["greeting"]);
        let orchestrator = orchestrator(&primary, &clips, &MockLocalSynthesizer::default(), quiet_config());
        orchestrator.start();
        orchestrator.shutdown().await;

        let outcome = orchestrator.speak("Hello", SpeakOptions::new()).await.unwrap();
        assert_eq!(outcome.tier, Tier::SecondaryClip);
        assert_eq!(primary.call_count(), 0);
        assert!(!orchestrator.status().tiers.primary);
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let mut config = quiet_config();
        config.cache.success_capacity = 0;
        let result = SpeechOrchestrator::builder(Arc::new(MockPrimaryProvider::healthy()))
            .config(config)
            .build();
        assert!(matches!(result, Err(SpeechError::Configuration(_))));
    }
}
