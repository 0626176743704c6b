//! # Fallback Chain
//!
//! Ordered strategies tried once the primary tier has given up: a canned clip
//! chosen from the text (or the mood), then the local synthesizer. Each
//! strategy runs at most once per request under its own timeout. Tier
//! failures are logged and collected; only when every tier fails does the
//! caller see them, aggregated into [`FallbackExhausted`].

use crate::config::FallbackConfig;
use crate::constants::Tier;
use crate::error::{FallbackCause, FallbackExhausted, TierFailure};
use crate::health::HealthMonitor;
use crate::logging::log_tier_transition;
use crate::mood::generic_clip_tag;
use crate::providers::{ClipSource, LocalSynthesizer};
use crate::types::{LocalVoiceParams, SpeechPayload, SynthesisRequest};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// (keywords, clip tag), checked in order against the lowercased text
const CLIP_KEYWORDS: [(&[&str], &str); 5] = [
    (&["hello", "hi "], "greeting"),
    (&["error", "failed"], "error"),
    (&["complete", "done"], "success"),
    (&["loading", "processing"], "processing"),
    (&["help", "assist"], "helpful"),
];

/// Clip tag for a request: the first keyword match in the text, else the
/// mood's generic clip
pub fn clip_tag_for(text: &str, mood: &str) -> String {
    let lower = text.to_lowercase();
    CLIP_KEYWORDS
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(_, tag)| (*tag).to_string())
        .unwrap_or_else(|| generic_clip_tag(mood).to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackStrategy {
    SecondaryClip,
    TertiaryLocal,
}

impl FallbackStrategy {
    pub const ORDER: [FallbackStrategy; 2] =
        [FallbackStrategy::SecondaryClip, FallbackStrategy::TertiaryLocal];

    pub fn tier(&self) -> Tier {
        match self {
            FallbackStrategy::SecondaryClip => Tier::SecondaryClip,
            FallbackStrategy::TertiaryLocal => Tier::TertiaryLocal,
        }
    }
}

/// A fallback tier that produced speech
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackServed {
    pub tier: Tier,
    pub payload: SpeechPayload,
    pub latency: Duration,
}

pub struct FallbackChain {
    strategies: Vec<FallbackStrategy>,
    clips: Option<Arc<dyn ClipSource>>,
    local: Option<Arc<dyn LocalSynthesizer>>,
    health: Arc<HealthMonitor>,
    enabled: bool,
    clip_timeout: Duration,
    local_timeout: Duration,
}

impl std::fmt::Debug for FallbackChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackChain")
            .field("strategies", &self.strategies)
            .field("clips_configured", &self.clips.is_some())
            .field("local_configured", &self.local.is_some())
            .field("enabled", &self.enabled)
            .field("clip_timeout", &self.clip_timeout)
            .field("local_timeout", &self.local_timeout)
            .finish()
    }
}

impl FallbackChain {
    pub fn new(
        clips: Option<Arc<dyn ClipSource>>,
        local: Option<Arc<dyn LocalSynthesizer>>,
        health: Arc<HealthMonitor>,
        config: &FallbackConfig,
    ) -> Self {
        Self {
            strategies: FallbackStrategy::ORDER.to_vec(),
            clips,
            local,
            health,
            enabled: config.enabled,
            clip_timeout: config.clip_timeout(),
            local_timeout: config.local_timeout(),
        }
    }

    pub fn strategies(&self) -> &[FallbackStrategy] {
        &self.strategies
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn clips_configured(&self) -> bool {
        self.clips.is_some()
    }

    pub fn local_configured(&self) -> bool {
        self.local.is_some()
    }

    /// Walk the strategies in order until one produces speech
    pub async fn resolve(
        &self,
        request: &SynthesisRequest,
        local_params: &LocalVoiceParams,
        cause: FallbackCause,
    ) -> Result<FallbackServed, FallbackExhausted> {
        if !self.enabled {
            warn!(
                request_id = %request.id,
                cause = %cause,
                "Fallback disabled, surfacing primary failure"
            );
            return Err(FallbackExhausted {
                cause,
                failures: Vec::new(),
            });
        }

        let mut failures = Vec::with_capacity(self.strategies.len());
        let mut from = Tier::Primary;

        for strategy in &self.strategies {
            let tier = strategy.tier();
            let reason = failures
                .last()
                .map(|f: &TierFailure| f.reason.clone())
                .unwrap_or_else(|| cause.to_string());
            log_tier_transition(request.id, from, tier, &reason);

            let started = Instant::now();
            match self.attempt(*strategy, request, local_params).await {
                Ok(payload) => {
                    let latency = started.elapsed();
                    self.health.record_fallback_served();
                    info!(
                        request_id = %request.id,
                        tier = %tier,
                        latency_ms = latency.as_millis() as u64,
                        "🛟 Fallback tier served request"
                    );
                    return Ok(FallbackServed {
                        tier,
                        payload,
                        latency,
                    });
                }
                Err(reason) => {
                    warn!(
                        request_id = %request.id,
                        tier = %tier,
                        reason = %reason,
                        "Fallback tier failed"
                    );
                    failures.push(TierFailure { tier, reason });
                    from = tier;
                }
            }
        }

        let exhausted = FallbackExhausted { cause, failures };
        tracing::error!(
            request_id = %request.id,
            error = %exhausted,
            "💥 Every speech tier failed"
        );
        Err(exhausted)
    }

    async fn attempt(
        &self,
        strategy: FallbackStrategy,
        request: &SynthesisRequest,
        local_params: &LocalVoiceParams,
    ) -> Result<SpeechPayload, String> {
        match strategy {
            FallbackStrategy::SecondaryClip => {
                let clips = self.clips.as_ref().ok_or("clip source not configured")?;
                let tag = clip_tag_for(&request.text, &request.mood_tag);
                debug!(request_id = %request.id, clip_tag = %tag, "Looking up canned clip");

                match tokio::time::timeout(self.clip_timeout, clips.lookup(&tag)).await {
                    Ok(Ok(audio)) => Ok(SpeechPayload::Audio(audio)),
                    Ok(Err(err)) => Err(err.to_string()),
                    Err(_) => Err(format!(
                        "clip lookup for '{tag}' timed out after {}ms",
                        self.clip_timeout.as_millis()
                    )),
                }
            }
            FallbackStrategy::TertiaryLocal => {
                let local = self
                    .local
                    .as_ref()
                    .ok_or("local synthesizer not configured")?;

                match tokio::time::timeout(
                    self.local_timeout,
                    local.synthesize_local(&request.text, local_params),
                )
                .await
                {
                    Ok(Ok(handle)) => Ok(SpeechPayload::Local(handle)),
                    Ok(Err(err)) => Err(err.to_string()),
                    Err(_) => Err(format!(
                        "local synthesis timed out after {}ms",
                        self.local_timeout.as_millis()
                    )),
                }
            }
        }
    }
}
