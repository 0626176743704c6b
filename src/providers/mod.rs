//! # Speech Collaborators
//!
//! Trait seams for the backends the orchestrator drives: the remote primary
//! provider, the canned-clip source and the always-on local synthesizer.
//! Implementations are supplied by the host application.

use crate::error::{ClipError, LocalSynthesisError, ProviderError};
use crate::types::{AudioBytes, LocalHandle, LocalVoiceParams, VoiceParams};
use async_trait::async_trait;

/// Remote speech-synthesis provider (rate-limited, intermittently unavailable).
#[async_trait]
pub trait PrimaryProvider: Send + Sync {
    /// Synthesize `text` with the given voice parameters
    async fn synthesize(&self, text: &str, params: &VoiceParams)
        -> Result<AudioBytes, ProviderError>;

    /// Cheap capability check used by the background health probe
    async fn probe(&self) -> Result<(), ProviderError>;

    fn name(&self) -> &str {
        "primary"
    }
}

/// Source of pre-recorded clips addressed by semantic tag.
#[async_trait]
pub trait ClipSource: Send + Sync {
    async fn lookup(&self, tag: &str) -> Result<AudioBytes, ClipError>;
}

/// Lower-quality synthesizer that runs locally.
#[async_trait]
pub trait LocalSynthesizer: Send + Sync {
    async fn synthesize_local(
        &self,
        text: &str,
        params: &LocalVoiceParams,
    ) -> Result<LocalHandle, LocalSynthesisError>;
}
