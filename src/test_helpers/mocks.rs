//! Mock speech collaborators
//!
//! Each mock keeps its observable state behind an `Arc<Mutex<_>>` so a test
//! can hand a clone to the orchestrator and still inspect what happened.

use crate::error::{ClipError, LocalSynthesisError, ProviderError};
use crate::providers::{ClipSource, LocalSynthesizer, PrimaryProvider};
use crate::types::{AudioBytes, LocalHandle, LocalVoiceParams, VoiceParams};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// One call the primary provider received
#[derive(Debug, Clone)]
pub struct PrimaryCall {
    pub text: String,
    pub params: VoiceParams,
    pub at: Instant,
}

#[derive(Debug, Default, Clone)]
pub struct MockPrimaryState {
    /// Failures handed out before the steady-state behavior applies
    pub script: VecDeque<ProviderError>,
    /// Error returned once the script is exhausted; `None` means succeed
    pub steady_error: Option<ProviderError>,
    /// Every synthesize call, in arrival order
    pub calls: Vec<PrimaryCall>,
    pub probe_error: Option<ProviderError>,
    pub probes: usize,
}

/// Primary provider with scripted failures and optional latency.
/// Successful calls return `primary:{text}`.
#[derive(Debug, Clone, Default)]
pub struct MockPrimaryProvider {
    state: Arc<Mutex<MockPrimaryState>>,
    latency: Option<Duration>,
}

impl MockPrimaryProvider {
    pub fn healthy() -> Self {
        Self::default()
    }

    pub fn failing(error: ProviderError) -> Self {
        let provider = Self::default();
        provider.set_steady_error(Some(error));
        provider
    }

    /// Sleep this long inside every synthesize call
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Fail the next otherwise-unscripted call with `error`
    pub fn push_failure(&self, error: ProviderError) {
        self.state.lock().script.push_back(error);
    }

    pub fn set_steady_error(&self, error: Option<ProviderError>) {
        self.state.lock().steady_error = error;
    }

    pub fn set_probe_error(&self, error: Option<ProviderError>) {
        self.state.lock().probe_error = error;
    }

    pub fn calls(&self) -> Vec<PrimaryCall> {
        self.state.lock().calls.clone()
    }

    pub fn call_texts(&self) -> Vec<String> {
        self.calls().into_iter().map(|call| call.text).collect()
    }

    pub fn call_count(&self) -> usize {
        self.state.lock().calls.len()
    }

    pub fn probe_count(&self) -> usize {
        self.state.lock().probes
    }

    /// Gaps between consecutive calls, in arrival order
    pub fn call_gaps(&self) -> Vec<Duration> {
        self.calls()
            .windows(2)
            .map(|pair| pair[1].at.duration_since(pair[0].at))
            .collect()
    }
}

#[async_trait]
impl PrimaryProvider for MockPrimaryProvider {
    async fn synthesize(
        &self,
        text: &str,
        params: &VoiceParams,
    ) -> Result<AudioBytes, ProviderError> {
        let outcome = {
            let mut state = self.state.lock();
            state.calls.push(PrimaryCall {
                text: text.to_string(),
                params: *params,
                at: Instant::now(),
            });
            match state.script.pop_front() {
                Some(error) => Err(error),
                None => match &state.steady_error {
                    Some(error) => Err(error.clone()),
                    None => Ok(()),
                },
            }
        };

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        outcome.map(|()| AudioBytes::new(format!("primary:{text}").into_bytes()))
    }

    async fn probe(&self) -> Result<(), ProviderError> {
        let mut state = self.state.lock();
        state.probes += 1;
        match &state.probe_error {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn name(&self) -> &str {
        "mock-primary"
    }
}

#[derive(Debug, Default, Clone)]
pub struct MockClipState {
    pub clips: HashMap<String, AudioBytes>,
    pub lookups: Vec<String>,
    pub unavailable: bool,
}

/// Clip library keyed by tag. Registered clips return `clip:{tag}`.
#[derive(Debug, Clone, Default)]
pub struct MockClipSource {
    state: Arc<Mutex<MockClipState>>,
}

impl MockClipSource {
    pub fn with_clips(tags: &[&str]) -> Self {
        let source = Self::default();
        {
            let mut state = source.state.lock();
            for tag in tags {
                state.clips.insert(
                    (*tag).to_string(),
                    AudioBytes::new(format!("clip:{tag}").into_bytes()),
                );
            }
        }
        source
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().unavailable = unavailable;
    }

    pub fn lookups(&self) -> Vec<String> {
        self.state.lock().lookups.clone()
    }
}

#[async_trait]
impl ClipSource for MockClipSource {
    async fn lookup(&self, tag: &str) -> Result<AudioBytes, ClipError> {
        let mut state = self.state.lock();
        state.lookups.push(tag.to_string());
        if state.unavailable {
            return Err(ClipError::Failed("clip storage offline".to_string()));
        }
        state
            .clips
            .get(tag)
            .cloned()
            .ok_or_else(|| ClipError::NotFound {
                tag: tag.to_string(),
            })
    }
}

#[derive(Debug, Default, Clone)]
pub struct MockLocalState {
    pub utterances: Vec<(String, LocalVoiceParams)>,
    pub failing: bool,
}

/// Local synthesizer that records what it was asked to say.
/// Handles are numbered `utterance-1`, `utterance-2`, ...
#[derive(Debug, Clone, Default)]
pub struct MockLocalSynthesizer {
    state: Arc<Mutex<MockLocalState>>,
}

impl MockLocalSynthesizer {
    pub fn failing() -> Self {
        let local = Self::default();
        local.set_failing(true);
        local
    }

    pub fn set_failing(&self, failing: bool) {
        self.state.lock().failing = failing;
    }

    pub fn utterances(&self) -> Vec<(String, LocalVoiceParams)> {
        self.state.lock().utterances.clone()
    }

    pub fn call_count(&self) -> usize {
        self.state.lock().utterances.len()
    }
}

#[async_trait]
impl LocalSynthesizer for MockLocalSynthesizer {
    async fn synthesize_local(
        &self,
        text: &str,
        params: &LocalVoiceParams,
    ) -> Result<LocalHandle, LocalSynthesisError> {
        let mut state = self.state.lock();
        state.utterances.push((text.to_string(), *params));
        if state.failing {
            return Err(LocalSynthesisError::new("local engine offline"));
        }
        Ok(LocalHandle::new(format!(
            "utterance-{}",
            state.utterances.len()
        )))
    }
}
