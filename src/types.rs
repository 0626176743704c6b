//! # Orchestration Types
//!
//! Requests, options, payloads and outcomes shared across the orchestrator's
//! components.

use crate::constants::{ErrorClass, Priority, Tier};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

/// Encoded audio returned by the primary provider or the clip source.
///
/// Cloning is cheap; cached payloads are shared rather than copied.
#[derive(Clone, PartialEq, Eq)]
pub struct AudioBytes(Arc<[u8]>);

impl AudioBytes {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(Arc::from(bytes.into()))
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for AudioBytes {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}

impl std::fmt::Debug for AudioBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AudioBytes({} bytes)", self.0.len())
    }
}

/// Opaque handle to speech produced (or being produced) by the local synthesizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalHandle {
    pub id: String,
}

impl LocalHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Voice parameters for the primary provider.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VoiceParams {
    pub stability: f64,
    pub similarity_boost: f64,
    pub style: f64,
    pub use_speaker_boost: bool,
}

impl Default for VoiceParams {
    fn default() -> Self {
        Self {
            stability: 0.5,
            similarity_boost: 0.75,
            style: 0.0,
            use_speaker_boost: true,
        }
    }
}

/// Voice parameters for the local synthesizer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocalVoiceParams {
    pub rate: f64,
    pub pitch: f64,
    pub volume: f64,
}

impl Default for LocalVoiceParams {
    fn default() -> Self {
        Self {
            rate: 1.0,
            pitch: 1.0,
            volume: 0.8,
        }
    }
}

/// An immutable synthesis request, owned by the orchestrator until resolved.
#[derive(Debug, Clone)]
pub struct SynthesisRequest {
    pub id: Uuid,
    pub text: String,
    /// Already resolved against the mood table: never an unknown tag
    pub mood_tag: String,
    pub priority: Priority,
    pub submitted_at: Instant,
}

impl SynthesisRequest {
    pub fn new(text: impl Into<String>, mood_tag: impl Into<String>, priority: Priority) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            mood_tag: mood_tag.into(),
            priority,
            submitted_at: Instant::now(),
        }
    }

    /// Leading slice of the text for log lines
    pub fn preview(&self) -> &str {
        match self.text.char_indices().nth(50) {
            Some((idx, _)) => &self.text[..idx],
            None => &self.text,
        }
    }
}

/// Caller options for `speak`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpeakOptions {
    pub mood_tag: Option<String>,
    pub priority: Option<Priority>,
    /// Consult the success cache (defaults to `true`)
    pub use_cache: Option<bool>,
}

impl SpeakOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mood(mut self, mood_tag: impl Into<String>) -> Self {
        self.mood_tag = Some(mood_tag.into());
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = Some(use_cache);
        self
    }
}

/// What a resolved request produced.
#[derive(Debug, Clone, PartialEq)]
pub enum SpeechPayload {
    /// Audio bytes from the primary provider or a canned clip
    Audio(AudioBytes),
    /// The local synthesizer took over playback
    Local(LocalHandle),
}

/// Successful resolution of a `speak` call, tagged with the serving tier.
#[derive(Debug, Clone)]
pub struct SpeakOutcome {
    pub request_id: Uuid,
    pub tier: Tier,
    pub payload: SpeechPayload,
    pub latency: Duration,
    pub from_cache: bool,
}

impl SpeakOutcome {
    pub fn audio(&self) -> Option<&AudioBytes> {
        match &self.payload {
            SpeechPayload::Audio(audio) => Some(audio),
            SpeechPayload::Local(_) => None,
        }
    }

    pub fn handle(&self) -> Option<&LocalHandle> {
        match &self.payload {
            SpeechPayload::Local(handle) => Some(handle),
            SpeechPayload::Audio(_) => None,
        }
    }

    pub fn latency_ms(&self) -> u64 {
        self.latency.as_millis() as u64
    }
}

/// A remembered primary failure for a request key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub error_class: ErrorClass,
    pub first_seen_at: DateTime<Utc>,
    pub last_error_message: String,
}

impl FailureRecord {
    pub fn new(error_class: ErrorClass, message: impl Into<String>) -> Self {
        Self {
            error_class,
            first_seen_at: Utc::now(),
            last_error_message: message.into(),
        }
    }
}
