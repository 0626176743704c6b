#![allow(clippy::doc_markdown)] // Allow technical terms in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Speech Orchestrator
//!
//! Resilient orchestration layer that turns short text into speech through a
//! rate-limited, intermittently unavailable remote synthesis provider, without
//! ever blocking or failing the calling application unless every backend is
//! down.
//!
//! ## Architecture
//!
//! ```text
//!            speak()
//!               │
//!        ┌──────▼──────┐   hit    ┌──────────────┐
//!        │ ResponseCache├────────▶│   Resolved   │
//!        └──────┬──────┘          └──────▲───────┘
//!               │ miss                   │
//!        ┌──────▼──────┐  open   ┌───────┴──────┐
//!        │HealthMonitor├────────▶│ FallbackChain│ clip ─▶ local
//!        └──────┬──────┘         └───────▲──────┘
//!               │ closed                 │ gave up
//!        ┌──────▼──────┐  retry  ┌───────┴──────┐
//!        │  Scheduler  ├────────▶│RetryController│
//!        └─────────────┘         └──────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`orchestrator`] - `SpeechOrchestrator` façade, metrics and status
//! - [`scheduler`] - priority queue and paced dispatch loop
//! - [`retry`] - error classification and backoff
//! - [`health`] - provider health state machine and background probe
//! - [`fallback`] - ordered fallback strategies
//! - [`cache`] - request keys, success and failure stores
//! - [`mood`] - mood-to-voice tables
//! - [`providers`] - collaborator traits
//! - [`config`] - YAML configuration with environment overrides
//! - [`logging`] - structured logging setup
//! - [`test_helpers`] - mock collaborators shared by unit and integration tests
//!
//! ## Testing
//!
//! Timing-sensitive behavior (TTL expiry, backoff, probe intervals, pacing) is
//! tested on tokio's paused clock; see `tests/` for end-to-end scenarios.

pub mod cache;
pub mod config;
pub mod constants;
pub mod error;
pub mod fallback;
pub mod health;
pub mod logging;
pub mod mood;
pub mod orchestrator;
pub mod providers;
pub mod retry;
pub mod scheduler;
pub mod test_helpers;
pub mod types;

pub use config::{ConfigManager, OrchestratorConfig};
pub use constants::{ErrorClass, HealthState, Priority, Tier};
pub use error::{FallbackCause, FallbackExhausted, ProviderError, Result, SpeechError};
pub use orchestrator::{OrchestratorStatus, SpeechOrchestrator};
pub use types::{AudioBytes, LocalHandle, SpeakOptions, SpeakOutcome, SpeechPayload};
