//! # Structured Logging Module
//!
//! Environment-aware structured logging that writes human-readable lines to the
//! console and JSON lines to a per-process file under `log/`.

use crate::constants::{ErrorClass, HealthState, Tier};
use chrono::Utc;
use std::fs;
use std::path::PathBuf;
use std::process;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};
use uuid::Uuid;

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration.
///
/// Safe to call repeatedly; only the first call installs a subscriber, and an
/// already-installed global subscriber is left in place.
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let log_level = get_log_level(&environment);
        let pid = process::id();

        let console_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_level(true)
            .with_ansi(true)
            .with_filter(build_filter(&log_level));

        let log_dir = PathBuf::from("log");
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
        let log_filename = format!("speech.{environment}.{pid}.{timestamp}.log");

        let file_layer = match fs::create_dir_all(&log_dir) {
            Ok(()) => {
                let file_appender = tracing_appender::rolling::never(&log_dir, &log_filename);
                let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
                // The writer flushes on guard drop; keep it for the process lifetime
                std::mem::forget(guard);
                Some(
                    fmt::layer()
                        .with_writer(file_writer)
                        .with_target(true)
                        .with_thread_ids(true)
                        .with_level(true)
                        .with_ansi(false)
                        .json()
                        .with_filter(build_filter(&log_level)),
                )
            }
            Err(_) => None,
        };
        let file_enabled = file_layer.is_some();

        let subscriber = tracing_subscriber::registry()
            .with(console_layer)
            .with(file_layer);

        if subscriber.try_init().is_err() {
            tracing::debug!(
                "Global tracing subscriber already initialized - continuing with existing subscriber"
            );
        }

        tracing::info!(
            pid = pid,
            environment = %environment,
            file_output = file_enabled,
            log_file = %log_dir.join(&log_filename).display(),
            "🔧 STRUCTURED LOGGING: Initialized"
        );
    });
}

/// RUST_LOG wins when set; otherwise the environment's default level applies
fn build_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Get current environment from environment variables
fn get_environment() -> String {
    std::env::var("SPEECH_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> String {
    match environment {
        "production" => "info".to_string(),
        "test" | "development" => "debug".to_string(),
        _ => "debug".to_string(),
    }
}

/// Log the resolution of a speech request
pub fn log_speech_outcome(
    request_id: Uuid,
    mood: &str,
    tier: Tier,
    latency_ms: u64,
    from_cache: bool,
) {
    tracing::info!(
        request_id = %request_id,
        mood = %mood,
        tier = %tier,
        latency_ms = latency_ms,
        from_cache = from_cache,
        timestamp = %Utc::now().to_rfc3339(),
        "🗣️ SPEECH_OUTCOME"
    );
}

/// Log a request moving from one tier to the next
pub fn log_tier_transition(request_id: Uuid, from: Tier, to: Tier, reason: &str) {
    tracing::warn!(
        request_id = %request_id,
        from = %from,
        to = %to,
        reason = %reason,
        "↪️ TIER_TRANSITION"
    );
}

/// Log a provider health state change
pub fn log_health_transition(
    from: HealthState,
    to: HealthState,
    consecutive_failures: u32,
    last_error: Option<ErrorClass>,
) {
    let last_error = last_error.map(|class| class.as_str()).unwrap_or("none");
    match to {
        HealthState::Unavailable => tracing::error!(
            from = %from,
            to = %to,
            consecutive_failures = consecutive_failures,
            last_error = %last_error,
            "🔴 HEALTH_TRANSITION"
        ),
        HealthState::Degraded => tracing::warn!(
            from = %from,
            to = %to,
            consecutive_failures = consecutive_failures,
            last_error = %last_error,
            "🟡 HEALTH_TRANSITION"
        ),
        _ => tracing::info!(
            from = %from,
            to = %to,
            consecutive_failures = consecutive_failures,
            "🟢 HEALTH_TRANSITION"
        ),
    }
}
