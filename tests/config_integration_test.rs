//! Configuration Integration Tests
//!
//! Loads the repository's `config/speech-config.yaml` for each environment and
//! wires the result into a working orchestrator.

use speech_orchestrator::config::ConfigManager;
use speech_orchestrator::test_helpers::{MockClipSource, MockLocalSynthesizer, MockPrimaryProvider};
use speech_orchestrator::{SpeakOptions, SpeechOrchestrator, Tier};
use std::path::PathBuf;
use std::sync::Arc;

fn shipped_config_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("config")
}

#[test]
fn test_shipped_config_loads_for_every_environment() {
    for environment in ["development", "test", "production"] {
        let manager =
            ConfigManager::load_from_directory_with_env(Some(shipped_config_dir()), environment)
                .unwrap_or_else(|e| panic!("{environment} config failed to load: {e}"));
        assert_eq!(manager.environment(), environment);
        assert!(manager.config().validate().is_ok());
        assert_eq!(manager.config().voice.default_mood, "neutral");
    }
}

#[test]
fn test_environment_overrides_merge_onto_base() {
    let dev = ConfigManager::load_from_directory_with_env(Some(shipped_config_dir()), "development")
        .unwrap();
    assert_eq!(dev.config().health.probe_interval_ms, 60_000);
    assert_eq!(dev.config().scheduler.rate_limit_delay_ms, 100);

    let test = ConfigManager::load_from_directory_with_env(Some(shipped_config_dir()), "test")
        .unwrap();
    assert!(!test.config().health.probe_enabled);
    assert_eq!(test.config().retry.base_delay_ms, 10);
    assert_eq!(test.config().retry.max_delay_ms, 100);
    // Untouched keys inside an overridden section keep their base values
    assert_eq!(test.config().retry.max_retries, 3);
    assert_eq!(test.config().scheduler.rate_limit_delay_ms, 0);

    let production =
        ConfigManager::load_from_directory_with_env(Some(shipped_config_dir()), "production")
            .unwrap();
    assert_eq!(production.config().cache.success_capacity, 200);
    assert_eq!(production.config().cache.failure_capacity, 400);
    assert_eq!(production.config().scheduler.rate_limit_delay_ms, 150);
    assert_eq!(production.config().health.probe_interval_ms, 30_000);
}

#[test]
fn test_debug_config_is_json_object() {
    let manager =
        ConfigManager::load_from_directory_with_env(Some(shipped_config_dir()), "test").unwrap();
    let debug = manager.debug_config();
    assert_eq!(debug["retry"]["base_delay_ms"], 10);
    assert_eq!(debug["scheduler"]["primary_timeout_ms"], 1000);
}

#[tokio::test]
async fn test_orchestrator_runs_on_test_environment_config() {
    let manager =
        ConfigManager::load_from_directory_with_env(Some(shipped_config_dir()), "test").unwrap();

    let primary = MockPrimaryProvider::healthy();
    let orchestrator = SpeechOrchestrator::builder(Arc::new(primary.clone()))
        .config_manager(&manager)
        .clip_source(Arc::new(MockClipSource::default()))
        .local_synthesizer(Arc::new(MockLocalSynthesizer::default()))
        .build()
        .unwrap();

    let outcome = orchestrator
        .speak("Configuration check", SpeakOptions::new())
        .await
        .unwrap();
    assert_eq!(outcome.tier, Tier::Primary);
    assert_eq!(primary.call_count(), 1);
    assert_eq!(orchestrator.config().retry.max_delay_ms, 100);

    orchestrator.shutdown().await;
}

#[test]
fn test_missing_directory_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let result =
        ConfigManager::load_from_directory_with_env(Some(dir.path().join("absent")), "test");
    assert!(result.is_err());
}
