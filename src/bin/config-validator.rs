//! # Speech Configuration Validator
//!
//! Command-line tool for validating `speech-config.yaml` across environments
//! before wiring the orchestrator into an application.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use speech_orchestrator::config::{ConfigManager, OrchestratorConfig};
use speech_orchestrator::mood::MoodTable;
use std::path::PathBuf;
use std::process;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "speech-config-validator")]
#[command(about = "Validate speech orchestrator configuration files")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Environment to validate (development, test, production)
    #[arg(short, long, default_value = "development")]
    environment: String,

    /// Configuration directory path (default: config)
    #[arg(short, long)]
    config_dir: Option<PathBuf>,

    /// Verbose output level (use multiple times for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Output format for `show` (json, yaml)
    #[arg(long, default_value = "json")]
    format: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate every configuration section
    All,

    /// Validate one section (cache, retry, health, scheduler, fallback, voice)
    Component { name: String },

    /// List environment override blocks present in the file
    Environments,

    /// Print the merged, sanitized configuration
    Show,
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let _ = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .try_init();

    let result = match &cli.command {
        Some(Commands::All) | None => validate_all_config(&cli),
        Some(Commands::Component { name }) => validate_component(&cli, name),
        Some(Commands::Environments) => list_environments(&cli),
        Some(Commands::Show) => show_config(&cli),
    };

    match result {
        Ok(()) => {
            info!("Configuration validation completed successfully");
            process::exit(0);
        }
        Err(e) => {
            error!("Configuration validation failed: {:#}", e);
            eprintln!("❌ {e:#}");
            process::exit(1);
        }
    }
}

fn load(cli: &Cli) -> Result<std::sync::Arc<ConfigManager>> {
    ConfigManager::load_from_directory_with_env(cli.config_dir.clone(), &cli.environment)
        .with_context(|| format!("loading configuration for '{}'", cli.environment))
}

fn validate_all_config(cli: &Cli) -> Result<()> {
    println!("🔧 Validating Speech Configuration");
    println!("Environment: {}", cli.environment);
    if let Some(config_dir) = &cli.config_dir {
        println!("Config Directory: {}", config_dir.display());
    }
    println!();

    let manager = load(cli)?;
    println!("✅ Configuration loaded and validated");

    let config = manager.config();
    for section in SECTIONS {
        validate_section(config, section)?;
    }

    println!("\n🎉 All configuration validation checks passed!");
    Ok(())
}

const SECTIONS: [&str; 6] = ["cache", "retry", "health", "scheduler", "fallback", "voice"];

fn validate_component(cli: &Cli, name: &str) -> Result<()> {
    let name = name.to_lowercase();
    if !SECTIONS.contains(&name.as_str()) {
        bail!("Unknown component: {name} (expected one of {})", SECTIONS.join(", "));
    }

    println!("🔧 Validating Component: {name}");
    let manager = load(cli)?;
    validate_section(manager.config(), &name)?;
    println!("✅ Component '{name}' validation passed!");
    Ok(())
}

fn validate_section(config: &OrchestratorConfig, section: &str) -> Result<()> {
    match section {
        "cache" => {
            println!("🗃️  Cache");
            println!(
                "   ✅ success capacity {}, failure capacity {}",
                config.cache.success_capacity, config.cache.failure_capacity
            );
            println!(
                "   ✅ failure TTL {}s (remember failures: {})",
                config.cache.failure_ttl().as_secs(),
                config.cache.cache_failed_requests
            );
        }
        "retry" => {
            println!("🔁 Retry");
            if !config.retry.enabled {
                warn!("   ⚠️  Retries disabled: every primary failure goes straight to fallback");
            }
            println!(
                "   ✅ max retries {}, backoff {}ms..{}ms, jitter {:.0}%",
                config.retry.effective_max_retries(),
                config.retry.base_delay_ms,
                config.retry.max_delay_ms,
                config.retry.jitter_factor * 100.0
            );
        }
        "health" => {
            println!("🩺 Health");
            println!(
                "   ✅ breaker opens after {} consecutive failures",
                config.health.max_consecutive_failures
            );
            if config.health.probe_enabled {
                println!(
                    "   ✅ probe every {}ms (first after {}ms, timeout {}ms)",
                    config.health.probe_interval_ms,
                    config.health.initial_probe_delay_ms,
                    config.health.probe_timeout_ms
                );
            } else {
                println!("   ℹ️  Background probe disabled: recovery relies on live calls");
            }
        }
        "scheduler" => {
            println!("📬 Scheduler");
            if config.scheduler.primary_timeout_ms < config.scheduler.rate_limit_delay_ms {
                warn!("   ⚠️  Primary timeout is shorter than the pacing delay");
            }
            println!(
                "   ✅ pacing {}ms, primary timeout {}ms",
                config.scheduler.rate_limit_delay_ms, config.scheduler.primary_timeout_ms
            );
        }
        "fallback" => {
            println!("🛟 Fallback");
            if config.fallback.enabled {
                println!(
                    "   ✅ clip timeout {}ms, local timeout {}ms",
                    config.fallback.clip_timeout_ms, config.fallback.local_timeout_ms
                );
            } else {
                warn!("   ⚠️  Fallback disabled: primary failures surface to callers");
            }
        }
        "voice" => {
            println!("🎭 Voice");
            let moods = MoodTable::new();
            if !moods.is_known(&config.voice.default_mood) {
                bail!(
                    "default mood '{}' is unknown (known: {})",
                    config.voice.default_mood,
                    moods.moods().join(", ")
                );
            }
            println!("   ✅ default mood {}", config.voice.default_mood);
        }
        other => bail!("Unknown component: {other}"),
    }
    Ok(())
}

fn list_environments(cli: &Cli) -> Result<()> {
    let dir = cli
        .config_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from("config"));
    let path = dir.join("speech-config.yaml");
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("reading {}", path.display()))?;
    let yaml: serde_yaml::Value =
        serde_yaml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;

    println!("📋 Environment overrides in {}:", path.display());
    let mut found = 0;
    for env in ["development", "test", "production"] {
        if yaml.get(env).is_some() {
            println!("  • {env}");
            found += 1;
        }
    }
    if found == 0 {
        println!("  (none, base configuration only)");
    }
    Ok(())
}

fn show_config(cli: &Cli) -> Result<()> {
    let manager = load(cli)?;
    let sanitized = manager.debug_config();
    let rendered = match cli.format.as_str() {
        "json" => serde_json::to_string_pretty(&sanitized)?,
        "yaml" => serde_yaml::to_string(&sanitized)?,
        other => bail!("Unsupported format: {other} (expected json or yaml)"),
    };
    println!("{rendered}");
    Ok(())
}
