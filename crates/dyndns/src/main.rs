// # dyndns - consensus-based dynamic DNS updater
//
// This binary is a THIN integration layer. All resolver and zone logic
// lives in dyndns-core; this file only:
// 1. Reads environment variables and command-line arguments
// 2. Initializes logging and the runtime
// 3. Loads the config and providers files
// 4. Runs one update pass (or a provider survey) and maps the result to an
//    exit code
//
// It runs once and exits. Schedule it with cron or a systemd timer.
//
// ## Usage
//
// ```bash
// dyndns          # resolve the external IP and update the zone if needed
// dyndns test     # query every provider once and print what each reports
// dyndns --help
// ```
//
// ## Environment
//
// - `DYNDNS_CONFIG`: Path to the config file (default `config.json`)
// - `DYNDNS_PROVIDERS`: Path to the providers file (overrides `providers_file`)
// - `DYNDNS_LOG_LEVEL`: trace, debug, info, warn or error (default `info`)
// - `DYNDNS_MODE`: `dry-run` to log intended writes without making them
//
// ## Exit codes
//
// - 0: Records up to date, updated, or `test` finished
// - 1: A record update or a registrar call failed
// - 2: External IP unresolved, invalid configuration, no providers, or bad
//   command-line arguments

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{Parser, Subcommand};
use dyndns_core::{
    ConsensusResolver, DyndnsConfig, EngineEvent, ProviderList, ResolverConfig, UpdateEngine,
    UpdateOutcome,
};
use dyndns_ip_http::HttpProviderSource;
use dyndns_provider_gandi::GandiProvider;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

/// Exit codes for the possible run outcomes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DyndnsExitCode {
    /// Records up to date or updated
    Success = 0,
    /// A record update or registrar call failed
    UpdateFailed = 1,
    /// Nothing could be attempted (no IP, bad config, no providers)
    CannotRun = 2,
}

impl From<DyndnsExitCode> for ExitCode {
    fn from(code: DyndnsExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

#[derive(Parser, Debug)]
#[command(name = "dyndns", version)]
#[command(about = "Consensus-based dynamic DNS updater for Gandi zones")]
struct Cli {
    /// Without a subcommand, resolve the external IP and reconcile the zone
    #[command(subcommand)]
    command: Option<CliCommand>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum CliCommand {
    /// Query every provider once and print what each one reports
    Test,
}

/// Settings taken from the environment
#[derive(Debug)]
struct Settings {
    config_path: String,
    providers_path: Option<String>,
    log_level: String,
    dry_run: bool,
}

impl Settings {
    /// Load settings from environment variables
    fn from_env() -> Result<Self> {
        let settings = Self {
            config_path: env::var("DYNDNS_CONFIG").unwrap_or_else(|_| "config.json".to_string()),
            providers_path: env::var("DYNDNS_PROVIDERS").ok().filter(|p| !p.is_empty()),
            log_level: env::var("DYNDNS_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            dry_run: match env::var("DYNDNS_MODE") {
                Ok(mode) => match mode.to_lowercase().as_str() {
                    "dry-run" => true,
                    "" | "live" => false,
                    _ => anyhow::bail!(
                        "DYNDNS_MODE '{}' is not valid. Valid modes: live, dry-run",
                        mode
                    ),
                },
                Err(_) => false,
            },
        };

        settings.log_level()?;
        Ok(settings)
    }

    fn log_level(&self) -> Result<Level> {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Ok(Level::TRACE),
            "debug" => Ok(Level::DEBUG),
            "info" => Ok(Level::INFO),
            "warn" => Ok(Level::WARN),
            "error" => Ok(Level::ERROR),
            _ => anyhow::bail!(
                "DYNDNS_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }
    }
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return exit_code_for_cli_error(&e).into();
        }
    };

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return DyndnsExitCode::CannotRun.into();
        }
    };

    let log_level = settings.log_level().unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return DyndnsExitCode::CannotRun.into();
    }

    // One pass of sequential HTTP calls needs no worker threads
    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return DyndnsExitCode::UpdateFailed.into();
        }
    };

    let result = rt.block_on(async {
        match cli.command {
            None => run_update(&settings).await,
            Some(CliCommand::Test) => run_survey(&settings).await,
        }
    });

    match result {
        Ok(code) => code.into(),
        Err(e) => {
            error!("{:#}", e);
            exit_code_for_error(&e).into()
        }
    }
}

/// Map a rejected command line to its exit code
fn exit_code_for_cli_error(error: &clap::Error) -> DyndnsExitCode {
    match error.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => DyndnsExitCode::Success,
        _ => DyndnsExitCode::CannotRun,
    }
}

/// Map a failed run to its exit code
fn exit_code_for_error(error: &anyhow::Error) -> DyndnsExitCode {
    match error.downcast_ref::<dyndns_core::Error>() {
        Some(e) if e.is_config() => DyndnsExitCode::CannotRun,
        _ => DyndnsExitCode::UpdateFailed,
    }
}

/// Map a finished run to its exit code
fn exit_code_for_outcome(outcome: &UpdateOutcome) -> DyndnsExitCode {
    match outcome {
        UpdateOutcome::Unresolved { .. } => DyndnsExitCode::CannotRun,
        UpdateOutcome::Reconciled(report) if report.has_failures() => DyndnsExitCode::UpdateFailed,
        UpdateOutcome::Reconciled(_) => DyndnsExitCode::Success,
    }
}

fn load_config(settings: &Settings) -> Result<DyndnsConfig> {
    let config = DyndnsConfig::load(&settings.config_path)
        .with_context(|| format!("loading config from {}", settings.config_path))?;
    config.validate().context("validating config")?;
    Ok(config)
}

fn load_providers(path: &str) -> Result<ProviderList> {
    let providers =
        ProviderList::load(path).with_context(|| format!("loading providers from {}", path))?;
    debug!("Loaded {} provider(s) from {}", providers.len(), path);
    Ok(providers)
}

/// Resolve the external IP and reconcile the zone
async fn run_update(settings: &Settings) -> Result<DyndnsExitCode> {
    let config = load_config(settings)?;
    let providers_path = settings
        .providers_path
        .as_deref()
        .unwrap_or(&config.providers_file);
    let providers = load_providers(providers_path)?;

    if settings.dry_run {
        warn!("Running in DRY-RUN mode - the zone will not be modified");
    }
    info!(
        "Managing {} record(s) in {}: {}",
        config.names.len(),
        config.domain,
        config.names.join(", ")
    );

    let source = Arc::new(HttpProviderSource::new()?);
    let resolver = ConsensusResolver::new(source, config.resolver.clone())?;
    let zone = Box::new(GandiProvider::from_config(&config)?);

    let (engine, mut events) =
        UpdateEngine::new(resolver, providers, zone, &config, settings.dry_run)?;

    let monitor = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            log_event(&event);
        }
    });

    let mut rng = StdRng::from_entropy();
    let outcome = engine.run(&mut rng).await;

    // Closing the channel lets the monitor drain and finish
    drop(engine);
    let _ = monitor.await;

    let outcome = outcome?;
    match &outcome {
        UpdateOutcome::Unresolved { attempts } => {
            error!(
                "Could not resolve the external IP: providers did not agree within {} attempt(s)",
                attempts
            );
        }
        UpdateOutcome::Reconciled(report) => {
            for failure in &report.failed {
                error!("Record {} not updated: {}", failure.name, failure.reason);
            }
            if let Some(version) = report.activated_version {
                info!(
                    "Zone version {} active, {} record(s) now point at {}",
                    version,
                    report.updated.len(),
                    report.external_ip
                );
            } else if !report.would_update.is_empty() {
                info!(
                    "[DRY-RUN] {} record(s) would point at {}",
                    report.would_update.len(),
                    report.external_ip
                );
            }
        }
    }

    Ok(exit_code_for_outcome(&outcome))
}

/// Query every provider once and print what each one reports
async fn run_survey(settings: &Settings) -> Result<DyndnsExitCode> {
    let (providers_path, resolver_config) = match &settings.providers_path {
        Some(path) => (path.clone(), ResolverConfig::default()),
        None => {
            let config = DyndnsConfig::load(&settings.config_path)
                .with_context(|| format!("loading config from {}", settings.config_path))?;
            (config.providers_file, config.resolver)
        }
    };
    let providers = load_providers(&providers_path)?;

    let source = Arc::new(HttpProviderSource::new()?);
    let resolver = ConsensusResolver::new(source, resolver_config)?;

    for survey in resolver.survey(&providers.providers).await? {
        match survey.outcome {
            Ok(candidates) if candidates.is_empty() => {
                warn!("{}: no address found", survey.provider);
            }
            Ok(candidates) => info!("{}: {}", survey.provider, candidates.join(", ")),
            Err(e) => warn!("{}: {}", survey.provider, e),
        }
    }

    Ok(DyndnsExitCode::Success)
}

fn log_event(event: &EngineEvent) {
    match event {
        EngineEvent::RecordUpdateFailed {
            record_name,
            error,
            retry_count,
        } => warn!(
            "Update of {} failed after {} retr(ies): {}",
            record_name, retry_count, error
        ),
        other => debug!("Engine event: {:?}", other),
    }
}
