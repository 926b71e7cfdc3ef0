//! Binary entry logic: config layering, logging setup, the tokio runtime and Ctrl-C handling.

use std::sync::Arc;

use tracing_subscriber::prelude::*;
use tracing_subscriber::{reload, EnvFilter, Registry};

use crate::cli::{self, Args, Commands};
use crate::config::SyncConfig;
use crate::container::UnconfiguredContainer;
use crate::error::SyncError;
use crate::jobs::default_registry;
use crate::sync::{compute_changes, run_sync, SyncOutcome, SyncRequest};

/// Swaps the filter of an installed subscriber once the configured level is known.
pub struct LogLevel(Option<reload::Handle<EnvFilter, Registry>>);

impl LogLevel {
    /// Applies `level` unless `RUST_LOG` chose the filter.
    pub fn apply(&self, level: &str) {
        let Some(handle) = &self.0 else {
            return;
        };
        match EnvFilter::try_new(level) {
            Ok(filter) => {
                if let Err(e) = handle.reload(filter) {
                    tracing::warn!("could not apply log level {level}: {e}");
                }
            }
            Err(e) => tracing::warn!(level, "invalid log level, keeping the current one: {e}"),
        }
    }
}

/// Installs the global subscriber at `initial`. `RUST_LOG` wins over any level set later.
pub fn init_tracing(initial: &str) -> LogLevel {
    let (filter, from_env) = match EnvFilter::try_from_default_env() {
        Ok(filter) => (filter, true),
        Err(_) => (EnvFilter::new(initial), false),
    };
    let (filter, handle) = reload::Layer::new(filter);
    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false).compact().with_writer(std::io::stderr))
        .try_init()
        .is_ok();
    LogLevel((installed && !from_env).then_some(handle))
}

fn load_config(args: &Args) -> Result<SyncConfig, SyncError> {
    let mut config = SyncConfig::load(args.config.as_deref())?;
    args.apply_to(&mut config);
    Ok(config)
}

/// Public entry for running the CLI.
pub fn run_cli_app() -> Result<(), Box<dyn std::error::Error>> {
    let args = cli::run();
    // installed first so config loading can log
    let log = init_tracing(if args.verbose { "debug" } else { "info" });
    let config = load_config(&args)?;
    log.apply(&config.log_level);

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    runtime.block_on(dispatch(args, config))?;
    Ok(())
}

async fn dispatch(args: Args, config: SyncConfig) -> Result<(), SyncError> {
    match &args.command {
        Commands::Sync { .. } => {
            let Some((version, previous)) = args.command.versions() else {
                return Ok(());
            };
            let request = SyncRequest { version, previous, filter: args.command.job_filter() };
            let registry = default_registry()?;
            for name in request_unknown_names(&args.command, |n| registry.contains(n)) {
                tracing::warn!(job = %name, "unknown job name in filter");
            }

            let run = run_sync(&config, &request, Arc::new(UnconfiguredContainer), registry);
            let outcome = tokio::select! {
                outcome = run => outcome?,
                _ = tokio::signal::ctrl_c() => {
                    tracing::warn!("interrupted; completed writes are kept, nothing partial is left behind");
                    return Err(SyncError::Interrupted);
                }
            };

            match outcome {
                SyncOutcome::Unchanged => println!("version did not change"),
                SyncOutcome::Completed { changes, report } => {
                    println!("{} changed bundles", changes.len());
                    for job in &report.jobs {
                        println!("[{}] {:<12} {}", job.priority, job.name, job.outcome);
                    }
                }
            }
        }
        Commands::Diff { res_version, prev_res } => {
            let changes = compute_changes(&config, res_version, prev_res.as_deref()).await?;
            for change in &changes {
                println!("{}", serde_json::to_string(change)?);
            }
        }
        Commands::Jobs => {
            let registry = default_registry()?;
            for (priority, kinds) in registry.tiers() {
                let names: Vec<&str> = kinds.iter().map(|k| k.name.as_str()).collect();
                println!("{}: {}", priority, names.join(", "));
            }
        }
    }
    Ok(())
}

fn request_unknown_names(command: &Commands, known: impl Fn(&str) -> bool) -> Vec<String> {
    match command {
        Commands::Sync { include, exclude, .. } => {
            include.iter().flatten().chain(exclude.iter()).filter(|n| !known(n.as_str())).cloned().collect()
        }
        _ => Vec::new(),
    }
}
