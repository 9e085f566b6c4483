use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use argh::FromArgs;
use kubreed_core::WorkloadConfig;
use kubreed_core::observability;

use crate::config::Config;
use crate::dispatch::{ConcurrencyPolicy, Dispatcher, HttpTransport};
use crate::state::State;
use crate::{healthcheck, web};

/// Crates logged at full verbosity unless `RUST_LOG` says otherwise.
const VERBOSE_CRATES: &[&str] = &["kubreed_http", "kubreed_core", "tower_http"];

/// Synthetic mesh workload: serves simulated APIs and sends traffic to its peers.
#[derive(Debug, FromArgs)]
struct Args {
    /// path to the YAML configuration file
    #[argh(option, short = 'c')]
    pub config: Option<PathBuf>,

    #[argh(subcommand)]
    pub command: Command,
}

#[derive(Debug, FromArgs)]
#[argh(subcommand)]
enum Command {
    Run(RunCommand),
    Healthcheck(HealthcheckCommand),
    Version(VersionCommand),
}

/// serve the APIs and dispatch traffic to the configured remote services
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "run")]
struct RunCommand {}

/// perform a healthcheck against the running workload server
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "healthcheck")]
struct HealthcheckCommand {}

/// print the version
#[derive(Default, Debug, FromArgs)]
#[argh(subcommand, name = "version")]
struct VersionCommand {}

/// Bootstrap the runtime and execute the CLI command.
pub fn execute() -> Result<()> {
    let args: Args = argh::from_env();

    if let Command::Version(_) = args.command {
        println!("{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let config = Config::load(args.config.as_deref())?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("main-rt")
        .enable_all()
        .build()?;
    let _runtime_guard = runtime.enter();

    observability::init_tracing(VERBOSE_CRATES);
    tracing::debug!(?config);

    runtime.block_on(async move {
        match args.command {
            Command::Run(RunCommand {}) => run(config).await,
            Command::Healthcheck(HealthcheckCommand {}) => healthcheck::healthcheck(config).await,
            Command::Version(VersionCommand {}) => unreachable!(),
        }
    })
}

async fn run(config: Config) -> Result<()> {
    let workload = WorkloadConfig::from_env().context("invalid workload configuration")?;
    tracing::info!(?workload, "loaded workload configuration");

    let dispatcher = Dispatcher::new(&workload, Arc::new(HttpTransport::new()?))
        .policy(ConcurrencyPolicy::from_limit(config.dispatch.max_in_flight))
        .pause(config.dispatch.pause);
    tokio::spawn(dispatcher.run());

    web::server(State::new(config, workload)).await
}
