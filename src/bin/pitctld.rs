//! `pitctld`: the pitctl daemon entry point.

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use pitctl::config::{Config, DEFAULT_CONFIG_PATH};
use pitctl::display::{LoggingDisplaySink, NullDisplaySink};
use pitctl::error::Result;
use pitctl::motor::{NullMotorDriver, RetryingMotorDriver};
use pitctl::orchestrator::Orchestrator;
use pitctl::pit::PitController;
use pitctl::probe_manager::ProbeManager;

/// Closed-loop PID temperature controller for charcoal/wood barbecue smokers.
#[derive(Debug, Parser)]
#[command(name = "pitctld", version, about)]
struct Args {
    /// Path to the configuration file.
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Log level (`error`, `warn`, `info`, `debug`, `trace`). Overridden by
    /// `RUST_LOG` if set.
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Render status to the log instead of discarding it.
    #[arg(long)]
    log_status: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = Config::load(&args.config).unwrap_or_else(|e| {
        tracing::warn!("Failed to load {}: {}, using defaults", args.config, e);
        Config::default()
    });

    let probe_manager = Arc::new(ProbeManager::new(config.units).await?);
    let controller = PitController::from_config(&config);
    let motor = Arc::new(RetryingMotorDriver::new(NullMotorDriver));

    if args.log_status {
        run(probe_manager, controller, motor, Arc::new(LoggingDisplaySink)).await
    } else {
        run(probe_manager, controller, motor, Arc::new(NullDisplaySink)).await
    }
}

async fn run<D>(
    probe_manager: Arc<ProbeManager>,
    controller: Arc<PitController>,
    motor: Arc<RetryingMotorDriver<NullMotorDriver>>,
    display: Arc<D>,
) -> Result<()>
where
    D: pitctl::display::DisplaySink + 'static,
{
    let orchestrator = Orchestrator::new(probe_manager, controller, motor, display);
    orchestrator
        .run(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await
}
