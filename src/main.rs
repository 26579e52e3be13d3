//! vpsa-relay: forwards storage-array telemetry to metric and log sinks.
//!
//! One invocation runs one forwarding cycle: ship the appliance event log
//! (resuming from the checkpoint), then forward usage metrics per resource
//! category. An external scheduler drives periodic invocations; any error
//! surfaces as a non-zero exit.

mod checkpoint;
mod config;
mod cycle;
mod error;
mod forwarder;
mod shipper;
mod sink;
mod source;
mod telemetry;

use clap::Parser;
use snafu::prelude::*;
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use config::Config;
use error::{AddressParseSnafu, ConfigSnafu, CycleError, TelemetrySnafu};

/// Storage-array telemetry relay.
#[derive(Parser, Debug)]
#[command(name = "vpsa-relay")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file.
    #[arg(short, long)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Dry run - validate configuration without forwarding.
    #[arg(long)]
    dry_run: bool,
}

#[snafu::report]
#[tokio::main]
async fn main() -> Result<(), CycleError> {
    let args = Args::parse();

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!("vpsa-relay starting");

    let config = Config::from_file(&args.config).context(ConfigSnafu)?;

    // Initialize telemetry if enabled
    if config.telemetry.enabled {
        let addr = config.telemetry.address.parse().context(AddressParseSnafu)?;
        telemetry::init(addr).context(TelemetrySnafu)?;
        debug!(
            "Telemetry endpoint listening on http://{}/metrics",
            config.telemetry.address
        );
    }

    if args.dry_run {
        info!("Dry run mode - validating configuration");
        info!("Source: {}", config.source.host);
        info!("Metric sink: {} (namespace {})", config.metric_sink.endpoint, config.metric_sink.namespace);
        info!("Log sink: {} (stream {})", config.log_sink.endpoint, config.log_sink.stream);
        info!("Checkpoint: {} ({})", config.checkpoint.path, config.checkpoint_key());
        info!("Configuration is valid");
        return Ok(());
    }

    // Run one forwarding cycle
    let stats = cycle::run_cycle(&config).await?;

    info!("Cycle completed successfully");
    info!("  Log records shipped: {}", stats.records_shipped);
    info!("  Metric points forwarded: {}", stats.points_forwarded);
    info!("  Resources processed: {}", stats.resources_processed);
    info!("  Resources skipped: {}", stats.resources_skipped);
    info!("  Resources failed: {}", stats.resources_failed);

    Ok(())
}
