use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

use hvwatch::config::EngineConfig;
use hvwatch::engine::Engine;
use hvwatch::store::SqliteStore;
use hvwatch_gateway::sim::SimCrate;
use hvwatch_types::{channel_status, ChannelStatus, CrateSnapshot};

#[derive(Parser, Debug)]
#[command(name = "hvwatch")]
#[command(about = "Polls an HV crate and persists time-stamped snapshots")]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "hvwatch.toml")]
    config: PathBuf,

    /// Override the configured database URL
    #[arg(long)]
    database_url: Option<String>,

    /// Voltage setpoint for the simulated crate, in volts
    #[arg(long, default_value = "1500.0")]
    sim_voltage: f64,

    /// Measurement noise amplitude for the simulated crate, in volts
    #[arg(long, default_value = "0.5")]
    sim_noise: f64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let config = EngineConfig::load(&args.config)?;
    let topology = config.topology()?;
    let parameters = config.parameter_set()?;
    let database_url = args
        .database_url
        .unwrap_or_else(|| config.database_url.clone());

    info!(
        slots = topology.len(),
        channels = topology.total_channels(),
        parameters = parameters.len(),
        "topology loaded"
    );

    let store = Arc::new(
        SqliteStore::connect(&database_url, parameters.clone())
            .await
            .with_context(|| format!("cannot open store at {database_url}"))?,
    );

    // The hardware SDK boundary is the DeviceGateway trait; until a
    // vendor gateway is wired in, run against the simulated crate.
    warn!("using the simulated device gateway");
    let gateway = Arc::new(
        SimCrate::builder(topology.clone())
            .target_voltage(args.sim_voltage)
            .noise(args.sim_noise)
            .build(),
    );

    let engine = Engine::builder(gateway, store, topology)
        .parameters(parameters)
        .poll_interval(config.poll_interval())
        .commit_interval(config.commit_interval())
        .build();

    let mut snapshots = engine.subscribe_snapshots();
    let mut errors = engine.subscribe_errors();
    let handle = engine.start();

    // Consumer side: a per-band census for every new snapshot, plus the
    // latest engine error, until Ctrl-C.
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                if let Some(snapshot) = snapshots.borrow_and_update().clone() {
                    log_census(&snapshot);
                }
            }
            changed = errors.changed() => {
                if changed.is_err() {
                    break;
                }
                if let Some(event) = errors.borrow_and_update().clone() {
                    warn!(category = ?event.category, at = %event.at, "{}", event.message);
                }
            }
        }
    }

    info!("shutting down");
    match handle.shutdown(config.shutdown_wait()).await {
        Ok(outcome) => info!(?outcome, "final flush complete"),
        Err(e) => {
            error!(error = %e, "final flush failed, buffered data was not persisted");
        }
    }
    Ok(())
}

/// Count channels per severity band for the status log line.
fn log_census(snapshot: &CrateSnapshot) {
    let mut powered_off = 0usize;
    let mut bands = [0usize; 4];
    for (_, _, reading) in snapshot.iter() {
        match channel_status(reading) {
            Some(ChannelStatus::PoweredOff) => powered_off += 1,
            Some(ChannelStatus::Live(health)) => bands[health.band as usize] += 1,
            None => {}
        }
    }
    info!(
        at = %snapshot.captured_at,
        nominal = bands[0],
        elevated = bands[1],
        high = bands[2],
        critical = bands[3],
        powered_off,
        "snapshot"
    );
}
