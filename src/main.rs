//! Geofence engine - replay a position track against configured geofences
//!
//! Module structure:
//! - `domain/` - Core types (Geofence, GeofenceEvent, geometry)
//! - `io/` - Edge collaborators (clock, position source, egress)
//! - `services/` - Registry, occupancy, dispatch, scheduling, engine
//! - `infra/` - Infrastructure (Config, Metrics)

use anyhow::Context;
use clap::Parser;
use geofence_engine::infra::{Config, Metrics};
use geofence_engine::io::{EventEgress, PositionSource, ReplaySource, SystemClock};
use geofence_engine::services::{GeofenceEngine, PositionStatus};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Geofence engine - polls a position source and emits Enter / Exit / Dwell events
#[derive(Parser, Debug)]
#[command(name = "geofence-engine", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, env = "CONFIG_FILE", default_value = "config/dev.toml")]
    config: String,

    /// JSONL track to replay (overrides [replay].track_file)
    #[arg(short, long)]
    track: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Default: INFO, use RUST_LOG=debug for per-tick visibility
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!(version = %env!("CARGO_PKG_VERSION"), git_hash = %env!("GIT_HASH"), "geofence-engine starting");

    let args = Args::parse();
    let config = Config::load_from_path(&args.config).with_track_file(args.track);

    info!(
        config_file = %config.config_file(),
        site_id = %config.site_id(),
        check_interval_ms = %config.engine().check_interval_ms,
        dwell_threshold_ms = %config.engine().dwell_threshold_ms,
        high_accuracy = %config.engine().high_accuracy,
        geofences = %config.geofences().len(),
        track_file = ?config.track_file(),
        egress_file = %config.egress_file(),
        "config_loaded"
    );

    let Some(track_file) = config.track_file() else {
        error!("no_track_file_configured");
        anyhow::bail!("no position track configured: set [replay].track_file or pass --track");
    };
    let replay = Arc::new(ReplaySource::from_file(track_file)?);

    let metrics = Arc::new(Metrics::new());
    let source: Arc<dyn PositionSource> = replay.clone();
    let engine =
        GeofenceEngine::with_parts(config.engine().clone(), source, Arc::new(SystemClock::new()), metrics.clone());

    engine
        .add_geofences(config.geofences().iter().cloned())
        .context("invalid geofence in configuration")?;

    let egress = EventEgress::new(config.egress_file(), config.site_id());
    engine.subscribe_all(move |event| egress.write_event(event));

    engine.start()?;

    // Start metrics reporter (lock-free reads with full summary)
    let metrics_clone = metrics.clone();
    let metrics_interval = config.metrics_interval_secs().max(1);
    let geofence_count = config.geofences().len();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(metrics_interval));
        loop {
            interval.tick().await;
            metrics_clone.report(geofence_count).log();
        }
    });

    // Replay ends once the track is drained and the source reports no fix
    let mut status = engine.position_status();
    let track_done = async move {
        loop {
            if status.changed().await.is_err() {
                return;
            }
            let unavailable = matches!(*status.borrow(), PositionStatus::Unavailable { .. });
            if unavailable && replay.remaining() == 0 {
                return;
            }
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("shutdown_signal_received"),
        _ = track_done => info!("track_exhausted"),
    }

    let active = engine.active_geofences();
    info!(active_geofences = ?active, "final_occupancy");
    engine.shutdown().await;
    metrics.report(geofence_count).log();

    info!("geofence-engine shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_path_selection() {
        std::env::remove_var("CONFIG_FILE");
        let args = Args::try_parse_from(["geofence-engine"]).unwrap();
        assert_eq!(args.config, "config/dev.toml");
        assert!(args.track.is_none());

        std::env::set_var("CONFIG_FILE", "config/campus.toml");
        let args = Args::try_parse_from(["geofence-engine"]).unwrap();
        assert_eq!(args.config, "config/campus.toml");

        // Command line wins over the environment
        let args = Args::try_parse_from(["geofence-engine", "--config", "config/depot.toml"]).unwrap();
        assert_eq!(args.config, "config/depot.toml");
        std::env::remove_var("CONFIG_FILE");

        let args = Args::try_parse_from(["geofence-engine", "--track", "walk.jsonl"]).unwrap();
        assert_eq!(args.track.as_deref(), Some("walk.jsonl"));
    }
}
