//! Headless engine binary for the Metroline simulation.
//!
//! Wires configuration, logging, a session, the autopilot and the
//! background snapshot writer together, then drives the tick loop until
//! the session halts or the frame budget runs out.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `metroline-config.yaml`
//! 2. Initialize structured logging (tracing)
//! 3. Resume from the last snapshot, or start a fresh session
//! 4. Start the snapshot writer
//! 5. Run the tick loop
//! 6. Flush the writer and log the result

mod autopilot;
mod error;
mod persist;

use std::path::{Path, PathBuf};
use std::time::Duration;

use metroline_core::{Session, SimulationConfig, TickOutcome};
use metroline_world::{DryLand, FlatMap, Geography};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::autopilot::Autopilot;
use crate::error::EngineError;
use crate::persist::SnapshotWriter;

/// Application entry point.
///
/// # Errors
///
/// Returns an error if configuration, session setup or the snapshot
/// writer fails.
#[tokio::main]
async fn main() -> Result<(), EngineError> {
    // 1. Load configuration.
    let config = load_config()?;

    // 2. Initialize structured logging.
    init_tracing(&config);
    info!(
        world_name = config.world.name,
        seed = config.world.seed,
        mode = ?config.world.mode,
        "metroline-engine starting"
    );

    // 3. Resume or start fresh.
    let mut session = open_session(&config)?;
    let mut autopilot = Autopilot::new();
    if session.starting_stations().is_some() {
        autopilot.bootstrap(&mut session);
    }

    // 4. Snapshot writer.
    let writer = config
        .persistence
        .enabled
        .then(|| SnapshotWriter::spawn(PathBuf::from(&config.persistence.path)));

    // 5. Tick loop.
    run(&config, &mut session, &mut autopilot, writer.as_ref()).await;

    // 6. Flush and report.
    if let Some(writer) = writer {
        writer.submit(session.snapshot());
        let written = writer.shutdown().await?;
        info!(written, "snapshots flushed");
    }
    let (commands, rejected) = autopilot.counts();
    let stats = session.stats();
    let (cache_hits, cache_misses) = session.route_cache_stats();
    info!(
        state = ?session.state(),
        elapsed = session.clock().elapsed(),
        week = session.clock().week(),
        delivered = stats.delivered,
        stranded = stats.stranded_evicted,
        discarded = stats.discarded,
        leaks_corrected = stats.leaks_corrected,
        stations = session.network().station_count(),
        lines = session.network().line_count(),
        commands,
        rejected,
        cache_hits,
        cache_misses,
        "metroline-engine shutdown complete"
    );
    Ok(())
}

/// Drive the session frame by frame.
async fn run(
    config: &SimulationConfig,
    session: &mut Session,
    autopilot: &mut Autopilot,
    writer: Option<&SnapshotWriter>,
) {
    let frame = Duration::from_millis(config.headless.frame_ms.max(1));
    let frame_ms = u32::try_from(config.headless.frame_ms.max(1)).map_or(f64::from(u32::MAX), f64::from);
    let mut interval = tokio::time::interval(frame);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let started = Instant::now();

    let mut frames = 0_u64;
    let mut since_save = 0.0_f64;
    let mut last_elapsed = session.clock().elapsed();

    loop {
        if config.headless.max_frames > 0 && frames >= config.headless.max_frames {
            info!(frames, "frame budget reached");
            break;
        }
        let timestamp_ms = if config.headless.realtime {
            interval.tick().await;
            started.elapsed().as_secs_f64() * 1000.0
        } else {
            frame_ms * u32::try_from(frames).map_or(f64::from(u32::MAX), f64::from)
        };
        frames = frames.saturating_add(1);

        match session.tick(timestamp_ms) {
            TickOutcome::Ok(summary) => {
                if !summary.stations_spawned.is_empty() {
                    autopilot.place(session, &summary.stations_spawned);
                }
                if summary.halted {
                    warn!(state = ?session.state(), "session halted");
                    break;
                }
            }
            TickOutcome::Idle => {
                if session.state().is_halted() {
                    break;
                }
                if let Some(option) = autopilot.resolve_reward(session) {
                    info!(?option, week = session.clock().week(), "autopilot took reward");
                }
            }
            TickOutcome::Fault { message } => {
                warn!(message, "session faulted");
                break;
            }
        }

        let elapsed = session.clock().elapsed();
        since_save += elapsed - last_elapsed;
        last_elapsed = elapsed;
        if let Some(writer) = writer
            && since_save >= config.persistence.interval_secs
        {
            since_save = 0.0;
            writer.submit(session.snapshot());
        }
        if !config.headless.realtime && frames % 64 == 0 {
            tokio::task::yield_now().await;
        }
    }
}

/// Load the configuration from `metroline-config.yaml`, or use defaults.
fn load_config() -> Result<SimulationConfig, EngineError> {
    let config_path = Path::new("metroline-config.yaml");
    if config_path.exists() {
        Ok(SimulationConfig::from_file(config_path)?)
    } else {
        let mut config = SimulationConfig::default();
        config.world.apply_env_overrides();
        Ok(config)
    }
}

fn init_tracing(config: &SimulationConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    if config.logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }
}

fn geography(config: &SimulationConfig) -> Box<dyn Geography + Send + Sync> {
    if config.world.rivers.is_empty() {
        Box::new(DryLand::default())
    } else {
        Box::new(FlatMap::with_rivers(config.world.rivers.clone()))
    }
}

/// Restore the saved session if one exists and is still running.
fn open_session(config: &SimulationConfig) -> Result<Session, EngineError> {
    let path = Path::new(&config.persistence.path);
    if config.persistence.enabled && path.exists() {
        match persist::read_snapshot(path) {
            Ok(snapshot) if !snapshot.state.is_halted() => {
                info!(
                    path = %path.display(),
                    saved_at = %snapshot.saved_at.to_rfc3339(),
                    "resuming from snapshot"
                );
                return Ok(Session::restore(snapshot, config.clone(), geography(config))?);
            }
            Ok(_) => info!("saved session had halted, starting fresh"),
            Err(e) => warn!(error = %e, "snapshot unreadable, starting fresh"),
        }
    }
    Ok(Session::new(config.clone(), geography(config))?)
}
