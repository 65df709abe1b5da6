//! Persistable copies of a session.
//!
//! A [`WorldSnapshot`] is an owned, immutable copy of everything needed to
//! resume a session: network, resources, clock, counters and timers. Undo
//! history and the route cache are not part of it; a restored session
//! starts with empty history and a cold cache. Snapshots are versioned
//! only by their `saved_at` stamp.

use chrono::{DateTime, Utc};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tracing::info;

use metroline_ledger::ResourcePool;
use metroline_types::{GameMode, IdAllocator, SessionId};
use metroline_world::{Geography, Network};

use crate::clock::SimClock;
use crate::config::SimulationConfig;
use crate::session::{Session, SessionError, SessionState, SessionStats};
use crate::spawner::Spawner;

/// Serializable state of a session at one moment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    /// Session the snapshot was taken from.
    pub session_id: SessionId,
    /// Wall-clock time the snapshot was taken.
    pub saved_at: DateTime<Utc>,
    /// Game mode.
    pub mode: GameMode,
    /// Simulation clock.
    pub clock: SimClock,
    /// Stations, lines and trains.
    pub network: Network,
    /// Resource counters.
    pub pool: ResourcePool,
    /// Score and counters.
    pub stats: SessionStats,
    /// Spawn timers.
    pub spawner: Spawner,
    /// Lifecycle state, including any pending reward offer.
    pub state: SessionState,
    /// Id allocator, so restored sessions never reuse an id.
    pub ids: IdAllocator,
    /// Seconds since the last validator run.
    pub audit_timer: f64,
    /// Seconds since the last stranding sweep.
    pub stranding_timer: f64,
}

impl Session {
    /// Take a snapshot of the session.
    pub fn snapshot(&self) -> WorldSnapshot {
        WorldSnapshot {
            session_id: self.id,
            saved_at: Utc::now(),
            mode: self.mode,
            clock: self.clock.clone(),
            network: self.network.clone(),
            pool: self.pool,
            stats: self.stats,
            spawner: self.spawner,
            state: self.state.clone(),
            ids: self.ids.clone(),
            audit_timer: self.audit_timer,
            stranding_timer: self.stranding_timer,
        }
    }

    /// Rebuild a session from a snapshot.
    ///
    /// The snapshot's mode and clock win over `config`; everything else
    /// (routing rules, spawn intervals, history depth) comes from `config`.
    /// The RNG is reseeded from the configured seed and the snapshot's day,
    /// and the validator runs once so the pool matches the restored network.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] if `config` fails validation.
    pub fn restore(
        snapshot: WorldSnapshot,
        config: SimulationConfig,
        geography: Box<dyn Geography + Send + Sync>,
    ) -> Result<Self, SessionError> {
        let seed = config.world.seed.wrapping_add(snapshot.clock.day());
        let mut session = Self::assemble(config, geography, snapshot.network, snapshot.ids)?;
        session.id = snapshot.session_id;
        session.mode = snapshot.mode;
        session.clock = snapshot.clock;
        session.pool = snapshot.pool;
        session.stats = snapshot.stats;
        session.spawner = snapshot.spawner;
        session.state = snapshot.state;
        session.audit_timer = snapshot.audit_timer;
        session.stranding_timer = snapshot.stranding_timer;
        session.rng = StdRng::seed_from_u64(seed);
        session.run_audit();
        info!(
            session = %session.id,
            saved_at = %snapshot.saved_at,
            elapsed = session.clock.elapsed(),
            "session restored"
        );
        Ok(session)
    }
}
