//! A single game session: the authoritative owner of all world state.
//!
//! The session ties together the network, resource pool, clock, history,
//! route evaluator and router. Callers read state through accessor
//! methods and change it only through the command methods in
//! [`crate::commands`] and the tick in [`crate::tick`].
//!
//! # State machine
//!
//! ```text
//! Active --week boundary--> PausedForReward --choose_reward--> Active
//!   |
//!   +--overload (Normal mode) or internal fault--> Halted (terminal)
//! ```

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use metroline_ledger::{AuditReport, ResourcePool, audit};
use metroline_routing::{RouteEvaluator, Router};
use metroline_types::{
    GameMode, IdAllocator, LineId, Position, SessionId, Shape, StationId, TimeMultiplier,
};
use metroline_world::{Geography, Network, StartingStationIds, WorldError, create_starting_city};

use crate::clock::{ClockError, SimClock};
use crate::config::{ConfigError, SimulationConfig};
use crate::history::{DisplacedTrain, HistoryManager};
use crate::rewards::{RewardError, RewardOption};
use crate::spawner::Spawner;

/// Errors that can occur when building a session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The configuration failed validation.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: ConfigError,
    },

    /// The clock rejected the time configuration.
    #[error("clock error: {source}")]
    Clock {
        /// The underlying clock error.
        #[from]
        source: ClockError,
    },

    /// The opening city could not be built.
    #[error("world error: {source}")]
    World {
        /// The underlying world error.
        #[from]
        source: WorldError,
    },
}

/// Why a session stopped for good.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HaltReason {
    /// A station's overload timer filled up.
    Overcrowded {
        /// The station that overflowed.
        station: StationId,
    },
    /// An internal fault was caught during a tick.
    Fault {
        /// The fault message, kept for display.
        message: String,
    },
}

/// Lifecycle state of a session.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    /// Time runs and commands are accepted.
    #[default]
    Active,
    /// A week ended; the player must pick one of `options`.
    PausedForReward {
        /// The options on offer.
        options: Vec<RewardOption>,
    },
    /// Terminal. Ticks do nothing and commands are refused.
    Halted {
        /// Why the session ended.
        reason: HaltReason,
    },
}

impl SessionState {
    /// Whether ticks do work in this state.
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    /// Whether the session has ended.
    pub const fn is_halted(&self) -> bool {
        matches!(self, Self::Halted { .. })
    }
}

/// Running totals for a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStats {
    /// Passengers delivered (the score).
    pub delivered: u64,
    /// Passengers evicted as stranded.
    pub stranded_evicted: u64,
    /// Passengers dropped because their train or station disappeared.
    pub discarded: u64,
    /// Resource leaks corrected by audits.
    pub leaks_corrected: u64,
}

/// A game session.
pub struct Session {
    pub(crate) id: SessionId,
    pub(crate) config: SimulationConfig,
    pub(crate) mode: GameMode,
    pub(crate) network: Network,
    pub(crate) pool: ResourcePool,
    pub(crate) clock: SimClock,
    pub(crate) history: HistoryManager,
    pub(crate) evaluator: RouteEvaluator,
    pub(crate) router: Router,
    pub(crate) spawner: Spawner,
    pub(crate) ids: IdAllocator,
    pub(crate) rng: StdRng,
    pub(crate) geography: Box<dyn Geography + Send + Sync>,
    pub(crate) state: SessionState,
    pub(crate) stats: SessionStats,
    pub(crate) audit_timer: f64,
    pub(crate) stranding_timer: f64,
    pub(crate) starting: Option<StartingStationIds>,
}

impl core::fmt::Debug for Session {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("mode", &self.mode)
            .field("state", &self.state)
            .field("stations", &self.network.station_count())
            .field("lines", &self.network.line_count())
            .field("elapsed", &self.clock.elapsed())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Start a new session on the opening city.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] if the configuration is invalid or the
    /// opening city cannot be built.
    pub fn new(
        config: SimulationConfig,
        geography: Box<dyn Geography + Send + Sync>,
    ) -> Result<Self, SessionError> {
        let mut ids = IdAllocator::new();
        let centre = Position::new(config.world.width / 2.0, config.world.height / 2.0);
        let (network, starting) = create_starting_city(&mut ids, centre)?;
        let mut session = Self::assemble(config, geography, network, ids)?;
        session.starting = Some(starting);
        session.run_audit();
        info!(
            session = %session.id,
            mode = ?session.mode,
            seed = session.config.world.seed,
            "session started"
        );
        Ok(session)
    }

    /// Build a session around an existing network with fresh runtime state.
    pub(crate) fn assemble(
        config: SimulationConfig,
        geography: Box<dyn Geography + Send + Sync>,
        network: Network,
        ids: IdAllocator,
    ) -> Result<Self, SessionError> {
        config.validate()?;
        let clock = SimClock::new(&config.time)?;
        Ok(Self {
            id: SessionId::new(),
            mode: config.world.mode,
            pool: config.resources.starting_pool(),
            history: HistoryManager::new(config.history.depth),
            evaluator: RouteEvaluator::new(config.routing.evaluator_params()),
            router: Router::new(config.routing.router_params()),
            spawner: Spawner::new(),
            rng: StdRng::seed_from_u64(config.world.seed),
            state: SessionState::Active,
            stats: SessionStats::default(),
            audit_timer: 0.0,
            stranding_timer: 0.0,
            starting: None,
            clock,
            network,
            ids,
            geography,
            config,
        })
    }

    // -------------------------------------------------------------------
    // Read access
    // -------------------------------------------------------------------

    /// Session identifier.
    pub const fn id(&self) -> SessionId {
        self.id
    }

    /// Game mode.
    pub const fn mode(&self) -> GameMode {
        self.mode
    }

    /// Lifecycle state.
    pub const fn state(&self) -> &SessionState {
        &self.state
    }

    /// The live network.
    pub const fn network(&self) -> &Network {
        &self.network
    }

    /// Resource counters.
    pub const fn pool(&self) -> &ResourcePool {
        &self.pool
    }

    /// The simulation clock.
    pub const fn clock(&self) -> &SimClock {
        &self.clock
    }

    /// Running totals.
    pub const fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Configuration the session runs with.
    pub const fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// The opening stations, for a fresh session.
    pub const fn starting_stations(&self) -> Option<StartingStationIds> {
        self.starting
    }

    /// Route cache hit and miss counts.
    pub const fn route_cache_stats(&self) -> (u64, u64) {
        self.evaluator.cache().stats()
    }

    /// Whether an undo is possible.
    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    /// Whether a redo is possible.
    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    // -------------------------------------------------------------------
    // Diagnostic queries
    // -------------------------------------------------------------------

    /// Whether `line` reaches a station of `shape` within `max_depth` transfers.
    pub fn can_reach(&mut self, line: LineId, shape: Shape, max_depth: u32) -> bool {
        self.evaluator.can_reach(&self.network, line, shape, max_depth)
    }

    /// Lines through `station` that reach `shape` within the configured depth.
    pub fn find_valid_lines(&mut self, station: StationId, shape: Shape) -> Vec<LineId> {
        self.evaluator.find_valid_lines(&self.network, station, shape)
    }

    // -------------------------------------------------------------------
    // Session control
    // -------------------------------------------------------------------

    /// Change the simulation speed.
    pub fn set_multiplier(&mut self, multiplier: TimeMultiplier) {
        self.clock.set_multiplier(multiplier);
        info!(?multiplier, "time multiplier changed");
    }

    /// Resolve a pending reward by index into the offered options.
    ///
    /// Credits the bonus, re-runs the validator, and resumes the session.
    ///
    /// # Errors
    ///
    /// Returns [`RewardError::NotOffered`] outside
    /// [`SessionState::PausedForReward`], or
    /// [`RewardError::InvalidChoice`] for an out-of-range index.
    pub fn choose_reward(&mut self, index: usize) -> Result<RewardOption, RewardError> {
        let SessionState::PausedForReward { options } = &self.state else {
            return Err(RewardError::NotOffered);
        };
        let option = options
            .get(index)
            .copied()
            .ok_or(RewardError::InvalidChoice {
                index,
                offered: options.len(),
            })?;
        option.apply(&mut self.pool)?;
        self.state = SessionState::Active;
        self.run_audit();
        info!(?option, week = self.clock.week(), "reward chosen");
        Ok(option)
    }

    // -------------------------------------------------------------------
    // Internal helpers shared by commands and the tick
    // -------------------------------------------------------------------

    /// Run the resource validator and count any corrected leaks.
    pub(crate) fn run_audit(&mut self) -> AuditReport {
        let report = audit(&self.network, &mut self.pool, self.mode);
        let leaks = u64::try_from(report.leaks.len()).unwrap_or(u64::MAX);
        self.stats.leaks_corrected = self.stats.leaks_corrected.saturating_add(leaks);
        report
    }

    /// Put the riders of removed trains down.
    ///
    /// A rider whose train was heading to a station of their destination
    /// shape is delivered; anyone else joins that station's queue. Riders
    /// with nowhere to go are discarded.
    pub(crate) fn settle_displaced(&mut self, displaced: Vec<DisplacedTrain>) {
        for DisplacedTrain { train, heading_to } in displaced {
            if train.passengers.is_empty() {
                continue;
            }
            let Some(station) = heading_to.and_then(|id| self.network.station_mut(id)) else {
                let dropped = u64::try_from(train.passengers.len()).unwrap_or(u64::MAX);
                self.stats.discarded = self.stats.discarded.saturating_add(dropped);
                warn!(train = %train.id, dropped, "riders discarded with their train");
                continue;
            };
            for mut passenger in train.passengers {
                if passenger.destination == station.shape {
                    self.stats.delivered = self.stats.delivered.saturating_add(1);
                } else {
                    passenger.wait_since = None;
                    station.queue.push_back(passenger);
                }
            }
        }
    }

    /// Move to [`SessionState::Halted`].
    pub(crate) fn halt(&mut self, reason: HaltReason) {
        warn!(session = %self.id, ?reason, "session halted");
        self.state = SessionState::Halted { reason };
    }
}
