//! Session orchestration for the Metroline transit simulation.
//!
//! A [`Session`] owns the whole world: the network, the resource pool, the
//! clock, undo history and the routing machinery. It changes only through
//! topology commands and the tick pipeline.
//!
//! # Modules
//!
//! - [`clock`] -- Simulation clock: clamped, scaled deltas and the
//!   day/week calendar.
//! - [`commands`] -- Topology commands (connect, disconnect, trains,
//!   wagons, creative station editing, undo/redo).
//! - [`config`] -- Configuration loading from `metroline-config.yaml` into
//!   strongly-typed structs.
//! - [`history`] -- Bounded undo/redo of line topology.
//! - [`rewards`] -- Weekly reward options.
//! - [`session`] -- The [`Session`] type and its state machine.
//! - [`snapshot`] -- [`WorldSnapshot`] for persistence.
//! - [`spawner`] -- Passenger and station spawn timers.
//! - [`tick`] -- The phase loop that advances a session.

pub mod clock;
pub mod commands;
pub mod config;
pub mod history;
pub mod rewards;
pub mod session;
pub mod snapshot;
pub mod spawner;
pub mod tick;

pub use commands::{CommandError, CommandOutcome, ConnectTarget};
pub use config::{ConfigError, SimulationConfig};
pub use rewards::{RewardError, RewardOption};
pub use session::{HaltReason, Session, SessionError, SessionState, SessionStats};
pub use snapshot::WorldSnapshot;
pub use tick::{TickOutcome, TickSummary};
