//! Resource accounting for the Metroline simulation.
//!
//! Every unit of player capacity (line slots, trains, tunnels, bridges,
//! wagons) is tracked in a [`ResourcePool`] as two counters:
//!
//! - `total` -- the ceiling granted so far. Only reward grants raise it.
//! - `available` -- what is left after the live topology takes its share.
//!
//! Commands decrement `available` incrementally as they commit, but that
//! bookkeeping is never trusted on its own. The [`audit`] module
//! recomputes the active usage from the network and overwrites
//! `available` with `total - active`, reporting any disagreement as a
//! [`ResourceLeak`].
//!
//! # Crossing allocation
//!
//! Water-crossing segments draw from tunnels first. Only crossings beyond
//! the tunnel total are attributed to bridges, whatever kind the segment
//! was classified as when it was built.
//!
//! # Modules
//!
//! - [`pool`] -- The [`ResourcePool`] counters and incremental operations.
//! - [`audit`] -- Usage recomputation and the invariant validator.

pub mod audit;
pub mod pool;

pub use audit::{ActiveUsage, AuditReport, ResourceLeak, audit, measure_usage};
pub use pool::{ResourceCounter, ResourcePool};

use metroline_types::ResourceKind;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors from incremental pool operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// Not enough of a resource is available.
    #[error("not enough {kind:?}: requested {requested}, available {available}")]
    Insufficient {
        /// The resource that ran short.
        kind: ResourceKind,
        /// Units the operation needed.
        requested: u32,
        /// Units that were available.
        available: u32,
    },

    /// A credit would overflow the counter.
    #[error("{kind:?} total overflowed")]
    Overflow {
        /// The resource whose total overflowed.
        kind: ResourceKind,
    },
}
