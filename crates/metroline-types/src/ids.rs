//! Type-safe identifier wrappers.
//!
//! Every entity in the simulation has a strongly-typed ID to prevent
//! accidental mixing of identifiers at compile time. Entity IDs are
//! allocated from a monotonic counter owned by the session, so a replayed
//! session with the same seed produces the same IDs.
//!
//! Lines are identified by their slot index (`0..=9`) rather than a counter,
//! because a slot fixes the line's colour and is reused after deletion.
//!
//! The session itself carries a UUID v7 so persisted snapshots can be told
//! apart across runs.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generates a newtype wrapper around a `u64` counter value with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub u64);

        impl $name {
            /// Return the inner counter value.
            pub const fn into_inner(self) -> u64 {
                self.0
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self(id)
            }
        }

        impl From<$name> for u64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id! {
    /// Unique identifier for a station (node in the transit graph).
    StationId
}

define_id! {
    /// Unique identifier for a passenger.
    PassengerId
}

define_id! {
    /// Unique identifier for a train.
    TrainId
}

/// Number of line slots available in a session.
pub const LINE_SLOTS: u8 = 10;

/// Slot index of a transit line, in `0..LINE_SLOTS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LineId(u8);

impl LineId {
    /// Create a line id for the given slot, or `None` if the slot is out of range.
    pub const fn new(slot: u8) -> Option<Self> {
        if slot < LINE_SLOTS {
            Some(Self(slot))
        } else {
            None
        }
    }

    /// Return the slot index.
    pub const fn slot(self) -> u8 {
        self.0
    }

    /// Iterate over every valid line slot in ascending order.
    pub fn all() -> impl Iterator<Item = Self> {
        (0..LINE_SLOTS).map(Self)
    }
}

impl core::fmt::Display for LineId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "line-{}", self.0)
    }
}

/// Unique identifier for a simulation session (UUID v7, time-ordered).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Create a new session identifier using UUID v7.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for SessionId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonic allocator for station, passenger and train identifiers.
///
/// One counter is shared across all entity kinds, so an id value is never
/// reused within a session even across kinds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdAllocator {
    next: u64,
}

impl IdAllocator {
    /// Create an allocator starting at zero.
    pub const fn new() -> Self {
        Self { next: 0 }
    }

    /// Create an allocator that resumes after `last_issued`.
    pub const fn resume_after(last_issued: u64) -> Self {
        Self {
            next: last_issued.saturating_add(1),
        }
    }

    fn bump(&mut self) -> u64 {
        let id = self.next;
        self.next = self.next.saturating_add(1);
        id
    }

    /// Allocate a new station id.
    pub fn station(&mut self) -> StationId {
        StationId(self.bump())
    }

    /// Allocate a new passenger id.
    pub fn passenger(&mut self) -> PassengerId {
        PassengerId(self.bump())
    }

    /// Allocate a new train id.
    pub fn train(&mut self) -> TrainId {
        TrainId(self.bump())
    }

    /// Make sure the next issued id is strictly greater than `seen`.
    ///
    /// Used when trains are recreated with their old id during undo.
    pub fn observe(&mut self, seen: u64) {
        if seen >= self.next {
            self.next = seen.saturating_add(1);
        }
    }
}
