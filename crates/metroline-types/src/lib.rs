//! Shared type definitions for the Metroline transit simulation.
//!
//! This crate is the single source of truth for the entity types used
//! across the Metroline workspace: stations, passengers, lines, segments
//! and trains, plus the identifiers and enumerations that tie them
//! together.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe identifier wrappers (counter-backed entity IDs,
//!   line slots, and the UUID session identifier)
//! - [`enums`] -- Enumeration types (shapes, resources, modes, crossings)
//! - [`structs`] -- Core entity structs (stations, passengers, lines, trains)

pub mod enums;
pub mod ids;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use enums::{CrossingKind, Direction, GameMode, ResourceKind, Shape, TimeMultiplier};
pub use ids::{IdAllocator, LineId, PassengerId, SessionId, StationId, TrainId};
pub use structs::{GeoCoord, Line, Passenger, Position, Segment, Station, Train};
