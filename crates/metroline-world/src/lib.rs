//! Transit graph, geography, and line segments for the Metroline simulation.
//!
//! This crate models the physical network: stations as nodes, lines as
//! ordered station sequences (simple paths), trains as shuttles bound to a
//! line, and the geography collaborator that decides which segments cross
//! water.
//!
//! # Modules
//!
//! - [`error`] -- Error types for network operations.
//! - [`geography`] -- The [`Geography`] collaborator trait with the bundled
//!   [`DryLand`] and [`FlatMap`] implementations.
//! - [`network`] -- [`Network`]: stations, lines and trains with a
//!   topology version that bumps on every structural change.
//! - [`segment`] -- Segment construction and tunnel/bridge classification.
//! - [`starting_city`] -- Default three-station opening layout.

pub mod error;
pub mod geography;
pub mod network;
pub mod segment;
pub mod starting_city;

// Re-export primary types at crate root.
pub use error::WorldError;
pub use geography::{DryLand, FlatMap, Geography, Projection, RiverBand};
pub use network::{LINE_COLORS, Network, line_color};
pub use starting_city::{StartingStationIds, create_starting_city};
