//! Error types for the `metroline-world` crate.
//!
//! All fallible operations in this crate return [`WorldError`].

use metroline_types::{LineId, StationId, TrainId};

/// Errors that can occur during network operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorldError {
    /// A station was not found in the network.
    #[error("station not found: {0}")]
    StationNotFound(StationId),

    /// A line was not found in the network.
    #[error("line not found: {0}")]
    LineNotFound(LineId),

    /// A train was not found in the network.
    #[error("train not found: {0}")]
    TrainNotFound(TrainId),

    /// A duplicate station was inserted.
    #[error("duplicate station id: {0}")]
    DuplicateStation(StationId),

    /// A line was inserted into an occupied slot.
    #[error("line slot already in use: {0}")]
    DuplicateLine(LineId),

    /// A line would be left with fewer than two stations.
    #[error("{line} would have {len} station(s); a line needs at least 2")]
    LineTooShort {
        /// The affected line.
        line: LineId,
        /// The station count the line would have.
        len: usize,
    },

    /// A station appears twice in a line's sequence.
    #[error("{line} would visit station {station} twice")]
    RepeatedStation {
        /// The affected line.
        line: LineId,
        /// The repeated station.
        station: StationId,
    },
}
