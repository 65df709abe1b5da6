//! Core entity structs for the Metroline simulation.
//!
//! Passengers are owned by value: a waiting passenger lives in its station's
//! queue, a travelling passenger lives in its train's passenger list, and
//! boarding or alighting moves the value between the two.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::enums::{CrossingKind, Direction, Shape};
use crate::ids::{LineId, PassengerId, StationId, TrainId};

// ---------------------------------------------------------------------------
// Geometry
// ---------------------------------------------------------------------------

/// A point in world coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    /// Horizontal coordinate.
    pub x: f64,
    /// Vertical coordinate.
    pub y: f64,
}

impl Position {
    /// Create a position from its coordinates.
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another position.
    pub fn distance(self, other: Self) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// Sum of both coordinates, used by the tunnel/bridge tie-break.
    pub fn coordinate_sum(self) -> f64 {
        self.x + self.y
    }
}

/// A geographic coordinate (degrees), prior to projection.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GeoCoord {
    /// Longitude in degrees.
    pub lon: f64,
    /// Latitude in degrees.
    pub lat: f64,
}

// ---------------------------------------------------------------------------
// Stations and passengers
// ---------------------------------------------------------------------------

/// A passenger waiting at a station or riding a train.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passenger {
    /// Unique passenger identifier.
    pub id: PassengerId,
    /// Station the passenger spawned at.
    pub origin: StationId,
    /// Shape of any station that completes the trip.
    pub destination: Shape,
    /// Simulated time (seconds) at which the passenger spawned.
    pub spawned_at: f64,
    /// Simulated time at which the passenger started waiting for a better
    /// line, if a preference wait is in progress.
    pub wait_since: Option<f64>,
}

impl Passenger {
    /// Create a freshly spawned passenger.
    pub const fn new(id: PassengerId, origin: StationId, destination: Shape, now: f64) -> Self {
        Self {
            id,
            origin,
            destination,
            spawned_at: now,
            wait_since: None,
        }
    }

    /// Seconds since the passenger spawned.
    pub fn age(&self, now: f64) -> f64 {
        (now - self.spawned_at).max(0.0)
    }
}

/// A station in the transit network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    /// Unique station identifier.
    pub id: StationId,
    /// Destination class this station satisfies.
    pub shape: Shape,
    /// World position.
    pub position: Position,
    /// Waiting passengers in arrival order.
    pub queue: VecDeque<Passenger>,
    /// Overcrowding timer in `[0, 1]`; the session fails when it reaches 1.
    pub overload: f64,
}

impl Station {
    /// Create an empty station.
    pub const fn new(id: StationId, shape: Shape, position: Position) -> Self {
        Self {
            id,
            shape,
            position,
            queue: VecDeque::new(),
            overload: 0.0,
        }
    }

    /// Number of passengers waiting.
    pub fn waiting(&self) -> usize {
        self.queue.len()
    }
}

// ---------------------------------------------------------------------------
// Lines
// ---------------------------------------------------------------------------

/// A stretch of line between two adjacent stations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    /// Station at the lower index.
    pub from: StationId,
    /// Station at the higher index.
    pub to: StationId,
    /// How the segment crosses water, or `None` if it stays on land.
    pub crossing: Option<CrossingKind>,
}

impl Segment {
    /// Whether this segment joins `a` and `b` in either order.
    pub fn joins(&self, a: StationId, b: StationId) -> bool {
        (self.from == a && self.to == b) || (self.from == b && self.to == a)
    }
}

/// A transit line: an ordered, acyclic sequence of stations served by
/// shuttle trains.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Line {
    /// Slot index of the line.
    pub id: LineId,
    /// Display colour (CSS hex).
    pub color: String,
    /// Stations in travel order. Always at least two for a live line.
    pub stations: Vec<StationId>,
    /// Per adjacent-pair segment data, `stations.len() - 1` entries.
    pub segments: Vec<Segment>,
    /// Trains running on this line.
    pub trains: Vec<TrainId>,
}

impl Line {
    /// Whether the line passes through `station`.
    pub fn contains(&self, station: StationId) -> bool {
        self.stations.contains(&station)
    }

    /// Index of `station` in the line's sequence.
    pub fn index_of(&self, station: StationId) -> Option<usize> {
        self.stations.iter().position(|s| *s == station)
    }

    /// First station of the line.
    pub fn head(&self) -> Option<StationId> {
        self.stations.first().copied()
    }

    /// Last station of the line.
    pub fn tail(&self) -> Option<StationId> {
        self.stations.last().copied()
    }

    /// Whether `station` is the head or the tail of the line.
    pub fn is_endpoint(&self, station: StationId) -> bool {
        self.head() == Some(station) || self.tail() == Some(station)
    }

    /// Number of water-crossing segments on the line.
    pub fn crossing_count(&self) -> usize {
        self.segments.iter().filter(|s| s.crossing.is_some()).count()
    }
}

// ---------------------------------------------------------------------------
// Trains
// ---------------------------------------------------------------------------

/// A shuttle train running back and forth along one line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Train {
    /// Unique train identifier.
    pub id: TrainId,
    /// Line the train belongs to.
    pub line: LineId,
    /// Index (in the line's station sequence) of the station the train is heading to.
    pub next_index: usize,
    /// Progress towards the next station in `[0, 1)`.
    pub progress: f64,
    /// Current travel direction.
    pub direction: Direction,
    /// Passengers on board.
    pub passengers: Vec<Passenger>,
    /// Capacity of the locomotive alone.
    pub base_capacity: u32,
    /// Attached wagons; each adds another `base_capacity` seats.
    pub wagons: u32,
}

impl Train {
    /// Create an empty train leaving the first station of its line.
    pub const fn new(id: TrainId, line: LineId, base_capacity: u32) -> Self {
        Self {
            id,
            line,
            next_index: 1,
            progress: 0.0,
            direction: Direction::Forward,
            passengers: Vec::new(),
            base_capacity,
            wagons: 0,
        }
    }

    /// Total seats, counting wagons.
    pub const fn capacity(&self) -> u32 {
        self.base_capacity.saturating_mul(self.wagons.saturating_add(1))
    }

    /// Seats still free. Zero when over capacity after a rollback.
    pub fn free_seats(&self) -> usize {
        let capacity = usize::try_from(self.capacity()).unwrap_or(usize::MAX);
        capacity.saturating_sub(self.passengers.len())
    }

    /// Index of the station the train most recently left.
    pub const fn previous_index(&self, line_len: usize) -> Option<usize> {
        self.direction.reversed().step(self.next_index, line_len)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn line(stations: &[u64]) -> Line {
        Line {
            id: LineId::new(0).unwrap(),
            color: "#e53935".to_owned(),
            stations: stations.iter().copied().map(StationId).collect(),
            segments: Vec::new(),
            trains: Vec::new(),
        }
    }

    #[test]
    fn line_endpoints() {
        let l = line(&[1, 2, 3]);
        assert!(l.is_endpoint(StationId(1)));
        assert!(l.is_endpoint(StationId(3)));
        assert!(!l.is_endpoint(StationId(2)));
        assert_eq!(l.index_of(StationId(3)), Some(2));
    }

    #[test]
    fn wagons_multiply_capacity() {
        let mut train = Train::new(TrainId(1), LineId::new(0).unwrap(), 6);
        assert_eq!(train.capacity(), 6);
        train.wagons = 2;
        assert_eq!(train.capacity(), 18);
        assert_eq!(train.free_seats(), 18);
    }

    #[test]
    fn previous_index_follows_direction() {
        let mut train = Train::new(TrainId(1), LineId::new(0).unwrap(), 6);
        assert_eq!(train.previous_index(3), Some(0));
        train.direction = Direction::Backward;
        train.next_index = 0;
        assert_eq!(train.previous_index(3), Some(1));
    }

    #[test]
    fn passenger_age_never_negative() {
        let p = Passenger::new(PassengerId(1), StationId(1), Shape::Square, 10.0);
        assert!(p.age(5.0).abs() < f64::EPSILON);
        assert!((p.age(12.5) - 2.5).abs() < f64::EPSILON);
    }
}
