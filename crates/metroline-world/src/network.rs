//! The transit network graph: stations, lines, and trains.
//!
//! [`Network`] owns every station, line and train in a session. Lines are
//! simple paths over stations; trains are shuttles bound to a line. Every
//! structural change (station added or removed, line created, reshaped or
//! deleted, train added or removed) bumps the topology version, which
//! downstream caches use as their validity key.
//!
//! The network enforces line-shape invariants (at least two stations, no
//! repeated station, every station exists) but knows nothing about
//! resources or history; those belong to the session.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use metroline_types::{
    Direction, Line, LineId, Shape, Station, StationId, Train, TrainId,
};

use crate::error::WorldError;
use crate::geography::Geography;
use crate::segment::build_segments;

/// Display colour for each line slot.
pub const LINE_COLORS: [&str; 10] = [
    "#e53935", "#1e88e5", "#fdd835", "#43a047", "#8e24aa", "#fb8c00", "#00acc1", "#6d4c41",
    "#d81b60", "#546e7a",
];

/// Return the palette colour for a line slot.
pub fn line_color(id: LineId) -> &'static str {
    LINE_COLORS
        .get(usize::from(id.slot()))
        .copied()
        .unwrap_or("#000000")
}

/// The live transit graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Network {
    /// All stations indexed by identifier.
    stations: BTreeMap<StationId, Station>,
    /// All live lines indexed by slot.
    lines: BTreeMap<LineId, Line>,
    /// All trains indexed by identifier.
    trains: BTreeMap<TrainId, Train>,
    /// Bumped on every structural change.
    topology_version: u64,
}

impl Network {
    /// Create an empty network.
    pub const fn new() -> Self {
        Self {
            stations: BTreeMap::new(),
            lines: BTreeMap::new(),
            trains: BTreeMap::new(),
            topology_version: 0,
        }
    }

    /// Current topology version.
    pub const fn topology_version(&self) -> u64 {
        self.topology_version
    }

    fn bump(&mut self) {
        self.topology_version = self.topology_version.wrapping_add(1);
    }

    // -------------------------------------------------------------------
    // Stations
    // -------------------------------------------------------------------

    /// Add a station.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::DuplicateStation`] if the id is already present.
    pub fn add_station(&mut self, station: Station) -> Result<(), WorldError> {
        let id = station.id;
        if self.stations.contains_key(&id) {
            return Err(WorldError::DuplicateStation(id));
        }
        self.stations.insert(id, station);
        self.bump();
        Ok(())
    }

    /// Remove a station that no line references any more.
    ///
    /// Callers must first take the station off every line.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::StationNotFound`] if the station is absent.
    pub fn remove_station(&mut self, id: StationId) -> Result<Station, WorldError> {
        let station = self
            .stations
            .remove(&id)
            .ok_or(WorldError::StationNotFound(id))?;
        self.bump();
        Ok(station)
    }

    /// Get a station.
    pub fn station(&self, id: StationId) -> Option<&Station> {
        self.stations.get(&id)
    }

    /// Get a mutable station. Queue and overload edits do not change topology.
    pub fn station_mut(&mut self, id: StationId) -> Option<&mut Station> {
        self.stations.get_mut(&id)
    }

    /// Iterate over all stations in id order.
    pub fn stations(&self) -> impl Iterator<Item = &Station> {
        self.stations.values()
    }

    /// Iterate mutably over all stations in id order.
    pub fn stations_mut(&mut self) -> impl Iterator<Item = &mut Station> {
        self.stations.values_mut()
    }

    /// The station map, for segment construction.
    pub const fn station_map(&self) -> &BTreeMap<StationId, Station> {
        &self.stations
    }

    /// Number of stations.
    pub fn station_count(&self) -> usize {
        self.stations.len()
    }

    /// Every distinct shape among the stations.
    pub fn shapes_present(&self) -> BTreeSet<Shape> {
        self.stations.values().map(|s| s.shape).collect()
    }

    // -------------------------------------------------------------------
    // Lines
    // -------------------------------------------------------------------

    /// Get a line.
    pub fn line(&self, id: LineId) -> Option<&Line> {
        self.lines.get(&id)
    }

    /// Iterate over live lines in slot order.
    pub fn lines(&self) -> impl Iterator<Item = &Line> {
        self.lines.values()
    }

    /// Number of live lines.
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Lowest unused line slot.
    pub fn free_slot(&self) -> Option<LineId> {
        LineId::all().find(|id| !self.lines.contains_key(id))
    }

    /// Lines passing through `station`, in slot order.
    pub fn lines_through(&self, station: StationId) -> Vec<LineId> {
        self.lines
            .values()
            .filter(|l| l.contains(station))
            .map(|l| l.id)
            .collect()
    }

    /// Whether `line` directly serves a station of `shape`.
    pub fn line_has_shape(&self, line: LineId, shape: Shape) -> bool {
        self.first_index_of_shape(line, shape).is_some()
    }

    /// Index of the first station of `shape` along `line`.
    pub fn first_index_of_shape(&self, line: LineId, shape: Shape) -> Option<usize> {
        let line = self.lines.get(&line)?;
        line.stations.iter().position(|id| {
            self.stations
                .get(id)
                .is_some_and(|s| s.shape == shape)
        })
    }

    fn validate_sequence(&self, line: LineId, sequence: &[StationId]) -> Result<(), WorldError> {
        if sequence.len() < 2 {
            return Err(WorldError::LineTooShort {
                line,
                len: sequence.len(),
            });
        }
        let mut seen = BTreeSet::new();
        for station in sequence {
            if !self.stations.contains_key(station) {
                return Err(WorldError::StationNotFound(*station));
            }
            if !seen.insert(*station) {
                return Err(WorldError::RepeatedStation {
                    line,
                    station: *station,
                });
            }
        }
        Ok(())
    }

    /// Create a line in an unused slot with the slot's palette colour.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::DuplicateLine`] if the slot is taken, or a
    /// sequence error if the stations do not form a valid simple path.
    pub fn create_line(
        &mut self,
        id: LineId,
        sequence: Vec<StationId>,
        geography: &dyn Geography,
    ) -> Result<(), WorldError> {
        if self.lines.contains_key(&id) {
            return Err(WorldError::DuplicateLine(id));
        }
        self.upsert_line(id, line_color(id).to_owned(), sequence, geography)
    }

    /// Create or replace a line with an explicit colour and sequence.
    ///
    /// Existing trains on a replaced line are kept and re-anchored to the
    /// new sequence.
    ///
    /// # Errors
    ///
    /// Returns a sequence error if the stations do not form a valid simple path.
    pub fn upsert_line(
        &mut self,
        id: LineId,
        color: String,
        sequence: Vec<StationId>,
        geography: &dyn Geography,
    ) -> Result<(), WorldError> {
        self.validate_sequence(id, &sequence)?;
        let segments = build_segments(&sequence, &self.stations, geography)?;

        let old = self.lines.get(&id).map(|l| l.stations.clone());
        let trains = self.lines.get(&id).map(|l| l.trains.clone()).unwrap_or_default();
        self.lines.insert(
            id,
            Line {
                id,
                color,
                stations: sequence,
                segments,
                trains,
            },
        );
        if let Some(old) = old {
            self.resync_trains(id, &old);
        }
        self.bump();
        debug!(line = %id, version = self.topology_version, "line updated");
        Ok(())
    }

    /// Replace the station sequence of an existing line, keeping its colour.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::LineNotFound`] or a sequence error.
    pub fn set_line_stations(
        &mut self,
        id: LineId,
        sequence: Vec<StationId>,
        geography: &dyn Geography,
    ) -> Result<(), WorldError> {
        let color = self
            .lines
            .get(&id)
            .map(|l| l.color.clone())
            .ok_or(WorldError::LineNotFound(id))?;
        self.upsert_line(id, color, sequence, geography)
    }

    /// Delete a line together with its trains.
    ///
    /// Returns the line and the removed trains (with their passengers) so
    /// the caller can decide what happens to riders.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::LineNotFound`] if the slot is empty.
    pub fn remove_line(&mut self, id: LineId) -> Result<(Line, Vec<Train>), WorldError> {
        let line = self.lines.remove(&id).ok_or(WorldError::LineNotFound(id))?;
        let trains = line
            .trains
            .iter()
            .filter_map(|t| self.trains.remove(t))
            .collect();
        self.bump();
        debug!(line = %id, "line deleted");
        Ok((line, trains))
    }

    /// Re-anchor every train on `line` after its sequence changed from `old`.
    ///
    /// A train keeps heading to the same station when that station is still
    /// on the line. If the station it was travelling from changed, its
    /// progress restarts from zero.
    fn resync_trains(&mut self, line: LineId, old: &[StationId]) {
        let Some(current) = self.lines.get(&line) else {
            return;
        };
        let new = current.stations.clone();
        for train_id in &current.trains {
            let Some(train) = self.trains.get_mut(train_id) else {
                continue;
            };
            let old_target = old.get(train.next_index).copied();
            let old_previous = train
                .previous_index(old.len())
                .and_then(|i| old.get(i).copied());

            match old_target.and_then(|s| new.iter().position(|n| *n == s)) {
                Some(index) => {
                    train.next_index = index;
                    let new_previous = train
                        .previous_index(new.len())
                        .and_then(|i| new.get(i).copied());
                    if new_previous != old_previous {
                        train.progress = 0.0;
                    }
                }
                None => train.progress = 0.0,
            }
            normalize_train(train, new.len());
        }
    }

    // -------------------------------------------------------------------
    // Trains
    // -------------------------------------------------------------------

    /// Get a train.
    pub fn train(&self, id: TrainId) -> Option<&Train> {
        self.trains.get(&id)
    }

    /// Get a mutable train. Passenger and progress edits do not change topology.
    pub fn train_mut(&mut self, id: TrainId) -> Option<&mut Train> {
        self.trains.get_mut(&id)
    }

    /// Iterate over all trains in id order.
    pub fn trains(&self) -> impl Iterator<Item = &Train> {
        self.trains.values()
    }

    /// Number of trains.
    pub fn train_count(&self) -> usize {
        self.trains.len()
    }

    /// Identifiers of every train, in id order.
    pub fn train_ids(&self) -> Vec<TrainId> {
        self.trains.keys().copied().collect()
    }

    /// Put a train on its line.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::LineNotFound`] if the train's line does not exist.
    pub fn add_train(&mut self, mut train: Train) -> Result<(), WorldError> {
        let line = self
            .lines
            .get_mut(&train.line)
            .ok_or(WorldError::LineNotFound(train.line))?;
        normalize_train(&mut train, line.stations.len());
        if !line.trains.contains(&train.id) {
            line.trains.push(train.id);
        }
        self.trains.insert(train.id, train);
        self.bump();
        Ok(())
    }

    /// Take a train off its line.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::TrainNotFound`] if the train does not exist.
    pub fn remove_train(&mut self, id: TrainId) -> Result<Train, WorldError> {
        let train = self.trains.remove(&id).ok_or(WorldError::TrainNotFound(id))?;
        if let Some(line) = self.lines.get_mut(&train.line) {
            line.trains.retain(|t| *t != id);
        }
        self.bump();
        Ok(train)
    }

    /// Move a train to an explicit position on its line.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::TrainNotFound`] or [`WorldError::LineNotFound`].
    pub fn place_train(
        &mut self,
        id: TrainId,
        next_index: usize,
        progress: f64,
        direction: Direction,
    ) -> Result<(), WorldError> {
        let train = self.trains.get_mut(&id).ok_or(WorldError::TrainNotFound(id))?;
        let len = self
            .lines
            .get(&train.line)
            .map(|l| l.stations.len())
            .ok_or(WorldError::LineNotFound(train.line))?;
        train.next_index = next_index;
        train.progress = progress;
        train.direction = direction;
        normalize_train(train, len);
        Ok(())
    }

    /// Set a train's wagon count.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::TrainNotFound`] if the train does not exist.
    pub fn set_wagons(&mut self, id: TrainId, wagons: u32) -> Result<(), WorldError> {
        let train = self.trains.get_mut(&id).ok_or(WorldError::TrainNotFound(id))?;
        train.wagons = wagons;
        self.bump();
        Ok(())
    }
}

/// Force a train's position into a consistent state for a line of `len` stations.
///
/// The target index is clamped to the line, the train must have a station
/// behind it in its direction of travel, and progress stays in `[0, 1)`.
fn normalize_train(train: &mut Train, len: usize) {
    let last = len.saturating_sub(1);
    if train.next_index > last {
        train.next_index = last;
        train.progress = 0.0;
    }
    if train.previous_index(len).is_none() {
        train.direction = train.direction.reversed();
        train.progress = 0.0;
    }
    if !(0.0..1.0).contains(&train.progress) {
        train.progress = 0.0;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use metroline_types::Position;

    use super::*;
    use crate::geography::{DryLand, FlatMap, RiverBand};

    fn slot(n: u8) -> LineId {
        LineId::new(n).unwrap()
    }

    fn make_network() -> Network {
        let mut net = Network::new();
        let shapes = [Shape::Circle, Shape::Square, Shape::Triangle, Shape::Circle];
        for (i, shape) in shapes.iter().enumerate() {
            let id = StationId(u64::try_from(i).unwrap());
            let x = f64::from(u32::try_from(i).unwrap()) * 100.0;
            net.add_station(Station::new(id, *shape, Position::new(x, 0.0)))
                .unwrap();
        }
        net
    }

    fn ids(raw: &[u64]) -> Vec<StationId> {
        raw.iter().copied().map(StationId).collect()
    }

    #[test]
    fn create_line_uses_palette_colour() {
        let mut net = make_network();
        net.create_line(slot(2), ids(&[0, 1]), &DryLand::default()).unwrap();
        let line = net.line(slot(2)).unwrap();
        assert_eq!(line.color, LINE_COLORS[2]);
        assert_eq!(line.segments.len(), 1);
    }

    #[test]
    fn short_or_cyclic_lines_rejected() {
        let mut net = make_network();
        let geo = DryLand::default();
        assert!(matches!(
            net.create_line(slot(0), ids(&[0]), &geo),
            Err(WorldError::LineTooShort { len: 1, .. })
        ));
        assert!(matches!(
            net.create_line(slot(0), ids(&[0, 1, 0]), &geo),
            Err(WorldError::RepeatedStation { .. })
        ));
        assert!(matches!(
            net.create_line(slot(0), ids(&[0, 42]), &geo),
            Err(WorldError::StationNotFound(_))
        ));
    }

    #[test]
    fn topology_version_bumps_on_structure_changes() {
        let mut net = make_network();
        let v0 = net.topology_version();
        net.create_line(slot(0), ids(&[0, 1]), &DryLand::default()).unwrap();
        let v1 = net.topology_version();
        assert!(v1 > v0);
        net.station_mut(StationId(0)).unwrap().overload = 0.5;
        assert_eq!(net.topology_version(), v1);
    }

    #[test]
    fn lines_through_in_slot_order() {
        let mut net = make_network();
        let geo = DryLand::default();
        net.create_line(slot(3), ids(&[1, 2]), &geo).unwrap();
        net.create_line(slot(1), ids(&[0, 1]), &geo).unwrap();
        assert_eq!(net.lines_through(StationId(1)), vec![slot(1), slot(3)]);
        assert_eq!(net.free_slot(), Some(slot(0)));
    }

    #[test]
    fn first_index_of_shape() {
        let mut net = make_network();
        net.create_line(slot(0), ids(&[0, 1, 2]), &DryLand::default()).unwrap();
        assert_eq!(net.first_index_of_shape(slot(0), Shape::Triangle), Some(2));
        assert_eq!(net.first_index_of_shape(slot(0), Shape::Star), None);
    }

    #[test]
    fn prepend_keeps_train_target() {
        let mut net = make_network();
        let geo = DryLand::default();
        net.create_line(slot(0), ids(&[1, 2]), &geo).unwrap();
        let mut train = Train::new(TrainId(10), slot(0), 6);
        train.progress = 0.4;
        net.add_train(train).unwrap();

        net.set_line_stations(slot(0), ids(&[0, 1, 2]), &geo).unwrap();
        let train = net.train(TrainId(10)).unwrap();
        assert_eq!(train.next_index, 2);
        assert!((train.progress - 0.4).abs() < f64::EPSILON);
    }

    #[test]
    fn removing_target_station_clamps_train() {
        let mut net = make_network();
        let geo = DryLand::default();
        net.create_line(slot(0), ids(&[0, 1, 2]), &geo).unwrap();
        let mut train = Train::new(TrainId(10), slot(0), 6);
        train.next_index = 2;
        train.progress = 0.7;
        net.add_train(train).unwrap();

        net.set_line_stations(slot(0), ids(&[0, 1]), &geo).unwrap();
        let train = net.train(TrainId(10)).unwrap();
        assert_eq!(train.next_index, 1);
        assert!(train.progress.abs() < f64::EPSILON);
        assert!(train.previous_index(2).is_some());
    }

    #[test]
    fn remove_line_takes_trains_with_it() {
        let mut net = make_network();
        net.create_line(slot(0), ids(&[0, 1]), &DryLand::default()).unwrap();
        net.add_train(Train::new(TrainId(10), slot(0), 6)).unwrap();
        let (line, trains) = net.remove_line(slot(0)).unwrap();
        assert_eq!(line.id, slot(0));
        assert_eq!(trains.len(), 1);
        assert_eq!(net.train_count(), 0);
    }

    #[test]
    fn place_train_normalizes_direction() {
        let mut net = make_network();
        net.create_line(slot(0), ids(&[0, 1, 2]), &DryLand::default()).unwrap();
        net.add_train(Train::new(TrainId(10), slot(0), 6)).unwrap();
        net.place_train(TrainId(10), 0, 0.5, Direction::Forward).unwrap();
        let train = net.train(TrainId(10)).unwrap();
        assert_eq!(train.direction, Direction::Backward);
        assert!(train.progress.abs() < f64::EPSILON);
    }

    #[test]
    fn survives_json_with_crossings_and_trains() {
        let mut net = make_network();
        let geo = FlatMap::with_rivers(vec![RiverBand {
            x_min: 140.0,
            x_max: 160.0,
        }]);
        net.create_line(slot(0), ids(&[0, 1, 2]), &geo).unwrap();
        net.add_train(Train::new(TrainId(10), slot(0), 6)).unwrap();
        net.place_train(TrainId(10), 2, 0.25, Direction::Forward).unwrap();

        let json = serde_json::to_string(&net).unwrap();
        let back: Network = serde_json::from_str(&json).unwrap();
        assert_eq!(back, net);
        assert_eq!(back.topology_version(), net.topology_version());
        let line = back.line(slot(0)).unwrap();
        assert!(line.segments.iter().any(|seg| seg.crossing.is_some()));
        assert_eq!(back.train(TrainId(10)).unwrap().next_index, 2);
    }
}
