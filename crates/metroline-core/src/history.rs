//! Bounded undo/redo over line topology.
//!
//! Snapshots hold line sequences and train positions only. Passengers,
//! station queues and the resource pool are left alone on undo: riders stay
//! on whatever train they are on, even if a rollback leaves it briefly over
//! capacity.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::debug;

use metroline_types::{Direction, IdAllocator, Line, LineId, StationId, Train, TrainId};
use metroline_world::{Geography, Network, WorldError};

/// A line as recorded in a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineSnapshot {
    /// Line slot.
    pub id: LineId,
    /// Display colour.
    pub color: String,
    /// Station sequence.
    pub stations: Vec<StationId>,
}

/// A train as recorded in a snapshot. Passengers are deliberately absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainSnapshot {
    /// Train identifier, reused if the train has to be recreated.
    pub id: TrainId,
    /// Owning line.
    pub line: LineId,
    /// Target station index.
    pub next_index: usize,
    /// Progress towards the target.
    pub progress: f64,
    /// Travel direction.
    pub direction: Direction,
    /// Seats on the locomotive.
    pub base_capacity: u32,
    /// Attached wagons.
    pub wagons: u32,
}

/// A train taken off the network together with the station it was
/// heading to, so its riders can be put down somewhere sensible.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplacedTrain {
    /// The removed train, passengers still aboard.
    pub train: Train,
    /// The station the train was approaching, if it still exists.
    pub heading_to: Option<StationId>,
}

impl DisplacedTrain {
    /// Pair a removed train with its target on `line`.
    pub fn on_line(train: Train, line: &Line) -> Self {
        let heading_to = line.stations.get(train.next_index).copied();
        Self { train, heading_to }
    }

    /// Remove a train from the network, remembering where it was heading.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::TrainNotFound`] if the train does not exist.
    pub fn take(network: &mut Network, id: TrainId) -> Result<Self, WorldError> {
        let heading_to = network
            .train(id)
            .and_then(|t| network.line(t.line).and_then(|l| l.stations.get(t.next_index)))
            .copied();
        let train = network.remove_train(id)?;
        Ok(Self { train, heading_to })
    }

    /// Remove a line and its trains.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::LineNotFound`] if the slot is empty.
    pub fn take_line(network: &mut Network, id: LineId) -> Result<Vec<Self>, WorldError> {
        let (line, trains) = network.remove_line(id)?;
        Ok(trains
            .into_iter()
            .map(|t| Self::on_line(t, &line))
            .collect())
    }
}

/// The restorable topology of a network at one moment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopologySnapshot {
    /// Lines in slot order.
    pub lines: Vec<LineSnapshot>,
    /// Trains in id order.
    pub trains: Vec<TrainSnapshot>,
}

impl TopologySnapshot {
    /// Record the current topology of `network`.
    pub fn capture(network: &Network) -> Self {
        Self {
            lines: network
                .lines()
                .map(|l| LineSnapshot {
                    id: l.id,
                    color: l.color.clone(),
                    stations: l.stations.clone(),
                })
                .collect(),
            trains: network
                .trains()
                .map(|t| TrainSnapshot {
                    id: t.id,
                    line: t.line,
                    next_index: t.next_index,
                    progress: t.progress,
                    direction: t.direction,
                    base_capacity: t.base_capacity,
                    wagons: t.wagons,
                })
                .collect(),
        }
    }

    /// Make `network` match this snapshot.
    ///
    /// Lines and trains missing from the snapshot are deleted. Lines in it
    /// are recreated or reshaped; stations that no longer exist are skipped,
    /// and a line left with fewer than two stations is dropped. Trains in
    /// it are repositioned, or recreated under their old id if they were
    /// deleted since.
    ///
    /// Returns every train that was taken off the network, passengers and
    /// all, so the caller can decide what happens to its riders.
    ///
    /// # Errors
    ///
    /// Propagates [`WorldError`] from the network. The network may be
    /// partially restored when that happens.
    pub fn restore(
        &self,
        network: &mut Network,
        geography: &dyn Geography,
        ids: &mut IdAllocator,
    ) -> Result<Vec<DisplacedTrain>, WorldError> {
        let mut displaced = Vec::new();

        let stale_lines: Vec<LineId> = network
            .lines()
            .map(|l| l.id)
            .filter(|id| !self.lines.iter().any(|s| s.id == *id))
            .collect();
        for id in stale_lines {
            displaced.extend(DisplacedTrain::take_line(network, id)?);
        }

        for id in network.train_ids() {
            if !self.trains.iter().any(|s| s.id == id) {
                displaced.push(DisplacedTrain::take(network, id)?);
            }
        }

        for line in &self.lines {
            let stations: Vec<StationId> = line
                .stations
                .iter()
                .copied()
                .filter(|s| network.station(*s).is_some())
                .collect();
            if stations.len() < 2 {
                if network.line(line.id).is_some() {
                    displaced.extend(DisplacedTrain::take_line(network, line.id)?);
                }
                continue;
            }
            let unchanged = network
                .line(line.id)
                .is_some_and(|l| l.stations == stations && l.color == line.color);
            if !unchanged {
                network.upsert_line(line.id, line.color.clone(), stations, geography)?;
            }
        }

        for snap in &self.trains {
            if network.line(snap.line).is_none() {
                continue;
            }
            match network.train(snap.id) {
                Some(live) => {
                    if live.wagons != snap.wagons {
                        network.set_wagons(snap.id, snap.wagons)?;
                    }
                }
                None => {
                    let mut train = Train::new(snap.id, snap.line, snap.base_capacity);
                    train.wagons = snap.wagons;
                    network.add_train(train)?;
                    ids.observe(snap.id.into_inner());
                }
            }
            network.place_train(snap.id, snap.next_index, snap.progress, snap.direction)?;
        }

        Ok(displaced)
    }
}

/// Bounded linear undo/redo stacks.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryManager {
    undo: VecDeque<TopologySnapshot>,
    redo: VecDeque<TopologySnapshot>,
    depth: usize,
}

impl HistoryManager {
    /// Create empty stacks holding at most `depth` entries each.
    pub fn new(depth: usize) -> Self {
        Self {
            undo: VecDeque::with_capacity(depth),
            redo: VecDeque::with_capacity(depth),
            depth,
        }
    }

    /// Record the state about to be replaced by a new edit. Clears redo.
    pub fn push(&mut self, snapshot: TopologySnapshot) {
        push_bounded(&mut self.undo, snapshot, self.depth);
        self.redo.clear();
    }

    /// Swap `current` for the most recent undo entry.
    ///
    /// Returns `None` (and drops `current`) when there is nothing to undo.
    pub fn undo(&mut self, current: TopologySnapshot) -> Option<TopologySnapshot> {
        let previous = self.undo.pop_back()?;
        push_bounded(&mut self.redo, current, self.depth);
        debug!(undo = self.undo.len(), redo = self.redo.len(), "undo");
        Some(previous)
    }

    /// Swap `current` for the most recent redo entry.
    ///
    /// Returns `None` when there is nothing to redo.
    pub fn redo(&mut self, current: TopologySnapshot) -> Option<TopologySnapshot> {
        let next = self.redo.pop_back()?;
        push_bounded(&mut self.undo, current, self.depth);
        debug!(undo = self.undo.len(), redo = self.redo.len(), "redo");
        Some(next)
    }

    /// Whether there is anything to undo.
    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    /// Whether there is anything to redo.
    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    /// Number of undo entries.
    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    /// Number of redo entries.
    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }

}

fn push_bounded(stack: &mut VecDeque<TopologySnapshot>, snapshot: TopologySnapshot, depth: usize) {
    if depth == 0 {
        return;
    }
    while stack.len() >= depth {
        stack.pop_front();
    }
    stack.push_back(snapshot);
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use metroline_types::{Position, Shape, Station};
    use metroline_world::DryLand;

    use super::*;

    fn slot(n: u8) -> LineId {
        LineId::new(n).unwrap()
    }

    fn make_network() -> Network {
        let mut net = Network::new();
        for i in 0..4_u32 {
            net.add_station(Station::new(
                StationId(u64::from(i)),
                Shape::Circle,
                Position::new(f64::from(i) * 100.0, 0.0),
            ))
            .unwrap();
        }
        net
    }

    fn marker(n: u8) -> TopologySnapshot {
        TopologySnapshot {
            lines: vec![LineSnapshot {
                id: slot(n),
                color: String::new(),
                stations: Vec::new(),
            }],
            trains: Vec::new(),
        }
    }

    #[test]
    fn stacks_are_bounded() {
        let mut h = HistoryManager::new(10);
        for n in 0..10 {
            h.push(marker(n));
        }
        h.push(marker(0));
        assert_eq!(h.undo_len(), 10);
    }

    #[test]
    fn push_clears_redo() {
        let mut h = HistoryManager::new(10);
        h.push(marker(1));
        let restored = h.undo(marker(2)).unwrap();
        assert_eq!(restored, marker(1));
        assert_eq!(h.redo_len(), 1);
        h.push(marker(3));
        assert_eq!(h.redo_len(), 0);
        assert!(!h.can_redo());
    }

    #[test]
    fn undo_on_empty_is_none() {
        let mut h = HistoryManager::new(10);
        assert!(h.undo(marker(0)).is_none());
        assert!(!h.can_redo());
    }

    #[test]
    fn restore_recreates_deleted_train_and_line() {
        let geo = DryLand::default();
        let mut net = make_network();
        let mut ids = IdAllocator::resume_after(20);
        net.create_line(slot(0), vec![StationId(0), StationId(1), StationId(2)], &geo)
            .unwrap();
        net.add_train(Train::new(TrainId(7), slot(0), 6)).unwrap();
        net.place_train(TrainId(7), 2, 0.25, Direction::Forward).unwrap();
        let before = TopologySnapshot::capture(&net);

        net.remove_line(slot(0)).unwrap();
        net.create_line(slot(1), vec![StationId(2), StationId(3)], &geo)
            .unwrap();
        net.add_train(Train::new(TrainId(21), slot(1), 6)).unwrap();

        let displaced = before.restore(&mut net, &geo, &mut ids).unwrap();
        assert_eq!(displaced.len(), 1);
        assert_eq!(displaced.first().unwrap().heading_to, Some(StationId(3)));
        assert_eq!(TopologySnapshot::capture(&net), before);
        assert!(net.line(slot(1)).is_none());
    }

    #[test]
    fn restore_skips_missing_stations() {
        let geo = DryLand::default();
        let mut net = make_network();
        let mut ids = IdAllocator::new();
        net.create_line(slot(0), vec![StationId(0), StationId(1), StationId(2)], &geo)
            .unwrap();
        let before = TopologySnapshot::capture(&net);

        net.remove_line(slot(0)).unwrap();
        net.remove_station(StationId(1)).unwrap();
        net.remove_station(StationId(2)).unwrap();

        before.restore(&mut net, &geo, &mut ids).unwrap();
        assert!(net.line(slot(0)).is_none());
    }
}
