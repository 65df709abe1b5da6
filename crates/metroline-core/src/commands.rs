//! Topology commands.
//!
//! Every command follows the same pipeline:
//!
//! 1. Refuse if the session has halted.
//! 2. Check the request against the network and, outside creative mode,
//!    against resource availability.
//! 3. Push the current topology onto the undo stack.
//! 4. Mutate the network and commit resources.
//! 5. Invalidate the route cache.
//!
//! A command that fails at step 1 or 2 leaves all state untouched.

use serde::{Deserialize, Serialize};
use tracing::debug;

use metroline_types::{
    LineId, Position, ResourceKind, Shape, Station, StationId, Train, TrainId,
};
use metroline_world::WorldError;
use metroline_world::segment::crossing_between;

use crate::history::{DisplacedTrain, TopologySnapshot};
use crate::session::Session;

/// Errors returned by topology commands.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    /// A required resource unit is not available.
    #[error("{kind:?} unavailable: {reason}")]
    ResourceDenied {
        /// The resource that ran out.
        kind: ResourceKind,
        /// Human-readable explanation.
        reason: String,
    },

    /// The change would break a line-shape rule.
    #[error("invalid topology: {reason}")]
    TopologyInvalid {
        /// Human-readable explanation.
        reason: String,
    },

    /// A referenced station does not exist.
    #[error("station {0} not found")]
    StationNotFound(StationId),

    /// A referenced line does not exist.
    #[error("{0} not found")]
    LineNotFound(LineId),

    /// A referenced train does not exist.
    #[error("train {0} not found")]
    TrainNotFound(TrainId),

    /// The session has halted.
    #[error("session has halted")]
    Halted,

    /// The command is not available in the current game mode.
    #[error("not permitted: {reason}")]
    NotPermitted {
        /// Human-readable explanation.
        reason: String,
    },

    /// There is no history entry to undo.
    #[error("nothing to undo")]
    NothingToUndo,

    /// There is no history entry to redo.
    #[error("nothing to redo")]
    NothingToRedo,

    /// The network rejected a change the command had already validated.
    #[error("world error: {0}")]
    World(#[from] WorldError),
}

impl CommandError {
    fn topology(reason: impl Into<String>) -> Self {
        Self::TopologyInvalid {
            reason: reason.into(),
        }
    }

    fn denied(kind: ResourceKind, reason: impl Into<String>) -> Self {
        Self::ResourceDenied {
            kind,
            reason: reason.into(),
        }
    }
}

/// How `connect` chooses the line to change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectTarget {
    /// Extend the one line that ends at either station, or open a new
    /// line when none does.
    #[default]
    Auto,
    /// Extend this line from whichever of its ends is one of the stations.
    Extend(LineId),
    /// Always open a new line.
    NewLine,
}

/// What a successful command did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CommandOutcome {
    /// A new line was opened with one train.
    LineCreated {
        /// The new line.
        line: LineId,
        /// Its first train.
        train: TrainId,
    },
    /// A line grew by one station at an end.
    LineExtended {
        /// The line.
        line: LineId,
        /// The station added.
        station: StationId,
    },
    /// An end station was detached from a line.
    StationDetached {
        /// The line.
        line: LineId,
        /// The station removed from it.
        station: StationId,
    },
    /// A line was deleted with its trains.
    LineDeleted {
        /// The deleted line.
        line: LineId,
    },
    /// A train was put on a line.
    TrainAdded {
        /// The new train.
        train: TrainId,
        /// Its line.
        line: LineId,
    },
    /// A train was taken off its line.
    TrainRemoved {
        /// The removed train.
        train: TrainId,
    },
    /// A train's wagon count changed.
    WagonsChanged {
        /// The train.
        train: TrainId,
        /// Its new wagon count.
        wagons: u32,
    },
    /// A station was placed by hand.
    StationAdded {
        /// The new station.
        station: StationId,
    },
    /// A station was removed by hand.
    StationRemoved {
        /// The removed station.
        station: StationId,
        /// Lines that fell below two stations and were deleted.
        lines_deleted: Vec<LineId>,
    },
    /// The last topology change was undone.
    Undone,
    /// The last undone change was reapplied.
    Redone,
}

/// Which end of a line a new station attaches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum End {
    Head,
    Tail,
}

/// A validated connect request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectPlan {
    Extend {
        line: LineId,
        end: End,
        station: StationId,
    },
    Create {
        line: LineId,
    },
}

impl Session {
    fn ensure_not_halted(&self) -> Result<(), CommandError> {
        if self.state.is_halted() {
            return Err(CommandError::Halted);
        }
        Ok(())
    }

    fn constrained(&self) -> bool {
        self.mode.resources_constrained()
    }

    fn require(&self, kind: ResourceKind, n: u32, reason: &str) -> Result<(), CommandError> {
        if self.constrained() && !self.pool.has(kind, n) {
            return Err(CommandError::denied(kind, reason));
        }
        Ok(())
    }

    /// Record the pre-edit topology. Always the step right before mutation.
    fn checkpoint(&mut self) {
        self.history.push(TopologySnapshot::capture(&self.network));
    }

    fn consume(&mut self, kind: ResourceKind, n: u32) {
        if self.constrained() && self.pool.try_consume(kind, n).is_err() {
            debug!(?kind, n, "incremental consume drifted; next audit corrects it");
        }
    }

    fn consume_crossing(&mut self) {
        if self.constrained() && self.pool.try_consume_crossing().is_err() {
            debug!("incremental crossing consume drifted; next audit corrects it");
        }
    }

    fn release_line_resources(&mut self, line_crossings: usize, trains: &[DisplacedTrain]) {
        if !self.constrained() {
            return;
        }
        self.pool.release(ResourceKind::Lines, 1);
        for displaced in trains {
            self.pool.release(ResourceKind::Trains, 1);
            self.pool.release(ResourceKind::Wagons, displaced.train.wagons);
        }
        for _ in 0..line_crossings {
            self.pool.release_crossing();
        }
    }

    fn station_exists(&self, id: StationId) -> Result<(), CommandError> {
        if self.network.station(id).is_none() {
            return Err(CommandError::StationNotFound(id));
        }
        Ok(())
    }

    // -------------------------------------------------------------------
    // connect / disconnect
    // -------------------------------------------------------------------

    /// Join two stations, either by extending a line at one of its ends or
    /// by opening a new line.
    ///
    /// # Errors
    ///
    /// - [`CommandError::TopologyInvalid`] for a splice into the middle of a
    ///   line, a bridge between two lines, a cycle, or an ambiguous
    ///   [`ConnectTarget::Auto`].
    /// - [`CommandError::ResourceDenied`] when a line slot, train, or
    ///   crossing is not available.
    pub fn connect(
        &mut self,
        from: StationId,
        to: StationId,
        target: ConnectTarget,
    ) -> Result<CommandOutcome, CommandError> {
        self.ensure_not_halted()?;
        self.station_exists(from)?;
        self.station_exists(to)?;
        if from == to {
            return Err(CommandError::topology("a station cannot connect to itself"));
        }

        let plan = self.plan_connect(from, to, target)?;
        let crossing = crossing_between(from, to, self.network.station_map(), &*self.geography)?;
        if crossing.is_some() && self.constrained() && self.pool.crossings_available() == 0 {
            return Err(CommandError::denied(
                ResourceKind::Tunnels,
                "no tunnel or bridge left to cross the water",
            ));
        }
        if let ConnectPlan::Create { .. } = plan {
            self.require(ResourceKind::Lines, 1, "no line left to open")?;
            self.require(ResourceKind::Trains, 1, "a new line needs a train")?;
        }

        self.checkpoint();
        let outcome = match plan {
            ConnectPlan::Extend { line, end, station } => {
                let mut stations = self
                    .network
                    .line(line)
                    .map(|l| l.stations.clone())
                    .ok_or(CommandError::LineNotFound(line))?;
                match end {
                    End::Head => stations.insert(0, station),
                    End::Tail => stations.push(station),
                }
                self.network
                    .set_line_stations(line, stations, &*self.geography)?;
                CommandOutcome::LineExtended { line, station }
            }
            ConnectPlan::Create { line } => {
                self.network
                    .create_line(line, vec![from, to], &*self.geography)?;
                let train = self.ids.train();
                self.network.add_train(Train::new(
                    train,
                    line,
                    self.config.trains.base_capacity,
                ))?;
                self.consume(ResourceKind::Lines, 1);
                self.consume(ResourceKind::Trains, 1);
                CommandOutcome::LineCreated { line, train }
            }
        };
        if crossing.is_some() {
            self.consume_crossing();
        }
        self.evaluator.invalidate();
        debug!(%from, %to, ?outcome, "connect");
        Ok(outcome)
    }

    fn plan_connect(
        &self,
        from: StationId,
        to: StationId,
        target: ConnectTarget,
    ) -> Result<ConnectPlan, CommandError> {
        if self
            .network
            .lines()
            .any(|l| l.contains(from) && l.contains(to) && target != ConnectTarget::NewLine)
        {
            return Err(CommandError::topology(
                "stations already share a line; joining them again would close a loop",
            ));
        }

        match target {
            ConnectTarget::NewLine => self.plan_new_line(),
            ConnectTarget::Extend(line) => self.plan_extend(line, from, to),
            ConnectTarget::Auto => {
                let ends_at = |station: StationId, other: StationId| -> Vec<LineId> {
                    self.network
                        .lines()
                        .filter(|l| l.is_endpoint(station) && !l.contains(other))
                        .map(|l| l.id)
                        .collect()
                };
                let from_ends = ends_at(from, to);
                let to_ends = ends_at(to, from);
                match (from_ends.as_slice(), to_ends.as_slice()) {
                    ([], []) => self.plan_new_line(),
                    ([line], []) => self.plan_extend(*line, from, to),
                    ([], [line]) => self.plan_extend(*line, to, from),
                    (f, t) if !f.is_empty() && !t.is_empty() => Err(CommandError::topology(
                        "both stations end different lines; lines cannot be bridged",
                    )),
                    _ => Err(CommandError::topology(
                        "several lines end here; choose which line to extend",
                    )),
                }
            }
        }
    }

    fn plan_new_line(&self) -> Result<ConnectPlan, CommandError> {
        let line = self
            .network
            .free_slot()
            .ok_or_else(|| CommandError::denied(ResourceKind::Lines, "every line slot is in use"))?;
        Ok(ConnectPlan::Create { line })
    }

    /// Extend `line` from its end at `anchor` to `station`, or from its end
    /// at `station` to `anchor` when `station` is the end.
    fn plan_extend(
        &self,
        line: LineId,
        anchor: StationId,
        station: StationId,
    ) -> Result<ConnectPlan, CommandError> {
        let current = self
            .network
            .line(line)
            .ok_or(CommandError::LineNotFound(line))?;
        let attach = |end_station: StationId, new: StationId| {
            if current.contains(new) {
                return None;
            }
            if current.head() == Some(end_station) {
                Some(ConnectPlan::Extend {
                    line,
                    end: End::Head,
                    station: new,
                })
            } else if current.tail() == Some(end_station) {
                Some(ConnectPlan::Extend {
                    line,
                    end: End::Tail,
                    station: new,
                })
            } else {
                None
            }
        };
        attach(anchor, station)
            .or_else(|| attach(station, anchor))
            .ok_or_else(|| {
                CommandError::topology(format!(
                    "{line} can only be extended from its head or tail"
                ))
            })
    }

    /// Remove the segment between `a` and `b` from the end of a line.
    ///
    /// The end station is detached; a two-station line is deleted with its
    /// trains. When several lines end with this segment the lowest slot is
    /// changed.
    ///
    /// # Errors
    ///
    /// [`CommandError::TopologyInvalid`] if the stations are not adjacent
    /// on any line, or only adjacent in the middle of one.
    pub fn disconnect(&mut self, a: StationId, b: StationId) -> Result<CommandOutcome, CommandError> {
        self.ensure_not_halted()?;
        self.station_exists(a)?;
        self.station_exists(b)?;

        let mut interior = false;
        let mut found = None;
        for line in self.network.lines() {
            let Some(position) = line.segments.iter().position(|s| s.joins(a, b)) else {
                continue;
            };
            let last = line.segments.len().saturating_sub(1);
            if position == 0 || position == last {
                let detached = if position == 0 {
                    line.head()
                } else {
                    line.tail()
                };
                let crossing = line
                    .segments
                    .get(position)
                    .is_some_and(|s| s.crossing.is_some());
                found = Some((line.id, detached, line.stations.len(), crossing));
                break;
            }
            interior = true;
        }

        let Some((line, Some(detached), len, crossing)) = found else {
            return Err(CommandError::topology(if interior {
                "only the first or last segment of a line can be removed"
            } else {
                "stations are not adjacent on any line"
            }));
        };

        self.checkpoint();
        let outcome = if len <= 2 {
            let crossings = self.network.line(line).map_or(0, |l| l.crossing_count());
            let displaced = DisplacedTrain::take_line(&mut self.network, line)?;
            self.release_line_resources(crossings, &displaced);
            self.settle_displaced(displaced);
            CommandOutcome::LineDeleted { line }
        } else {
            let stations: Vec<StationId> = self
                .network
                .line(line)
                .map(|l| l.stations.iter().copied().filter(|s| *s != detached).collect())
                .ok_or(CommandError::LineNotFound(line))?;
            self.network
                .set_line_stations(line, stations, &*self.geography)?;
            if crossing && self.constrained() {
                self.pool.release_crossing();
            }
            CommandOutcome::StationDetached {
                line,
                station: detached,
            }
        };
        self.evaluator.invalidate();
        debug!(%a, %b, ?outcome, "disconnect");
        Ok(outcome)
    }

    // -------------------------------------------------------------------
    // Trains and wagons
    // -------------------------------------------------------------------

    /// Put a new train at the head of `line`.
    ///
    /// # Errors
    ///
    /// [`CommandError::LineNotFound`] or [`CommandError::ResourceDenied`].
    pub fn add_train(&mut self, line: LineId) -> Result<CommandOutcome, CommandError> {
        self.ensure_not_halted()?;
        if self.network.line(line).is_none() {
            return Err(CommandError::LineNotFound(line));
        }
        self.require(ResourceKind::Trains, 1, "no train left")?;

        self.checkpoint();
        let train = self.ids.train();
        self.network
            .add_train(Train::new(train, line, self.config.trains.base_capacity))?;
        self.consume(ResourceKind::Trains, 1);
        self.evaluator.invalidate();
        debug!(%train, %line, "train added");
        Ok(CommandOutcome::TrainAdded { train, line })
    }

    /// Take a train off its line. Its riders are settled at the station it
    /// was heading to.
    ///
    /// # Errors
    ///
    /// [`CommandError::TrainNotFound`].
    pub fn remove_train(&mut self, train: TrainId) -> Result<CommandOutcome, CommandError> {
        self.ensure_not_halted()?;
        if self.network.train(train).is_none() {
            return Err(CommandError::TrainNotFound(train));
        }

        self.checkpoint();
        let displaced = DisplacedTrain::take(&mut self.network, train)?;
        if self.constrained() {
            self.pool.release(ResourceKind::Trains, 1);
            self.pool
                .release(ResourceKind::Wagons, displaced.train.wagons);
        }
        self.settle_displaced(vec![displaced]);
        self.evaluator.invalidate();
        debug!(%train, "train removed");
        Ok(CommandOutcome::TrainRemoved { train })
    }

    /// Attach one wagon to a train.
    ///
    /// # Errors
    ///
    /// [`CommandError::TrainNotFound`] or [`CommandError::ResourceDenied`].
    pub fn add_wagon(&mut self, train: TrainId) -> Result<CommandOutcome, CommandError> {
        self.ensure_not_halted()?;
        let wagons = self
            .network
            .train(train)
            .map(|t| t.wagons)
            .ok_or(CommandError::TrainNotFound(train))?;
        self.require(ResourceKind::Wagons, 1, "no wagon left")?;

        self.checkpoint();
        let wagons = wagons.saturating_add(1);
        self.network.set_wagons(train, wagons)?;
        self.consume(ResourceKind::Wagons, 1);
        self.evaluator.invalidate();
        Ok(CommandOutcome::WagonsChanged { train, wagons })
    }

    /// Detach one wagon from a train. Riders over the reduced capacity stay
    /// aboard until they alight.
    ///
    /// # Errors
    ///
    /// [`CommandError::TrainNotFound`], or
    /// [`CommandError::TopologyInvalid`] if the train has no wagons.
    pub fn remove_wagon(&mut self, train: TrainId) -> Result<CommandOutcome, CommandError> {
        self.ensure_not_halted()?;
        let wagons = self
            .network
            .train(train)
            .map(|t| t.wagons)
            .ok_or(CommandError::TrainNotFound(train))?;
        let Some(wagons) = wagons.checked_sub(1) else {
            return Err(CommandError::topology("train has no wagons"));
        };

        self.checkpoint();
        self.network.set_wagons(train, wagons)?;
        if self.constrained() {
            self.pool.release(ResourceKind::Wagons, 1);
        }
        self.evaluator.invalidate();
        Ok(CommandOutcome::WagonsChanged { train, wagons })
    }

    // -------------------------------------------------------------------
    // Creative-mode station editing
    // -------------------------------------------------------------------

    /// Place a station by hand. Creative mode only.
    ///
    /// # Errors
    ///
    /// [`CommandError::NotPermitted`] outside creative mode.
    pub fn add_station(
        &mut self,
        shape: Shape,
        position: Position,
    ) -> Result<CommandOutcome, CommandError> {
        self.ensure_not_halted()?;
        if self.constrained() {
            return Err(CommandError::NotPermitted {
                reason: "stations can only be placed in creative mode".to_owned(),
            });
        }
        let station = self.ids.station();
        self.network
            .add_station(Station::new(station, shape, position))?;
        self.evaluator.invalidate();
        debug!(%station, ?shape, "station added");
        Ok(CommandOutcome::StationAdded { station })
    }

    /// Remove a station by hand. Creative mode only.
    ///
    /// The station is taken off every line (neighbours on either side are
    /// joined directly); lines left with fewer than two stations are
    /// deleted. Passengers waiting at the station are discarded.
    ///
    /// # Errors
    ///
    /// [`CommandError::NotPermitted`] outside creative mode, or
    /// [`CommandError::StationNotFound`].
    pub fn remove_station(&mut self, station: StationId) -> Result<CommandOutcome, CommandError> {
        self.ensure_not_halted()?;
        if self.constrained() {
            return Err(CommandError::NotPermitted {
                reason: "stations can only be removed in creative mode".to_owned(),
            });
        }
        self.station_exists(station)?;

        self.checkpoint();
        let mut lines_deleted = Vec::new();
        let mut displaced = Vec::new();
        for line in self.network.lines_through(station) {
            let remaining: Vec<StationId> = self
                .network
                .line(line)
                .map(|l| l.stations.iter().copied().filter(|s| *s != station).collect())
                .unwrap_or_default();
            if remaining.len() < 2 {
                displaced.extend(DisplacedTrain::take_line(&mut self.network, line)?);
                lines_deleted.push(line);
            } else {
                self.network
                    .set_line_stations(line, remaining, &*self.geography)?;
            }
        }
        self.settle_displaced(displaced);

        let removed = self.network.remove_station(station)?;
        let dropped = u64::try_from(removed.queue.len()).unwrap_or(u64::MAX);
        self.stats.discarded = self.stats.discarded.saturating_add(dropped);
        self.evaluator.invalidate();
        debug!(%station, dropped, lines_deleted = lines_deleted.len(), "station removed");
        Ok(CommandOutcome::StationRemoved {
            station,
            lines_deleted,
        })
    }

    // -------------------------------------------------------------------
    // History
    // -------------------------------------------------------------------

    /// Restore the topology from before the last command.
    ///
    /// Passengers are not rolled back. The validator runs afterwards so
    /// `available` matches the restored topology.
    ///
    /// # Errors
    ///
    /// [`CommandError::NothingToUndo`] when the undo stack is empty.
    pub fn undo(&mut self) -> Result<CommandOutcome, CommandError> {
        self.ensure_not_halted()?;
        let current = TopologySnapshot::capture(&self.network);
        let previous = self
            .history
            .undo(current)
            .ok_or(CommandError::NothingToUndo)?;
        self.apply_snapshot(&previous)?;
        Ok(CommandOutcome::Undone)
    }

    /// Reapply the last undone change.
    ///
    /// # Errors
    ///
    /// [`CommandError::NothingToRedo`] when the redo stack is empty.
    pub fn redo(&mut self) -> Result<CommandOutcome, CommandError> {
        self.ensure_not_halted()?;
        let current = TopologySnapshot::capture(&self.network);
        let next = self
            .history
            .redo(current)
            .ok_or(CommandError::NothingToRedo)?;
        self.apply_snapshot(&next)?;
        Ok(CommandOutcome::Redone)
    }

    fn apply_snapshot(&mut self, snapshot: &TopologySnapshot) -> Result<(), CommandError> {
        let displaced = snapshot.restore(&mut self.network, &*self.geography, &mut self.ids)?;
        self.settle_displaced(displaced);
        self.evaluator.invalidate();
        self.run_audit();
        Ok(())
    }
}
