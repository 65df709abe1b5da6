//! Hybrid greedy router: per-passenger board and alight decisions.
//!
//! The router is consulted whenever a train stands at a station. For each
//! waiting passenger it decides whether to board; for each rider it decides
//! whether to stay, get off at the destination, or change to a cheaper
//! line serving the same station.
//!
//! # Preference wait
//!
//! When the arriving train can reach the destination but another line at
//! the station is strictly cheaper, the passenger refuses to board and
//! starts a preference wait. Once the wait exceeds
//! [`RouterParams::preference_wait_secs`] the passenger boards anyway, so
//! a better line that never shows up cannot starve them.

use serde::{Deserialize, Serialize};
use tracing::trace;

use metroline_types::{Direction, LineId, Passenger, StationId, Train};
use metroline_world::Network;

use crate::evaluator::RouteEvaluator;

/// Timing rules for the router.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RouterParams {
    /// How long a passenger holds out for a better line before boarding anyway.
    pub preference_wait_secs: f64,
    /// Age after which an unroutable passenger is evicted.
    pub stranded_timeout_secs: f64,
}

impl Default for RouterParams {
    fn default() -> Self {
        Self {
            preference_wait_secs: 3.0,
            stranded_timeout_secs: 60.0,
        }
    }
}

/// Why a passenger boarded. Diagnostic only; every reason boards the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoardReason {
    /// A destination station lies ahead on the train's current leg.
    DestinationAhead,
    /// The line reaches the destination eventually (later leg or transfer).
    EventuallyReaches,
    /// A better line exists, but the preference wait ran out.
    PreferenceWaitExpired,
}

/// Outcome of [`Router::should_board`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum BoardDecision {
    /// Get on the train.
    Board(BoardReason),
    /// Stay on the platform waiting for a strictly better line.
    Wait {
        /// The line the passenger is holding out for.
        better: LineId,
        /// Seconds already spent waiting.
        waited: f64,
    },
    /// The train's line cannot reach the destination within the transfer limit.
    NoPath,
}

/// Outcome of [`Router::should_alight`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlightDecision {
    /// The station matches the destination: the trip is complete.
    Deliver,
    /// Get off and wait for the given, strictly cheaper line.
    Transfer(LineId),
    /// Stay on board.
    Stay,
}

/// Greedy, local passenger router.
#[derive(Debug, Clone, Copy, Default)]
pub struct Router {
    params: RouterParams,
}

impl Router {
    /// Create a router.
    pub const fn new(params: RouterParams) -> Self {
        Self { params }
    }

    /// The router's parameters.
    pub const fn params(&self) -> &RouterParams {
        &self.params
    }

    /// Decide whether `passenger`, waiting at `station`, boards `train`.
    ///
    /// `train.direction` must already be the direction the train will leave
    /// in. Boarding clears the passenger's preference-wait timestamp; a
    /// first refusal in favour of a better line sets it to `now`.
    pub fn should_board(
        &self,
        evaluator: &mut RouteEvaluator,
        network: &Network,
        passenger: &mut Passenger,
        train: &Train,
        station: StationId,
        now: f64,
    ) -> BoardDecision {
        let destination = passenger.destination;
        if !evaluator.can_reach_default(network, train.line, destination) {
            return BoardDecision::NoPath;
        }

        let better = network
            .lines_through(station)
            .into_iter()
            .filter(|other| *other != train.line)
            .find(|other| {
                evaluator.can_reach_default(network, *other, destination)
                    && evaluator.better_line(network, train.line, *other, destination)
                        == Some(*other)
            });

        if let Some(better) = better {
            match passenger.wait_since {
                None => {
                    passenger.wait_since = Some(now);
                    trace!(passenger = %passenger.id, %better, "preference wait started");
                    return BoardDecision::Wait {
                        better,
                        waited: 0.0,
                    };
                }
                Some(since) => {
                    let waited = (now - since).max(0.0);
                    if waited < self.params.preference_wait_secs {
                        return BoardDecision::Wait { better, waited };
                    }
                    passenger.wait_since = None;
                    return BoardDecision::Board(BoardReason::PreferenceWaitExpired);
                }
            }
        }

        passenger.wait_since = None;
        if destination_ahead(network, train, station, passenger) {
            BoardDecision::Board(BoardReason::DestinationAhead)
        } else {
            BoardDecision::Board(BoardReason::EventuallyReaches)
        }
    }

    /// Decide what a rider of `train` does when it stops at `station`.
    ///
    /// Candidate transfer lines are scanned in slot order and the first one
    /// that reaches the destination and is strictly cheaper than the
    /// current line wins; candidates are not ranked against each other.
    pub fn should_alight(
        &self,
        evaluator: &mut RouteEvaluator,
        network: &Network,
        passenger: &mut Passenger,
        station: StationId,
        train: &Train,
    ) -> AlightDecision {
        let destination = passenger.destination;
        if network
            .station(station)
            .is_some_and(|s| s.shape == destination)
        {
            passenger.wait_since = None;
            return AlightDecision::Deliver;
        }

        let transfer = network
            .lines_through(station)
            .into_iter()
            .filter(|other| *other != train.line)
            .find(|other| {
                evaluator.can_reach_default(network, *other, destination)
                    && evaluator.better_line(network, train.line, *other, destination)
                        == Some(*other)
            });

        match transfer {
            Some(line) => {
                passenger.wait_since = None;
                AlightDecision::Transfer(line)
            }
            None => AlightDecision::Stay,
        }
    }

    /// Whether a waiting passenger should be evicted as undeliverable.
    ///
    /// True once no line anywhere in the network can reach the destination
    /// within the transfer limit and the passenger has waited longer than
    /// the stranded timeout since spawning.
    pub fn is_stranded(
        &self,
        evaluator: &mut RouteEvaluator,
        network: &Network,
        passenger: &Passenger,
        now: f64,
    ) -> bool {
        if passenger.age(now) <= self.params.stranded_timeout_secs {
            return false;
        }
        let lines: Vec<LineId> = network.lines().map(|l| l.id).collect();
        !lines
            .into_iter()
            .any(|line| evaluator.can_reach_default(network, line, passenger.destination))
    }
}

/// Whether a station of the passenger's destination shape lies further
/// along the train's line in its direction of travel.
fn destination_ahead(
    network: &Network,
    train: &Train,
    station: StationId,
    passenger: &Passenger,
) -> bool {
    let Some(line) = network.line(train.line) else {
        return false;
    };
    let Some(here) = line.index_of(station) else {
        return false;
    };
    let range = match train.direction {
        Direction::Forward => here.saturating_add(1)..line.stations.len(),
        Direction::Backward => 0..here,
    };
    line.stations
        .get(range)
        .unwrap_or_default()
        .iter()
        .filter_map(|id| network.station(*id))
        .any(|s| s.shape == passenger.destination)
}
