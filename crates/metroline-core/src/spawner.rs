//! Passenger and station spawning.
//!
//! Two independent accumulators run on simulated time. Each fires every
//! `base_interval / level` seconds, where the difficulty level is one plus
//! the number of completed weeks, so the city gets busier as it ages.

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use metroline_types::{IdAllocator, Passenger, Position, Shape, Station, StationId};
use metroline_world::{Geography, Network, WorldError};

use crate::config::SimulationConfig;

/// Margin kept free along the map edges when placing stations.
const EDGE_MARGIN: f64 = 40.0;

/// Candidate positions tried per station spawn before giving up.
const PLACEMENT_ATTEMPTS: u32 = 24;

/// What one spawner step produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpawnReport {
    /// Passengers added to station queues.
    pub passengers: u32,
    /// Stations added to the map.
    pub stations: Vec<StationId>,
}

/// Accumulating spawn timers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Spawner {
    passenger_timer: f64,
    station_timer: f64,
}

/// Difficulty level after `weeks` completed weeks.
pub fn difficulty_level(weeks: u64) -> f64 {
    let level = u32::try_from(weeks.saturating_add(1)).unwrap_or(u32::MAX);
    f64::from(level)
}

impl Spawner {
    /// Fresh timers.
    pub const fn new() -> Self {
        Self {
            passenger_timer: 0.0,
            station_timer: 0.0,
        }
    }

    /// Advance both timers by `dt` and spawn whatever came due.
    ///
    /// # Errors
    ///
    /// Propagates [`WorldError`] from adding a station.
    #[allow(clippy::too_many_arguments)]
    pub fn step(
        &mut self,
        dt: f64,
        weeks: u64,
        now: f64,
        network: &mut Network,
        ids: &mut IdAllocator,
        rng: &mut impl Rng,
        geography: &dyn Geography,
        config: &SimulationConfig,
    ) -> Result<SpawnReport, WorldError> {
        let level = difficulty_level(weeks);
        let mut report = SpawnReport::default();

        let passenger_interval = config.passengers.spawn_interval_secs / level;
        self.passenger_timer += dt;
        while self.passenger_timer >= passenger_interval {
            self.passenger_timer -= passenger_interval;
            if spawn_passenger(network, ids, rng, now) {
                report.passengers = report.passengers.saturating_add(1);
            }
        }

        let station_interval = config.stations.spawn_interval_secs / level;
        self.station_timer += dt;
        while self.station_timer >= station_interval {
            self.station_timer -= station_interval;
            if let Some(id) = spawn_station(network, ids, rng, geography, config)? {
                report.stations.push(id);
            }
        }

        Ok(report)
    }
}

/// Add one passenger to a random station's queue.
///
/// The destination is a shape present on the map other than the origin's
/// own. Returns `false` when the map has no such pair.
pub fn spawn_passenger(
    network: &mut Network,
    ids: &mut IdAllocator,
    rng: &mut impl Rng,
    now: f64,
) -> bool {
    let origins: Vec<(StationId, Shape)> = network.stations().map(|s| (s.id, s.shape)).collect();
    if origins.is_empty() {
        return false;
    }
    let Some(&(origin, origin_shape)) = origins.get(rng.random_range(0..origins.len())) else {
        return false;
    };
    let destinations: Vec<Shape> = network
        .shapes_present()
        .into_iter()
        .filter(|s| *s != origin_shape)
        .collect();
    let Some(destination) = pick_weighted(rng, &destinations) else {
        return false;
    };

    let passenger = Passenger::new(ids.passenger(), origin, destination, now);
    let Some(station) = network.station_mut(origin) else {
        return false;
    };
    debug!(passenger = %passenger.id, station = %origin, ?destination, "passenger spawned");
    station.queue.push_back(passenger);
    true
}

/// Place a new station at a free dry-land position.
///
/// Returns `Ok(None)` when the map is at its station cap or no position
/// satisfied the spacing rule.
///
/// # Errors
///
/// Propagates [`WorldError`] from [`Network::add_station`].
pub fn spawn_station(
    network: &mut Network,
    ids: &mut IdAllocator,
    rng: &mut impl Rng,
    geography: &dyn Geography,
    config: &SimulationConfig,
) -> Result<Option<StationId>, WorldError> {
    let cap = usize::try_from(config.stations.max_stations).unwrap_or(usize::MAX);
    if network.station_count() >= cap {
        return Ok(None);
    }
    let Some(shape) = pick_weighted(rng, &Shape::ALL) else {
        return Ok(None);
    };

    let x_max = (config.world.width - EDGE_MARGIN).max(EDGE_MARGIN);
    let y_max = (config.world.height - EDGE_MARGIN).max(EDGE_MARGIN);
    for _ in 0..PLACEMENT_ATTEMPTS {
        let candidate = Position::new(
            rng.random_range(EDGE_MARGIN..=x_max),
            rng.random_range(EDGE_MARGIN..=y_max),
        );
        if geography.crosses_water(candidate, candidate) {
            continue;
        }
        let crowded = network
            .stations()
            .any(|s| s.position.distance(candidate) < config.stations.min_spacing);
        if crowded {
            continue;
        }
        let id = ids.station();
        network.add_station(Station::new(id, shape, candidate))?;
        info!(station = %id, ?shape, x = candidate.x, y = candidate.y, "station spawned");
        return Ok(Some(id));
    }
    Ok(None)
}

/// Pick a shape from `shapes` weighted by [`Shape::spawn_weight`].
fn pick_weighted(rng: &mut impl Rng, shapes: &[Shape]) -> Option<Shape> {
    let total: u32 = shapes.iter().map(|s| s.spawn_weight()).sum();
    if total == 0 {
        return None;
    }
    let mut roll = rng.random_range(0..total);
    for shape in shapes {
        let weight = shape.spawn_weight();
        if roll < weight {
            return Some(*shape);
        }
        roll = roll.saturating_sub(weight);
    }
    shapes.last().copied()
}
