//! Default opening layout for a new session.
//!
//! Every session opens with one station of each common shape placed
//! around the centre of the map, and no lines. Further stations appear
//! through the station spawn timer.

use metroline_types::{IdAllocator, Position, Shape, Station, StationId};

use crate::error::WorldError;
use crate::network::Network;

/// Identifiers of the three opening stations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartingStationIds {
    /// The opening circle station.
    pub circle: StationId,
    /// The opening triangle station.
    pub triangle: StationId,
    /// The opening square station.
    pub square: StationId,
}

/// Offsets of the opening stations from the map centre.
const OPENING_LAYOUT: [(Shape, f64, f64); 3] = [
    (Shape::Circle, -120.0, 40.0),
    (Shape::Triangle, 0.0, -80.0),
    (Shape::Square, 130.0, 30.0),
];

/// Create the opening network around `centre`.
///
/// # Errors
///
/// Returns [`WorldError::DuplicateStation`] if the allocator hands out a
/// colliding id (only possible with a corrupted allocator).
pub fn create_starting_city(
    ids: &mut IdAllocator,
    centre: Position,
) -> Result<(Network, StartingStationIds), WorldError> {
    let mut network = Network::new();
    let mut placed = Vec::with_capacity(OPENING_LAYOUT.len());

    for (shape, dx, dy) in OPENING_LAYOUT {
        let id = ids.station();
        let position = Position::new(centre.x + dx, centre.y + dy);
        network.add_station(Station::new(id, shape, position))?;
        placed.push(id);
    }

    let station = |i: usize| placed.get(i).copied().unwrap_or(StationId(0));
    let starting = StartingStationIds {
        circle: station(0),
        triangle: station(1),
        square: station(2),
    };

    tracing::info!(
        stations = network.station_count(),
        "Starting city created"
    );

    Ok((network, starting))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn opening_has_one_of_each_common_shape() {
        let mut ids = IdAllocator::new();
        let (net, start) = create_starting_city(&mut ids, Position::new(500.0, 400.0)).unwrap();
        assert_eq!(net.station_count(), 3);
        assert_eq!(net.line_count(), 0);
        assert_eq!(net.station(start.circle).unwrap().shape, Shape::Circle);
        assert_eq!(net.station(start.triangle).unwrap().shape, Shape::Triangle);
        assert_eq!(net.station(start.square).unwrap().shape, Shape::Square);
    }

    #[test]
    fn opening_ids_come_from_allocator() {
        let mut ids = IdAllocator::new();
        let (_, start) = create_starting_city(&mut ids, Position::default()).unwrap();
        assert_eq!(start.circle, StationId(0));
        assert_eq!(ids.station(), StationId(3));
    }
}
