//! Segment construction and tunnel/bridge classification.
//!
//! A line with `n` stations has `n - 1` segments, one per adjacent pair.
//! Each segment records whether it crosses water and, if so, whether it is
//! built as a tunnel or a bridge.
//!
//! # Tie-break
//!
//! The kind is decided by comparing the coordinate sums (`x + y`) of the
//! two endpoints: when the first endpoint's sum is strictly larger the
//! segment is a tunnel, otherwise a bridge. The rule is arbitrary but
//! deterministic; resource accounting does not depend on it (the audit
//! allocates tunnels first regardless of the recorded kind).

use std::collections::BTreeMap;

use metroline_types::{CrossingKind, Position, Segment, Station, StationId};

use crate::error::WorldError;
use crate::geography::Geography;

/// Classify the segment from `a` to `b`.
///
/// Returns `None` when the segment stays on land.
pub fn classify(a: Position, b: Position, geography: &dyn Geography) -> Option<CrossingKind> {
    if !geography.crosses_water(a, b) {
        return None;
    }
    if a.coordinate_sum() > b.coordinate_sum() {
        Some(CrossingKind::Tunnel)
    } else {
        Some(CrossingKind::Bridge)
    }
}

/// Build the segment list for a station sequence.
///
/// # Errors
///
/// Returns [`WorldError::StationNotFound`] if any station in the sequence
/// is missing from `stations`.
pub fn build_segments(
    sequence: &[StationId],
    stations: &BTreeMap<StationId, Station>,
    geography: &dyn Geography,
) -> Result<Vec<Segment>, WorldError> {
    let position = |id: StationId| {
        stations
            .get(&id)
            .map(|s| s.position)
            .ok_or(WorldError::StationNotFound(id))
    };

    sequence
        .iter()
        .zip(sequence.iter().skip(1))
        .map(|(&from, &to)| {
            Ok(Segment {
                from,
                to,
                crossing: classify(position(from)?, position(to)?, geography),
            })
        })
        .collect()
}

/// Classify a prospective segment between two existing stations.
///
/// # Errors
///
/// Returns [`WorldError::StationNotFound`] if either station is missing.
pub fn crossing_between(
    a: StationId,
    b: StationId,
    stations: &BTreeMap<StationId, Station>,
    geography: &dyn Geography,
) -> Result<Option<CrossingKind>, WorldError> {
    let pa = stations.get(&a).ok_or(WorldError::StationNotFound(a))?.position;
    let pb = stations.get(&b).ok_or(WorldError::StationNotFound(b))?.position;
    Ok(classify(pa, pb, geography))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use metroline_types::Shape;

    use super::*;
    use crate::geography::{DryLand, FlatMap, RiverBand};

    fn river() -> FlatMap {
        FlatMap::with_rivers(vec![RiverBand {
            x_min: 100.0,
            x_max: 110.0,
        }])
    }

    fn stations() -> BTreeMap<StationId, Station> {
        let mut map = BTreeMap::new();
        for (id, x, y) in [(1, 0.0, 0.0), (2, 50.0, 0.0), (3, 200.0, 0.0)] {
            map.insert(
                StationId(id),
                Station::new(StationId(id), Shape::Circle, Position::new(x, y)),
            );
        }
        map
    }

    #[test]
    fn larger_first_sum_is_tunnel() {
        let geo = river();
        let east = Position::new(200.0, 0.0);
        let west = Position::new(0.0, 0.0);
        assert_eq!(classify(east, west, &geo), Some(CrossingKind::Tunnel));
        assert_eq!(classify(west, east, &geo), Some(CrossingKind::Bridge));
    }

    #[test]
    fn land_segments_have_no_crossing() {
        assert_eq!(
            classify(Position::new(0.0, 0.0), Position::new(500.0, 0.0), &DryLand::default()),
            None
        );
    }

    #[test]
    fn segments_follow_sequence() {
        let seq = [StationId(1), StationId(2), StationId(3)];
        let segments = build_segments(&seq, &stations(), &river()).unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments.first().unwrap().crossing, None);
        assert_eq!(segments.get(1).unwrap().crossing, Some(CrossingKind::Bridge));
    }

    #[test]
    fn missing_station_is_an_error() {
        let seq = [StationId(1), StationId(99)];
        assert!(build_segments(&seq, &stations(), &river()).is_err());
    }
}
