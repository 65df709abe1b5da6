//! Geography collaborator: coordinate projection and water crossings.
//!
//! The engine never inspects water geometry directly. It asks a
//! [`Geography`] implementation whether the straight segment between two
//! station positions crosses water, and only at connect time, to classify
//! the segment as a tunnel or bridge.

use serde::{Deserialize, Serialize};

use metroline_types::{GeoCoord, Position};

/// Projection and water-crossing queries supplied by the host.
pub trait Geography {
    /// Project a geographic coordinate into world coordinates.
    fn project(&self, coord: GeoCoord) -> Position;

    /// Whether the straight segment from `a` to `b` crosses water.
    fn crosses_water(&self, a: Position, b: Position) -> bool;
}

/// Equirectangular projection parameters shared by the bundled geographies.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    /// Geographic coordinate that maps to the world origin.
    pub origin: GeoCoord,
    /// World units per degree.
    pub scale: f64,
}

impl Projection {
    /// Project with north pointing towards negative `y`.
    pub fn apply(&self, coord: GeoCoord) -> Position {
        let lat_rad = self.origin.lat.to_radians();
        Position::new(
            (coord.lon - self.origin.lon) * lat_rad.cos() * self.scale,
            (self.origin.lat - coord.lat) * self.scale,
        )
    }
}

impl Default for Projection {
    fn default() -> Self {
        Self {
            origin: GeoCoord::default(),
            scale: 1.0,
        }
    }
}

/// A map without water: no segment ever needs a tunnel or bridge.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DryLand {
    /// Projection used by [`Geography::project`].
    pub projection: Projection,
}

impl Geography for DryLand {
    fn project(&self, coord: GeoCoord) -> Position {
        self.projection.apply(coord)
    }

    fn crosses_water(&self, _a: Position, _b: Position) -> bool {
        false
    }
}

/// A vertical band of water spanning `x_min..=x_max` across the whole map.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiverBand {
    /// Western bank.
    pub x_min: f64,
    /// Eastern bank.
    pub x_max: f64,
}

impl RiverBand {
    /// Whether a segment between `a` and `b` touches the band.
    fn intersects(&self, a: Position, b: Position) -> bool {
        let lo = a.x.min(b.x);
        let hi = a.x.max(b.x);
        lo <= self.x_max && hi >= self.x_min
    }
}

/// A flat map with axis-aligned rivers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlatMap {
    /// Projection used by [`Geography::project`].
    pub projection: Projection,
    /// Rivers crossing the map from north to south.
    pub rivers: Vec<RiverBand>,
}

impl FlatMap {
    /// Create a flat map with the given rivers and a unit projection.
    pub fn with_rivers(rivers: Vec<RiverBand>) -> Self {
        Self {
            projection: Projection::default(),
            rivers,
        }
    }
}

impl Geography for FlatMap {
    fn project(&self, coord: GeoCoord) -> Position {
        self.projection.apply(coord)
    }

    fn crosses_water(&self, a: Position, b: Position) -> bool {
        self.rivers.iter().any(|r| r.intersects(a, b))
    }
}
