//! Enumeration types for the Metroline simulation.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Shapes
// ---------------------------------------------------------------------------

/// Destination class shared by stations and passengers.
///
/// A passenger is delivered at any station whose shape matches the
/// passenger's destination shape; stations of the same shape are
/// interchangeable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Shape {
    /// The most common station class.
    Circle,
    /// Common station class.
    Triangle,
    /// Common station class.
    Square,
    /// Rare station class.
    Pentagon,
    /// Rare station class.
    Star,
    /// Rare station class.
    Diamond,
    /// Rare station class.
    Cross,
}

impl Shape {
    /// Every shape, common shapes first.
    pub const ALL: [Self; 7] = [
        Self::Circle,
        Self::Triangle,
        Self::Square,
        Self::Pentagon,
        Self::Star,
        Self::Diamond,
        Self::Cross,
    ];

    /// Whether this shape belongs to the common set spawned from the start.
    pub const fn is_common(self) -> bool {
        matches!(self, Self::Circle | Self::Triangle | Self::Square)
    }

    /// Relative spawn weight for new stations of this shape.
    pub const fn spawn_weight(self) -> u32 {
        match self {
            Self::Circle => 50,
            Self::Triangle => 25,
            Self::Square => 15,
            Self::Pentagon | Self::Star | Self::Diamond | Self::Cross => 2,
        }
    }
}

// ---------------------------------------------------------------------------
// Resources
// ---------------------------------------------------------------------------

/// A kind of player resource tracked by the resource pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    /// Line slots that may be opened.
    Lines,
    /// Trains that may be placed on lines.
    Trains,
    /// Tunnels for water-crossing segments.
    Tunnels,
    /// Bridges for water-crossing segments (used after tunnels run out).
    Bridges,
    /// Wagons that raise a train's capacity.
    Wagons,
}

impl ResourceKind {
    /// Every resource kind, in audit order.
    pub const ALL: [Self; 5] = [
        Self::Lines,
        Self::Trains,
        Self::Tunnels,
        Self::Bridges,
        Self::Wagons,
    ];
}

/// How a water-crossing segment is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CrossingKind {
    /// The segment runs under the water.
    Tunnel,
    /// The segment runs over the water.
    Bridge,
}

/// Travel direction of a shuttle train along its line's station sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Direction {
    /// Towards higher station indices.
    #[default]
    Forward,
    /// Towards lower station indices.
    Backward,
}

impl Direction {
    /// Return the opposite direction.
    pub const fn reversed(self) -> Self {
        match self {
            Self::Forward => Self::Backward,
            Self::Backward => Self::Forward,
        }
    }

    /// Return the index that follows `index` in this direction, if any.
    ///
    /// `len` is the number of stations on the line.
    pub const fn step(self, index: usize, len: usize) -> Option<usize> {
        match self {
            Self::Forward => {
                let next = index.saturating_add(1);
                if next < len { Some(next) } else { None }
            }
            Self::Backward => index.checked_sub(1),
        }
    }
}

// ---------------------------------------------------------------------------
// Session settings
// ---------------------------------------------------------------------------

/// Rule set for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameMode {
    /// All constraints apply: resources are limited and overcrowding ends the session.
    #[default]
    Normal,
    /// No-fail mode: overcrowding never halts the session.
    Endless,
    /// Sandbox mode: resources are unconstrained, overcrowding never halts,
    /// and stations may be added or removed by hand.
    Creative,
}

impl GameMode {
    /// Whether an overloaded station may halt the session.
    pub const fn can_fail(self) -> bool {
        matches!(self, Self::Normal)
    }

    /// Whether resource availability is enforced.
    pub const fn resources_constrained(self) -> bool {
        !matches!(self, Self::Creative)
    }
}

/// User-selected simulation speed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TimeMultiplier {
    /// 0x: time does not advance.
    Paused,
    /// 1x.
    #[default]
    Normal,
    /// 2x.
    Fast,
    /// 4x.
    Fastest,
}

impl TimeMultiplier {
    /// Return the scale factor applied to real elapsed time.
    pub const fn factor(self) -> f64 {
        match self {
            Self::Paused => 0.0,
            Self::Normal => 1.0,
            Self::Fast => 2.0,
            Self::Fastest => 4.0,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn common_shapes_outweigh_rare_ones() {
        let common: u32 = Shape::ALL
            .iter()
            .filter(|s| s.is_common())
            .map(|s| s.spawn_weight())
            .sum();
        let rare: u32 = Shape::ALL
            .iter()
            .filter(|s| !s.is_common())
            .map(|s| s.spawn_weight())
            .sum();
        assert!(common > rare);
    }

    #[test]
    fn direction_steps_stop_at_ends() {
        assert_eq!(Direction::Forward.step(0, 3), Some(1));
        assert_eq!(Direction::Forward.step(2, 3), None);
        assert_eq!(Direction::Backward.step(2, 3), Some(1));
        assert_eq!(Direction::Backward.step(0, 3), None);
        assert_eq!(Direction::Forward.reversed(), Direction::Backward);
    }

    #[test]
    fn mode_rules() {
        assert!(GameMode::Normal.can_fail());
        assert!(!GameMode::Endless.can_fail());
        assert!(!GameMode::Creative.can_fail());
        assert!(GameMode::Endless.resources_constrained());
        assert!(!GameMode::Creative.resources_constrained());
    }

    #[test]
    fn game_mode_serializes_snake_case() {
        let json = serde_json::to_string(&GameMode::Creative).unwrap();
        assert_eq!(json, "\"creative\"");
    }
}
