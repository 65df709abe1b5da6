//! Route evaluator: reachability and cost queries over the line graph.
//!
//! The evaluator treats lines as nodes and shared stations as transfer
//! edges. Two queries are answered:
//!
//! - [`RouteEvaluator::can_reach`]: depth-limited search for a line that
//!   directly serves the destination shape, counting line changes.
//! - [`RouteEvaluator::cost`]: a heuristic cost for riding a line towards a
//!   shape, either directly or with a single transfer.
//!
//! Both are memoized in a [`RouteCache`]. The cache is owned by the
//! evaluator (no global state) and is dropped in full either when the
//! owner calls [`RouteEvaluator::invalidate`] or when a query observes a
//! topology version different from the one the cache was filled under.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::trace;

use metroline_types::{LineId, Shape, StationId};
use metroline_world::Network;

/// Tunable weights and limits for route evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoutingParams {
    /// Maximum number of line changes a reachability search may take.
    pub max_transfer_depth: u32,
    /// Cost per station index when the destination is on the line itself.
    pub direct_route_weight: f64,
    /// Flat cost added for a route that needs one transfer.
    pub transfer_penalty: f64,
}

impl Default for RoutingParams {
    fn default() -> Self {
        Self {
            max_transfer_depth: 2,
            direct_route_weight: 1.0,
            transfer_penalty: 5.0,
        }
    }
}

/// Heuristic cost of riding a line towards a shape.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum RouteCost {
    /// A finite cost; lower is better.
    Finite(f64),
    /// No direct or single-transfer route; worse than any finite cost.
    Unbounded,
}

impl RouteCost {
    /// Whether this cost is strictly lower than `other`.
    pub fn is_better_than(self, other: Self) -> bool {
        match (self, other) {
            (Self::Finite(a), Self::Finite(b)) => a < b,
            (Self::Finite(_), Self::Unbounded) => true,
            (Self::Unbounded, _) => false,
        }
    }

    /// The cost as a float, with [`RouteCost::Unbounded`] mapped to infinity.
    pub const fn value(self) -> f64 {
        match self {
            Self::Finite(v) => v,
            Self::Unbounded => f64::INFINITY,
        }
    }
}

/// Memoized reachability and cost results for one topology version.
#[derive(Debug, Clone, Default)]
pub struct RouteCache {
    /// Topology version the entries were computed under.
    version: Option<u64>,
    /// `(line, shape, max_depth) -> reachable`.
    reach: BTreeMap<(LineId, Shape, u32), bool>,
    /// `(line, shape) -> cost`.
    cost: BTreeMap<(LineId, Shape), RouteCost>,
    /// Queries answered from the cache since creation.
    hits: u64,
    /// Queries that had to be computed since creation.
    misses: u64,
}

impl RouteCache {
    /// Drop every memoized entry.
    pub fn clear(&mut self) {
        self.version = None;
        self.reach.clear();
        self.cost.clear();
    }

    /// Number of memoized entries (reachability plus cost).
    pub fn len(&self) -> usize {
        self.reach.len().saturating_add(self.cost.len())
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.reach.is_empty() && self.cost.is_empty()
    }

    /// `(hits, misses)` since creation.
    pub const fn stats(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }

    /// Clear the cache if it was filled under a different topology version.
    fn sync(&mut self, version: u64) {
        if self.version != Some(version) {
            if !self.is_empty() {
                trace!(old = ?self.version, new = version, "route cache reset");
            }
            self.clear();
            self.version = Some(version);
        }
    }
}

/// Reachability and cost queries over a [`Network`].
#[derive(Debug, Clone, Default)]
pub struct RouteEvaluator {
    params: RoutingParams,
    cache: RouteCache,
}

impl RouteEvaluator {
    /// Create an evaluator with an empty cache.
    pub fn new(params: RoutingParams) -> Self {
        Self {
            params,
            cache: RouteCache::default(),
        }
    }

    /// The evaluator's parameters.
    pub const fn params(&self) -> &RoutingParams {
        &self.params
    }

    /// Read access to the cache, for diagnostics.
    pub const fn cache(&self) -> &RouteCache {
        &self.cache
    }

    /// Drop every memoized result. Call after any structural change.
    pub fn invalidate(&mut self) {
        self.cache.clear();
    }

    /// Whether a station of `shape` is reachable from `line` within
    /// `max_depth` line changes.
    ///
    /// Depth 0 means `line` itself serves `shape`. The search tracks the
    /// lines visited along the current path only, so cycles in the line
    /// graph cannot loop forever but the same line may be revisited along a
    /// different path. The result is monotonic in `max_depth`.
    pub fn can_reach(
        &mut self,
        network: &Network,
        line: LineId,
        shape: Shape,
        max_depth: u32,
    ) -> bool {
        self.cache.sync(network.topology_version());
        let key = (line, shape, max_depth);
        if let Some(hit) = self.cache.reach.get(&key) {
            self.cache.hits = self.cache.hits.saturating_add(1);
            return *hit;
        }
        self.cache.misses = self.cache.misses.saturating_add(1);

        let mut path = Vec::new();
        let found = search(network, line, shape, 0, max_depth, &mut path);
        self.cache.reach.insert(key, found);
        found
    }

    /// [`Self::can_reach`] at the configured maximum transfer depth.
    pub fn can_reach_default(&mut self, network: &Network, line: LineId, shape: Shape) -> bool {
        let depth = self.params.max_transfer_depth;
        self.can_reach(network, line, shape, depth)
    }

    /// Heuristic cost of riding `line` towards `shape`.
    ///
    /// When `line` serves `shape`, the cost is the index of the first
    /// matching station times the direct-route weight. Otherwise it is the
    /// minimum, over stations of `line` that share a line serving `shape`,
    /// of the station index plus the transfer penalty. With neither, the
    /// cost is [`RouteCost::Unbounded`].
    pub fn cost(&mut self, network: &Network, line: LineId, shape: Shape) -> RouteCost {
        self.cache.sync(network.topology_version());
        let key = (line, shape);
        if let Some(hit) = self.cache.cost.get(&key) {
            self.cache.hits = self.cache.hits.saturating_add(1);
            return *hit;
        }
        self.cache.misses = self.cache.misses.saturating_add(1);

        let cost = compute_cost(network, &self.params, line, shape);
        self.cache.cost.insert(key, cost);
        cost
    }

    /// Lines through `station` that can reach `shape` within the configured depth.
    pub fn find_valid_lines(
        &mut self,
        network: &Network,
        station: StationId,
        shape: Shape,
    ) -> Vec<LineId> {
        network
            .lines_through(station)
            .into_iter()
            .filter(|line| self.can_reach_default(network, *line, shape))
            .collect()
    }

    /// The strictly cheaper of two lines towards `shape`.
    ///
    /// Returns `None` when the costs tie (including both unbounded): neither
    /// line is promoted.
    pub fn better_line(
        &mut self,
        network: &Network,
        a: LineId,
        b: LineId,
        shape: Shape,
    ) -> Option<LineId> {
        let cost_a = self.cost(network, a, shape);
        let cost_b = self.cost(network, b, shape);
        if cost_a.is_better_than(cost_b) {
            Some(a)
        } else if cost_b.is_better_than(cost_a) {
            Some(b)
        } else {
            None
        }
    }
}

/// Depth-limited search with per-path visited tracking.
fn search(
    network: &Network,
    line: LineId,
    shape: Shape,
    depth: u32,
    max_depth: u32,
    path: &mut Vec<LineId>,
) -> bool {
    if depth > max_depth {
        return false;
    }
    if network.line_has_shape(line, shape) {
        return true;
    }
    let Some(current) = network.line(line) else {
        return false;
    };

    path.push(line);
    let next_depth = depth.saturating_add(1);
    for station in &current.stations {
        for next in network.lines_through(*station) {
            if next == line || path.contains(&next) {
                continue;
            }
            if search(network, next, shape, next_depth, max_depth, path) {
                path.pop();
                return true;
            }
        }
    }
    path.pop();
    false
}

fn compute_cost(network: &Network, params: &RoutingParams, line: LineId, shape: Shape) -> RouteCost {
    if let Some(index) = network.first_index_of_shape(line, shape) {
        return RouteCost::Finite(index as f64 * params.direct_route_weight);
    }
    let Some(current) = network.line(line) else {
        return RouteCost::Unbounded;
    };

    current
        .stations
        .iter()
        .enumerate()
        .filter(|(_, station)| {
            network
                .lines_through(**station)
                .into_iter()
                .any(|other| other != line && network.line_has_shape(other, shape))
        })
        .map(|(index, _)| index as f64 + params.transfer_penalty)
        .reduce(f64::min)
        .map_or(RouteCost::Unbounded, RouteCost::Finite)
}
