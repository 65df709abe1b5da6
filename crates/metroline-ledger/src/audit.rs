//! Resource invariant validator.
//!
//! For every resource kind `k`, immediately after an audit:
//!
//! ```text
//! available[k] == total[k] - active[k]   (clamped at zero)
//! ```
//!
//! `active` is recomputed from the live network on every run; nothing
//! incremental feeds into it. A disagreement between the stored
//! `available` and the recomputed one is a leak. Leaks are logged and
//! corrected, never surfaced as failures.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use metroline_types::{GameMode, ResourceKind};
use metroline_world::Network;

use crate::pool::ResourcePool;

/// Units of each resource the live topology consumes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveUsage {
    /// Live lines.
    pub lines: u32,
    /// Trains on all lines.
    pub trains: u32,
    /// Crossings attributed to tunnels.
    pub tunnels: u32,
    /// Crossings beyond the tunnel total.
    pub bridges: u32,
    /// Wagons across all trains.
    pub wagons: u32,
}

impl ActiveUsage {
    /// Usage of `kind`.
    pub const fn get(&self, kind: ResourceKind) -> u32 {
        match kind {
            ResourceKind::Lines => self.lines,
            ResourceKind::Trains => self.trains,
            ResourceKind::Tunnels => self.tunnels,
            ResourceKind::Bridges => self.bridges,
            ResourceKind::Wagons => self.wagons,
        }
    }

    /// Total water crossings on the network.
    pub const fn crossings(&self) -> u32 {
        self.tunnels.saturating_add(self.bridges)
    }
}

/// A stored `available` value that disagreed with the recomputed one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLeak {
    /// The affected resource.
    pub kind: ResourceKind,
    /// What the pool held before the audit.
    pub recorded: u32,
    /// What the audit wrote back.
    pub recomputed: u32,
}

/// Result of one audit run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditReport {
    /// Usage measured on the network.
    pub usage: ActiveUsage,
    /// Counters that had drifted and were corrected.
    pub leaks: Vec<ResourceLeak>,
    /// Kinds whose usage exceeds the total (available clamped to zero).
    pub overcommitted: Vec<ResourceKind>,
    /// True when the audit did not touch the pool (sandbox mode).
    pub skipped: bool,
}

impl AuditReport {
    /// Whether the pool matched the topology.
    pub fn is_clean(&self) -> bool {
        self.leaks.is_empty() && self.overcommitted.is_empty()
    }
}

fn count(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

/// Measure what the network consumes, allocating crossings to tunnels up
/// to `tunnel_total` and the rest to bridges.
pub fn measure_usage(network: &Network, tunnel_total: u32) -> ActiveUsage {
    let crossings = count(network.lines().map(|l| l.crossing_count()).sum());
    let tunnels = crossings.min(tunnel_total);
    ActiveUsage {
        lines: count(network.line_count()),
        trains: count(network.lines().map(|l| l.trains.len()).sum()),
        tunnels,
        bridges: crossings.saturating_sub(tunnels),
        wagons: network
            .trains()
            .fold(0_u32, |acc, t| acc.saturating_add(t.wagons)),
    }
}

/// Recompute active usage and overwrite every `available` counter.
///
/// A no-op in [`GameMode::Creative`], where resources are unconstrained;
/// the returned report then has `skipped` set and the measured usage for
/// display.
pub fn audit(network: &Network, pool: &mut ResourcePool, mode: GameMode) -> AuditReport {
    let usage = measure_usage(network, pool.total(ResourceKind::Tunnels));
    if !mode.resources_constrained() {
        return AuditReport {
            usage,
            skipped: true,
            ..AuditReport::default()
        };
    }

    let mut report = AuditReport {
        usage,
        ..AuditReport::default()
    };

    for kind in ResourceKind::ALL {
        let counter = pool.counter_mut(kind);
        let active = usage.get(kind);
        let recomputed = counter.total.saturating_sub(active);
        if active > counter.total {
            warn!(?kind, active, total = counter.total, "resource overcommitted");
            report.overcommitted.push(kind);
        }
        if counter.available != recomputed {
            warn!(
                ?kind,
                recorded = counter.available,
                recomputed,
                "resource leak corrected"
            );
            report.leaks.push(ResourceLeak {
                kind,
                recorded: counter.available,
                recomputed,
            });
            counter.available = recomputed;
        }
    }

    debug!(
        lines = usage.lines,
        trains = usage.trains,
        crossings = usage.crossings(),
        wagons = usage.wagons,
        leaks = report.leaks.len(),
        "resource audit complete"
    );
    report
}
