//! Total and available counters per resource kind.

use serde::{Deserialize, Serialize};
use tracing::debug;

use metroline_types::ResourceKind;

use crate::LedgerError;

/// The two counters tracked for one resource kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceCounter {
    /// Units granted so far. Never decreases.
    pub total: u32,
    /// Units not committed to the live topology.
    pub available: u32,
}

impl ResourceCounter {
    /// A counter with everything available.
    pub const fn full(total: u32) -> Self {
        Self {
            total,
            available: total,
        }
    }
}

/// Resource counters for a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourcePool {
    /// Line slots.
    pub lines: ResourceCounter,
    /// Trains.
    pub trains: ResourceCounter,
    /// Tunnels.
    pub tunnels: ResourceCounter,
    /// Bridges.
    pub bridges: ResourceCounter,
    /// Wagons.
    pub wagons: ResourceCounter,
}

impl ResourcePool {
    /// Build a pool from starting totals. Kinds not listed start at zero.
    pub fn from_totals(totals: impl IntoIterator<Item = (ResourceKind, u32)>) -> Self {
        let mut pool = Self::default();
        for (kind, total) in totals {
            *pool.counter_mut(kind) = ResourceCounter::full(total);
        }
        pool
    }

    /// The counters for `kind`.
    pub const fn counter(&self, kind: ResourceKind) -> ResourceCounter {
        match kind {
            ResourceKind::Lines => self.lines,
            ResourceKind::Trains => self.trains,
            ResourceKind::Tunnels => self.tunnels,
            ResourceKind::Bridges => self.bridges,
            ResourceKind::Wagons => self.wagons,
        }
    }

    /// Mutable counters for `kind`.
    pub fn counter_mut(&mut self, kind: ResourceKind) -> &mut ResourceCounter {
        match kind {
            ResourceKind::Lines => &mut self.lines,
            ResourceKind::Trains => &mut self.trains,
            ResourceKind::Tunnels => &mut self.tunnels,
            ResourceKind::Bridges => &mut self.bridges,
            ResourceKind::Wagons => &mut self.wagons,
        }
    }

    /// Units granted so far.
    pub const fn total(&self, kind: ResourceKind) -> u32 {
        self.counter(kind).total
    }

    /// Units free to commit.
    pub const fn available(&self, kind: ResourceKind) -> u32 {
        self.counter(kind).available
    }

    /// Whether at least `n` units are free.
    pub const fn has(&self, kind: ResourceKind, n: u32) -> bool {
        self.available(kind) >= n
    }

    /// Free crossing capacity: tunnels plus bridges.
    pub const fn crossings_available(&self) -> u32 {
        self.tunnels.available.saturating_add(self.bridges.available)
    }

    /// Grant `n` more units. Raises both `total` and `available`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Overflow`] if the total would overflow.
    pub fn credit(&mut self, kind: ResourceKind, n: u32) -> Result<u32, LedgerError> {
        let counter = self.counter_mut(kind);
        let total = counter
            .total
            .checked_add(n)
            .ok_or(LedgerError::Overflow { kind })?;
        counter.total = total;
        counter.available = counter.available.saturating_add(n).min(total);
        debug!(?kind, granted = n, total, "resource credited");
        Ok(total)
    }

    /// Commit `n` units to the topology.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Insufficient`] if fewer than `n` are free.
    /// The pool is unchanged on error.
    pub fn try_consume(&mut self, kind: ResourceKind, n: u32) -> Result<(), LedgerError> {
        let counter = self.counter_mut(kind);
        counter.available =
            counter
                .available
                .checked_sub(n)
                .ok_or(LedgerError::Insufficient {
                    kind,
                    requested: n,
                    available: counter.available,
                })?;
        Ok(())
    }

    /// Commit one crossing, drawing a tunnel first and a bridge otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Insufficient`] (reported against tunnels)
    /// when neither is free.
    pub fn try_consume_crossing(&mut self) -> Result<(), LedgerError> {
        if self.tunnels.available > 0 {
            self.try_consume(ResourceKind::Tunnels, 1)
        } else if self.bridges.available > 0 {
            self.try_consume(ResourceKind::Bridges, 1)
        } else {
            Err(LedgerError::Insufficient {
                kind: ResourceKind::Tunnels,
                requested: 1,
                available: 0,
            })
        }
    }

    /// Return one crossing. Bridges are returned first, mirroring the
    /// tunnels-first allocation.
    pub fn release_crossing(&mut self) {
        if self.bridges.available < self.bridges.total {
            self.release(ResourceKind::Bridges, 1);
        } else {
            self.release(ResourceKind::Tunnels, 1);
        }
    }

    /// Return `n` units to the free pool, never above `total`.
    pub fn release(&mut self, kind: ResourceKind, n: u32) {
        let counter = self.counter_mut(kind);
        counter.available = counter.available.saturating_add(n).min(counter.total);
    }

    /// Free every unit of every kind, as if the topology were empty.
    pub fn release_all(&mut self) {
        for kind in ResourceKind::ALL {
            let counter = self.counter_mut(kind);
            counter.available = counter.total;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn pool() -> ResourcePool {
        ResourcePool::from_totals([
            (ResourceKind::Lines, 3),
            (ResourceKind::Trains, 3),
            (ResourceKind::Tunnels, 1),
        ])
    }

    #[test]
    fn starting_totals_are_fully_available() {
        let p = pool();
        assert_eq!(p.total(ResourceKind::Lines), 3);
        assert_eq!(p.available(ResourceKind::Lines), 3);
        assert_eq!(p.total(ResourceKind::Wagons), 0);
    }

    #[test]
    fn consume_fails_without_touching_pool() {
        let mut p = pool();
        p.try_consume(ResourceKind::Trains, 3).unwrap();
        let before = p;
        let err = p.try_consume(ResourceKind::Trains, 1).unwrap_err();
        assert_eq!(
            err,
            LedgerError::Insufficient {
                kind: ResourceKind::Trains,
                requested: 1,
                available: 0
            }
        );
        assert_eq!(p, before);
    }

    #[test]
    fn credit_raises_total_and_available() {
        let mut p = pool();
        p.try_consume(ResourceKind::Lines, 2).unwrap();
        assert_eq!(p.credit(ResourceKind::Lines, 1).unwrap(), 4);
        assert_eq!(p.available(ResourceKind::Lines), 2);
    }

    #[test]
    fn release_is_capped_at_total() {
        let mut p = pool();
        p.release(ResourceKind::Lines, 10);
        assert_eq!(p.available(ResourceKind::Lines), 3);
    }

    #[test]
    fn crossings_prefer_tunnels() {
        let mut p = pool();
        p.credit(ResourceKind::Bridges, 1).unwrap();
        p.try_consume_crossing().unwrap();
        assert_eq!(p.available(ResourceKind::Tunnels), 0);
        assert_eq!(p.available(ResourceKind::Bridges), 1);
        p.try_consume_crossing().unwrap();
        assert_eq!(p.available(ResourceKind::Bridges), 0);
        assert!(p.try_consume_crossing().is_err());
        p.release_crossing();
        assert_eq!(p.available(ResourceKind::Bridges), 1);
        p.release_crossing();
        assert_eq!(p.available(ResourceKind::Tunnels), 1);
    }

    #[test]
    fn pool_serializes() {
        let p = pool();
        let json = serde_json::to_string(&p).unwrap();
        let back: ResourcePool = serde_json::from_str(&json).unwrap();
        assert_eq!(p, back);
    }
}
