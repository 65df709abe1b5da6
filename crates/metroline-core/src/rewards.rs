//! Weekly reward options.
//!
//! At every week boundary the session pauses and offers two distinct
//! options drawn from a seeded RNG. Choosing one credits its bonus to the
//! resource totals.

use rand::Rng;
use serde::{Deserialize, Serialize};

use metroline_ledger::{LedgerError, ResourcePool};
use metroline_types::ResourceKind;
use metroline_types::ids::LINE_SLOTS;

/// Errors from reward resolution.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RewardError {
    /// The session is not waiting on a reward choice.
    #[error("no reward is on offer")]
    NotOffered,

    /// The chosen index is outside the offered options.
    #[error("reward choice {index} out of range ({offered} offered)")]
    InvalidChoice {
        /// Index the caller picked.
        index: usize,
        /// Number of options on offer.
        offered: usize,
    },

    /// Crediting the bonus failed.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// A bonus the player can pick at the end of a week.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardOption {
    /// One more line slot.
    NewLine,
    /// One more train.
    ExtraTrain,
    /// One more wagon.
    Wagon,
    /// Two more tunnels.
    Tunnels,
    /// Two more bridges.
    Bridges,
}

impl RewardOption {
    /// Every option, in display order.
    pub const ALL: [Self; 5] = [
        Self::NewLine,
        Self::ExtraTrain,
        Self::Wagon,
        Self::Tunnels,
        Self::Bridges,
    ];

    /// The resource this option credits and by how much.
    pub const fn bonus(self) -> (ResourceKind, u32) {
        match self {
            Self::NewLine => (ResourceKind::Lines, 1),
            Self::ExtraTrain => (ResourceKind::Trains, 1),
            Self::Wagon => (ResourceKind::Wagons, 1),
            Self::Tunnels => (ResourceKind::Tunnels, 2),
            Self::Bridges => (ResourceKind::Bridges, 2),
        }
    }

    /// Whether the option is worth offering given the current pool.
    ///
    /// A new line is pointless once every slot is granted.
    pub fn is_eligible(self, pool: &ResourcePool) -> bool {
        match self {
            Self::NewLine => pool.total(ResourceKind::Lines) < u32::from(LINE_SLOTS),
            _ => true,
        }
    }

    /// Credit this option's bonus to `pool`.
    ///
    /// # Errors
    ///
    /// Returns [`RewardError::Ledger`] if the total would overflow.
    pub fn apply(self, pool: &mut ResourcePool) -> Result<(), RewardError> {
        let (kind, amount) = self.bonus();
        pool.credit(kind, amount)?;
        Ok(())
    }
}

/// Draw two distinct eligible options.
pub fn draw_options(rng: &mut impl Rng, pool: &ResourcePool) -> Vec<RewardOption> {
    let mut eligible: Vec<RewardOption> = RewardOption::ALL
        .into_iter()
        .filter(|o| o.is_eligible(pool))
        .collect();

    let mut drawn = Vec::with_capacity(2);
    while drawn.len() < 2 && !eligible.is_empty() {
        let index = rng.random_range(0..eligible.len());
        drawn.push(eligible.swap_remove(index));
    }
    drawn
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    #[test]
    fn draws_two_distinct_options() {
        let pool = ResourcePool::default();
        for seed in 0..200 {
            let mut rng = StdRng::seed_from_u64(seed);
            let options = draw_options(&mut rng, &pool);
            assert_eq!(options.len(), 2);
            assert_ne!(options.first(), options.get(1));
        }
    }

    #[test]
    fn same_seed_same_draw() {
        let pool = ResourcePool::default();
        let a = draw_options(&mut StdRng::seed_from_u64(9), &pool);
        let b = draw_options(&mut StdRng::seed_from_u64(9), &pool);
        assert_eq!(a, b);
    }

    #[test]
    fn full_line_slots_drop_new_line() {
        let pool = ResourcePool::from_totals([(ResourceKind::Lines, 10)]);
        for seed in 0..50 {
            let options = draw_options(&mut StdRng::seed_from_u64(seed), &pool);
            assert!(!options.contains(&RewardOption::NewLine));
        }
    }

    #[test]
    fn apply_credits_declared_bonus() {
        let mut pool = ResourcePool::default();
        for option in RewardOption::ALL {
            let (kind, amount) = option.bonus();
            let before = pool.total(kind);
            option.apply(&mut pool).unwrap();
            assert_eq!(pool.total(kind), before + amount);
        }
    }
}
