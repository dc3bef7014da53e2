//! Weighted-random mirror selection.
//!
//! Target lists are single digits long, so a linear scan over cumulative
//! weights is all that is needed.

use rand::Rng;
use tidemirror_types::Target;

/// A target annotated with the running weight sum up to and including itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeightedTarget {
    pub target: Target,
    pub cumulative_weight: u64,
}

/// Source of uniform draws in `[0, upper)`. Injected so tests can pin selections.
pub trait RandomSource: Send + Sync {
    fn below(&self, upper: u64) -> u64;
}

/// Thread-local RNG backed source used in production.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn below(&self, upper: u64) -> u64 {
        if upper == 0 {
            return 0;
        }
        rand::thread_rng().gen_range(0..upper)
    }
}

/// Build the cumulative index, dropping targets with no selection mass.
pub fn build_weighted(targets: &[Target]) -> Vec<WeightedTarget> {
    let mut running: u64 = 0;
    targets
        .iter()
        .filter(|target| {
            if target.weight == 0 {
                tracing::warn!(mirror = %target.name, "Skipping zero-weight target");
                return false;
            }
            true
        })
        .map(|target| {
            running += u64::from(target.weight);
            WeightedTarget { target: target.clone(), cumulative_weight: running }
        })
        .collect()
}

pub fn total_weight(weighted: &[WeightedTarget]) -> u64 {
    weighted.last().map_or(0, |w| w.cumulative_weight)
}

/// Pick a target with probability proportional to its weight.
///
/// Returns the first element whose cumulative weight exceeds the draw.
pub fn select<'a>(weighted: &'a [WeightedTarget], random: &dyn RandomSource) -> Option<&'a Target> {
    let first = weighted.first()?;
    let total = total_weight(weighted);
    if total == 0 {
        return Some(&first.target);
    }

    let draw = random.below(total);
    weighted
        .iter()
        .find(|w| w.cumulative_weight > draw)
        .or(weighted.last())
        .map(|w| &w.target)
}
