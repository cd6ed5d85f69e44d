//! Ensemble training loops.

mod bagging;
mod boosting;
mod trainer;

pub use trainer::ForestTrainer;

use rand::RngCore;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::utils::splitmix64;

/// Separates the example-sampling stream from the feature-sampling stream
/// derived from the same per-tree seed.
const SAMPLE_SEED_TAG: u64 = 0xa0761d6478bd642f;

/// Per-tree seeds, all drawn upfront from one master stream so that tree
/// `i` trains identically no matter how many trees run concurrently or
/// whether the run was resumed.
pub(super) fn tree_seeds(master_seed: u64, num_trees: u32) -> Vec<u64> {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(master_seed);
    (0..num_trees).map(|_| rng.next_u64()).collect()
}

/// Seed for the example sample of the tree with the given seed.
pub(super) fn sample_seed(tree_seed: u64) -> u64 {
    splitmix64(tree_seed ^ SAMPLE_SEED_TAG)
}
