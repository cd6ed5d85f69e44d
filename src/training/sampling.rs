//! Example and feature sampling.
//!
//! Every sampling decision flows from an explicit seed so that results are
//! independent of thread count and scheduling.

use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

/// Bootstrap sample of `(ratio * num_examples)` ids, with replacement,
/// sorted ascending. Always returns at least one example.
pub fn bootstrap_sample(seed: u64, num_examples: usize, ratio: f32) -> Vec<u32> {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    let draws = sample_size(num_examples, ratio);
    let mut sample: Vec<u32> = (0..draws)
        .map(|_| rng.gen_range(0..num_examples as u32))
        .collect();
    sample.sort_unstable();
    sample
}

/// Sample of `(ratio * num_examples)` distinct ids, sorted ascending.
/// `ratio >= 1` returns every example.
pub fn subsample(seed: u64, num_examples: usize, ratio: f32) -> Vec<u32> {
    if ratio >= 1.0 {
        return (0..num_examples as u32).collect();
    }
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    let size = sample_size(num_examples, ratio);
    let mut sample: Vec<u32> = rand::seq::index::sample(&mut rng, num_examples, size)
        .iter()
        .map(|i| i as u32)
        .collect();
    sample.sort_unstable();
    sample
}

/// Draw `count` distinct entries from `features`, sorted ascending.
/// `count >= features.len()` returns all of them.
pub fn sample_features(seed: u64, features: &[u32], count: usize) -> Vec<u32> {
    if count >= features.len() {
        return features.to_vec();
    }
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    let mut sample: Vec<u32> = rand::seq::index::sample(&mut rng, features.len(), count)
        .iter()
        .map(|i| features[i])
        .collect();
    sample.sort_unstable();
    sample
}

fn sample_size(num_examples: usize, ratio: f32) -> usize {
    ((num_examples as f64 * ratio as f64).round() as usize)
        .clamp(1, num_examples.max(1))
}
