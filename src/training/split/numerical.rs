//! Exact numerical split search.
//!
//! Sort the node's (value, example) pairs and sweep left to right,
//! accumulating label statistics. A threshold candidate exists between every
//! pair of distinct consecutive values; the threshold is their midpoint so
//! routing is robust to values near the boundary. Missing values (NaN) are
//! accumulated separately and always routed left.

use super::{evaluator::SplitParams, SplitInfo, GAIN_EPSILON};
use crate::model::SplitCondition;
use crate::training::scorer::{LabelStats, SplitScorer};

pub(super) fn best_numerical_split<S: SplitScorer>(
    feature: u32,
    values: &[f32],
    examples: &[u32],
    scorer: &S,
    parent: &S::Stats,
    parent_score: f64,
    params: &SplitParams,
) -> Option<SplitInfo> {
    let mut pairs: Vec<(f32, u32)> = Vec::with_capacity(examples.len());
    let mut missing = scorer.empty();
    for &example in examples {
        let v = values[example as usize];
        if v.is_nan() {
            scorer.accumulate(&mut missing, example);
        } else {
            pairs.push((v, example));
        }
    }
    if pairs.len() < 2 {
        return None;
    }
    pairs.sort_unstable_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

    // Missing values go left under every candidate threshold.
    let mut left = missing;
    let mut best: Option<SplitInfo> = None;

    for window in 0..pairs.len() - 1 {
        let (value, example) = pairs[window];
        scorer.accumulate(&mut left, example);
        let next_value = pairs[window + 1].0;
        if value >= next_value {
            continue;
        }

        let mut right = parent.clone();
        right.subtract(&left);
        if left.count() < params.min_examples_per_leaf as u64
            || right.count() < params.min_examples_per_leaf as u64
        {
            continue;
        }

        let gain = scorer.score(&left) + scorer.score(&right) - parent_score;
        if gain <= params.min_gain + GAIN_EPSILON {
            continue;
        }
        if best.as_ref().map_or(true, |b| gain > b.gain + GAIN_EPSILON) {
            let mut threshold = (value + next_value) / 2.0;
            if !threshold.is_finite() {
                threshold = value;
            }
            best = Some(SplitInfo {
                condition: SplitCondition::Numerical {
                    feature,
                    threshold,
                    missing_left: true,
                },
                gain,
            });
        }
    }
    best
}

/// Boolean split: false and missing route left, true routes right. There is
/// only one candidate partition per boolean feature.
pub(super) fn best_boolean_split<S: SplitScorer>(
    feature: u32,
    values: &[u8],
    examples: &[u32],
    scorer: &S,
    parent: &S::Stats,
    parent_score: f64,
    params: &SplitParams,
) -> Option<SplitInfo> {
    let mut left = scorer.empty();
    let mut right = scorer.empty();
    for &example in examples {
        if values[example as usize] == 1 {
            scorer.accumulate(&mut right, example);
        } else {
            scorer.accumulate(&mut left, example);
        }
    }
    if left.count() < params.min_examples_per_leaf as u64
        || right.count() < params.min_examples_per_leaf as u64
    {
        return None;
    }
    let gain = scorer.score(&left) + scorer.score(&right) - parent_score;
    if gain <= params.min_gain + GAIN_EPSILON {
        return None;
    }
    Some(SplitInfo {
        condition: SplitCondition::Boolean { feature, missing_left: true },
        gain,
    })
}
