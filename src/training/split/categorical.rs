//! Categorical split search by greedy subset growth.
//!
//! Exhausting the `2^(k-1)` bipartitions is intractable for large
//! vocabularies, so the left set is grown one code at a time: each round
//! moves the code whose transfer improves the gain the most, and the growth
//! stops at the first round with no improving move. The best configuration
//! seen along the way becomes the split. Missing values are folded into the
//! out-of-vocabulary code before lookup, matching inference routing.

use super::{evaluator::SplitParams, SplitInfo, GAIN_EPSILON};
use crate::data::{MISSING_CATEGORICAL, OOV_CODE};
use crate::model::SplitCondition;
use crate::training::scorer::{LabelStats, SplitScorer};

pub(super) fn best_categorical_split<S: SplitScorer>(
    feature: u32,
    codes: &[u32],
    vocab_size: usize,
    examples: &[u32],
    scorer: &S,
    parent: &S::Stats,
    parent_score: f64,
    params: &SplitParams,
) -> Option<SplitInfo> {
    // Per-code accumulators over the node's examples.
    let mut per_code: Vec<S::Stats> = (0..vocab_size).map(|_| scorer.empty()).collect();
    for &example in examples {
        let mut code = codes[example as usize];
        if code == MISSING_CATEGORICAL {
            code = OOV_CODE;
        }
        scorer.accumulate(&mut per_code[code as usize], example);
    }

    let present: Vec<u32> = (0..vocab_size as u32)
        .filter(|&c| per_code[c as usize].count() > 0)
        .collect();
    if present.len() < 2 {
        return None;
    }

    let mut in_left = vec![false; vocab_size];
    let mut left = scorer.empty();
    let mut moves: Vec<u32> = Vec::new();
    let mut current_gain = f64::NEG_INFINITY;
    let mut best: Option<(usize, f64)> = None; // (moves taken, gain)

    // Never move every present code left; one must remain on the right.
    for _ in 0..present.len() - 1 {
        let mut round_best: Option<(u32, f64)> = None;
        for &code in &present {
            if in_left[code as usize] {
                continue;
            }
            let mut trial_left = left.clone();
            trial_left.merge(&per_code[code as usize]);
            let mut trial_right = parent.clone();
            trial_right.subtract(&trial_left);
            let gain =
                scorer.score(&trial_left) + scorer.score(&trial_right) - parent_score;
            // Strict improvement keeps the lowest code on ties.
            if round_best.map_or(true, |(_, g)| gain > g + GAIN_EPSILON) {
                round_best = Some((code, gain));
            }
        }
        let (code, gain) = round_best?;
        if gain <= current_gain + GAIN_EPSILON {
            break;
        }
        in_left[code as usize] = true;
        left.merge(&per_code[code as usize]);
        moves.push(code);
        current_gain = gain;

        let mut right = parent.clone();
        right.subtract(&left);
        let admissible = left.count() >= params.min_examples_per_leaf as u64
            && right.count() >= params.min_examples_per_leaf as u64
            && gain > params.min_gain + GAIN_EPSILON;
        if admissible && best.map_or(true, |(_, g)| gain > g + GAIN_EPSILON) {
            best = Some((moves.len(), gain));
        }
    }

    let (num_moves, gain) = best?;
    let mut left_codes: Vec<u32> = moves[..num_moves].to_vec();
    left_codes.sort_unstable();
    Some(SplitInfo {
        condition: SplitCondition::Categorical { feature, left_codes },
        gain,
    })
}
