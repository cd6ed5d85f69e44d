//! Per-node split evaluation.
//!
//! Every splittable candidate feature is searched independently for its best
//! admissible condition; the winner across features is the one with the
//! highest gain, ties going to the lowest feature index. Because the
//! per-feature searches are pure, they can run sequentially or via rayon
//! with identical results.

use rayon::prelude::*;
use thiserror::Error;

use super::{categorical, numerical, SplitInfo, GAIN_EPSILON};
use crate::data::{ColumnValues, Dataset};
use crate::training::scorer::{LabelStats, SplitScorer};

/// Per-feature parallelism is not worth the fork/join overhead below this
/// many candidates.
const MIN_FEATURES_FOR_PARALLEL: usize = 4;

/// Admissibility constraints for candidate splits.
#[derive(Clone, Copy, Debug)]
pub struct SplitParams {
    pub min_examples_per_leaf: u32,
    pub min_gain: f64,
}

/// The node's label statistics degenerated (non-finite labels or weights).
/// The builder turns the offending node into a leaf rather than failing the
/// whole training run.
#[derive(Debug, Error)]
#[error("split evaluation failed: {detail}")]
pub struct NodeEvaluationError {
    pub detail: String,
}

/// Find the best admissible split for a node.
///
/// # Arguments
/// * `features` - candidate feature column ids, ascending.
/// * `examples` - example ids in the node.
/// * `parallel` - evaluate features via rayon when worthwhile.
///
/// Returns `Ok(None)` when no candidate clears `min_gain` and the leaf
/// minima; the caller then finalizes the node as a leaf.
pub fn find_best_split<S: SplitScorer>(
    dataset: &Dataset,
    features: &[u32],
    examples: &[u32],
    scorer: &S,
    params: &SplitParams,
    parallel: bool,
) -> Result<Option<SplitInfo>, NodeEvaluationError> {
    let parent = scorer.stats_of(examples);
    if !parent.is_finite() {
        return Err(NodeEvaluationError {
            detail: format!(
                "non-finite label statistics over {} examples",
                examples.len()
            ),
        });
    }
    if (parent.count() as usize) < 2 * params.min_examples_per_leaf as usize {
        return Ok(None);
    }
    let parent_score = scorer.score(&parent);

    let candidates: Vec<Option<SplitInfo>> =
        if parallel && features.len() >= MIN_FEATURES_FOR_PARALLEL {
            features
                .par_iter()
                .map(|&f| best_for_feature(dataset, f, examples, scorer, &parent, parent_score, params))
                .collect()
        } else {
            features
                .iter()
                .map(|&f| best_for_feature(dataset, f, examples, scorer, &parent, parent_score, params))
                .collect()
        };

    // Candidates arrive in ascending feature order; only a strictly larger
    // gain displaces an earlier winner.
    let mut best: Option<SplitInfo> = None;
    for candidate in candidates.into_iter().flatten() {
        if best.as_ref().map_or(true, |b| candidate.gain > b.gain + GAIN_EPSILON) {
            best = Some(candidate);
        }
    }
    Ok(best)
}

fn best_for_feature<S: SplitScorer>(
    dataset: &Dataset,
    feature: u32,
    examples: &[u32],
    scorer: &S,
    parent: &S::Stats,
    parent_score: f64,
    params: &SplitParams,
) -> Option<SplitInfo> {
    match dataset.column(feature).values() {
        ColumnValues::Numerical(values) => numerical::best_numerical_split(
            feature, values, examples, scorer, parent, parent_score, params,
        ),
        ColumnValues::Boolean(values) => numerical::best_boolean_split(
            feature, values, examples, scorer, parent, parent_score, params,
        ),
        ColumnValues::Categorical { codes, dictionary } => {
            categorical::best_categorical_split(
                feature,
                codes,
                dictionary.len(),
                examples,
                scorer,
                parent,
                parent_score,
                params,
            )
        }
        // Hash and set columns are never candidate features.
        _ => None,
    }
}
