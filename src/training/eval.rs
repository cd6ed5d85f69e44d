//! Incremental validation metrics.
//!
//! Each appended tree is routed once over the validation set and its output
//! folded into running per-example sums, so the after-each-tree metric costs
//! one tree traversal per round instead of re-running the whole ensemble.

use crate::data::Dataset;
use crate::model::{LeafValue, Tree};

#[inline]
fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Running validation state for one training run.
pub(crate) enum ValidTracker {
    /// RMSE over scalar tree outputs: regression, ranking (against centered
    /// labels) and boosted regression.
    Rmse {
        targets: Vec<f32>,
        weights: Option<Vec<f32>>,
        sums: Vec<f32>,
        base: f32,
        /// Average tree outputs (bagging) instead of summing (boosting).
        average: bool,
    },
    /// Accuracy over averaged leaf distributions (bagged classification).
    Vote {
        codes: Vec<u32>,
        weights: Option<Vec<f32>>,
        /// Flattened `num_examples x num_classes` distribution sums.
        dists: Vec<f64>,
        num_classes: usize,
    },
    /// Accuracy over summed scores through a sigmoid (boosted binary
    /// classification). `positives[i]` is true when the example carries the
    /// positive class.
    BinaryScore {
        positives: Vec<bool>,
        weights: Option<Vec<f32>>,
        sums: Vec<f32>,
        base: f32,
    },
}

impl ValidTracker {
    pub fn rmse(targets: Vec<f32>, weights: Option<Vec<f32>>, base: f32, average: bool) -> Self {
        let n = targets.len();
        ValidTracker::Rmse { targets, weights, sums: vec![0.0; n], base, average }
    }

    pub fn vote(codes: Vec<u32>, weights: Option<Vec<f32>>, num_classes: usize) -> Self {
        let n = codes.len();
        ValidTracker::Vote { codes, weights, dists: vec![0.0; n * num_classes], num_classes }
    }

    pub fn binary_score(positives: Vec<bool>, weights: Option<Vec<f32>>, base: f32) -> Self {
        let n = positives.len();
        ValidTracker::BinaryScore { positives, weights, sums: vec![0.0; n], base }
    }

    /// Metric name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            ValidTracker::Rmse { .. } => "rmse",
            ValidTracker::Vote { .. } | ValidTracker::BinaryScore { .. } => "accuracy",
        }
    }

    /// Direction of improvement.
    pub fn higher_is_better(&self) -> bool {
        !matches!(self, ValidTracker::Rmse { .. })
    }

    /// Fold one new tree into the running sums.
    pub fn add_tree(&mut self, tree: &Tree, valid: &Dataset) {
        match self {
            ValidTracker::Rmse { sums, .. } | ValidTracker::BinaryScore { sums, .. } => {
                for (example, sum) in sums.iter_mut().enumerate() {
                    *sum += tree.predict_row(valid, example);
                }
            }
            ValidTracker::Vote { dists, num_classes, .. } => {
                let n = dists.len() / *num_classes;
                for example in 0..n {
                    let row = &mut dists[example * *num_classes..(example + 1) * *num_classes];
                    match tree.route(valid, example) {
                        LeafValue::Distribution(d) => {
                            for (slot, p) in row.iter_mut().zip(d) {
                                *slot += *p as f64;
                            }
                        }
                        LeafValue::Scalar(v) => row[0] += *v as f64,
                    }
                }
            }
        }
    }

    /// Metric value after `num_trees` trees.
    pub fn value(&self, num_trees: usize) -> f64 {
        match self {
            ValidTracker::Rmse { targets, weights, sums, base, average } => {
                let scale = if *average && num_trees > 0 {
                    1.0 / num_trees as f32
                } else {
                    1.0
                };
                let mut sq_sum = 0.0f64;
                let mut weight_sum = 0.0f64;
                for (example, (&target, &sum)) in targets.iter().zip(sums).enumerate() {
                    let weight = weights.as_ref().map_or(1.0, |w| w[example] as f64);
                    let err = (base + sum * scale - target) as f64;
                    sq_sum += weight * err * err;
                    weight_sum += weight;
                }
                if weight_sum > 0.0 {
                    (sq_sum / weight_sum).sqrt()
                } else {
                    0.0
                }
            }
            ValidTracker::Vote { codes, weights, dists, num_classes } => {
                let mut hits = 0.0f64;
                let mut weight_sum = 0.0f64;
                for (example, &code) in codes.iter().enumerate() {
                    let row = &dists[example * *num_classes..(example + 1) * *num_classes];
                    let mut best = 0usize;
                    for (k, &p) in row.iter().enumerate() {
                        if p > row[best] {
                            best = k;
                        }
                    }
                    let weight = weights.as_ref().map_or(1.0, |w| w[example] as f64);
                    if best as u32 == code {
                        hits += weight;
                    }
                    weight_sum += weight;
                }
                if weight_sum > 0.0 {
                    hits / weight_sum
                } else {
                    0.0
                }
            }
            ValidTracker::BinaryScore { positives, weights, sums, base } => {
                let mut hits = 0.0f64;
                let mut weight_sum = 0.0f64;
                for (example, &positive) in positives.iter().enumerate() {
                    let weight = weights.as_ref().map_or(1.0, |w| w[example] as f64);
                    let predicted = sigmoid(base + sums[example]) > 0.5;
                    if predicted == positive {
                        hits += weight;
                    }
                    weight_sum += weight;
                }
                if weight_sum > 0.0 {
                    hits / weight_sum
                } else {
                    0.0
                }
            }
        }
    }
}
