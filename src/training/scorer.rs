//! Task-specific split scoring.
//!
//! The split evaluator is task-agnostic: it accumulates [`LabelStats`] for
//! candidate partitions and asks a [`SplitScorer`] for the node score. The
//! gain of a split is `score(left) + score(right) - score(parent)`, so each
//! scorer only defines a per-node score:
//!
//! - regression: negative weighted sum of squared errors (variance
//!   reduction),
//! - classification: negative weighted Gini impurity,
//! - ranking: variance reduction over group-mean-centered labels (a
//!   pairwise surrogate),
//! - uplift: weighted Euclidean divergence between treated and control
//!   outcome means,
//! - boosting: the Newton gain `G^2 / 2(H + lambda)` on gradients.
//!
//! Scorers are pure and borrow the label/weight columns read-only, which
//! makes per-feature evaluation safe to parallelize.

use std::collections::HashMap;

use crate::model::LeafValue;

// =============================================================================
// Stats traits
// =============================================================================

/// Additive label statistics for a set of examples.
pub trait LabelStats: Clone + Send + Sync {
    /// Add another accumulator into this one.
    fn merge(&mut self, other: &Self);
    /// Remove another accumulator from this one (`right = parent - left`).
    fn subtract(&mut self, other: &Self);
    /// Total example weight.
    fn weight(&self) -> f64;
    /// Number of examples.
    fn count(&self) -> u64;
    /// False when the accumulated sums degenerated (NaN/infinite labels).
    fn is_finite(&self) -> bool;
}

/// Task-specific node scoring over [`LabelStats`].
pub trait SplitScorer: Sync {
    type Stats: LabelStats;

    /// An empty accumulator.
    fn empty(&self) -> Self::Stats;

    /// Fold one example into the accumulator.
    fn accumulate(&self, stats: &mut Self::Stats, example: u32);

    /// Node score; higher is better. Gains are score sums over children
    /// minus the parent score.
    fn score(&self, stats: &Self::Stats) -> f64;

    /// Leaf prediction for a node with these statistics.
    fn leaf_value(&self, stats: &Self::Stats) -> LeafValue;

    /// Accumulate a whole example set.
    fn stats_of(&self, examples: &[u32]) -> Self::Stats {
        let mut stats = self.empty();
        for &example in examples {
            self.accumulate(&mut stats, example);
        }
        stats
    }
}

// =============================================================================
// Numerical statistics (regression, ranking)
// =============================================================================

/// Weighted first and second moments of a numerical label.
#[derive(Clone, Debug, Default)]
pub struct NumericalStats {
    pub count: u64,
    pub weight: f64,
    pub sum: f64,
    pub sum_sq: f64,
}

impl NumericalStats {
    #[inline]
    fn add(&mut self, value: f64, weight: f64) {
        self.count += 1;
        self.weight += weight;
        self.sum += value * weight;
        self.sum_sq += value * value * weight;
    }

    /// Weighted mean; 0 for an empty accumulator.
    #[inline]
    pub fn mean(&self) -> f64 {
        if self.weight > 0.0 {
            self.sum / self.weight
        } else {
            0.0
        }
    }

    /// Negative weighted sum of squared errors around the mean.
    #[inline]
    fn neg_sse(&self) -> f64 {
        if self.weight > 0.0 {
            -(self.sum_sq - self.sum * self.sum / self.weight)
        } else {
            0.0
        }
    }
}

impl LabelStats for NumericalStats {
    fn merge(&mut self, other: &Self) {
        self.count += other.count;
        self.weight += other.weight;
        self.sum += other.sum;
        self.sum_sq += other.sum_sq;
    }

    fn subtract(&mut self, other: &Self) {
        self.count -= other.count;
        self.weight -= other.weight;
        self.sum -= other.sum;
        self.sum_sq -= other.sum_sq;
    }

    fn weight(&self) -> f64 {
        self.weight
    }

    fn count(&self) -> u64 {
        self.count
    }

    fn is_finite(&self) -> bool {
        self.weight.is_finite() && self.sum.is_finite() && self.sum_sq.is_finite()
    }
}

/// Variance-reduction scorer for numerical labels.
///
/// Also used for ranking with group-mean-centered labels as the target.
pub struct RegressionScorer<'a> {
    labels: &'a [f32],
    weights: Option<&'a [f32]>,
}

impl<'a> RegressionScorer<'a> {
    pub fn new(labels: &'a [f32], weights: Option<&'a [f32]>) -> Self {
        Self { labels, weights }
    }

    #[inline]
    fn weight_of(&self, example: u32) -> f64 {
        self.weights.map_or(1.0, |w| w[example as usize] as f64)
    }
}

impl SplitScorer for RegressionScorer<'_> {
    type Stats = NumericalStats;

    fn empty(&self) -> NumericalStats {
        NumericalStats::default()
    }

    fn accumulate(&self, stats: &mut NumericalStats, example: u32) {
        stats.add(self.labels[example as usize] as f64, self.weight_of(example));
    }

    fn score(&self, stats: &NumericalStats) -> f64 {
        stats.neg_sse()
    }

    fn leaf_value(&self, stats: &NumericalStats) -> LeafValue {
        LeafValue::Scalar(stats.mean() as f32)
    }
}

/// Center labels to a zero mean within each ranking group.
///
/// Examples are only compared within their group, so the cross-group label
/// offset carries no ranking information; removing it turns variance
/// reduction into a within-group (pairwise surrogate) criterion.
pub fn center_labels_by_group(labels: &[f32], group_keys: &[u64]) -> Vec<f32> {
    let mut sums: HashMap<u64, (f64, u64)> = HashMap::new();
    for (&label, &key) in labels.iter().zip(group_keys) {
        let entry = sums.entry(key).or_default();
        entry.0 += label as f64;
        entry.1 += 1;
    }
    labels
        .iter()
        .zip(group_keys)
        .map(|(&label, &key)| {
            let (sum, count) = sums[&key];
            label - (sum / count as f64) as f32
        })
        .collect()
}

// =============================================================================
// Class statistics (classification)
// =============================================================================

/// Weighted class counts.
#[derive(Clone, Debug)]
pub struct ClassStats {
    pub count: u64,
    pub weight: f64,
    pub class_weights: Vec<f64>,
}

impl ClassStats {
    fn new(num_classes: usize) -> Self {
        Self {
            count: 0,
            weight: 0.0,
            class_weights: vec![0.0; num_classes],
        }
    }

    #[inline]
    fn add(&mut self, code: u32, weight: f64) {
        self.count += 1;
        self.weight += weight;
        self.class_weights[code as usize] += weight;
    }

    /// Negative weighted Gini impurity: `-(w - sum_k w_k^2 / w)`.
    fn neg_gini(&self) -> f64 {
        if self.weight <= 0.0 {
            return 0.0;
        }
        let sum_sq: f64 = self.class_weights.iter().map(|w| w * w).sum();
        -(self.weight - sum_sq / self.weight)
    }

    /// Normalized class probabilities.
    fn distribution(&self) -> Vec<f32> {
        if self.weight <= 0.0 {
            return vec![0.0; self.class_weights.len()];
        }
        self.class_weights
            .iter()
            .map(|w| (w / self.weight) as f32)
            .collect()
    }
}

impl LabelStats for ClassStats {
    fn merge(&mut self, other: &Self) {
        self.count += other.count;
        self.weight += other.weight;
        for (slot, w) in self.class_weights.iter_mut().zip(&other.class_weights) {
            *slot += w;
        }
    }

    fn subtract(&mut self, other: &Self) {
        self.count -= other.count;
        self.weight -= other.weight;
        for (slot, w) in self.class_weights.iter_mut().zip(&other.class_weights) {
            *slot -= w;
        }
    }

    fn weight(&self) -> f64 {
        self.weight
    }

    fn count(&self) -> u64 {
        self.count
    }

    fn is_finite(&self) -> bool {
        self.weight.is_finite() && self.class_weights.iter().all(|w| w.is_finite())
    }
}

/// Gini-reduction scorer for categorical labels.
pub struct ClassificationScorer<'a> {
    codes: &'a [u32],
    weights: Option<&'a [f32]>,
    num_classes: usize,
}

impl<'a> ClassificationScorer<'a> {
    pub fn new(codes: &'a [u32], weights: Option<&'a [f32]>, num_classes: usize) -> Self {
        Self { codes, weights, num_classes }
    }
}

impl SplitScorer for ClassificationScorer<'_> {
    type Stats = ClassStats;

    fn empty(&self) -> ClassStats {
        ClassStats::new(self.num_classes)
    }

    fn accumulate(&self, stats: &mut ClassStats, example: u32) {
        let weight = self.weights.map_or(1.0, |w| w[example as usize] as f64);
        stats.add(self.codes[example as usize], weight);
    }

    fn score(&self, stats: &ClassStats) -> f64 {
        stats.neg_gini()
    }

    fn leaf_value(&self, stats: &ClassStats) -> LeafValue {
        LeafValue::Distribution(stats.distribution())
    }
}

// =============================================================================
// Uplift statistics
// =============================================================================

/// Per-arm moments for uplift on a numerical outcome.
#[derive(Clone, Debug, Default)]
pub struct UpliftStats {
    pub treated: NumericalStats,
    pub control: NumericalStats,
}

impl LabelStats for UpliftStats {
    fn merge(&mut self, other: &Self) {
        self.treated.merge(&other.treated);
        self.control.merge(&other.control);
    }

    fn subtract(&mut self, other: &Self) {
        self.treated.subtract(&other.treated);
        self.control.subtract(&other.control);
    }

    fn weight(&self) -> f64 {
        self.treated.weight + self.control.weight
    }

    fn count(&self) -> u64 {
        self.treated.count + self.control.count
    }

    fn is_finite(&self) -> bool {
        self.treated.is_finite() && self.control.is_finite()
    }
}

/// Treatment-effect divergence scorer for a numerical outcome.
///
/// Node score is `w * (mu_t - mu_c)^2` (Euclidean divergence); splits that
/// separate examples with different treatment effects gain. A node with an
/// empty arm scores zero and its effect estimate is zero.
pub struct NumericalUpliftScorer<'a> {
    outcomes: &'a [f32],
    treated: &'a [bool],
    weights: Option<&'a [f32]>,
}

impl<'a> NumericalUpliftScorer<'a> {
    pub fn new(outcomes: &'a [f32], treated: &'a [bool], weights: Option<&'a [f32]>) -> Self {
        Self { outcomes, treated, weights }
    }
}

impl SplitScorer for NumericalUpliftScorer<'_> {
    type Stats = UpliftStats;

    fn empty(&self) -> UpliftStats {
        UpliftStats::default()
    }

    fn accumulate(&self, stats: &mut UpliftStats, example: u32) {
        let value = self.outcomes[example as usize] as f64;
        let weight = self.weights.map_or(1.0, |w| w[example as usize] as f64);
        if self.treated[example as usize] {
            stats.treated.add(value, weight);
        } else {
            stats.control.add(value, weight);
        }
    }

    fn score(&self, stats: &UpliftStats) -> f64 {
        if stats.treated.weight <= 0.0 || stats.control.weight <= 0.0 {
            return 0.0;
        }
        let effect = stats.treated.mean() - stats.control.mean();
        stats.weight() * effect * effect
    }

    fn leaf_value(&self, stats: &UpliftStats) -> LeafValue {
        let effect = if stats.treated.weight > 0.0 && stats.control.weight > 0.0 {
            stats.treated.mean() - stats.control.mean()
        } else {
            0.0
        };
        LeafValue::Scalar(effect as f32)
    }
}

/// Per-arm class counts for uplift on a categorical outcome.
#[derive(Clone, Debug)]
pub struct ClassUpliftStats {
    pub treated: ClassStats,
    pub control: ClassStats,
}

impl LabelStats for ClassUpliftStats {
    fn merge(&mut self, other: &Self) {
        self.treated.merge(&other.treated);
        self.control.merge(&other.control);
    }

    fn subtract(&mut self, other: &Self) {
        self.treated.subtract(&other.treated);
        self.control.subtract(&other.control);
    }

    fn weight(&self) -> f64 {
        self.treated.weight + self.control.weight
    }

    fn count(&self) -> u64 {
        self.treated.count + self.control.count
    }

    fn is_finite(&self) -> bool {
        self.treated.is_finite() && self.control.is_finite()
    }
}

/// Treatment-effect divergence scorer for a categorical outcome.
///
/// Node score is the weighted squared Euclidean distance between the
/// treated and control class distributions.
pub struct CategoricalUpliftScorer<'a> {
    codes: &'a [u32],
    treated: &'a [bool],
    weights: Option<&'a [f32]>,
    num_classes: usize,
}

impl<'a> CategoricalUpliftScorer<'a> {
    pub fn new(
        codes: &'a [u32],
        treated: &'a [bool],
        weights: Option<&'a [f32]>,
        num_classes: usize,
    ) -> Self {
        Self { codes, treated, weights, num_classes }
    }
}

impl SplitScorer for CategoricalUpliftScorer<'_> {
    type Stats = ClassUpliftStats;

    fn empty(&self) -> ClassUpliftStats {
        ClassUpliftStats {
            treated: ClassStats::new(self.num_classes),
            control: ClassStats::new(self.num_classes),
        }
    }

    fn accumulate(&self, stats: &mut ClassUpliftStats, example: u32) {
        let code = self.codes[example as usize];
        let weight = self.weights.map_or(1.0, |w| w[example as usize] as f64);
        if self.treated[example as usize] {
            stats.treated.add(code, weight);
        } else {
            stats.control.add(code, weight);
        }
    }

    fn score(&self, stats: &ClassUpliftStats) -> f64 {
        if stats.treated.weight <= 0.0 || stats.control.weight <= 0.0 {
            return 0.0;
        }
        let treated = stats.treated.distribution();
        let control = stats.control.distribution();
        let divergence: f64 = treated
            .iter()
            .zip(&control)
            .map(|(t, c)| {
                let d = (*t - *c) as f64;
                d * d
            })
            .sum();
        stats.weight() * divergence
    }

    fn leaf_value(&self, stats: &ClassUpliftStats) -> LeafValue {
        if stats.treated.weight <= 0.0 || stats.control.weight <= 0.0 {
            return LeafValue::Distribution(vec![0.0; self.num_classes]);
        }
        let treated = stats.treated.distribution();
        let control = stats.control.distribution();
        LeafValue::Distribution(
            treated.iter().zip(&control).map(|(t, c)| t - c).collect(),
        )
    }
}

// =============================================================================
// Gradient statistics (boosting)
// =============================================================================

/// Gradient/hessian sums for one node.
#[derive(Clone, Debug, Default)]
pub struct GradientStats {
    pub count: u64,
    pub sum_grad: f64,
    pub sum_hess: f64,
}

impl LabelStats for GradientStats {
    fn merge(&mut self, other: &Self) {
        self.count += other.count;
        self.sum_grad += other.sum_grad;
        self.sum_hess += other.sum_hess;
    }

    fn subtract(&mut self, other: &Self) {
        self.count -= other.count;
        self.sum_grad -= other.sum_grad;
        self.sum_hess -= other.sum_hess;
    }

    fn weight(&self) -> f64 {
        self.sum_hess
    }

    fn count(&self) -> u64 {
        self.count
    }

    fn is_finite(&self) -> bool {
        self.sum_grad.is_finite() && self.sum_hess.is_finite()
    }
}

/// Newton-step scorer over per-example gradients and hessians.
///
/// Node score is `G^2 / 2(H + lambda)`; the leaf carries the shrunken
/// Newton step `-lr * G / (H + lambda)`. Example weights are already folded
/// into the gradient/hessian buffers by the boosting loop.
pub struct GradientScorer<'a> {
    grads: &'a [f32],
    hess: &'a [f32],
    lambda: f64,
    shrinkage: f64,
}

impl<'a> GradientScorer<'a> {
    pub fn new(grads: &'a [f32], hess: &'a [f32], lambda: f64, shrinkage: f64) -> Self {
        Self { grads, hess, lambda, shrinkage }
    }
}

impl SplitScorer for GradientScorer<'_> {
    type Stats = GradientStats;

    fn empty(&self) -> GradientStats {
        GradientStats::default()
    }

    fn accumulate(&self, stats: &mut GradientStats, example: u32) {
        stats.count += 1;
        stats.sum_grad += self.grads[example as usize] as f64;
        stats.sum_hess += self.hess[example as usize] as f64;
    }

    fn score(&self, stats: &GradientStats) -> f64 {
        stats.sum_grad * stats.sum_grad / (2.0 * (stats.sum_hess + self.lambda))
    }

    fn leaf_value(&self, stats: &GradientStats) -> LeafValue {
        let step = -self.shrinkage * stats.sum_grad / (stats.sum_hess + self.lambda);
        LeafValue::Scalar(step as f32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn variance_reduction_on_perfect_split() {
        let labels = [0.0, 0.0, 10.0, 10.0];
        let scorer = RegressionScorer::new(&labels, None);

        let parent = scorer.stats_of(&[0, 1, 2, 3]);
        let left = scorer.stats_of(&[0, 1]);
        let right = scorer.stats_of(&[2, 3]);

        let gain = scorer.score(&left) + scorer.score(&right) - scorer.score(&parent);
        // Parent SSE = 100, children SSE = 0.
        assert_relative_eq!(gain, 100.0, epsilon = 1e-9);
        assert_relative_eq!(left.mean(), 0.0);
        assert_relative_eq!(right.mean(), 10.0);
    }

    #[test]
    fn weighted_mean_respects_weights() {
        let labels = [1.0, 3.0];
        let weights = [3.0, 1.0];
        let scorer = RegressionScorer::new(&labels, Some(&weights));
        let stats = scorer.stats_of(&[0, 1]);
        assert_relative_eq!(stats.mean(), 1.5, epsilon = 1e-9);
    }

    #[test]
    fn gini_favors_pure_children() {
        let codes = [1, 1, 2, 2];
        let scorer = ClassificationScorer::new(&codes, None, 3);

        let parent = scorer.stats_of(&[0, 1, 2, 3]);
        let pure_left = scorer.stats_of(&[0, 1]);
        let pure_right = scorer.stats_of(&[2, 3]);
        let mixed_left = scorer.stats_of(&[0, 2]);
        let mixed_right = scorer.stats_of(&[1, 3]);

        let pure_gain =
            scorer.score(&pure_left) + scorer.score(&pure_right) - scorer.score(&parent);
        let mixed_gain =
            scorer.score(&mixed_left) + scorer.score(&mixed_right) - scorer.score(&parent);
        assert!(pure_gain > mixed_gain);
        assert!(pure_gain > 0.0);
        assert_relative_eq!(mixed_gain, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn classification_leaf_is_normalized() {
        let codes = [1, 1, 1, 2];
        let scorer = ClassificationScorer::new(&codes, None, 3);
        let stats = scorer.stats_of(&[0, 1, 2, 3]);
        match scorer.leaf_value(&stats) {
            LeafValue::Distribution(d) => {
                assert_relative_eq!(d[1], 0.75);
                assert_relative_eq!(d[2], 0.25);
                assert_relative_eq!(d.iter().sum::<f32>(), 1.0);
            }
            _ => panic!("expected distribution"),
        }
    }

    #[test]
    fn group_centering_removes_group_offsets() {
        let labels = [1.0, 2.0, 11.0, 12.0];
        let groups = [7, 7, 9, 9];
        let centered = center_labels_by_group(&labels, &groups);
        assert_relative_eq!(centered[0], -0.5);
        assert_relative_eq!(centered[1], 0.5);
        assert_relative_eq!(centered[2], -0.5);
        assert_relative_eq!(centered[3], 0.5);
    }

    #[test]
    fn uplift_effect_and_divergence() {
        // Treated outcomes 2.0, control outcomes 1.0: effect = 1.0.
        let outcomes = [2.0, 2.0, 1.0, 1.0];
        let treated = [true, true, false, false];
        let scorer = NumericalUpliftScorer::new(&outcomes, &treated, None);
        let stats = scorer.stats_of(&[0, 1, 2, 3]);

        assert_relative_eq!(scorer.score(&stats), 4.0, epsilon = 1e-9); // w=4, effect^2=1
        match scorer.leaf_value(&stats) {
            LeafValue::Scalar(effect) => assert_relative_eq!(effect, 1.0),
            _ => panic!("expected scalar effect"),
        }
    }

    #[test]
    fn uplift_empty_arm_scores_zero() {
        let outcomes = [2.0, 3.0];
        let treated = [true, true];
        let scorer = NumericalUpliftScorer::new(&outcomes, &treated, None);
        let stats = scorer.stats_of(&[0, 1]);
        assert_eq!(scorer.score(&stats), 0.0);
        assert_eq!(scorer.leaf_value(&stats), LeafValue::Scalar(0.0));
    }

    #[test]
    fn gradient_leaf_is_shrunken_newton_step() {
        let grads = [-2.0, -2.0];
        let hess = [1.0, 1.0];
        let scorer = GradientScorer::new(&grads, &hess, 0.0, 0.5);
        let stats = scorer.stats_of(&[0, 1]);
        // step = -0.5 * (-4 / 2) = 1.0
        assert_eq!(scorer.leaf_value(&stats), LeafValue::Scalar(1.0));
        assert_relative_eq!(scorer.score(&stats), 4.0, epsilon = 1e-9);
    }

    #[test]
    fn subtract_recovers_right_child() {
        let labels = [1.0, 2.0, 3.0, 4.0];
        let scorer = RegressionScorer::new(&labels, None);
        let parent = scorer.stats_of(&[0, 1, 2, 3]);
        let left = scorer.stats_of(&[0, 1]);

        let mut right = parent.clone();
        right.subtract(&left);
        let expected = scorer.stats_of(&[2, 3]);
        assert_eq!(right.count(), expected.count());
        assert_relative_eq!(right.sum, expected.sum, epsilon = 1e-9);
        assert_relative_eq!(right.sum_sq, expected.sum_sq, epsilon = 1e-9);
    }
}
