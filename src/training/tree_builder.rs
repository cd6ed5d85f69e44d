//! Recursive tree growth.
//!
//! A node starts as the owner of an example-id slice, evaluates its
//! candidate features, and either finalizes as a leaf or partitions its
//! examples by the winning condition and recurses. Sibling subtrees are
//! independent and may grow via `rayon::join`; determinism is preserved
//! because every node derives its feature-sampling seed from its position,
//! not from scheduling order.

use std::sync::Mutex;

use crate::config::FeatureSampling;
use crate::data::Dataset;
use crate::model::{LeafValue, Node, NodeKind, SplitCondition, Tree};
use crate::utils::splitmix64;

use super::cancel::CancelToken;
use super::scorer::SplitScorer;
use super::split::{find_best_split, SplitParams};

/// Below this many examples a subtree grows sequentially; fork/join
/// overhead dominates on small nodes.
const MIN_EXAMPLES_FOR_PARALLEL: usize = 2048;

// Stream separators for deriving child seeds from a node seed.
const LEFT_SEED_TAG: u64 = 0x9e3779b97f4a7c15;
const RIGHT_SEED_TAG: u64 = 0xd1b54a32d192ed03;

/// Growth parameters for one tree.
#[derive(Clone, Debug)]
pub(crate) struct TreeBuildParams {
    pub max_depth: u32,
    pub min_examples_per_leaf: u32,
    pub min_gain: f64,
    pub feature_sampling: FeatureSampling,
}

/// Why tree growth was abandoned.
#[derive(Debug)]
pub(crate) enum GrowError {
    /// The cancel token fired; the partial tree is discarded.
    Cancelled,
    /// An internal invariant was violated; training must fail.
    Fatal(String),
}

/// A finished tree plus warnings raised while growing it.
pub(crate) struct BuiltTree {
    pub tree: Tree,
    pub warnings: Vec<String>,
}

/// Grows one tree over a fixed example sample.
pub(crate) struct TreeBuilder<'a, S: SplitScorer> {
    dataset: &'a Dataset,
    scorer: &'a S,
    features: &'a [u32],
    params: TreeBuildParams,
    /// Allow intra-tree parallelism (per-feature and sibling subtrees).
    parallel: bool,
    cancel: &'a CancelToken,
}

enum GrownNode {
    Leaf {
        value: LeafValue,
        count: u32,
    },
    Internal {
        condition: SplitCondition,
        count: u32,
        left: Box<GrownNode>,
        right: Box<GrownNode>,
    },
}

impl<'a, S: SplitScorer> TreeBuilder<'a, S> {
    pub fn new(
        dataset: &'a Dataset,
        scorer: &'a S,
        features: &'a [u32],
        params: TreeBuildParams,
        parallel: bool,
        cancel: &'a CancelToken,
    ) -> Self {
        Self { dataset, scorer, features, params, parallel, cancel }
    }

    /// Grow a tree over `examples`. `seed` drives all feature sampling in
    /// this tree; every node derives its own seed from it.
    pub fn build(&self, examples: Vec<u32>, seed: u64) -> Result<BuiltTree, GrowError> {
        let warnings = Mutex::new(Vec::new());
        let root = self.grow(examples, 0, splitmix64(seed), &warnings)?;

        let mut nodes = Vec::new();
        flatten(root, &mut nodes);
        Ok(BuiltTree {
            tree: Tree::from_nodes(nodes),
            warnings: warnings.into_inner().unwrap_or_default(),
        })
    }

    fn grow(
        &self,
        examples: Vec<u32>,
        depth: u32,
        seed: u64,
        warnings: &Mutex<Vec<String>>,
    ) -> Result<GrownNode, GrowError> {
        if self.cancel.is_cancelled() {
            return Err(GrowError::Cancelled);
        }
        let count = examples.len() as u32;
        let stats = self.scorer.stats_of(&examples);

        if depth >= self.params.max_depth
            || examples.len() < 2 * self.params.min_examples_per_leaf as usize
        {
            return Ok(self.leaf(&stats, count));
        }

        let candidates = self.candidate_features(seed);
        let split_params = SplitParams {
            min_examples_per_leaf: self.params.min_examples_per_leaf,
            min_gain: self.params.min_gain,
        };
        let split = match find_best_split(
            self.dataset,
            &candidates,
            &examples,
            self.scorer,
            &split_params,
            self.parallel && examples.len() >= MIN_EXAMPLES_FOR_PARALLEL,
        ) {
            Ok(split) => split,
            Err(err) => {
                // A degenerate node becomes a leaf; the run continues.
                if let Ok(mut w) = warnings.lock() {
                    w.push(format!("node forced to leaf at depth {depth}: {err}"));
                }
                return Ok(self.leaf(&stats, count));
            }
        };
        let Some(split) = split else {
            return Ok(self.leaf(&stats, count));
        };

        let mut left_examples = Vec::new();
        let mut right_examples = Vec::new();
        for &example in &examples {
            if split.condition.goes_left(self.dataset, example as usize) {
                left_examples.push(example);
            } else {
                right_examples.push(example);
            }
        }
        // The evaluator promised an admissible partition; an empty side
        // means evaluation and routing disagreed, which would silently
        // corrupt every downstream prediction.
        if left_examples.is_empty() || right_examples.is_empty() {
            return Err(GrowError::Fatal(format!(
                "split on feature {} produced an empty child ({} / {} examples)",
                split.condition.feature(),
                left_examples.len(),
                right_examples.len(),
            )));
        }

        let left_seed = splitmix64(seed ^ LEFT_SEED_TAG);
        let right_seed = splitmix64(seed ^ RIGHT_SEED_TAG);
        let spawn = self.parallel
            && left_examples.len() >= MIN_EXAMPLES_FOR_PARALLEL
            && right_examples.len() >= MIN_EXAMPLES_FOR_PARALLEL;

        let (left, right) = if spawn {
            rayon::join(
                || self.grow(left_examples, depth + 1, left_seed, warnings),
                || self.grow(right_examples, depth + 1, right_seed, warnings),
            )
        } else {
            (
                self.grow(left_examples, depth + 1, left_seed, warnings),
                self.grow(right_examples, depth + 1, right_seed, warnings),
            )
        };
        let (left, right) = match (left, right) {
            (Ok(left), Ok(right)) => (left, right),
            (Err(GrowError::Fatal(msg)), _) | (_, Err(GrowError::Fatal(msg))) => {
                return Err(GrowError::Fatal(msg))
            }
            _ => return Err(GrowError::Cancelled),
        };

        Ok(GrownNode::Internal {
            condition: split.condition,
            count,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    fn leaf(&self, stats: &S::Stats, count: u32) -> GrownNode {
        GrownNode::Leaf { value: self.scorer.leaf_value(stats), count }
    }

    fn candidate_features(&self, seed: u64) -> Vec<u32> {
        let count = self.params.feature_sampling.candidates(self.features.len());
        super::sampling::sample_features(seed, self.features, count)
    }
}

/// Preorder flatten into the arena layout `Tree` expects.
fn flatten(node: GrownNode, nodes: &mut Vec<Node>) -> u32 {
    let id = nodes.len() as u32;
    match node {
        GrownNode::Leaf { value, count } => {
            nodes.push(Node { kind: NodeKind::Leaf { value }, num_examples: count });
        }
        GrownNode::Internal { condition, count, left, right } => {
            nodes.push(Node {
                // Child ids are patched after the subtrees are laid out.
                kind: NodeKind::Internal { condition, left: 0, right: 0 },
                num_examples: count,
            });
            let left_id = flatten(*left, nodes);
            let right_id = flatten(*right, nodes);
            if let NodeKind::Internal { left, right, .. } = &mut nodes[id as usize].kind {
                *left = left_id;
                *right = right_id;
            }
        }
    }
    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Column;
    use crate::training::scorer::RegressionScorer;
    use approx::assert_relative_eq;

    fn dataset(x: Vec<f32>, y: Vec<f32>) -> Dataset {
        Dataset::builder()
            .column(Column::numerical("x", x))
            .column(Column::numerical("y", y))
            .label("y")
            .build()
            .unwrap()
    }

    fn params(max_depth: u32) -> TreeBuildParams {
        TreeBuildParams {
            max_depth,
            min_examples_per_leaf: 1,
            min_gain: 0.0,
            feature_sampling: FeatureSampling::All,
        }
    }

    #[test]
    fn grows_a_perfect_stump() {
        let ds = dataset(vec![1.0, 2.0, 3.0, 4.0], vec![0.0, 0.0, 10.0, 10.0]);
        let labels = [0.0, 0.0, 10.0, 10.0];
        let scorer = RegressionScorer::new(&labels, None);
        let cancel = CancelToken::new();
        let builder =
            TreeBuilder::new(&ds, &scorer, ds.feature_ids(), params(1), false, &cancel);

        let built = builder.build(vec![0, 1, 2, 3], 42).unwrap();
        assert!(built.warnings.is_empty());
        assert_eq!(built.tree.num_leaves(), 2);
        assert_relative_eq!(built.tree.predict_row(&ds, 0), 0.0);
        assert_relative_eq!(built.tree.predict_row(&ds, 3), 10.0);
    }

    #[test]
    fn child_example_counts_sum_to_parent() {
        let ds = dataset(
            (0..64).map(|i| i as f32).collect(),
            (0..64).map(|i| (i % 7) as f32).collect(),
        );
        let labels: Vec<f32> = (0..64).map(|i| (i % 7) as f32).collect();
        let scorer = RegressionScorer::new(&labels, None);
        let cancel = CancelToken::new();
        let builder =
            TreeBuilder::new(&ds, &scorer, ds.feature_ids(), params(4), false, &cancel);

        let built = builder.build((0..64).collect(), 7).unwrap();
        for node in built.tree.nodes() {
            if let NodeKind::Internal { left, right, .. } = &node.kind {
                let sum = built.tree.node(*left).num_examples
                    + built.tree.node(*right).num_examples;
                assert_eq!(sum, node.num_examples);
            }
        }
        assert_eq!(built.tree.node(0).num_examples, 64);
    }

    #[test]
    fn depth_zero_means_a_single_leaf_at_the_mean() {
        let ds = dataset(vec![1.0, 2.0, 3.0], vec![3.0, 6.0, 9.0]);
        let labels = [3.0, 6.0, 9.0];
        let scorer = RegressionScorer::new(&labels, None);
        let cancel = CancelToken::new();
        let builder =
            TreeBuilder::new(&ds, &scorer, ds.feature_ids(), params(0), false, &cancel);

        let built = builder.build(vec![0, 1, 2], 1).unwrap();
        assert_eq!(built.tree.num_nodes(), 1);
        assert_relative_eq!(built.tree.predict_row(&ds, 0), 6.0);
    }

    #[test]
    fn cancelled_token_aborts_growth() {
        let ds = dataset(vec![1.0, 2.0, 3.0, 4.0], vec![0.0, 0.0, 10.0, 10.0]);
        let labels = [0.0, 0.0, 10.0, 10.0];
        let scorer = RegressionScorer::new(&labels, None);
        let cancel = CancelToken::new();
        cancel.cancel();
        let builder =
            TreeBuilder::new(&ds, &scorer, ds.feature_ids(), params(3), false, &cancel);

        assert!(matches!(
            builder.build(vec![0, 1, 2, 3], 42),
            Err(GrowError::Cancelled)
        ));
    }

    #[test]
    fn non_finite_labels_force_a_leaf_with_warning() {
        let ds = dataset(vec![1.0, 2.0, 3.0, 4.0], vec![0.0, f32::NAN, 10.0, 10.0]);
        let labels = [0.0, f32::NAN, 10.0, 10.0];
        let scorer = RegressionScorer::new(&labels, None);
        let cancel = CancelToken::new();
        let builder =
            TreeBuilder::new(&ds, &scorer, ds.feature_ids(), params(3), false, &cancel);

        let built = builder.build(vec![0, 1, 2, 3], 42).unwrap();
        assert_eq!(built.tree.num_nodes(), 1);
        assert_eq!(built.warnings.len(), 1);
        assert!(built.warnings[0].contains("forced to leaf"));
    }

    #[test]
    fn same_seed_same_tree() {
        let x: Vec<f32> = (0..128).map(|i| ((i * 37) % 101) as f32).collect();
        let y: Vec<f32> = x.iter().map(|v| (v * 0.5).sin()).collect();
        let ds = dataset(x, y.clone());
        let scorer = RegressionScorer::new(&y, None);
        let cancel = CancelToken::new();
        let p = TreeBuildParams {
            max_depth: 5,
            min_examples_per_leaf: 2,
            min_gain: 0.0,
            feature_sampling: FeatureSampling::All,
        };
        let builder =
            TreeBuilder::new(&ds, &scorer, ds.feature_ids(), p, false, &cancel);

        let a = builder.build((0..128).collect(), 99).unwrap();
        let b = builder.build((0..128).collect(), 99).unwrap();
        assert_eq!(a.tree, b.tree);
    }
}
