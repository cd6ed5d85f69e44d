//! Single-tree representation.
//!
//! Trees are arena-backed: nodes live in one `Vec`, the root is index 0 and
//! children are referenced by index. A tree is immutable once grown.

use serde::{Deserialize, Serialize};

use crate::data::{ColumnValues, Dataset, MISSING_BOOLEAN, MISSING_CATEGORICAL, OOV_CODE};

/// Split condition of an internal node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SplitCondition {
    /// Numerical: `value <= threshold` routes left.
    Numerical {
        feature: u32,
        threshold: f32,
        /// Where missing values go.
        missing_left: bool,
    },
    /// Categorical: codes in `left_codes` (sorted) route left. Missing
    /// values are evaluated as the OOV code.
    Categorical { feature: u32, left_codes: Vec<u32> },
    /// Boolean: false routes left, true routes right.
    Boolean { feature: u32, missing_left: bool },
}

impl SplitCondition {
    /// Feature column id this condition tests.
    pub fn feature(&self) -> u32 {
        match self {
            SplitCondition::Numerical { feature, .. }
            | SplitCondition::Categorical { feature, .. }
            | SplitCondition::Boolean { feature, .. } => *feature,
        }
    }

    /// Evaluate the condition for one example.
    ///
    /// Used both for inference routing and for index partitioning during
    /// training, so the two can never disagree.
    #[inline]
    pub fn goes_left(&self, dataset: &Dataset, example: usize) -> bool {
        match self {
            SplitCondition::Numerical { feature, threshold, missing_left } => {
                match dataset.column(*feature).values() {
                    ColumnValues::Numerical(values) => {
                        let v = values[example];
                        if v.is_nan() {
                            *missing_left
                        } else {
                            v <= *threshold
                        }
                    }
                    _ => *missing_left,
                }
            }
            SplitCondition::Categorical { feature, left_codes } => {
                match dataset.column(*feature).values() {
                    ColumnValues::Categorical { codes, .. } => {
                        let mut code = codes[example];
                        if code == MISSING_CATEGORICAL {
                            code = OOV_CODE;
                        }
                        left_codes.binary_search(&code).is_ok()
                    }
                    _ => false,
                }
            }
            SplitCondition::Boolean { feature, missing_left } => {
                match dataset.column(*feature).values() {
                    ColumnValues::Boolean(values) => match values[example] {
                        MISSING_BOOLEAN => *missing_left,
                        v => v == 0,
                    },
                    _ => *missing_left,
                }
            }
        }
    }
}

/// Prediction stored in a leaf.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum LeafValue {
    /// Scalar prediction: regression mean, ranking score, boosted step or
    /// numerical treatment effect.
    Scalar(f32),
    /// Class-probability vector indexed by label code (classification), or
    /// per-class treatment effects (categorical uplift).
    Distribution(Vec<f32>),
}

impl LeafValue {
    /// Scalar view; the first component for distributions.
    pub fn scalar(&self) -> f32 {
        match self {
            LeafValue::Scalar(v) => *v,
            LeafValue::Distribution(d) => d.first().copied().unwrap_or(0.0),
        }
    }
}

/// Content of a node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum NodeKind {
    /// Internal node with exactly two children.
    Internal {
        condition: SplitCondition,
        left: u32,
        right: u32,
    },
    /// Terminal node.
    Leaf { value: LeafValue },
}

/// One tree node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub kind: NodeKind,
    /// Number of training examples that reached this node.
    pub num_examples: u32,
}

/// A grown decision tree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    /// Wrap a node arena. Node 0 must be the root and child indices must be
    /// in bounds; the tree builder guarantees this.
    pub(crate) fn from_nodes(nodes: Vec<Node>) -> Self {
        debug_assert!(!nodes.is_empty());
        Self { nodes }
    }

    /// All nodes, root first.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Node by arena index.
    pub fn node(&self, id: u32) -> &Node {
        &self.nodes[id as usize]
    }

    /// Total node count.
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Leaf count.
    pub fn num_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n.kind, NodeKind::Leaf { .. }))
            .count()
    }

    /// Route one example to its leaf.
    pub fn route(&self, dataset: &Dataset, example: usize) -> &LeafValue {
        let mut id = 0usize;
        loop {
            match &self.nodes[id].kind {
                NodeKind::Leaf { value } => return value,
                NodeKind::Internal { condition, left, right } => {
                    id = if condition.goes_left(dataset, example) {
                        *left as usize
                    } else {
                        *right as usize
                    };
                }
            }
        }
    }

    /// Scalar prediction for one example.
    pub fn predict_row(&self, dataset: &Dataset, example: usize) -> f32 {
        self.route(dataset, example).scalar()
    }
}
