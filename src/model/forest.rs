//! The trained forest model.

use serde::{Deserialize, Serialize};

use crate::config::Task;
use crate::data::Dataset;

use super::tree::{LeafValue, Tree};

/// How per-tree outputs combine into the ensemble prediction.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum Aggregation {
    /// Mean over trees (bagging). Classification averages leaf
    /// distributions; the predicted class is the argmax.
    Average,
    /// Sum over trees plus a base score (boosting). Leaf values already
    /// carry the learning rate.
    Sum { base_score: f32 },
}

/// An immutable trained decision forest.
///
/// Created incrementally by the forest trainer (only the coordinating
/// thread appends trees) and frozen when training finishes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Model {
    task: Task,
    label: String,
    /// Label vocabulary by code for categorical labels (index 0 is the OOV
    /// sentinel); empty for numerical labels.
    classes: Vec<String>,
    aggregation: Aggregation,
    trees: Vec<Tree>,
}

impl Model {
    /// An empty model skeleton for the trainer to fill.
    pub(crate) fn new(
        task: Task,
        label: impl Into<String>,
        classes: Vec<String>,
        aggregation: Aggregation,
    ) -> Self {
        Self {
            task,
            label: label.into(),
            classes,
            aggregation,
            trees: Vec::new(),
        }
    }

    /// Append a completed tree. Trainer-internal; called only from the
    /// coordinating thread.
    pub(crate) fn push_tree(&mut self, tree: Tree) {
        self.trees.push(tree);
    }

    /// Drop all trees past `n` (early-stopping best snapshot).
    pub(crate) fn truncate(&mut self, n: usize) {
        self.trees.truncate(n);
    }

    /// Learning task this model was trained for.
    pub fn task(&self) -> Task {
        self.task
    }

    /// Label column name.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Label vocabulary for categorical labels (code order, OOV first).
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    /// Aggregation rule.
    pub fn aggregation(&self) -> Aggregation {
        self.aggregation
    }

    /// Trees in training order.
    pub fn trees(&self) -> &[Tree] {
        &self.trees
    }

    /// Number of trees.
    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }

    /// Scalar prediction for one example: regression mean, ranking score,
    /// treatment effect, or boosted raw score.
    pub fn predict_row(&self, dataset: &Dataset, example: usize) -> f32 {
        match self.aggregation {
            Aggregation::Average => {
                if self.trees.is_empty() {
                    return 0.0;
                }
                let sum: f32 = self
                    .trees
                    .iter()
                    .map(|tree| tree.predict_row(dataset, example))
                    .sum();
                sum / self.trees.len() as f32
            }
            Aggregation::Sum { base_score } => {
                base_score
                    + self
                        .trees
                        .iter()
                        .map(|tree| tree.predict_row(dataset, example))
                        .sum::<f32>()
            }
        }
    }

    /// Scalar predictions for every example.
    pub fn predict(&self, dataset: &Dataset) -> Vec<f32> {
        (0..dataset.num_examples())
            .map(|example| self.predict_row(dataset, example))
            .collect()
    }

    /// Class-probability vector for one example, indexed by label code.
    ///
    /// Bagging averages leaf distributions; binary boosting applies the
    /// logistic function to the raw score, assigning the probability to the
    /// highest label code.
    pub fn predict_distribution_row(&self, dataset: &Dataset, example: usize) -> Vec<f32> {
        let num_classes = self.classes.len().max(2);
        match self.aggregation {
            Aggregation::Average => {
                let mut acc = vec![0.0f32; num_classes];
                if self.trees.is_empty() {
                    return acc;
                }
                for tree in &self.trees {
                    match tree.route(dataset, example) {
                        LeafValue::Distribution(d) => {
                            for (slot, v) in acc.iter_mut().zip(d) {
                                *slot += v;
                            }
                        }
                        LeafValue::Scalar(v) => acc[0] += v,
                    }
                }
                let n = self.trees.len() as f32;
                for slot in &mut acc {
                    *slot /= n;
                }
                acc
            }
            Aggregation::Sum { .. } => {
                let score = self.predict_row(dataset, example);
                let p = 1.0 / (1.0 + (-score).exp());
                let mut dist = vec![0.0f32; num_classes];
                dist[num_classes - 1] = p;
                dist[1.min(num_classes - 1)] = 1.0 - p;
                dist
            }
        }
    }

    /// Predicted class code for one example: argmax of the distribution,
    /// ties broken towards the lowest code.
    pub fn predict_class_row(&self, dataset: &Dataset, example: usize) -> u32 {
        let dist = self.predict_distribution_row(dataset, example);
        let mut best = 0usize;
        for (code, &p) in dist.iter().enumerate().skip(1) {
            if p > dist[best] {
                best = code;
            }
        }
        best as u32
    }
}
