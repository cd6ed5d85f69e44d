//! Gradient-boosted training.
//!
//! Rounds are strictly sequential: each tree fits the Newton
//! gradient/hessian of the running ensemble's predictions, so parallelism
//! lives inside a round (per-feature search and sibling subtrees). Example
//! weights are folded into the gradients once per round.

use crate::config::{BoostingParams, TrainingConfig};
use crate::data::Dataset;
use crate::model::{Aggregation, Model};
use crate::training::callback::{EarlyStopAction, EarlyStopping};
use crate::training::checkpoint::Checkpointer;
use crate::training::eval::ValidTracker;
use crate::training::logger::TrainingLogger;
use crate::training::sampling;
use crate::training::scorer::GradientScorer;
use crate::training::tree_builder::{GrowError, TreeBuildParams, TreeBuilder};
use crate::training::{TrainError, TrainSession, TrainingOutput, TrainingStatus};

use super::bagging::finish;
use super::{sample_seed, tree_seeds};

/// Hessians are floored at this value so leaf steps stay bounded on
/// saturated sigmoid outputs.
const MIN_HESSIAN: f32 = 1e-6;

#[inline]
fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Differentiable training objective.
pub(in crate::training) enum Objective<'a> {
    /// Squared error on a numerical label.
    SquaredError { labels: &'a [f32] },
    /// Log loss on a binary label; `positives[i]` marks the positive class.
    BinaryLogLoss { positives: Vec<bool> },
}

impl Objective<'_> {
    /// The constant prediction minimizing the objective: the weighted label
    /// mean, or the log-odds of the positive class.
    fn base_score(&self, weights: Option<&[f32]>) -> f32 {
        let weight_of = |i: usize| weights.map_or(1.0, |w| w[i] as f64);
        match self {
            Objective::SquaredError { labels } => {
                let mut sum = 0.0f64;
                let mut total = 0.0f64;
                for (i, &y) in labels.iter().enumerate() {
                    sum += weight_of(i) * y as f64;
                    total += weight_of(i);
                }
                if total > 0.0 { (sum / total) as f32 } else { 0.0 }
            }
            Objective::BinaryLogLoss { positives } => {
                let mut positive = 0.0f64;
                let mut total = 0.0f64;
                for (i, &is_positive) in positives.iter().enumerate() {
                    if is_positive {
                        positive += weight_of(i);
                    }
                    total += weight_of(i);
                }
                let p = if total > 0.0 { positive / total } else { 0.5 };
                let p = p.clamp(1e-6, 1.0 - 1e-6);
                (p / (1.0 - p)).ln() as f32
            }
        }
    }

    /// First and second derivatives of the loss at the current predictions,
    /// with example weights folded in.
    fn gradients(
        &self,
        preds: &[f32],
        weights: Option<&[f32]>,
        grads: &mut [f32],
        hess: &mut [f32],
    ) {
        let weight_of = |i: usize| weights.map_or(1.0, |w| w[i]);
        match self {
            Objective::SquaredError { labels } => {
                for i in 0..preds.len() {
                    let w = weight_of(i);
                    grads[i] = (preds[i] - labels[i]) * w;
                    hess[i] = w;
                }
            }
            Objective::BinaryLogLoss { positives } => {
                for i in 0..preds.len() {
                    let w = weight_of(i);
                    let p = sigmoid(preds[i]);
                    let y = if positives[i] { 1.0 } else { 0.0 };
                    grads[i] = (p - y) * w;
                    hess[i] = (p * (1.0 - p)).max(MIN_HESSIAN) * w;
                }
            }
        }
    }
}

/// Validation targets, shaped before the base score is known.
pub(in crate::training) enum ValidTargets {
    Squared { targets: Vec<f32>, weights: Option<Vec<f32>> },
    Binary { positives: Vec<bool>, weights: Option<Vec<f32>> },
}

impl ValidTargets {
    fn into_tracker(self, base_score: f32) -> ValidTracker {
        match self {
            ValidTargets::Squared { targets, weights } => {
                ValidTracker::rmse(targets, weights, base_score, false)
            }
            ValidTargets::Binary { positives, weights } => {
                ValidTracker::binary_score(positives, weights, base_score)
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
pub(super) fn run(
    config: &TrainingConfig,
    params: &BoostingParams,
    train: &Dataset,
    session: &TrainSession<'_>,
    logger: &TrainingLogger,
    parallel: bool,
    objective: Objective<'_>,
    classes: Vec<String>,
    valid_targets: Option<ValidTargets>,
    mut warnings: Vec<String>,
) -> Result<TrainingOutput, TrainError> {
    let num_examples = train.num_examples();
    let num_trees = config.num_trees;
    let seeds = tree_seeds(config.seed, num_trees);
    let weights = train.weights();
    let base_score = objective.base_score(weights);
    let tree_params = TreeBuildParams {
        max_depth: config.tree.max_depth,
        min_examples_per_leaf: config.tree.min_examples_per_leaf,
        min_gain: config.tree.min_gain as f64,
        feature_sampling: config.tree.feature_sampling,
    };

    let mut model = Model::new(
        config.task,
        config.label.clone(),
        classes,
        Aggregation::Sum { base_score },
    );
    let mut checkpointer =
        Checkpointer::from_deployment(&config.deployment, config.fingerprint());
    let mut start_round = 0u32;
    if let Some(cp) = &checkpointer {
        if let Some(snapshot) = cp.resume(logger) {
            start_round = snapshot.next_tree.min(num_trees);
            model = snapshot.model;
        }
    }
    // Predictions of the resumed ensemble; `predict` already includes the
    // base score.
    let mut preds = if start_round > 0 {
        model.predict(train)
    } else {
        vec![base_score; num_examples]
    };

    let mut tracker = valid_targets.map(|targets| targets.into_tracker(base_score));
    let mut early = match (config.early_stopping_rounds, &tracker) {
        (0, _) => None,
        (patience, Some(t)) => Some(EarlyStopping::new(patience, t.higher_is_better())),
        (_, None) => {
            let message = "early_stopping_rounds is set but no validation data was provided";
            logger.warn(message);
            warnings.push(message.to_string());
            None
        }
    };
    if start_round > 0 {
        if let (Some(tracker), Some(valid)) = (tracker.as_mut(), session.valid) {
            for (i, tree) in model.trees().iter().enumerate() {
                tracker.add_tree(tree, valid);
                if let Some(early) = early.as_mut() {
                    early.update(tracker.value(i + 1));
                }
            }
        }
    }

    logger.start("boosting", num_trees, num_examples, train.feature_ids().len());
    let mut status = TrainingStatus::Completed;
    let mut grads = vec![0.0f32; num_examples];
    let mut hess = vec![0.0f32; num_examples];

    for round in start_round..num_trees {
        if session.cancel.is_cancelled() {
            status = TrainingStatus::Cancelled;
            break;
        }
        objective.gradients(&preds, weights, &mut grads, &mut hess);
        let scorer = GradientScorer::new(
            &grads,
            &hess,
            params.reg_lambda as f64,
            params.learning_rate as f64,
        );
        let seed = seeds[round as usize];
        let examples = sampling::subsample(sample_seed(seed), num_examples, params.subsample);
        let built = TreeBuilder::new(
            train,
            &scorer,
            train.feature_ids(),
            tree_params.clone(),
            parallel,
            &session.cancel,
        )
        .build(examples, seed);

        match built {
            Ok(built) => {
                warnings.extend(built.warnings);
                for (example, pred) in preds.iter_mut().enumerate() {
                    *pred += built.tree.predict_row(train, example);
                }
                let metric = match (tracker.as_mut(), session.valid) {
                    (Some(tracker), Some(valid)) => {
                        tracker.add_tree(&built.tree, valid);
                        Some((tracker.name(), tracker.value(round as usize + 1)))
                    }
                    _ => None,
                };
                model.push_tree(built.tree);
                if let Some(callback) = &session.on_tree_complete {
                    callback(round + 1, num_trees);
                }
                logger.round(round, num_trees, metric);
                if let (Some(early), Some((_, value))) = (early.as_mut(), metric) {
                    if early.update(value) == EarlyStopAction::Stop {
                        let best_round = early.best_round();
                        model.truncate(best_round as usize + 1);
                        status = TrainingStatus::EarlyStopped { best_round };
                        break;
                    }
                }
                if let Some(cp) = checkpointer.as_mut() {
                    cp.maybe_save(&model, round + 1, logger);
                }
            }
            Err(GrowError::Fatal(message)) => return Err(TrainError::Fatal(message)),
            Err(GrowError::Cancelled) => {
                status = TrainingStatus::Cancelled;
                break;
            }
        }
    }

    finish(model, status, warnings, checkpointer, session, logger)
}
