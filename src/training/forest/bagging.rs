//! Bagged (random forest) training.
//!
//! Trees are independent given their pre-drawn seeds, so they train in
//! waves of up to one tree per worker thread. The coordinating thread alone
//! appends finished trees to the model, in index order, which keeps the
//! result identical to a single-threaded run. Cancellation is observed at
//! wave boundaries and inside tree growth; trees finished before the
//! cancellation point are kept.

use rayon::prelude::*;

use crate::config::{BaggingParams, TrainingConfig};
use crate::data::Dataset;
use crate::model::{Aggregation, Model};
use crate::training::callback::{EarlyStopAction, EarlyStopping};
use crate::training::checkpoint::Checkpointer;
use crate::training::eval::ValidTracker;
use crate::training::logger::TrainingLogger;
use crate::training::sampling;
use crate::training::scorer::SplitScorer;
use crate::training::tree_builder::{BuiltTree, GrowError, TreeBuildParams, TreeBuilder};
use crate::training::{TrainError, TrainSession, TrainingOutput, TrainingStatus};

use super::{sample_seed, tree_seeds};

#[allow(clippy::too_many_arguments)]
pub(super) fn run<S: SplitScorer>(
    config: &TrainingConfig,
    params: &BaggingParams,
    train: &Dataset,
    session: &TrainSession<'_>,
    logger: &TrainingLogger,
    parallel: bool,
    scorer: &S,
    classes: Vec<String>,
    mut tracker: Option<ValidTracker>,
    mut warnings: Vec<String>,
) -> Result<TrainingOutput, TrainError> {
    let num_examples = train.num_examples();
    let num_trees = config.num_trees;
    let seeds = tree_seeds(config.seed, num_trees);
    let tree_params = TreeBuildParams {
        max_depth: config.tree.max_depth,
        min_examples_per_leaf: config.tree.min_examples_per_leaf,
        min_gain: config.tree.min_gain as f64,
        feature_sampling: config.tree.feature_sampling,
    };

    let mut model = Model::new(config.task, config.label.clone(), classes, Aggregation::Average);
    let mut checkpointer =
        Checkpointer::from_deployment(&config.deployment, config.fingerprint());
    let mut start_tree = 0u32;
    if let Some(cp) = &checkpointer {
        if let Some(snapshot) = cp.resume(logger) {
            start_tree = snapshot.next_tree.min(num_trees);
            model = snapshot.model;
        }
    }

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

    // Bring the validation state up to date with resumed trees.
    if start_tree > 0 {
        if let (Some(tracker), Some(valid)) = (tracker.as_mut(), session.valid) {
            for (i, tree) in model.trees().iter().enumerate() {
                tracker.add_tree(tree, valid);
                if let Some(early) = early.as_mut() {
                    early.update(tracker.value(i + 1));
                }
            }
        }
    }

    logger.start("bagging", num_trees, num_examples, train.feature_ids().len());
    let wave = if parallel { rayon::current_num_threads().max(1) } else { 1 };
    let mut status = TrainingStatus::Completed;
    let mut next_tree = start_tree;

    'waves: while next_tree < num_trees {
        if session.cancel.is_cancelled() {
            status = TrainingStatus::Cancelled;
            break;
        }
        let wave_end = (next_tree + wave as u32).min(num_trees);
        let indices: Vec<u32> = (next_tree..wave_end).collect();

        let build_one = |&index: &u32| -> Result<BuiltTree, GrowError> {
            let seed = seeds[index as usize];
            let examples = if params.bootstrap {
                sampling::bootstrap_sample(sample_seed(seed), num_examples, params.examples_ratio)
            } else {
                sampling::subsample(sample_seed(seed), num_examples, params.examples_ratio)
            };
            TreeBuilder::new(
                train,
                scorer,
                train.feature_ids(),
                tree_params.clone(),
                parallel,
                &session.cancel,
            )
            .build(examples, seed)
        };
        let results: Vec<Result<BuiltTree, GrowError>> = if parallel {
            indices.par_iter().map(build_one).collect()
        } else {
            indices.iter().map(build_one).collect()
        };

        // Append strictly in index order; a cancelled tree discards every
        // later tree of the wave.
        for result in results {
            match result {
                Ok(built) => {
                    warnings.extend(built.warnings);
                    let metric = match (tracker.as_mut(), session.valid) {
                        (Some(tracker), Some(valid)) => {
                            tracker.add_tree(&built.tree, valid);
                            Some((tracker.name(), tracker.value(model.num_trees() + 1)))
                        }
                        _ => None,
                    };
                    model.push_tree(built.tree);
                    next_tree += 1;
                    if let Some(callback) = &session.on_tree_complete {
                        callback(next_tree, num_trees);
                    }
                    logger.round(next_tree - 1, num_trees, metric);
                    if let (Some(early), Some((_, value))) = (early.as_mut(), metric) {
                        if early.update(value) == EarlyStopAction::Stop {
                            let best_round = early.best_round();
                            model.truncate(best_round as usize + 1);
                            status = TrainingStatus::EarlyStopped { best_round };
                            break 'waves;
                        }
                    }
                }
                Err(GrowError::Fatal(message)) => return Err(TrainError::Fatal(message)),
                Err(GrowError::Cancelled) => {
                    status = TrainingStatus::Cancelled;
                    break 'waves;
                }
            }
        }
        if let Some(cp) = checkpointer.as_mut() {
            cp.maybe_save(&model, next_tree, logger);
        }
    }

    finish(model, status, warnings, checkpointer, session, logger)
}

/// Shared run epilogue: snapshot bookkeeping and the cancellation policy.
pub(super) fn finish(
    model: Model,
    status: TrainingStatus,
    warnings: Vec<String>,
    mut checkpointer: Option<Checkpointer>,
    session: &TrainSession<'_>,
    logger: &TrainingLogger,
) -> Result<TrainingOutput, TrainError> {
    if status == TrainingStatus::Cancelled {
        // Leave a snapshot behind so a later run can pick up the work.
        if let Some(cp) = checkpointer.as_mut() {
            cp.save(&model, model.num_trees() as u32, logger);
        }
        if !session.keep_partial_on_cancel {
            return Err(TrainError::Cancelled);
        }
        logger.info(&format!("cancelled after {} trees", model.num_trees()));
        return Ok(TrainingOutput { model, status, warnings });
    }
    if let Some(cp) = checkpointer.as_ref() {
        cp.discard(logger);
    }
    logger.finish(model.num_trees());
    Ok(TrainingOutput { model, status, warnings })
}
