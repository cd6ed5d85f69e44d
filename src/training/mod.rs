//! Forest training.
//!
//! [`ForestTrainer`] validates a [`TrainingConfig`](crate::config::TrainingConfig),
//! binds it to a training [`Dataset`](crate::data::Dataset) and produces a
//! [`Model`](crate::model::Model). A [`TrainSession`] carries the per-run
//! extras: an optional validation set, a cancellation token and the policy
//! for partial results.
//!
//! Training is deterministic for a fixed configuration: every random
//! decision derives from the configured seed through per-tree and per-node
//! seed streams, so thread count and scheduling never change the trained
//! model.

mod callback;
mod cancel;
mod checkpoint;
mod eval;
mod forest;
mod logger;
mod sampling;
mod scorer;
mod split;
mod tree_builder;

pub use cancel::CancelToken;
pub use forest::ForestTrainer;
pub use logger::{TrainingLogger, Verbosity};
pub use scorer::{LabelStats, SplitScorer};
pub use split::{NodeEvaluationError, SplitInfo, GAIN_EPSILON};

use crate::config::ConfigError;
use crate::data::{Dataset, SchemaError};
use crate::model::Model;

/// Training failure.
#[derive(Debug, thiserror::Error)]
pub enum TrainError {
    /// The configuration is invalid or inconsistent with the dataset.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The dataset itself is malformed.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Training was cancelled and partial results were not requested.
    #[error("training was cancelled")]
    Cancelled,

    /// An internal invariant was violated; the partial model is unusable.
    #[error("internal training failure: {0}")]
    Fatal(String),
}

/// How a training run ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrainingStatus {
    /// All requested trees were trained.
    Completed,
    /// The validation metric stopped improving; the model is truncated to
    /// the best round.
    EarlyStopped { best_round: u32 },
    /// Cancelled mid-run; the model holds the trees completed before the
    /// cancellation was observed.
    Cancelled,
}

/// A trained model plus run metadata.
#[derive(Debug)]
pub struct TrainingOutput {
    pub model: Model,
    pub status: TrainingStatus,
    /// Non-fatal conditions encountered while training.
    pub warnings: Vec<String>,
}

/// Per-run training context.
///
/// The default session has no validation set, a fresh cancel token and
/// keeps partial models on cancellation.
pub struct TrainSession<'a> {
    /// Held-out examples for the validation metric and early stopping. Must
    /// share the training dataset's schema (and label dictionary for
    /// categorical labels).
    pub valid: Option<&'a Dataset>,
    /// Cooperative cancellation flag; clone it to cancel from another
    /// thread.
    pub cancel: CancelToken,
    /// On cancellation, return `Ok` with the partial model and
    /// [`TrainingStatus::Cancelled`] instead of [`TrainError::Cancelled`].
    pub keep_partial_on_cancel: bool,
    /// Called after each tree is appended, with (trees so far, total
    /// requested).
    pub on_tree_complete: Option<Box<dyn Fn(u32, u32) + Send + Sync + 'a>>,
}

impl Default for TrainSession<'_> {
    fn default() -> Self {
        Self {
            valid: None,
            cancel: CancelToken::new(),
            keep_partial_on_cancel: true,
            on_tree_complete: None,
        }
    }
}

impl<'a> TrainSession<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a validation set.
    pub fn with_valid(mut self, valid: &'a Dataset) -> Self {
        self.valid = Some(valid);
        self
    }
}
