//! The top-level training configuration.

use super::deployment::DeploymentConfig;
use super::hyperparameters::Hyperparameters;
use super::{validate_roles, ColumnRole, ConfigError, Task};

// =============================================================================
// Parameter groups
// =============================================================================

/// Per-node feature subsampling.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FeatureSampling {
    /// Consider every feature at every node.
    All,
    /// Consider `ceil(sqrt(n_features))` features per node (random forest
    /// default).
    Sqrt,
    /// Consider a fixed number of features per node.
    Count(u32),
}

impl FeatureSampling {
    /// Number of candidate features for a dataset with `n_features`.
    pub fn candidates(self, n_features: usize) -> usize {
        match self {
            FeatureSampling::All => n_features,
            FeatureSampling::Sqrt => (n_features as f64).sqrt().ceil() as usize,
            FeatureSampling::Count(k) => (k as usize).min(n_features),
        }
        .max(1)
    }
}

/// Tree structure and stopping parameters.
#[derive(Clone, Debug)]
pub struct TreeParams {
    /// Maximum tree depth (root is depth 0). A node at `max_depth` is a leaf.
    pub max_depth: u32,
    /// Minimum number of examples in each prospective child.
    pub min_examples_per_leaf: u32,
    /// Minimum gain a split must exceed over the leaf baseline.
    pub min_gain: f32,
    /// Features considered per node.
    pub feature_sampling: FeatureSampling,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            max_depth: 16,
            min_examples_per_leaf: 5,
            min_gain: 0.0,
            feature_sampling: FeatureSampling::All,
        }
    }
}

impl TreeParams {
    /// Validate the tree parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_depth == 0 {
            return Err(ConfigError::InvalidParam {
                name: "max_depth",
                reason: "must be >= 1".to_string(),
            });
        }
        if self.min_examples_per_leaf == 0 {
            return Err(ConfigError::InvalidParam {
                name: "min_examples_per_leaf",
                reason: "must be >= 1".to_string(),
            });
        }
        if !self.min_gain.is_finite() || self.min_gain < 0.0 {
            return Err(ConfigError::InvalidParam {
                name: "min_gain",
                reason: format!("must be finite and >= 0, got {}", self.min_gain),
            });
        }
        if let FeatureSampling::Count(0) = self.feature_sampling {
            return Err(ConfigError::InvalidParam {
                name: "num_candidate_features",
                reason: "must be >= 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Bagging (random forest) parameters.
#[derive(Clone, Debug)]
pub struct BaggingParams {
    /// Resample with replacement (bootstrap) or without.
    pub bootstrap: bool,
    /// Fraction of the training examples drawn per tree.
    pub examples_ratio: f32,
}

impl Default for BaggingParams {
    fn default() -> Self {
        Self {
            bootstrap: true,
            examples_ratio: 1.0,
        }
    }
}

/// Boosting (gradient boosted trees) parameters.
#[derive(Clone, Debug)]
pub struct BoostingParams {
    /// Shrinkage applied to every leaf value.
    pub learning_rate: f32,
    /// Fraction of rows used to fit each tree (without replacement).
    pub subsample: f32,
    /// L2 regularization on leaf values.
    pub reg_lambda: f32,
}

impl Default for BoostingParams {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            subsample: 1.0,
            reg_lambda: 1.0,
        }
    }
}

/// Ensemble strategy.
#[derive(Clone, Debug)]
pub enum Ensemble {
    /// Independent trees on resampled data, aggregated by averaging.
    /// Trees are built in parallel.
    Bagging(BaggingParams),
    /// Sequential trees on the gradients of the running ensemble.
    /// Trees are strictly ordered; parallelism is intra-tree only.
    Boosting(BoostingParams),
}

impl Ensemble {
    /// Short strategy name for errors and logs.
    pub fn name(&self) -> &'static str {
        match self {
            Ensemble::Bagging(_) => "bagging",
            Ensemble::Boosting(_) => "boosting",
        }
    }

    fn validate(&self, task: Task) -> Result<(), ConfigError> {
        match self {
            Ensemble::Bagging(params) => {
                check_ratio("examples_ratio", params.examples_ratio)?;
            }
            Ensemble::Boosting(params) => {
                // Boosting fits residual gradients; only tasks with a scalar
                // differentiable objective are supported.
                if !matches!(task, Task::Regression | Task::Classification) {
                    return Err(ConfigError::UnsupportedTask { task, ensemble: "boosting" });
                }
                if !params.learning_rate.is_finite() || params.learning_rate <= 0.0 {
                    return Err(ConfigError::InvalidParam {
                        name: "learning_rate",
                        reason: format!("must be > 0, got {}", params.learning_rate),
                    });
                }
                check_ratio("subsample", params.subsample)?;
                if !params.reg_lambda.is_finite() || params.reg_lambda < 0.0 {
                    return Err(ConfigError::InvalidParam {
                        name: "reg_lambda",
                        reason: format!("must be >= 0, got {}", params.reg_lambda),
                    });
                }
            }
        }
        Ok(())
    }
}

fn check_ratio(name: &'static str, value: f32) -> Result<(), ConfigError> {
    if !value.is_finite() || value <= 0.0 || value > 1.0 {
        return Err(ConfigError::InvalidParam {
            name,
            reason: format!("must be in (0, 1], got {value}"),
        });
    }
    Ok(())
}

// =============================================================================
// TrainingConfig
// =============================================================================

/// Complete configuration of a training run.
///
/// Construct with [`TrainingConfig::bagging`] / [`TrainingConfig::boosting`],
/// adjust fields (or fold in a [`Hyperparameters`] map with
/// [`TrainingConfig::with_hyperparameters`]), then hand it to
/// `ForestTrainer::new`, which validates it. The trainer never mutates the
/// configuration afterwards.
#[derive(Clone, Debug)]
pub struct TrainingConfig {
    /// Learning task.
    pub task: Task,
    /// Label column name. Must be non-empty.
    pub label: String,
    /// Optional per-example weight column name.
    pub weights: Option<String>,
    /// Ranking group column name; required iff `task == Ranking`.
    pub ranking_group: Option<String>,
    /// Treatment column name; required iff the task is an uplift task.
    pub uplift_treatment: Option<String>,
    /// Ensemble strategy and its parameters.
    pub ensemble: Ensemble,
    /// Tree structure parameters.
    pub tree: TreeParams,
    /// Number of trees to train.
    pub num_trees: u32,
    /// Early-stopping patience in trees/rounds; 0 disables early stopping.
    /// Requires a validation set at train time to take effect.
    pub early_stopping_rounds: u32,
    /// Seed for the single random generator stream all sampling derives from.
    pub seed: u64,
    /// Deployment options.
    pub deployment: DeploymentConfig,
}

impl TrainingConfig {
    /// A bagging configuration with default parameters.
    pub fn bagging(task: Task, label: impl Into<String>) -> Self {
        Self::new(task, label, Ensemble::Bagging(BaggingParams::default()))
    }

    /// A boosting configuration with default parameters.
    pub fn boosting(task: Task, label: impl Into<String>) -> Self {
        Self::new(task, label, Ensemble::Boosting(BoostingParams::default()))
    }

    fn new(task: Task, label: impl Into<String>, ensemble: Ensemble) -> Self {
        Self {
            task,
            label: label.into(),
            weights: None,
            ranking_group: None,
            uplift_treatment: None,
            ensemble,
            tree: TreeParams::default(),
            num_trees: 100,
            early_stopping_rounds: 0,
            seed: 42,
            deployment: DeploymentConfig::default(),
        }
    }

    /// Set the weight column.
    pub fn with_weights(mut self, name: impl Into<String>) -> Self {
        self.weights = Some(name.into());
        self
    }

    /// Set the ranking group column.
    pub fn with_ranking_group(mut self, name: impl Into<String>) -> Self {
        self.ranking_group = Some(name.into());
        self
    }

    /// Set the uplift treatment column.
    pub fn with_uplift_treatment(mut self, name: impl Into<String>) -> Self {
        self.uplift_treatment = Some(name.into());
        self
    }

    /// Fold a hyperparameter map into the typed fields.
    pub fn with_hyperparameters(mut self, hps: &Hyperparameters) -> Result<Self, ConfigError> {
        hps.apply_to(&mut self)?;
        Ok(self)
    }

    /// Validate the whole configuration.
    ///
    /// Checks the label, the role/task table, ensemble/task compatibility,
    /// parameter ranges and deployment options. Called by
    /// `ForestTrainer::new`; callers may also invoke it directly.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.label.is_empty() {
            return Err(ConfigError::EmptyLabel);
        }

        validate_roles(self.task, |role| match role {
            ColumnRole::Label => true,
            ColumnRole::Weight => self.weights.is_some(),
            ColumnRole::RankingGroup => self.ranking_group.is_some(),
            ColumnRole::UpliftTreatment => self.uplift_treatment.is_some(),
        })?;

        self.ensemble.validate(self.task)?;
        self.tree.validate()?;
        if self.num_trees == 0 {
            return Err(ConfigError::InvalidParam {
                name: "num_trees",
                reason: "must be >= 1".to_string(),
            });
        }
        if self.early_stopping_rounds > 0 && self.task.is_uplift() {
            // No held-out uplift metric is defined; see the eval module.
            return Err(ConfigError::InvalidParam {
                name: "early_stopping_rounds",
                reason: "early stopping is not supported for uplift tasks".to_string(),
            });
        }
        self.deployment.validate()?;
        Ok(())
    }

    /// Canonical fingerprint of everything that affects the trained model.
    ///
    /// Two runs with equal fingerprints train identical forests, which is
    /// what makes resumption snapshots safe to reuse. Deployment options are
    /// deliberately excluded.
    pub fn fingerprint(&self) -> u64 {
        let mut repr = String::new();
        use std::fmt::Write as _;
        let _ = write!(
            repr,
            "task={};label={};weights={:?};group={:?};treatment={:?};trees={};early={};seed={};",
            self.task,
            self.label,
            self.weights,
            self.ranking_group,
            self.uplift_treatment,
            self.num_trees,
            self.early_stopping_rounds,
            self.seed,
        );
        let _ = write!(
            repr,
            "depth={};min_examples={};min_gain={};sampling={:?};",
            self.tree.max_depth,
            self.tree.min_examples_per_leaf,
            self.tree.min_gain,
            self.tree.feature_sampling,
        );
        match &self.ensemble {
            Ensemble::Bagging(p) => {
                let _ = write!(repr, "bagging.bootstrap={};ratio={};", p.bootstrap, p.examples_ratio);
            }
            Ensemble::Boosting(p) => {
                let _ = write!(
                    repr,
                    "boosting.lr={};subsample={};lambda={};",
                    p.learning_rate, p.subsample, p.reg_lambda
                );
            }
        }
        crate::utils::fnv1a64(repr.as_bytes())
    }
}
