//! Configuration/dataset binding and task dispatch.

use rayon::ThreadPoolBuilder;

use crate::config::{
    determine_optimal_num_threads, ColumnRole, ConfigError, Ensemble, Task, TrainingConfig,
};
use crate::data::{ColumnSemantic, ColumnValues, Dataset, MISSING_BOOLEAN, MISSING_CATEGORICAL, OOV_CODE};
use crate::training::eval::ValidTracker;
use crate::training::logger::{TrainingLogger, Verbosity};
use crate::training::scorer::{
    center_labels_by_group, CategoricalUpliftScorer, ClassificationScorer, NumericalUpliftScorer,
    RegressionScorer,
};
use crate::training::{TrainError, TrainSession, TrainingOutput};

use super::boosting::{Objective, ValidTargets};
use super::{bagging, boosting};

/// Binary boosting predicts the positive class, which is the non-OOV code
/// with the larger dictionary index.
const POSITIVE_CODE: u32 = 2;

/// Trains a decision forest from a validated configuration.
///
/// # Example
/// ```no_run
/// use canopy::config::{Task, TrainingConfig};
/// use canopy::data::{Column, Dataset};
/// use canopy::training::ForestTrainer;
///
/// let dataset = Dataset::builder()
///     .column(Column::numerical("age", vec![31.0, 47.0, 22.0]))
///     .column(Column::numerical("income", vec![40.0, 85.0, 30.0]))
///     .label("income")
///     .build()?;
/// let trainer = ForestTrainer::new(TrainingConfig::bagging(Task::Regression, "income"))?;
/// let output = trainer.train(&dataset)?;
/// println!("trained {} trees", output.model.num_trees());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct ForestTrainer {
    config: TrainingConfig,
    logger: TrainingLogger,
}

impl ForestTrainer {
    /// Validate the configuration and build a trainer.
    pub fn new(config: TrainingConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config, logger: TrainingLogger::default() })
    }

    /// Set the log verbosity.
    pub fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.logger = TrainingLogger::new(verbosity);
        self
    }

    /// The validated configuration.
    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Train with a default session: no validation set, no cancellation.
    pub fn train(&self, train: &Dataset) -> Result<TrainingOutput, TrainError> {
        self.train_with(train, &TrainSession::default())
    }

    /// Train with an explicit session.
    pub fn train_with(
        &self,
        train: &Dataset,
        session: &TrainSession<'_>,
    ) -> Result<TrainingOutput, TrainError> {
        self.check_dataset(train)?;
        if let Some(valid) = session.valid {
            self.check_dataset(valid)?;
        }

        let num_threads = self
            .config
            .deployment
            .num_threads
            .unwrap_or_else(determine_optimal_num_threads);
        if num_threads > 1 {
            let pool = ThreadPoolBuilder::new()
                .num_threads(num_threads)
                .build()
                .map_err(|err| TrainError::Fatal(format!("cannot build thread pool: {err}")))?;
            pool.install(|| self.dispatch(train, session, true))
        } else {
            self.dispatch(train, session, false)
        }
    }

    /// Re-check the configuration's column bindings against a concrete
    /// dataset. The dataset builder already enforced per-column semantics;
    /// this catches config/dataset mismatches (wrong names, wrong label
    /// type for the task).
    fn check_dataset(&self, dataset: &Dataset) -> Result<(), TrainError> {
        let config = &self.config;
        let bindings = [
            (ColumnRole::Label, Some(config.label.as_str())),
            (ColumnRole::RankingGroup, config.ranking_group.as_deref()),
            (ColumnRole::UpliftTreatment, config.uplift_treatment.as_deref()),
            (ColumnRole::Weight, config.weights.as_deref()),
        ];
        for (role, expected) in bindings {
            let bound = dataset.role_column(role).map(|c| c.name());
            match (expected, bound) {
                (Some(name), Some(actual)) if name == actual => {}
                (Some(name), _) => {
                    return Err(ConfigError::MissingColumn { name: name.to_string(), role }.into());
                }
                // A dataset-side ranking group or treatment the config does
                // not ask for would silently change semantics.
                (None, Some(_))
                    if matches!(role, ColumnRole::RankingGroup | ColumnRole::UpliftTreatment) =>
                {
                    return Err(ConfigError::ForbiddenRole { role, task: config.task }.into());
                }
                (None, _) => {}
            }
        }

        let label = dataset.label_column();
        let expected = if config.task.label_is_categorical() {
            ColumnSemantic::Categorical
        } else {
            ColumnSemantic::Numerical
        };
        if label.semantic() != expected {
            return Err(ConfigError::RoleSemantic {
                name: label.name().to_string(),
                role: ColumnRole::Label,
                expected: expected.name(),
                task: config.task,
            }
            .into());
        }
        Ok(())
    }

    fn dispatch(
        &self,
        train: &Dataset,
        session: &TrainSession<'_>,
        parallel: bool,
    ) -> Result<TrainingOutput, TrainError> {
        let config = &self.config;
        let mut warnings = Vec::new();
        let weights = train.weights();

        match (&config.ensemble, config.task) {
            (Ensemble::Bagging(params), Task::Regression) => {
                let labels = numerical_label(train)?;
                let scorer = RegressionScorer::new(labels, weights);
                let tracker = session
                    .valid
                    .map(|valid| {
                        Ok::<_, TrainError>(ValidTracker::rmse(
                            numerical_label(valid)?.to_vec(),
                            valid.weights().map(<[f32]>::to_vec),
                            0.0,
                            true,
                        ))
                    })
                    .transpose()?;
                bagging::run(
                    config, params, train, session, &self.logger, parallel, &scorer,
                    Vec::new(), tracker, warnings,
                )
            }
            (Ensemble::Bagging(params), Task::Ranking) => {
                let labels = numerical_label(train)?;
                let centered = center_labels_by_group(labels, group_keys(train)?);
                let scorer = RegressionScorer::new(&centered, weights);
                let tracker = session
                    .valid
                    .map(|valid| {
                        // Scores are comparable within groups only, so the
                        // validation RMSE also targets centered labels.
                        let targets = center_labels_by_group(
                            numerical_label(valid)?,
                            group_keys(valid)?,
                        );
                        Ok::<_, TrainError>(ValidTracker::rmse(
                            targets,
                            valid.weights().map(<[f32]>::to_vec),
                            0.0,
                            true,
                        ))
                    })
                    .transpose()?;
                bagging::run(
                    config, params, train, session, &self.logger, parallel, &scorer,
                    Vec::new(), tracker, warnings,
                )
            }
            (Ensemble::Bagging(params), Task::Classification) => {
                let (codes, classes) = categorical_label(train)?;
                let scorer = ClassificationScorer::new(&codes, weights, classes.len());
                let tracker = session
                    .valid
                    .map(|valid| {
                        let (valid_codes, _) = categorical_label(valid)?;
                        Ok::<_, TrainError>(ValidTracker::vote(
                            valid_codes,
                            valid.weights().map(<[f32]>::to_vec),
                            classes.len(),
                        ))
                    })
                    .transpose()?;
                bagging::run(
                    config, params, train, session, &self.logger, parallel, &scorer,
                    classes, tracker, warnings,
                )
            }
            (Ensemble::Bagging(params), Task::NumericalUplift) => {
                let outcomes = numerical_label(train)?;
                let treated = treatment_indicator(train, &mut warnings)?;
                let scorer = NumericalUpliftScorer::new(outcomes, &treated, weights);
                if session.valid.is_some() {
                    let message = "validation data is ignored for uplift tasks";
                    self.logger.warn(message);
                    warnings.push(message.to_string());
                }
                bagging::run(
                    config, params, train, session, &self.logger, parallel, &scorer,
                    Vec::new(), None, warnings,
                )
            }
            (Ensemble::Bagging(params), Task::CategoricalUplift) => {
                let (codes, classes) = categorical_label(train)?;
                let treated = treatment_indicator(train, &mut warnings)?;
                let scorer =
                    CategoricalUpliftScorer::new(&codes, &treated, weights, classes.len());
                if session.valid.is_some() {
                    let message = "validation data is ignored for uplift tasks";
                    self.logger.warn(message);
                    warnings.push(message.to_string());
                }
                bagging::run(
                    config, params, train, session, &self.logger, parallel, &scorer,
                    classes, None, warnings,
                )
            }
            (Ensemble::Boosting(params), Task::Regression) => {
                let labels = numerical_label(train)?;
                let targets = session
                    .valid
                    .map(|valid| {
                        Ok::<_, TrainError>(ValidTargets::Squared {
                            targets: numerical_label(valid)?.to_vec(),
                            weights: valid.weights().map(<[f32]>::to_vec),
                        })
                    })
                    .transpose()?;
                boosting::run(
                    config,
                    params,
                    train,
                    session,
                    &self.logger,
                    parallel,
                    Objective::SquaredError { labels },
                    Vec::new(),
                    targets,
                    warnings,
                )
            }
            (Ensemble::Boosting(params), Task::Classification) => {
                let (codes, classes) = categorical_label(train)?;
                // OOV plus exactly two observed classes.
                if classes.len() != 3 {
                    return Err(ConfigError::InvalidParam {
                        name: "label",
                        reason: format!(
                            "boosting classification supports binary labels, found {} classes",
                            classes.len().saturating_sub(1)
                        ),
                    }
                    .into());
                }
                let positives = codes.iter().map(|&c| c == POSITIVE_CODE).collect();
                let targets = session
                    .valid
                    .map(|valid| {
                        let (valid_codes, _) = categorical_label(valid)?;
                        Ok::<_, TrainError>(ValidTargets::Binary {
                            positives: valid_codes.iter().map(|&c| c == POSITIVE_CODE).collect(),
                            weights: valid.weights().map(<[f32]>::to_vec),
                        })
                    })
                    .transpose()?;
                boosting::run(
                    config,
                    params,
                    train,
                    session,
                    &self.logger,
                    parallel,
                    Objective::BinaryLogLoss { positives },
                    classes,
                    targets,
                    warnings,
                )
            }
            // Rejected by TrainingConfig::validate.
            (Ensemble::Boosting(_), task) => Err(TrainError::Fatal(format!(
                "boosting dispatched for unsupported task {task}"
            ))),
        }
    }
}

fn numerical_label(dataset: &Dataset) -> Result<&[f32], TrainError> {
    dataset
        .label_column()
        .as_numerical()
        .ok_or_else(|| TrainError::Fatal("numerical label expected after validation".to_string()))
}

/// Label codes with missing mapped to OOV, plus the class vocabulary
/// (index 0 is the OOV token).
fn categorical_label(dataset: &Dataset) -> Result<(Vec<u32>, Vec<String>), TrainError> {
    let label = dataset.label_column();
    let (codes, dictionary) = match label.values() {
        ColumnValues::Categorical { codes, dictionary } => (codes, dictionary),
        _ => {
            return Err(TrainError::Fatal(
                "categorical label expected after validation".to_string(),
            ))
        }
    };
    let mapped = codes
        .iter()
        .map(|&c| if c == MISSING_CATEGORICAL { OOV_CODE } else { c })
        .collect();
    let classes = (0..dictionary.len() as u32)
        .filter_map(|code| dictionary.token(code))
        .map(String::from)
        .collect();
    Ok((mapped, classes))
}

fn group_keys(dataset: &Dataset) -> Result<&[u64], TrainError> {
    dataset
        .group_keys()
        .ok_or_else(|| TrainError::Fatal("ranking group column missing after validation".to_string()))
}

/// Per-example treatment indicator.
///
/// Boolean treatment: true means treated. Categorical treatment: the most
/// frequent token (code 1) is the control arm, every other in-vocabulary
/// code is treated. Missing assignments fall back to control with a
/// warning.
fn treatment_indicator(
    dataset: &Dataset,
    warnings: &mut Vec<String>,
) -> Result<Vec<bool>, TrainError> {
    let column = dataset.treatment_column().ok_or_else(|| {
        TrainError::Fatal("treatment column missing after validation".to_string())
    })?;
    let mut missing = 0usize;
    let treated = match column.values() {
        ColumnValues::Boolean(values) => values
            .iter()
            .map(|&v| {
                if v == MISSING_BOOLEAN {
                    missing += 1;
                    false
                } else {
                    v == 1
                }
            })
            .collect(),
        ColumnValues::Categorical { codes, .. } => codes
            .iter()
            .map(|&c| {
                if c == MISSING_CATEGORICAL {
                    missing += 1;
                    false
                } else {
                    c != 1 && c != OOV_CODE
                }
            })
            .collect(),
        _ => {
            return Err(TrainError::Fatal(
                "boolean or categorical treatment expected after validation".to_string(),
            ))
        }
    };
    if missing > 0 {
        warnings.push(format!(
            "{missing} examples with a missing treatment assignment were treated as control"
        ));
    }
    Ok(treated)
}
