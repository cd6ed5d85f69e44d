//! Training configuration: tasks, column roles, hyperparameters and
//! deployment options.
//!
//! A [`TrainingConfig`] is validated once via [`TrainingConfig::validate`]
//! and treated as immutable afterwards. Role/task consistency is expressed
//! as a declarative rule table ([`ROLE_RULES`]) instead of chained
//! conditionals, so every role carries its own compatibility predicate.

mod deployment;
mod hyperparameters;
mod training;

pub use deployment::{
    determine_optimal_num_threads, resolve_num_threads, DeploymentConfig, FALLBACK_NUM_THREADS,
    MAX_TRAINING_THREADS,
};
pub use hyperparameters::{HyperValue, Hyperparameters};
pub use training::{BaggingParams, BoostingParams, Ensemble, FeatureSampling, TrainingConfig, TreeParams};

use serde::{Deserialize, Serialize};

// =============================================================================
// Task
// =============================================================================

/// Learning task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Task {
    /// Predict a categorical label.
    Classification,
    /// Predict a numerical label.
    Regression,
    /// Order examples within ranking groups.
    Ranking,
    /// Predict the treatment effect on a numerical outcome.
    NumericalUplift,
    /// Predict the treatment effect on a categorical outcome.
    CategoricalUplift,
}

impl Task {
    /// All tasks, in declaration order.
    pub const ALL: [Task; 5] = [
        Task::Classification,
        Task::Regression,
        Task::Ranking,
        Task::NumericalUplift,
        Task::CategoricalUplift,
    ];

    /// Returns true for the two uplift tasks.
    pub fn is_uplift(self) -> bool {
        matches!(self, Task::NumericalUplift | Task::CategoricalUplift)
    }

    /// Returns true if the label column must be categorical.
    ///
    /// Classification and categorical uplift use a categorical label with an
    /// unlimited vocabulary; all remaining tasks use a numerical label.
    pub fn label_is_categorical(self) -> bool {
        matches!(self, Task::Classification | Task::CategoricalUplift)
    }

    /// Short task name for error messages and logs.
    pub fn name(self) -> &'static str {
        match self {
            Task::Classification => "CLASSIFICATION",
            Task::Regression => "REGRESSION",
            Task::Ranking => "RANKING",
            Task::NumericalUplift => "NUMERICAL_UPLIFT",
            Task::CategoricalUplift => "CATEGORICAL_UPLIFT",
        }
    }
}

impl std::fmt::Display for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Column roles
// =============================================================================

/// Special role a column can play in a training run.
///
/// A column serves at most one role; role columns are never features.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnRole {
    /// Target column. Always required.
    Label,
    /// Per-example weight column. Optional for every task.
    Weight,
    /// Group identity for ranking tasks.
    RankingGroup,
    /// Treatment assignment for uplift tasks.
    UpliftTreatment,
}

impl ColumnRole {
    /// Role name for error messages.
    pub fn name(self) -> &'static str {
        match self {
            ColumnRole::Label => "label",
            ColumnRole::Weight => "weights",
            ColumnRole::RankingGroup => "ranking_group",
            ColumnRole::UpliftTreatment => "uplift_treatment",
        }
    }
}

impl std::fmt::Display for ColumnRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Compatibility rule for one role.
pub struct RoleRule {
    /// Role the rule applies to.
    pub role: ColumnRole,
    /// Tasks for which the role must be assigned.
    pub required_for: &'static [Task],
    /// Tasks for which the role must not be assigned.
    pub forbidden_for: &'static [Task],
}

/// Role/task compatibility table.
///
/// The ranking group is present iff the task is RANKING; the uplift
/// treatment is present iff the task is one of the two uplift tasks.
/// Weights are optional everywhere and the label is checked separately
/// (it is required unconditionally).
pub const ROLE_RULES: &[RoleRule] = &[
    RoleRule {
        role: ColumnRole::RankingGroup,
        required_for: &[Task::Ranking],
        forbidden_for: &[
            Task::Classification,
            Task::Regression,
            Task::NumericalUplift,
            Task::CategoricalUplift,
        ],
    },
    RoleRule {
        role: ColumnRole::UpliftTreatment,
        required_for: &[Task::NumericalUplift, Task::CategoricalUplift],
        forbidden_for: &[Task::Classification, Task::Regression, Task::Ranking],
    },
    RoleRule {
        role: ColumnRole::Weight,
        required_for: &[],
        forbidden_for: &[],
    },
];

// =============================================================================
// ConfigError
// =============================================================================

/// Invalid or inconsistent training configuration.
///
/// Raised before any training work starts; recoverable by fixing the
/// configuration and retrying.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// The label name is empty.
    #[error("training requires a non-empty label column name")]
    EmptyLabel,

    /// A role required by the task is missing.
    #[error("the {role} column must be specified for {task} tasks")]
    MissingRole { role: ColumnRole, task: Task },

    /// A role forbidden for the task was assigned.
    #[error("the {role} column should only be specified for tasks that use it, not for {task}")]
    ForbiddenRole { role: ColumnRole, task: Task },

    /// The ensemble strategy does not support the task.
    #[error("{ensemble} training does not support {task} tasks")]
    UnsupportedTask { task: Task, ensemble: &'static str },

    /// A hyperparameter key is not known to the engine.
    #[error("unknown hyperparameter {name:?}")]
    UnknownHyperparameter { name: String },

    /// A hyperparameter does not apply to the selected ensemble.
    #[error("hyperparameter {name:?} only applies to {scope} training")]
    UnsupportedHyperparameter { name: String, scope: &'static str },

    /// A hyperparameter value is out of range or has the wrong type.
    #[error("invalid value for hyperparameter {name:?}: {reason}")]
    InvalidHyperparameter { name: String, reason: String },

    /// A typed configuration field is out of range.
    #[error("invalid value for {name}: {reason}")]
    InvalidParam { name: &'static str, reason: String },

    /// A column named during validation is absent from the dataset.
    #[error("column {name:?} required as {role} is not present in the dataset")]
    MissingColumn { name: String, role: ColumnRole },

    /// A role column has the wrong semantic for the task.
    #[error("column {name:?} used as {role} must be {expected} for {task} tasks")]
    RoleSemantic {
        name: String,
        role: ColumnRole,
        expected: &'static str,
        task: Task,
    },
}

/// Check the assigned roles against [`ROLE_RULES`] for the given task.
///
/// `assigned` reports whether each role has a column name configured.
pub fn validate_roles(
    task: Task,
    assigned: impl Fn(ColumnRole) -> bool,
) -> Result<(), ConfigError> {
    for rule in ROLE_RULES {
        let present = assigned(rule.role);
        if !present && rule.required_for.contains(&task) {
            return Err(ConfigError::MissingRole { role: rule.role, task });
        }
        if present && rule.forbidden_for.contains(&task) {
            return Err(ConfigError::ForbiddenRole { role: rule.role, task });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roles(ranking: bool, uplift: bool, weight: bool) -> impl Fn(ColumnRole) -> bool {
        move |role| match role {
            ColumnRole::Label => true,
            ColumnRole::Weight => weight,
            ColumnRole::RankingGroup => ranking,
            ColumnRole::UpliftTreatment => uplift,
        }
    }

    #[test]
    fn ranking_group_required_iff_ranking() {
        assert!(validate_roles(Task::Ranking, roles(true, false, false)).is_ok());
        assert_eq!(
            validate_roles(Task::Ranking, roles(false, false, false)),
            Err(ConfigError::MissingRole { role: ColumnRole::RankingGroup, task: Task::Ranking })
        );
        assert_eq!(
            validate_roles(Task::Regression, roles(true, false, false)),
            Err(ConfigError::ForbiddenRole {
                role: ColumnRole::RankingGroup,
                task: Task::Regression
            })
        );
    }

    #[test]
    fn uplift_treatment_required_iff_uplift() {
        for task in [Task::NumericalUplift, Task::CategoricalUplift] {
            assert!(validate_roles(task, roles(false, true, false)).is_ok());
            assert_eq!(
                validate_roles(task, roles(false, false, false)),
                Err(ConfigError::MissingRole { role: ColumnRole::UpliftTreatment, task })
            );
        }
        assert_eq!(
            validate_roles(Task::Classification, roles(false, true, false)),
            Err(ConfigError::ForbiddenRole {
                role: ColumnRole::UpliftTreatment,
                task: Task::Classification
            })
        );
    }

    #[test]
    fn weight_is_optional_everywhere() {
        for task in Task::ALL {
            let uplift = task.is_uplift();
            let ranking = task == Task::Ranking;
            assert!(validate_roles(task, roles(ranking, uplift, true)).is_ok());
            assert!(validate_roles(task, roles(ranking, uplift, false)).is_ok());
        }
    }
}
