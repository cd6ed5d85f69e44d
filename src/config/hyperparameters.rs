//! String-keyed hyperparameter mapping.
//!
//! External callers pass options as a name/value map. The map is checked
//! against a closed key table (including which ensemble each key applies
//! to) and folded into the typed [`TrainingConfig`] fields exactly once;
//! after that the configuration is immutable.

use std::collections::BTreeMap;

use super::training::{Ensemble, FeatureSampling, TrainingConfig};
use super::ConfigError;

/// A single hyperparameter value.
#[derive(Clone, Debug, PartialEq)]
pub enum HyperValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
}

impl HyperValue {
    fn type_name(&self) -> &'static str {
        match self {
            HyperValue::Int(_) => "integer",
            HyperValue::Float(_) => "float",
            HyperValue::Bool(_) => "boolean",
            HyperValue::Str(_) => "string",
        }
    }
}

impl From<i64> for HyperValue {
    fn from(v: i64) -> Self {
        HyperValue::Int(v)
    }
}

impl From<f64> for HyperValue {
    fn from(v: f64) -> Self {
        HyperValue::Float(v)
    }
}

impl From<bool> for HyperValue {
    fn from(v: bool) -> Self {
        HyperValue::Bool(v)
    }
}

impl From<&str> for HyperValue {
    fn from(v: &str) -> Self {
        HyperValue::Str(v.to_string())
    }
}

/// Which ensemble strategies a hyperparameter applies to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum KeyScope {
    Any,
    BaggingOnly,
    BoostingOnly,
}

impl KeyScope {
    fn accepts(self, ensemble: &Ensemble) -> bool {
        match self {
            KeyScope::Any => true,
            KeyScope::BaggingOnly => matches!(ensemble, Ensemble::Bagging(_)),
            KeyScope::BoostingOnly => matches!(ensemble, Ensemble::Boosting(_)),
        }
    }

    fn name(self) -> &'static str {
        match self {
            KeyScope::Any => "any",
            KeyScope::BaggingOnly => "bagging",
            KeyScope::BoostingOnly => "boosting",
        }
    }
}

/// Known hyperparameter keys and their scopes.
const KNOWN_KEYS: &[(&str, KeyScope)] = &[
    ("num_trees", KeyScope::Any),
    ("max_depth", KeyScope::Any),
    ("min_examples_per_leaf", KeyScope::Any),
    ("min_gain", KeyScope::Any),
    ("num_candidate_features", KeyScope::Any),
    ("early_stopping_rounds", KeyScope::Any),
    ("seed", KeyScope::Any),
    ("bootstrap", KeyScope::BaggingOnly),
    ("examples_ratio", KeyScope::BaggingOnly),
    ("learning_rate", KeyScope::BoostingOnly),
    ("subsample", KeyScope::BoostingOnly),
    ("reg_lambda", KeyScope::BoostingOnly),
];

/// An immutable, validated hyperparameter map.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Hyperparameters {
    values: BTreeMap<String, HyperValue>,
}

impl Hyperparameters {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value. Only usable while assembling the map; the map is
    /// consumed by [`Hyperparameters::apply_to`] and never edited after
    /// validation.
    pub fn set(mut self, name: impl Into<String>, value: impl Into<HyperValue>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if no entries are set.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Check every key against the table and fold the values into `config`.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::UnknownHyperparameter`] for keys not in the table.
    /// - [`ConfigError::UnsupportedHyperparameter`] for keys whose scope
    ///   does not match the configured ensemble.
    /// - [`ConfigError::InvalidHyperparameter`] for out-of-range or
    ///   wrongly-typed values.
    pub fn apply_to(&self, config: &mut TrainingConfig) -> Result<(), ConfigError> {
        for (name, value) in &self.values {
            let scope = KNOWN_KEYS
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, scope)| *scope)
                .ok_or_else(|| ConfigError::UnknownHyperparameter { name: name.clone() })?;

            if !scope.accepts(&config.ensemble) {
                return Err(ConfigError::UnsupportedHyperparameter {
                    name: name.clone(),
                    scope: scope.name(),
                });
            }

            apply_one(config, name, value)?;
        }
        Ok(())
    }
}

fn apply_one(config: &mut TrainingConfig, name: &str, value: &HyperValue) -> Result<(), ConfigError> {
    match name {
        "num_trees" => config.num_trees = as_u32(name, value, 1)?,
        "max_depth" => config.tree.max_depth = as_u32(name, value, 1)?,
        "min_examples_per_leaf" => config.tree.min_examples_per_leaf = as_u32(name, value, 1)?,
        "min_gain" => config.tree.min_gain = as_nonneg(name, value)? as f32,
        "num_candidate_features" => {
            config.tree.feature_sampling = match value {
                HyperValue::Int(n) if *n > 0 => FeatureSampling::Count(*n as u32),
                HyperValue::Str(s) if s == "all" => FeatureSampling::All,
                HyperValue::Str(s) if s == "sqrt" => FeatureSampling::Sqrt,
                _ => {
                    return Err(invalid(name, "expected a positive integer, \"all\" or \"sqrt\""))
                }
            }
        }
        "early_stopping_rounds" => config.early_stopping_rounds = as_u32(name, value, 0)?,
        "seed" => {
            config.seed = match value {
                HyperValue::Int(n) if *n >= 0 => *n as u64,
                HyperValue::Int(n) => {
                    return Err(invalid(name, &format!("value {n} out of range (min 0)")))
                }
                other => return Err(invalid(name, &format!("expected integer, got {}", other.type_name()))),
            }
        }
        "bootstrap" => match (&mut config.ensemble, value) {
            (Ensemble::Bagging(params), HyperValue::Bool(b)) => params.bootstrap = *b,
            (Ensemble::Bagging(_), other) => {
                return Err(invalid(name, &format!("expected boolean, got {}", other.type_name())))
            }
            _ => unreachable!("scope checked by caller"),
        },
        "examples_ratio" => match &mut config.ensemble {
            Ensemble::Bagging(params) => {
                params.examples_ratio = as_ratio(name, value, 0.0, 1.0)? as f32
            }
            _ => unreachable!("scope checked by caller"),
        },
        "learning_rate" => match &mut config.ensemble {
            Ensemble::Boosting(params) => {
                params.learning_rate = as_ratio(name, value, 0.0, f64::INFINITY)? as f32
            }
            _ => unreachable!("scope checked by caller"),
        },
        "subsample" => match &mut config.ensemble {
            Ensemble::Boosting(params) => {
                params.subsample = as_ratio(name, value, 0.0, 1.0)? as f32
            }
            _ => unreachable!("scope checked by caller"),
        },
        "reg_lambda" => match &mut config.ensemble {
            Ensemble::Boosting(params) => {
                params.reg_lambda = as_nonneg(name, value)? as f32
            }
            _ => unreachable!("scope checked by caller"),
        },
        _ => unreachable!("key membership checked by caller"),
    }
    Ok(())
}

fn invalid(name: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidHyperparameter {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}

fn as_u32(name: &str, value: &HyperValue, min: i64) -> Result<u32, ConfigError> {
    match value {
        HyperValue::Int(n) if *n >= min && *n <= u32::MAX as i64 => Ok(*n as u32),
        HyperValue::Int(n) => Err(invalid(name, &format!("{n} is out of range (min {min})"))),
        other => Err(invalid(name, &format!("expected integer, got {}", other.type_name()))),
    }
}

/// Accept any finite non-negative number (zero included).
fn as_nonneg(name: &str, value: &HyperValue) -> Result<f64, ConfigError> {
    let v = match value {
        HyperValue::Float(v) => *v,
        HyperValue::Int(n) => *n as f64,
        other => {
            return Err(invalid(name, &format!("expected number, got {}", other.type_name())))
        }
    };
    if !v.is_finite() || v < 0.0 {
        return Err(invalid(name, &format!("{v} must be finite and >= 0")));
    }
    Ok(v)
}

/// Accept a float (or integer) in `(low, high]`; `low` itself is excluded.
fn as_ratio(name: &str, value: &HyperValue, low: f64, high: f64) -> Result<f64, ConfigError> {
    let v = match value {
        HyperValue::Float(v) => *v,
        HyperValue::Int(n) => *n as f64,
        other => {
            return Err(invalid(name, &format!("expected number, got {}", other.type_name())))
        }
    };
    if !v.is_finite() || v <= low || v > high {
        return Err(invalid(name, &format!("{v} is outside ({low}, {high}]")));
    }
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Task;

    fn bagging_config() -> TrainingConfig {
        TrainingConfig::bagging(Task::Regression, "y")
    }

    fn boosting_config() -> TrainingConfig {
        TrainingConfig::boosting(Task::Regression, "y")
    }

    #[test]
    fn unknown_key_is_rejected() {
        let hps = Hyperparameters::new().set("shrinkage", 0.1);
        let mut config = bagging_config();
        assert!(matches!(
            hps.apply_to(&mut config),
            Err(ConfigError::UnknownHyperparameter { .. })
        ));
    }

    #[test]
    fn boosting_key_rejected_for_bagging() {
        let hps = Hyperparameters::new().set("learning_rate", 0.1);
        let mut config = bagging_config();
        assert!(matches!(
            hps.apply_to(&mut config),
            Err(ConfigError::UnsupportedHyperparameter { .. })
        ));
    }

    #[test]
    fn bagging_key_rejected_for_boosting() {
        let hps = Hyperparameters::new().set("examples_ratio", 0.5);
        let mut config = boosting_config();
        assert!(matches!(
            hps.apply_to(&mut config),
            Err(ConfigError::UnsupportedHyperparameter { .. })
        ));
    }

    #[test]
    fn values_fold_into_typed_fields() {
        let hps = Hyperparameters::new()
            .set("num_trees", 37)
            .set("max_depth", 4)
            .set("min_examples_per_leaf", 10)
            .set("seed", 7)
            .set("examples_ratio", 0.5);
        let mut config = bagging_config();
        hps.apply_to(&mut config).unwrap();

        assert_eq!(config.num_trees, 37);
        assert_eq!(config.tree.max_depth, 4);
        assert_eq!(config.tree.min_examples_per_leaf, 10);
        assert_eq!(config.seed, 7);
        match config.ensemble {
            Ensemble::Bagging(params) => assert!((params.examples_ratio - 0.5).abs() < 1e-6),
            _ => panic!("expected bagging"),
        }
    }

    #[test]
    fn out_of_range_value_is_rejected() {
        let hps = Hyperparameters::new().set("examples_ratio", 1.5);
        let mut config = bagging_config();
        assert!(matches!(
            hps.apply_to(&mut config),
            Err(ConfigError::InvalidHyperparameter { .. })
        ));

        let hps = Hyperparameters::new().set("num_trees", 0);
        let mut config = bagging_config();
        assert!(hps.apply_to(&mut config).is_err());
    }

    #[test]
    fn negative_seed_is_rejected() {
        let hps = Hyperparameters::new().set("seed", -1);
        let mut config = bagging_config();
        assert!(matches!(
            hps.apply_to(&mut config),
            Err(ConfigError::InvalidHyperparameter { .. })
        ));
    }

    #[test]
    fn candidate_features_accepts_named_modes() {
        let mut config = bagging_config();
        Hyperparameters::new()
            .set("num_candidate_features", "sqrt")
            .apply_to(&mut config)
            .unwrap();
        assert_eq!(config.tree.feature_sampling, FeatureSampling::Sqrt);

        Hyperparameters::new()
            .set("num_candidate_features", 3)
            .apply_to(&mut config)
            .unwrap();
        assert_eq!(config.tree.feature_sampling, FeatureSampling::Count(3));
    }
}
