//! Split search over candidate features.

mod categorical;
mod evaluator;
mod numerical;

pub use evaluator::{find_best_split, NodeEvaluationError, SplitParams};

use crate::model::SplitCondition;

/// Two gains within this tolerance are considered ties; ties resolve to the
/// lowest feature index so the search order cannot change the result.
pub const GAIN_EPSILON: f64 = 1e-9;

/// A candidate split and its gain over the parent score.
#[derive(Clone, Debug)]
pub struct SplitInfo {
    pub condition: SplitCondition,
    pub gain: f64,
}
