//! Early stopping on a validation metric.

/// Verdict after observing one validation round.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EarlyStopAction {
    /// New best round.
    Improved,
    /// No improvement yet, keep training.
    Continue,
    /// Patience exhausted; truncate to the best round.
    Stop,
}

/// Stops training after `patience` rounds without metric improvement.
///
/// Rounds are numbered from zero; `best_round` is the round of the best
/// value seen, which the trainer uses to truncate the model.
#[derive(Clone, Debug)]
pub struct EarlyStopping {
    patience: u32,
    higher_is_better: bool,
    best_value: f64,
    best_round: u32,
    rounds_since_best: u32,
    round: u32,
}

impl EarlyStopping {
    pub fn new(patience: u32, higher_is_better: bool) -> Self {
        Self {
            patience,
            higher_is_better,
            best_value: if higher_is_better { f64::NEG_INFINITY } else { f64::INFINITY },
            best_round: 0,
            rounds_since_best: 0,
            round: 0,
        }
    }

    /// Round index of the best value seen so far.
    pub fn best_round(&self) -> u32 {
        self.best_round
    }

    /// Observe the metric of the round that just finished.
    pub fn update(&mut self, value: f64) -> EarlyStopAction {
        let improved = if self.higher_is_better {
            value > self.best_value
        } else {
            value < self.best_value
        };
        let action = if improved {
            self.best_value = value;
            self.best_round = self.round;
            self.rounds_since_best = 0;
            EarlyStopAction::Improved
        } else {
            self.rounds_since_best += 1;
            if self.rounds_since_best >= self.patience {
                EarlyStopAction::Stop
            } else {
                EarlyStopAction::Continue
            }
        };
        self.round += 1;
        action
    }
}
