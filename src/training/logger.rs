//! Training progress logging.

use serde::{Deserialize, Serialize};

/// How much training progress to print.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Verbosity {
    /// Nothing, not even warnings.
    Silent,
    /// Warnings only.
    #[default]
    Warning,
    /// Warnings plus per-round progress.
    Info,
    /// Everything, including per-tree details.
    Debug,
}

/// Prints training progress to stderr.
#[derive(Clone, Copy, Debug, Default)]
pub struct TrainingLogger {
    verbosity: Verbosity,
}

impl TrainingLogger {
    pub fn new(verbosity: Verbosity) -> Self {
        Self { verbosity }
    }

    pub fn warn(&self, message: &str) {
        if self.verbosity >= Verbosity::Warning {
            eprintln!("[train] warning: {message}");
        }
    }

    pub fn info(&self, message: &str) {
        if self.verbosity >= Verbosity::Info {
            eprintln!("[train] {message}");
        }
    }

    pub fn debug(&self, message: &str) {
        if self.verbosity >= Verbosity::Debug {
            eprintln!("[train] {message}");
        }
    }

    pub fn start(&self, ensemble: &str, num_trees: u32, num_examples: usize, num_features: usize) {
        self.info(&format!(
            "{ensemble}: {num_trees} trees over {num_examples} examples, {num_features} features"
        ));
    }

    pub fn round(&self, tree_index: u32, num_trees: u32, metric: Option<(&str, f64)>) {
        if self.verbosity < Verbosity::Info {
            return;
        }
        match metric {
            Some((name, value)) => {
                self.info(&format!("tree {}/{num_trees}: valid {name}={value:.6}", tree_index + 1))
            }
            None => self.debug(&format!("tree {}/{num_trees}", tree_index + 1)),
        }
    }

    pub fn finish(&self, num_trees: usize) {
        self.info(&format!("done: {num_trees} trees"));
    }
}
