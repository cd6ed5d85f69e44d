//! Deployment options: thread count, resumption cache.

use std::path::PathBuf;

/// Hard upper bound on worker threads, even when more CPUs are available.
pub const MAX_TRAINING_THREADS: usize = 32;

/// Thread count used when the CPU count cannot be determined.
pub const FALLBACK_NUM_THREADS: usize = 6;

/// Deployment options for a training run.
///
/// These control resources and resumability, not learning behavior; two
/// runs differing only in deployment options train the same model.
#[derive(Clone, Debug)]
pub struct DeploymentConfig {
    /// Worker pool size. `None` selects [`determine_optimal_num_threads`].
    pub num_threads: Option<usize>,
    /// Directory for resumption snapshots.
    pub cache_path: Option<PathBuf>,
    /// Resume from the last complete snapshot in `cache_path` if one exists.
    pub try_resume_training: bool,
    /// Minimum seconds between resumption snapshots.
    pub resume_training_snapshot_interval_seconds: u64,
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self {
            num_threads: None,
            cache_path: None,
            try_resume_training: false,
            resume_training_snapshot_interval_seconds: 30,
        }
    }
}

impl DeploymentConfig {
    /// Validate the deployment options.
    pub fn validate(&self) -> Result<(), super::ConfigError> {
        if self.num_threads == Some(0) {
            return Err(super::ConfigError::InvalidParam {
                name: "num_threads",
                reason: "must be >= 1".to_string(),
            });
        }
        if self.try_resume_training {
            if self.cache_path.is_none() {
                return Err(super::ConfigError::InvalidParam {
                    name: "cache_path",
                    reason: "required when try_resume_training is set".to_string(),
                });
            }
            if self.resume_training_snapshot_interval_seconds == 0 {
                return Err(super::ConfigError::InvalidParam {
                    name: "resume_training_snapshot_interval_seconds",
                    reason: "must be >= 1".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Default worker count: `min(cpu_count, 32)`, or 6 when the CPU count
/// cannot be determined.
pub fn determine_optimal_num_threads() -> usize {
    let cpus = std::thread::available_parallelism().ok().map(|n| n.get());
    resolve_num_threads(cpus)
}

/// Pure form of the thread-count heuristic, for callers that already know
/// the CPU count (and for tests).
pub fn resolve_num_threads(cpu_count: Option<usize>) -> usize {
    match cpu_count {
        None => FALLBACK_NUM_THREADS,
        Some(n) => n.min(MAX_TRAINING_THREADS),
    }
}
