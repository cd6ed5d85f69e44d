//! Training snapshots for interrupted-run resumption.
//!
//! A snapshot is the partial model plus the index of the next tree to
//! train, tagged with the training-configuration fingerprint. On resume the
//! fingerprint must match; a stale or foreign snapshot is ignored and
//! training restarts from scratch. Writes go through a temporary file and an
//! atomic rename so a crash mid-write never corrupts an existing snapshot.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::config::DeploymentConfig;
use crate::model::Model;

use super::logger::TrainingLogger;

/// On-disk training state.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) struct Snapshot {
    /// Fingerprint of the training configuration that produced this state.
    pub fingerprint: u64,
    /// Index of the next tree to train.
    pub next_tree: u32,
    pub model: Model,
}

/// Periodically persists training state under the deployment cache path.
pub(crate) struct Checkpointer {
    path: PathBuf,
    interval: Duration,
    fingerprint: u64,
    last_write: Option<Instant>,
}

impl Checkpointer {
    /// Builds a checkpointer when resumption is enabled and a cache path is
    /// configured; `None` disables snapshotting entirely.
    pub fn from_deployment(deployment: &DeploymentConfig, fingerprint: u64) -> Option<Self> {
        if !deployment.try_resume_training {
            return None;
        }
        let cache = deployment.cache_path.as_ref()?;
        Some(Self {
            path: cache.join(format!("train-{fingerprint:016x}.snapshot.json")),
            interval: Duration::from_secs(deployment.resume_training_snapshot_interval_seconds),
            fingerprint,
            last_write: None,
        })
    }

    /// Load the snapshot left by a previous run, if any matches the current
    /// configuration. Unreadable or mismatching snapshots are reported and
    /// skipped, never fatal.
    pub fn resume(&self, logger: &TrainingLogger) -> Option<Snapshot> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return None,
            Err(err) => {
                logger.warn(&format!(
                    "cannot read snapshot {}: {err}",
                    self.path.display()
                ));
                return None;
            }
        };
        let snapshot: Snapshot = match serde_json::from_slice(&bytes) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                logger.warn(&format!(
                    "ignoring corrupt snapshot {}: {err}",
                    self.path.display()
                ));
                return None;
            }
        };
        if snapshot.fingerprint != self.fingerprint {
            logger.warn("ignoring snapshot from a different training configuration");
            return None;
        }
        logger.info(&format!(
            "resuming from snapshot: {} trees already trained",
            snapshot.next_tree
        ));
        Some(snapshot)
    }

    /// Persist a snapshot if the write interval has elapsed.
    pub fn maybe_save(&mut self, model: &Model, next_tree: u32, logger: &TrainingLogger) {
        let due = self
            .last_write
            .map_or(true, |at| at.elapsed() >= self.interval);
        if due {
            self.save(model, next_tree, logger);
        }
    }

    /// Persist a snapshot unconditionally.
    pub fn save(&mut self, model: &Model, next_tree: u32, logger: &TrainingLogger) {
        let snapshot = Snapshot {
            fingerprint: self.fingerprint,
            next_tree,
            model: model.clone(),
        };
        if let Err(err) = write_atomic(&self.path, &snapshot) {
            // A failed snapshot must not fail the training run.
            logger.warn(&format!(
                "cannot write snapshot {}: {err}",
                self.path.display()
            ));
            return;
        }
        self.last_write = Some(Instant::now());
        logger.debug(&format!("snapshot written at tree {next_tree}"));
    }

    /// Remove the snapshot after a completed run.
    pub fn discard(&self, logger: &TrainingLogger) {
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => logger.warn(&format!(
                "cannot remove snapshot {}: {err}",
                self.path.display()
            )),
        }
    }
}

fn write_atomic(path: &Path, snapshot: &Snapshot) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    let bytes = serde_json::to_vec(snapshot)?;
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)
}
