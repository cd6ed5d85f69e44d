//! Decision forest training: bagged (random forest) and gradient-boosted
//! ensembles over an in-memory column store.
//!
//! Supported tasks: classification, regression, ranking and the two uplift
//! flavors. Training is deterministic for a fixed configuration and seed,
//! regardless of thread count; runs are cancellable and can resume from
//! periodic snapshots.
//!
//! # Example
//! ```no_run
//! use canopy::config::{Task, TrainingConfig};
//! use canopy::data::{Column, Dataset};
//! use canopy::training::ForestTrainer;
//!
//! let dataset = Dataset::builder()
//!     .column(Column::numerical("x", vec![1.0, 2.0, 3.0, 4.0]))
//!     .column(Column::numerical("y", vec![1.2, 1.9, 3.1, 4.2]))
//!     .label("y")
//!     .build()?;
//!
//! let config = TrainingConfig::bagging(Task::Regression, "y");
//! let output = ForestTrainer::new(config)?.train(&dataset)?;
//! let predictions = output.model.predict(&dataset);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod data;
pub mod model;
pub mod training;

mod utils;

pub use config::{Task, TrainingConfig};
pub use data::{Column, Dataset};
pub use model::Model;
pub use training::{ForestTrainer, TrainError, TrainSession, TrainingOutput, TrainingStatus};
