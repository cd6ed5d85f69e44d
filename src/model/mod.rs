//! Trained model representation: trees and the forest that owns them.

mod forest;
mod tree;

pub use forest::{Aggregation, Model};
pub use tree::{LeafValue, Node, NodeKind, SplitCondition, Tree};
