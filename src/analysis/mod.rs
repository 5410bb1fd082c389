//! Aggregation and traversal over fetched resources.

pub mod aggregator;
pub mod evolution;

pub use aggregator::*;
pub use evolution::{ChainWalker, EvolutionNode};
