//! Ports layer: Trait definitions for swappable collaborators.
//!
//! Following Hexagonal Architecture, these traits define the boundaries
//! between the aggregation logic and its noise and partitioning strategies.

mod partitions;
mod privacy;

pub use partitions::PartitionSelection;
pub use privacy::{DpError, NoiseMechanism};
