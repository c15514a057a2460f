//! Configuration errors.
//!
//! Every variant is detected eagerly, before any record is read.

/// Invalid privacy budget, bounds or partition configuration.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid privacy budget: {0}")]
    InvalidBudget(String),

    #[error("Invalid bounds: min_value {min} must not exceed max_value {max} and both must be finite")]
    InvalidBounds { min: f64, max: f64 },

    #[error("Invalid max_partitions_contributed: {0} (must be >= 1)")]
    InvalidMaxPartitions(usize),

    #[error("Public partition set must not be empty")]
    EmptyPartitionSet,

    #[error("Noise kind mismatch: {0}")]
    NoiseKindMismatch(String),

    #[error("Invalid option: {0}")]
    InvalidOption(String),
}
