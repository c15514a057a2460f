//! # privsum
//!
//! Differentially-private sums over per-entity contributions.
//!
//! Given `(entity, value)` records, a public partition set and per-entity
//! contribution bounds, produces one noised sum per partition that satisfies
//! an (epsilon, delta) differential-privacy guarantee, then folds the results
//! into a single reported scalar.
//!
//! ## Architecture
//!
//! The crate follows Hexagonal Architecture:
//! - `domain`: Core types (records, bounds, budgets, partitions, accumulator)
//! - `ports`: Trait definitions for noise mechanisms and partition selection
//! - `adapters`: Concrete implementations (Laplace/Gaussian noise, text I/O)
//! - `application`: Privacy spec, contribution bounding, noisy summation, pipeline

pub mod adapters;
pub mod application;
pub mod domain;
pub mod ports;

pub use application::{PrivacySpec, PrivateSum, PrivateSumPipeline, SumConfig, SumOutput};
pub use domain::{BoundingParams, Contribution, MechanismMode, NoiseKind, OutputAccumulator, PartitionSet, Record};

/// Result type for privsum operations
pub type Result<T> = std::result::Result<T, PrivsumError>;

/// Main error type for privsum
#[derive(Debug, thiserror::Error)]
pub enum PrivsumError {
    #[error("Configuration error: {0}")]
    Config(#[from] domain::ConfigError),

    #[error("Parse error: {0}")]
    Parse(#[from] adapters::ParseError),

    #[error("Privacy error: {0}")]
    Privacy(ports::DpError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<ports::DpError> for PrivsumError {
    fn from(err: ports::DpError) -> Self {
        match err {
            ports::DpError::Config(config) => Self::Config(config),
            other => Self::Privacy(other),
        }
    }
}
