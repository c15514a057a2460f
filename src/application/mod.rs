//! Application layer: Use cases and services.
//!
//! This module orchestrates domain logic with ports to implement the
//! private sum: budget handling, contribution bounding, noisy per-partition
//! summation, and the end-to-end pipeline.

mod bounder;
mod config;
mod pipeline;
mod privacy_spec;
mod sum;

pub use bounder::{kept_partitions, BoundedContributions, ContributionBounder};
pub use config::SumConfig;
pub use pipeline::{PipelineOutput, PrivateSumPipeline, RunReport};
pub use privacy_spec::{NoiseGenerator, PrivacySpec};
pub use sum::{PartitionResult, PrivateSum, SumOutput};
