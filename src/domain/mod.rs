//! Domain layer: Core aggregation types.
//!
//! Pure types with strict validation. Nothing here draws randomness or
//! performs I/O.

mod accumulator;
mod bounds;
mod error;
mod partition;
mod privacy;
mod record;

pub use accumulator::OutputAccumulator;
pub use bounds::{BoundingParams, Sensitivity};
pub use error::ConfigError;
pub use partition::PartitionSet;
pub use privacy::{Budget, MechanismMode, NoiseKind};
pub use record::{Contribution, EntityId, PartitionKey, Record};
