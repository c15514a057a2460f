//! Contribution bounds and the sensitivities derived from them.

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Per-entity contribution envelope.
///
/// Used both to clamp contributions and to size the noise. The fields are
/// private so a constructed value is always valid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawBoundingParams", into = "RawBoundingParams")]
pub struct BoundingParams {
    max_partitions_contributed: usize,
    min_value: f64,
    max_value: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct RawBoundingParams {
    max_partitions_contributed: usize,
    min_value: f64,
    max_value: f64,
}

impl TryFrom<RawBoundingParams> for BoundingParams {
    type Error = ConfigError;

    fn try_from(raw: RawBoundingParams) -> Result<Self, Self::Error> {
        Self::new(raw.max_partitions_contributed, raw.min_value, raw.max_value)
    }
}

impl From<BoundingParams> for RawBoundingParams {
    fn from(params: BoundingParams) -> Self {
        Self {
            max_partitions_contributed: params.max_partitions_contributed,
            min_value: params.min_value,
            max_value: params.max_value,
        }
    }
}

impl BoundingParams {
    /// Create validated bounding parameters.
    ///
    /// # Errors
    /// `InvalidMaxPartitions` if `max_partitions_contributed` is 0,
    /// `InvalidBounds` if either bound is not finite or `min_value > max_value`.
    pub fn new(max_partitions_contributed: usize, min_value: f64, max_value: f64) -> Result<Self, ConfigError> {
        if max_partitions_contributed == 0 {
            return Err(ConfigError::InvalidMaxPartitions(max_partitions_contributed));
        }
        if !min_value.is_finite() || !max_value.is_finite() || min_value > max_value {
            return Err(ConfigError::InvalidBounds {
                min: min_value,
                max: max_value,
            });
        }

        Ok(Self {
            max_partitions_contributed,
            min_value,
            max_value,
        })
    }

    #[must_use]
    pub fn max_partitions_contributed(&self) -> usize {
        self.max_partitions_contributed
    }

    #[must_use]
    pub fn min_value(&self) -> f64 {
        self.min_value
    }

    #[must_use]
    pub fn max_value(&self) -> f64 {
        self.max_value
    }

    /// Clamp a value into `[min_value, max_value]`.
    #[must_use]
    pub fn clamp(&self, value: f64) -> f64 {
        self.min_value.max(self.max_value.min(value))
    }

    /// Sensitivities of a per-partition sum under these bounds.
    #[must_use]
    pub fn sensitivity(&self) -> Sensitivity {
        let l0 = self.max_partitions_contributed as f64;
        let linf = self.min_value.abs().max(self.max_value.abs());
        Sensitivity {
            l0,
            linf,
            l1: l0 * linf,
            l2: l0.sqrt() * linf,
        }
    }
}

/// How much one entity can move the vector of partition sums.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sensitivity {
    /// Partitions a single entity may touch
    pub l0: f64,

    /// Largest change to any single partition
    pub linf: f64,

    /// Total absolute change across partitions (Laplace calibration)
    pub l1: f64,

    /// Euclidean change across partitions (Gaussian calibration)
    pub l2: f64,
}
