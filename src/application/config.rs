//! Run configuration.
//!
//! Layering, lowest precedence first: defaults, JSON file, `PRIVSUM_*`
//! environment variables, then whatever the caller (the CLI) sets on top.
//! Nothing is validated until [`SumConfig::validate`], which runs before any
//! data is read.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::privacy_spec::PrivacySpec;
use crate::adapters::noise::NoiseSeed;
use crate::domain::{BoundingParams, ConfigError, MechanismMode, NoiseKind, PartitionKey, PartitionSet};
use crate::PrivsumError;

/// Every knob of a private sum run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SumConfig {
    /// Total epsilon for the run
    pub epsilon: f64,

    /// Total delta for the run
    pub delta: f64,

    /// Lower clamping bound
    pub min_value: f64,

    /// Upper clamping bound
    pub max_value: f64,

    /// Maximum partitions a single entity may contribute to
    pub max_partitions_contributed: usize,

    /// Public partition keys
    pub partitions: Vec<PartitionKey>,

    /// Partition every ingested record is assigned to
    pub default_partition: PartitionKey,

    pub mode: MechanismMode,

    /// Noise family; chosen from delta when unset
    pub noise_kind: Option<NoiseKind>,

    /// Worker threads; available parallelism when unset
    pub workers: Option<usize>,

    /// Master noise seed as 64 hex characters; OS entropy when unset
    pub seed: Option<String>,
}

impl Default for SumConfig {
    fn default() -> Self {
        Self {
            epsilon: 1e20,
            delta: 0.0,
            min_value: -1.0,
            max_value: 1.0,
            max_partitions_contributed: 1,
            partitions: vec![0],
            default_partition: 0,
            mode: MechanismMode::Real,
            noise_kind: None,
            workers: None,
            seed: None,
        }
    }
}

impl SumConfig {
    /// Load a JSON config file. Missing fields keep their defaults.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or is not valid JSON.
    pub fn from_json_file(path: &Path) -> Result<Self, PrivsumError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Apply `PRIVSUM_*` environment overrides (best-effort).
    ///
    /// Supported:
    /// - PRIVSUM_EPSILON
    /// - PRIVSUM_DELTA
    /// - PRIVSUM_MIN_VALUE
    /// - PRIVSUM_MAX_VALUE
    /// - PRIVSUM_MAX_PARTITIONS
    /// - PRIVSUM_MODE
    /// - PRIVSUM_WORKERS
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        fn parsed<T: std::str::FromStr>(name: &str, raw: Option<String>) -> Option<T> {
            let raw = raw?;
            match raw.trim().parse::<T>() {
                Ok(v) => Some(v),
                Err(_) => {
                    tracing::warn!("Ignoring unparseable {name}");
                    None
                }
            }
        }

        if let Some(v) = parsed("PRIVSUM_EPSILON", lookup("PRIVSUM_EPSILON")) {
            self.epsilon = v;
        }
        if let Some(v) = parsed("PRIVSUM_DELTA", lookup("PRIVSUM_DELTA")) {
            self.delta = v;
        }
        if let Some(v) = parsed("PRIVSUM_MIN_VALUE", lookup("PRIVSUM_MIN_VALUE")) {
            self.min_value = v;
        }
        if let Some(v) = parsed("PRIVSUM_MAX_VALUE", lookup("PRIVSUM_MAX_VALUE")) {
            self.max_value = v;
        }
        if let Some(v) = parsed("PRIVSUM_MAX_PARTITIONS", lookup("PRIVSUM_MAX_PARTITIONS")) {
            self.max_partitions_contributed = v;
        }
        if let Some(v) = parsed("PRIVSUM_MODE", lookup("PRIVSUM_MODE")) {
            self.mode = v;
        }
        if let Some(v) = parsed("PRIVSUM_WORKERS", lookup("PRIVSUM_WORKERS")) {
            self.workers = Some(v);
        }

        self
    }

    /// Check every option without spending any budget.
    ///
    /// # Errors
    /// Returns the first invalid option found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.privacy_spec()?;
        self.bounding_params()?;
        self.partition_set()?;
        self.noise_seed()?;
        if self.workers == Some(0) {
            return Err(ConfigError::InvalidOption("workers must be >= 1".to_string()));
        }
        Ok(())
    }

    /// A fresh privacy spec with an untouched budget ledger.
    ///
    /// # Errors
    /// `InvalidBudget` for an invalid epsilon or delta.
    pub fn privacy_spec(&self) -> Result<PrivacySpec, ConfigError> {
        let spec = PrivacySpec::with_mode(self.epsilon, self.delta, self.mode)?;
        Ok(match self.noise_kind {
            Some(kind) => spec.with_noise_kind(kind),
            None => spec,
        })
    }

    /// # Errors
    /// `InvalidBounds` or `InvalidMaxPartitions`.
    pub fn bounding_params(&self) -> Result<BoundingParams, ConfigError> {
        BoundingParams::new(self.max_partitions_contributed, self.min_value, self.max_value)
    }

    /// # Errors
    /// `EmptyPartitionSet` if no partition key is configured.
    pub fn partition_set(&self) -> Result<PartitionSet, ConfigError> {
        PartitionSet::new(self.partitions.iter().copied())
    }

    /// # Errors
    /// `InvalidOption` if the seed is not 64 hex characters.
    pub fn noise_seed(&self) -> Result<Option<NoiseSeed>, ConfigError> {
        self.seed.as_deref().map(NoiseSeed::from_hex).transpose()
    }
}
