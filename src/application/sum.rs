//! Per-partition summation with noise.
//!
//! For every released partition: sum the bounded contributions (0 if there
//! are none), then add one independent noise sample. Partitions are spread
//! over scoped worker threads; each one only reads shared immutable state
//! and draws from its own ChaCha20 stream, so the output does not depend on
//! the number of workers.

use std::num::NonZeroUsize;

use serde::Serialize;

use super::bounder::{BoundedContributions, ContributionBounder};
use super::privacy_spec::{NoiseGenerator, PrivacySpec};
use crate::adapters::noise::NoiseSeed;
use crate::domain::{BoundingParams, Budget, Contribution, MechanismMode, OutputAccumulator, PartitionKey};
use crate::ports::{DpError, PartitionSelection};

/// Noised sum for one partition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PartitionResult {
    pub partition: PartitionKey,
    pub noisy_sum: f64,
}

/// Result of one private sum aggregation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SumOutput {
    /// One entry per released partition, ordered by key
    pub partitions: Vec<PartitionResult>,

    /// Budget consumed by this aggregation
    pub budget: Budget,

    /// Mechanism that produced the noise
    pub noise: &'static str,

    /// Noise scale (0 for the test modes)
    pub noise_scale: f64,

    pub mode: MechanismMode,
}

impl SumOutput {
    /// Fold every partition result into one scalar.
    #[must_use]
    pub fn accumulate(&self) -> OutputAccumulator {
        self.partitions.iter().map(|r| r.noisy_sum).collect()
    }

    /// Noised sum for a partition, if it was released.
    #[must_use]
    pub fn get(&self, partition: PartitionKey) -> Option<f64> {
        self.partitions
            .iter()
            .find(|r| r.partition == partition)
            .map(|r| r.noisy_sum)
    }
}

/// A differentially-private sum over a fixed partition selection.
pub struct PrivateSum<'a> {
    spec: &'a PrivacySpec,
    params: BoundingParams,
    selection: &'a dyn PartitionSelection,
    workers: usize,
    seed: Option<NoiseSeed>,
}

impl<'a> PrivateSum<'a> {
    #[must_use]
    pub fn new(spec: &'a PrivacySpec, params: BoundingParams, selection: &'a dyn PartitionSelection) -> Self {
        Self {
            spec,
            params,
            selection,
            workers: default_workers(),
            seed: None,
        }
    }

    /// Number of worker threads (at least 1).
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Fix the master noise seed instead of drawing one from OS entropy.
    #[must_use]
    pub fn with_seed(mut self, seed: NoiseSeed) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Run the aggregation, consuming the spec's whole remaining allotment.
    ///
    /// # Errors
    /// Propagates budget and calibration errors from the privacy spec. No
    /// contribution is looked at before those checks pass.
    pub fn run<I>(&self, contributions: I) -> Result<SumOutput, DpError>
    where
        I: IntoIterator<Item = Contribution>,
    {
        let noise = self.spec.noise_generator(&self.params, 1.0)?;

        let bounder = ContributionBounder::new(self.params, noise.bounds_contributions());
        let bounded = bounder.bound(contributions, self.selection);

        let keys = self.selection.emitted();
        let seed = self.seed.clone().unwrap_or_else(NoiseSeed::from_entropy);
        let partitions = noisy_sums(&keys, &bounded, &noise, &seed, self.workers);

        tracing::info!(
            partitions = partitions.len(),
            workers = self.workers,
            "Computed noisy partition sums"
        );

        Ok(SumOutput {
            partitions,
            budget: noise.budget(),
            noise: noise.mechanism_name(),
            noise_scale: noise.scale(),
            mode: self.spec.mode(),
        })
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

fn noisy_sums(
    keys: &[PartitionKey],
    bounded: &BoundedContributions,
    noise: &NoiseGenerator,
    seed: &NoiseSeed,
    workers: usize,
) -> Vec<PartitionResult> {
    if keys.is_empty() {
        return Vec::new();
    }
    let chunk = keys.len().div_ceil(workers.max(1));

    std::thread::scope(|s| {
        let handles: Vec<_> = keys
            .chunks(chunk)
            .enumerate()
            .map(|(chunk_idx, chunk_keys)| {
                s.spawn(move || {
                    chunk_keys
                        .iter()
                        .enumerate()
                        .map(|(i, &partition)| {
                            let stream = (chunk_idx * chunk + i) as u64;
                            let exact = bounded.values(partition).iter().fold(0.0, |acc, v| acc + v);
                            let mut rng = seed.stream(stream);
                            PartitionResult {
                                partition,
                                noisy_sum: noise.add_noise(exact, &mut rng),
                            }
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        handles
            .into_iter()
            .flat_map(|h| h.join().unwrap_or_else(|e| std::panic::resume_unwind(e)))
            .collect()
    })
}
