//! Contribution bounding.
//!
//! Runs before any summation touches real values:
//! 1. drops contributions to partitions that are not released, and NaN values,
//! 2. combines each entity's values per partition into one contribution,
//! 3. keeps at most `max_partitions_contributed` partitions per entity,
//! 4. clamps every combined contribution into `[min_value, max_value]`.
//!
//! When bounding is disabled (the `NoNoiseWithoutBounding` test mode) steps 3
//! and 4 are skipped and NaN values pass through to the raw sum; the
//! partition filter still applies.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

use crate::domain::{BoundingParams, Contribution, EntityId, PartitionKey};
use crate::ports::PartitionSelection;

/// Bounded per-entity contributions grouped by partition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoundedContributions {
    partitions: BTreeMap<PartitionKey, Vec<f64>>,
}

impl BoundedContributions {
    /// Bounded values for a partition (one per surviving entity).
    #[must_use]
    pub fn values(&self, partition: PartitionKey) -> &[f64] {
        self.partitions.get(&partition).map_or(&[][..], Vec::as_slice)
    }

    /// Number of surviving (entity, partition) contributions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.partitions.values().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Clamps values and limits how many partitions each entity reaches.
#[derive(Debug, Clone, Copy)]
pub struct ContributionBounder {
    params: BoundingParams,
    enabled: bool,
}

impl ContributionBounder {
    /// Create a bounder. With `enabled == false` it only groups contributions.
    #[must_use]
    pub fn new(params: BoundingParams, enabled: bool) -> Self {
        Self { params, enabled }
    }

    /// Clamp a single value (identity when bounding is disabled).
    #[must_use]
    pub fn clamp(&self, value: f64) -> f64 {
        if self.enabled {
            self.params.clamp(value)
        } else {
            value
        }
    }

    /// Bound a batch of contributions.
    pub fn bound<I>(&self, contributions: I, selection: &dyn PartitionSelection) -> BoundedContributions
    where
        I: IntoIterator<Item = Contribution>,
    {
        let mut per_entity: BTreeMap<EntityId, BTreeMap<PartitionKey, f64>> = BTreeMap::new();
        let mut dropped_unreleased = 0usize;

        for c in contributions {
            if self.enabled && c.value.is_nan() {
                continue;
            }
            if !selection.admits(c.partition) {
                dropped_unreleased += 1;
                continue;
            }
            *per_entity
                .entry(c.entity)
                .or_default()
                .entry(c.partition)
                .or_insert(0.0) += c.value;
        }

        let limit = self.params.max_partitions_contributed();
        let mut dropped_over_limit = 0usize;
        let mut partitions: BTreeMap<PartitionKey, Vec<f64>> = BTreeMap::new();

        for (entity, sums) in per_entity {
            if self.enabled && sums.len() > limit {
                dropped_over_limit += sums.len() - limit;
                for partition in kept_partitions(entity, sums.keys().copied(), limit) {
                    partitions
                        .entry(partition)
                        .or_default()
                        .push(self.clamp(sums[&partition]));
                }
            } else {
                for (partition, sum) in sums {
                    partitions.entry(partition).or_default().push(self.clamp(sum));
                }
            }
        }

        tracing::debug!(
            enabled = self.enabled,
            dropped_unreleased,
            dropped_over_limit,
            "Contribution bounding complete"
        );

        BoundedContributions { partitions }
    }
}

/// Choose which `limit` partitions an over-contributing entity keeps.
///
/// Partitions are ranked by SHA-256 of `(entity, partition)` and the `limit`
/// lowest digests win. Same input, same subset, on every run.
pub fn kept_partitions<I>(entity: EntityId, partitions: I, limit: usize) -> Vec<PartitionKey>
where
    I: IntoIterator<Item = PartitionKey>,
{
    let mut ranked: Vec<([u8; 32], PartitionKey)> = partitions
        .into_iter()
        .map(|p| (selection_rank(entity, p), p))
        .collect();
    ranked.sort_unstable();
    ranked.truncate(limit);

    let mut kept: Vec<_> = ranked.into_iter().map(|(_, p)| p).collect();
    kept.sort_unstable();
    kept
}

fn selection_rank(entity: EntityId, partition: PartitionKey) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(entity.to_be_bytes());
    hasher.update(partition.to_be_bytes());
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PartitionSet;

    fn params(max_partitions: usize) -> BoundingParams {
        BoundingParams::new(max_partitions, -1.0, 1.0).expect("valid bounds")
    }

    #[test]
    fn test_clamps_values() {
        let bounder = ContributionBounder::new(params(1), true);
        let input = vec![
            Contribution::new(1, 0, 0.5),
            Contribution::new(2, 0, -3.0),
            Contribution::new(3, 0, 2.0),
        ];

        let bounded = bounder.bound(input, &PartitionSet::single(0));
        assert_eq!(bounded.values(0), &[0.5, -1.0, 1.0]);
    }

    #[test]
    fn test_disabled_passes_raw_values() {
        let bounder = ContributionBounder::new(params(1), false);
        let input = vec![Contribution::new(1, 0, 5.0), Contribution::new(1, 1, -7.0)];

        let bounded = bounder.bound(input, &PartitionSet::new([0, 1]).expect("non-empty"));
        assert_eq!(bounded.values(0), &[5.0]);
        assert_eq!(bounded.values(1), &[-7.0]);
    }

    #[test]
    fn test_entity_values_combined_before_clamping() {
        let bounder = ContributionBounder::new(params(1), true);
        let input = vec![Contribution::new(1, 0, 0.75), Contribution::new(1, 0, 0.75)];

        let bounded = bounder.bound(input, &PartitionSet::single(0));
        assert_eq!(bounded.values(0), &[1.0]);
        assert_eq!(bounded.len(), 1);
    }

    #[test]
    fn test_unreleased_partitions_dropped() {
        let bounder = ContributionBounder::new(params(1), true);
        let input = vec![Contribution::new(1, 9, 0.5), Contribution::new(1, 0, 0.25)];

        // Entity 1 keeps partition 0: the unreleased key does not use its allowance.
        let bounded = bounder.bound(input, &PartitionSet::single(0));
        assert_eq!(bounded.values(0), &[0.25]);
        assert!(bounded.values(9).is_empty());
    }

    #[test]
    fn test_nan_ignored() {
        let bounder = ContributionBounder::new(params(1), true);
        let bounded = bounder.bound(vec![Contribution::new(1, 0, f64::NAN)], &PartitionSet::single(0));
        assert!(bounded.is_empty());
    }

    #[test]
    fn test_nan_kept_without_bounding() {
        let bounder = ContributionBounder::new(params(1), false);
        let input = vec![Contribution::new(1, 0, f64::NAN), Contribution::new(2, 0, 0.5)];
        let bounded = bounder.bound(input, &PartitionSet::single(0));
        assert_eq!(bounded.len(), 2);
        assert!(bounded.values(0).iter().any(|v| v.is_nan()));
    }

    #[test]
    fn test_cross_partition_limit() {
        let bounder = ContributionBounder::new(params(2), true);
        let input: Vec<_> = (0..5).map(|p| Contribution::new(42, p, 1.0)).collect();
        let partitions = PartitionSet::new(0..5).expect("non-empty");

        let bounded = bounder.bound(input, &partitions);
        assert_eq!(bounded.len(), 2);

        let expected = kept_partitions(42, 0..5, 2);
        for p in 0..5 {
            let want = usize::from(expected.contains(&p));
            assert_eq!(bounded.values(p).len(), want, "partition {p}");
        }
    }

    #[test]
    fn test_limit_not_applied_when_disabled() {
        let bounder = ContributionBounder::new(params(1), false);
        let input: Vec<_> = (0..4).map(|p| Contribution::new(7, p, 1.0)).collect();

        let bounded = bounder.bound(input, &PartitionSet::new(0..4).expect("non-empty"));
        assert_eq!(bounded.len(), 4);
    }
}
