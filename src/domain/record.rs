//! Record types flowing through the aggregation pipeline.

use serde::{Deserialize, Serialize};

/// Identifier of the entity (privacy unit) a record belongs to.
pub type EntityId = i64;

/// Key of a public output partition.
pub type PartitionKey = i64;

/// One parsed input record.
///
/// Immutable once created. The `key` identifies the contributing entity;
/// the partition it lands in is decided separately (see [`Contribution`]).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Entity identifier
    pub key: EntityId,

    /// Raw contributed value (unclamped)
    pub value: f64,
}

impl Record {
    /// Create a new record.
    #[must_use]
    pub fn new(key: EntityId, value: f64) -> Self {
        Self { key, value }
    }

    /// Attach a partition key, producing a contribution.
    #[must_use]
    pub fn into_contribution(self, partition: PartitionKey) -> Contribution {
        Contribution {
            entity: self.key,
            partition,
            value: self.value,
        }
    }
}

/// A record keyed by both its entity and the partition it contributes to.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    /// Entity the value is attributed to
    pub entity: EntityId,

    /// Partition the value is summed into
    pub partition: PartitionKey,

    /// Contributed value
    pub value: f64,
}

impl Contribution {
    #[must_use]
    pub fn new(entity: EntityId, partition: PartitionKey, value: f64) -> Self {
        Self {
            entity,
            partition,
            value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_into_contribution() {
        let contribution = Record::new(7, 0.25).into_contribution(3);

        assert_eq!(contribution.entity, 7);
        assert_eq!(contribution.partition, 3);
        assert!((contribution.value - 0.25).abs() < f64::EPSILON);
    }
}
