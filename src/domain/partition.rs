//! Public partitions: output keys fixed in advance, independent of the data.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::{ConfigError, PartitionKey};

/// An enumerated, non-empty set of partition keys.
///
/// Every key is emitted exactly once in the output whether or not any
/// record maps to it. Records for keys outside the set are dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<PartitionKey>", into = "Vec<PartitionKey>")]
pub struct PartitionSet {
    keys: BTreeSet<PartitionKey>,
}

impl PartitionSet {
    /// Build a partition set. Duplicate keys collapse.
    ///
    /// # Errors
    /// `EmptyPartitionSet` if no key is given.
    pub fn new(keys: impl IntoIterator<Item = PartitionKey>) -> Result<Self, ConfigError> {
        let keys: BTreeSet<_> = keys.into_iter().collect();
        if keys.is_empty() {
            return Err(ConfigError::EmptyPartitionSet);
        }
        Ok(Self { keys })
    }

    /// The single partition `{key}`.
    #[must_use]
    pub fn single(key: PartitionKey) -> Self {
        Self {
            keys: BTreeSet::from([key]),
        }
    }

    #[must_use]
    pub fn contains(&self, key: PartitionKey) -> bool {
        self.keys.contains(&key)
    }

    /// Keys in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = PartitionKey> + '_ {
        self.keys.iter().copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl TryFrom<Vec<PartitionKey>> for PartitionSet {
    type Error = ConfigError;

    fn try_from(keys: Vec<PartitionKey>) -> Result<Self, Self::Error> {
        Self::new(keys)
    }
}

impl From<PartitionSet> for Vec<PartitionKey> {
    fn from(set: PartitionSet) -> Self {
        set.keys.into_iter().collect()
    }
}
