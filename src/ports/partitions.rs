//! Partition selection port.
//!
//! Decides which partition keys are released. The public implementation is
//! [`PartitionSet`]; a data-dependent private selector can slot in later
//! without touching the summation code.

use crate::domain::{PartitionKey, PartitionSet};

/// Source of the partition keys an aggregation emits.
pub trait PartitionSelection: Send + Sync {
    /// Whether contributions to `key` are kept.
    fn admits(&self, key: PartitionKey) -> bool;

    /// Keys to emit, each exactly once, in output order.
    fn emitted(&self) -> Vec<PartitionKey>;
}

impl PartitionSelection for PartitionSet {
    fn admits(&self, key: PartitionKey) -> bool {
        self.contains(key)
    }

    fn emitted(&self) -> Vec<PartitionKey> {
        self.iter().collect()
    }
}
