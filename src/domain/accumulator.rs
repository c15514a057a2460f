//! Output accumulator: folds noised partition sums into one reported scalar.
//!
//! No privacy-relevant behavior lives here; noise has already been added.

use serde::{Deserialize, Serialize};

/// Commutative, associative merge unit with `zero()` as identity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputAccumulator {
    sum: f64,
}

impl OutputAccumulator {
    /// The identity element.
    #[must_use]
    pub fn zero() -> Self {
        Self { sum: 0.0 }
    }

    /// Accumulator holding a single value.
    #[must_use]
    pub fn of(value: f64) -> Self {
        Self { sum: value }
    }

    /// Fold one partition result in.
    #[must_use]
    pub fn add(self, value: f64) -> Self {
        Self { sum: self.sum + value }
    }

    #[must_use]
    pub fn merge(self, other: Self) -> Self {
        Self {
            sum: self.sum + other.sum,
        }
    }

    #[must_use]
    pub fn value(&self) -> f64 {
        self.sum
    }

    /// Render with six fractional digits, e.g. `0.500000`.
    #[must_use]
    pub fn render(&self) -> String {
        format!("{:.6}", self.sum)
    }
}

impl FromIterator<f64> for OutputAccumulator {
    fn from_iter<I: IntoIterator<Item = f64>>(iter: I) -> Self {
        iter.into_iter().fold(Self::zero(), Self::add)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render() {
        assert_eq!(OutputAccumulator::of(0.5).render(), "0.500000");
        assert_eq!(OutputAccumulator::of(-0.5).render(), "-0.500000");
        assert_eq!(OutputAccumulator::zero().render(), "0.000000");
    }

    #[test]
    fn test_collect() {
        let acc: OutputAccumulator = [1.5, -0.5, 2.0].into_iter().collect();
        assert!((acc.value() - 3.0).abs() < f64::EPSILON);
    }
}
