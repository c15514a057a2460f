//! Privacy budget and mechanism selection types.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// An (epsilon, delta) differential-privacy budget.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Budget {
    /// Privacy loss parameter (smaller = more private)
    pub epsilon: f64,

    /// Probability of the epsilon bound failing (smaller = more private)
    pub delta: f64,
}

impl Budget {
    /// Create a validated budget.
    ///
    /// # Errors
    /// `InvalidBudget` unless epsilon is finite and positive and delta lies in `[0, 1)`.
    pub fn new(epsilon: f64, delta: f64) -> Result<Self, ConfigError> {
        if !epsilon.is_finite() || epsilon <= 0.0 {
            return Err(ConfigError::InvalidBudget(format!(
                "epsilon must be finite and > 0, got {epsilon}"
            )));
        }
        if !delta.is_finite() || !(0.0..1.0).contains(&delta) {
            return Err(ConfigError::InvalidBudget(format!(
                "delta must be in [0, 1), got {delta}"
            )));
        }
        Ok(Self { epsilon, delta })
    }

    /// The share `fraction` of this budget.
    #[must_use]
    pub fn scaled(&self, fraction: f64) -> Self {
        Self {
            epsilon: self.epsilon * fraction,
            delta: self.delta * fraction,
        }
    }
}

/// Which noise-mechanism variant a privacy spec hands out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MechanismMode {
    /// Calibrated noise; the only mode with an actual privacy guarantee.
    #[default]
    Real,
    /// No noise, contribution bounding still applied. Test use only.
    NoNoiseWithBounding,
    /// No noise and no bounding. Test use only.
    NoNoiseWithoutBounding,
}

impl MechanismMode {
    #[must_use]
    pub fn adds_noise(&self) -> bool {
        matches!(self, Self::Real)
    }

    #[must_use]
    pub fn bounds_contributions(&self) -> bool {
        !matches!(self, Self::NoNoiseWithoutBounding)
    }
}

impl std::fmt::Display for MechanismMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Real => write!(f, "real"),
            Self::NoNoiseWithBounding => write!(f, "no-noise-with-bounding"),
            Self::NoNoiseWithoutBounding => write!(f, "no-noise-without-bounding"),
        }
    }
}

impl FromStr for MechanismMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "real" => Ok(Self::Real),
            "no-noise-with-bounding" => Ok(Self::NoNoiseWithBounding),
            "no-noise-without-bounding" => Ok(Self::NoNoiseWithoutBounding),
            other => Err(ConfigError::InvalidOption(format!(
                "unknown mechanism mode {other:?} (expected real, no-noise-with-bounding or no-noise-without-bounding)"
            ))),
        }
    }
}

/// Noise distribution family used by the real mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoiseKind {
    /// Pure epsilon-DP, scale `l1 / epsilon`
    Laplace,
    /// (epsilon, delta)-DP, requires `delta > 0`
    Gaussian,
}

impl NoiseKind {
    /// Laplace for pure-epsilon budgets, Gaussian when delta is non-zero.
    #[must_use]
    pub fn for_budget(budget: &Budget) -> Self {
        if budget.delta == 0.0 {
            Self::Laplace
        } else {
            Self::Gaussian
        }
    }
}

impl std::fmt::Display for NoiseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Laplace => write!(f, "laplace"),
            Self::Gaussian => write!(f, "gaussian"),
        }
    }
}

impl FromStr for NoiseKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "laplace" => Ok(Self::Laplace),
            "gaussian" => Ok(Self::Gaussian),
            other => Err(ConfigError::InvalidOption(format!(
                "unknown noise kind {other:?} (expected laplace or gaussian)"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_validation() {
        assert!(Budget::new(1.0, 0.0).is_ok());
        assert!(Budget::new(1e20, 1e-5).is_ok());
        assert!(Budget::new(0.0, 0.0).is_err());
        assert!(Budget::new(-1.0, 0.0).is_err());
        assert!(Budget::new(f64::INFINITY, 0.0).is_err());
        assert!(Budget::new(1.0, -0.1).is_err());
        assert!(Budget::new(1.0, 1.0).is_err());
    }

    #[test]
    fn test_mode_flags() {
        assert!(MechanismMode::Real.adds_noise());
        assert!(MechanismMode::Real.bounds_contributions());
        assert!(!MechanismMode::NoNoiseWithBounding.adds_noise());
        assert!(MechanismMode::NoNoiseWithBounding.bounds_contributions());
        assert!(!MechanismMode::NoNoiseWithoutBounding.adds_noise());
        assert!(!MechanismMode::NoNoiseWithoutBounding.bounds_contributions());
    }

    #[test]
    fn test_mode_parse_roundtrip() {
        for mode in [
            MechanismMode::Real,
            MechanismMode::NoNoiseWithBounding,
            MechanismMode::NoNoiseWithoutBounding,
        ] {
            assert_eq!(mode.to_string().parse::<MechanismMode>(), Ok(mode));
        }
        assert_eq!(
            "NO_NOISE_WITH_BOUNDING".parse::<MechanismMode>(),
            Ok(MechanismMode::NoNoiseWithBounding)
        );
        assert!("noisy".parse::<MechanismMode>().is_err());
    }

    #[test]
    fn test_noise_kind_for_budget() {
        let pure = Budget::new(1.0, 0.0).expect("valid");
        let approx = Budget::new(1.0, 1e-6).expect("valid");
        assert_eq!(NoiseKind::for_budget(&pure), NoiseKind::Laplace);
        assert_eq!(NoiseKind::for_budget(&approx), NoiseKind::Gaussian);
    }
}
