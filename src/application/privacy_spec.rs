//! Privacy specification: the total budget and the mechanism mode.
//!
//! Created once per pipeline run and shared by reference with every
//! aggregation. Apart from the budget ledger it is immutable.
//!
//! # Mutex Behavior
//!
//! The ledger is guarded by a `Mutex` so aggregations running concurrently
//! against one spec cannot overspend. A poisoned mutex fails closed: no
//! further budget is handed out.

use std::sync::{Arc, Mutex};

use rand::RngCore;

use crate::adapters::noise::{mechanism_for, NoNoise};
use crate::domain::{BoundingParams, Budget, ConfigError, MechanismMode, NoiseKind};
use crate::ports::{DpError, NoiseMechanism};

/// Relative slack when comparing budget shares, so that e.g. ten shares of
/// 0.1 still fit into a budget of 1.0.
const BUDGET_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Default)]
struct Ledger {
    epsilon: f64,
    delta: f64,
}

/// Total (epsilon, delta) budget plus the selected mechanism mode.
#[derive(Debug)]
pub struct PrivacySpec {
    budget: Budget,
    mode: MechanismMode,
    noise_kind: Option<NoiseKind>,
    ledger: Mutex<Ledger>,
}

impl PrivacySpec {
    /// Production spec adding calibrated noise.
    ///
    /// # Errors
    /// `InvalidBudget` if epsilon <= 0 or delta is outside `[0, 1)`.
    pub fn new(epsilon: f64, delta: f64) -> Result<Self, ConfigError> {
        Self::with_mode(epsilon, delta, MechanismMode::Real)
    }

    /// Spec pinned to an explicit mechanism mode.
    ///
    /// # Errors
    /// `InvalidBudget` if epsilon <= 0 or delta is outside `[0, 1)`.
    pub fn with_mode(epsilon: f64, delta: f64, mode: MechanismMode) -> Result<Self, ConfigError> {
        let budget = Budget::new(epsilon, delta).inspect_err(|e| {
            tracing::error!("Rejecting privacy spec: {e}");
        })?;

        Ok(Self {
            budget,
            mode,
            noise_kind: None,
            ledger: Mutex::new(Ledger::default()),
        })
    }

    /// Test-only spec: no noise, contribution bounding still applied.
    ///
    /// Provides NO privacy protection.
    ///
    /// # Errors
    /// Same validation as [`PrivacySpec::new`].
    pub fn no_noise_with_bounding(epsilon: f64, delta: f64) -> Result<Self, ConfigError> {
        Self::with_mode(epsilon, delta, MechanismMode::NoNoiseWithBounding)
    }

    /// Test-only spec: no noise and no contribution bounding. Bounding
    /// parameters are still validated by every aggregation.
    ///
    /// Provides NO privacy protection.
    ///
    /// # Errors
    /// Same validation as [`PrivacySpec::new`].
    pub fn no_noise_without_bounding(epsilon: f64, delta: f64) -> Result<Self, ConfigError> {
        Self::with_mode(epsilon, delta, MechanismMode::NoNoiseWithoutBounding)
    }

    /// Force a noise family instead of choosing one from delta.
    #[must_use]
    pub fn with_noise_kind(mut self, kind: NoiseKind) -> Self {
        self.noise_kind = Some(kind);
        self
    }

    #[must_use]
    pub fn mode(&self) -> MechanismMode {
        self.mode
    }

    /// The total budget this spec was created with.
    #[must_use]
    pub fn budget(&self) -> Budget {
        self.budget
    }

    /// Configured noise family, or the default for this budget.
    #[must_use]
    pub fn noise_kind(&self) -> NoiseKind {
        self.noise_kind.unwrap_or_else(|| NoiseKind::for_budget(&self.budget))
    }

    /// Total epsilon consumed so far. Reports the whole budget if the ledger is poisoned.
    #[must_use]
    pub fn epsilon_spent(&self) -> f64 {
        match self.ledger.lock() {
            Ok(ledger) => ledger.epsilon,
            Err(_) => self.budget.epsilon,
        }
    }

    /// Total delta consumed so far. Reports the whole budget if the ledger is poisoned.
    #[must_use]
    pub fn delta_spent(&self) -> f64 {
        match self.ledger.lock() {
            Ok(ledger) => ledger.delta,
            Err(_) => self.budget.delta,
        }
    }

    #[must_use]
    pub fn epsilon_remaining(&self) -> f64 {
        (self.budget.epsilon - self.epsilon_spent()).max(0.0)
    }

    /// Reserve `fraction` of the total budget for one aggregation.
    ///
    /// # Errors
    /// `InvalidFraction` unless `0 < fraction <= 1`, `BudgetExhausted` if the
    /// share exceeds what remains, `LedgerUnavailable` on a poisoned ledger.
    pub fn consume(&self, fraction: f64) -> Result<Budget, DpError> {
        if !fraction.is_finite() || fraction <= 0.0 || fraction > 1.0 {
            return Err(DpError::InvalidFraction(fraction));
        }

        let requested = self.budget.scaled(fraction);
        let mut ledger = self.ledger.lock().map_err(|_| DpError::LedgerUnavailable)?;

        let remaining_epsilon = self.budget.epsilon - ledger.epsilon;
        let remaining_delta = self.budget.delta - ledger.delta;
        let over_epsilon = requested.epsilon > remaining_epsilon + BUDGET_TOLERANCE * self.budget.epsilon;
        let over_delta = requested.delta > remaining_delta + BUDGET_TOLERANCE * self.budget.delta;

        if over_epsilon || over_delta {
            tracing::warn!(
                "Privacy budget exhausted: need ε={}, remaining ε={:.9}",
                requested.epsilon,
                remaining_epsilon.max(0.0)
            );
            return Err(DpError::BudgetExhausted {
                requested_epsilon: requested.epsilon,
                requested_delta: requested.delta,
                remaining_epsilon: remaining_epsilon.max(0.0),
                remaining_delta: remaining_delta.max(0.0),
            });
        }

        ledger.epsilon += requested.epsilon;
        ledger.delta += requested.delta;
        Ok(requested)
    }

    /// Derive the noise generator for one aggregation.
    ///
    /// Calibration runs before any budget is reserved, so a configuration
    /// error never burns budget. The test modes calibrate exactly like the
    /// real one and then substitute the noise-free mechanism.
    ///
    /// # Errors
    /// `Config` if the budget cannot be used with the noise family, plus
    /// every error of [`PrivacySpec::consume`].
    pub fn noise_generator(&self, bounds: &BoundingParams, fraction: f64) -> Result<NoiseGenerator, DpError> {
        if !fraction.is_finite() || fraction <= 0.0 || fraction > 1.0 {
            return Err(DpError::InvalidFraction(fraction));
        }

        let share = self.budget.scaled(fraction);
        let sensitivity = bounds.sensitivity();
        let real = mechanism_for(self.noise_kind());
        let real_scale = real
            .calibrate(&share, &sensitivity)
            .and_then(|scale| usable_scale(scale, sensitivity.l1 > 0.0))
            .inspect_err(|e| {
                tracing::error!("Invalid noise configuration: {e}");
            })?;

        let (mechanism, scale): (Arc<dyn NoiseMechanism>, f64) = if self.mode.adds_noise() {
            (real, real_scale)
        } else {
            (Arc::new(NoNoise), 0.0)
        };

        let budget = self.consume(fraction)?;
        tracing::info!(
            mode = %self.mode,
            noise = mechanism.name(),
            scale,
            epsilon = budget.epsilon,
            delta = budget.delta,
            "Reserved privacy budget for aggregation"
        );

        Ok(NoiseGenerator {
            mechanism,
            scale,
            budget,
            bounds_contributions: self.mode.bounds_contributions(),
        })
    }
}

/// A scale of zero is only meaningful when no contribution can move the sum.
fn usable_scale(scale: f64, sensitive: bool) -> Result<f64, ConfigError> {
    if !scale.is_finite() || scale < 0.0 || (sensitive && scale == 0.0) {
        return Err(ConfigError::InvalidBudget(format!(
            "noise scale {scale} is unusable; epsilon is out of range for these bounds"
        )));
    }
    Ok(scale)
}

/// Calibrated noise source handed to one aggregation.
#[derive(Debug, Clone)]
pub struct NoiseGenerator {
    mechanism: Arc<dyn NoiseMechanism>,
    scale: f64,
    budget: Budget,
    bounds_contributions: bool,
}

impl NoiseGenerator {
    /// Add one independent noise sample to `value`.
    pub fn add_noise(&self, value: f64, rng: &mut dyn RngCore) -> f64 {
        value + self.mechanism.sample(self.scale, rng)
    }

    /// Noise scale (Laplace `b` or Gaussian `sigma`); 0 for the test modes.
    #[must_use]
    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Budget share consumed for this generator.
    #[must_use]
    pub fn budget(&self) -> Budget {
        self.budget
    }

    #[must_use]
    pub fn mechanism_name(&self) -> &'static str {
        self.mechanism.name()
    }

    /// Whether the contribution bounder must run.
    #[must_use]
    pub fn bounds_contributions(&self) -> bool {
        self.bounds_contributions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::noise::NoiseSeed;

    fn bounds() -> BoundingParams {
        BoundingParams::new(1, -1.0, 1.0).expect("valid bounds")
    }

    #[test]
    fn test_invalid_budget_rejected() {
        assert!(matches!(PrivacySpec::new(0.0, 0.0), Err(ConfigError::InvalidBudget(_))));
        assert!(matches!(PrivacySpec::new(1.0, -1e-9), Err(ConfigError::InvalidBudget(_))));
        assert!(PrivacySpec::no_noise_with_bounding(-1.0, 0.0).is_err());
        assert!(PrivacySpec::no_noise_without_bounding(1.0, -0.5).is_err());
    }

    #[test]
    fn test_whole_budget_consumed_once() {
        let spec = PrivacySpec::new(1.0, 0.0).expect("valid spec");

        let generator = spec.noise_generator(&bounds(), 1.0).expect("first aggregation");
        assert!((generator.budget().epsilon - 1.0).abs() < f64::EPSILON);
        assert!((spec.epsilon_spent() - 1.0).abs() < f64::EPSILON);
        assert_eq!(spec.epsilon_remaining(), 0.0);

        let err = spec.noise_generator(&bounds(), 1.0).expect_err("budget already spent");
        assert!(matches!(err, DpError::BudgetExhausted { .. }));
    }

    #[test]
    fn test_fractional_consumption() {
        let spec = PrivacySpec::new(1.0, 0.0).expect("valid spec");

        for _ in 0..10 {
            spec.consume(0.1).expect("ten tenths fit");
        }
        assert!(matches!(spec.consume(0.1), Err(DpError::BudgetExhausted { .. })));
    }

    #[test]
    fn test_invalid_fraction() {
        let spec = PrivacySpec::new(1.0, 0.0).expect("valid spec");
        assert_eq!(spec.consume(0.0), Err(DpError::InvalidFraction(0.0)));
        assert_eq!(spec.consume(1.5), Err(DpError::InvalidFraction(1.5)));
        assert!(spec.noise_generator(&bounds(), f64::NAN).is_err());
        assert_eq!(spec.epsilon_spent(), 0.0);
    }

    #[test]
    fn test_noise_kind_mismatch_does_not_spend_budget() {
        let spec = PrivacySpec::new(1.0, 1e-5)
            .expect("valid spec")
            .with_noise_kind(NoiseKind::Laplace);

        let err = spec.noise_generator(&bounds(), 1.0).expect_err("laplace cannot use delta");
        assert!(matches!(err, DpError::Config(ConfigError::NoiseKindMismatch(_))));
        assert_eq!(spec.epsilon_spent(), 0.0);
    }

    #[test]
    fn test_infinite_scale_rejected_before_spending() {
        let spec = PrivacySpec::new(1e-310, 0.0).expect("epsilon is positive");

        let err = spec.noise_generator(&bounds(), 1.0).expect_err("l1 / epsilon overflows");
        assert!(matches!(err, DpError::Config(ConfigError::InvalidBudget(_))));
        assert_eq!(spec.epsilon_spent(), 0.0);

        let test_mode = PrivacySpec::no_noise_with_bounding(1e-310, 0.0).expect("epsilon is positive");
        assert!(test_mode.noise_generator(&bounds(), 1.0).is_err());
    }

    #[test]
    fn test_zero_sensitivity_allows_zero_scale() {
        let spec = PrivacySpec::new(1.0, 0.0).expect("valid spec");
        let params = BoundingParams::new(1, 0.0, 0.0).expect("valid bounds");

        let generator = spec.noise_generator(&params, 1.0).expect("nothing to protect");
        assert_eq!(generator.scale(), 0.0);
    }

    #[test]
    fn test_gaussian_spends_delta() {
        let spec = PrivacySpec::new(10.0, 1e-5).expect("valid spec");
        let generator = spec.noise_generator(&bounds(), 1.0).expect("gaussian");

        // The classic bound would give 0.484 here.
        assert!(generator.scale() > 0.484, "sigma {}", generator.scale());
        assert!((spec.delta_spent() - 1e-5).abs() < 1e-18);
    }

    #[test]
    fn test_default_noise_kind_follows_delta() {
        let pure = PrivacySpec::new(1.0, 0.0).expect("valid spec");
        let approx = PrivacySpec::new(1.0, 1e-6).expect("valid spec");

        assert_eq!(pure.noise_kind(), NoiseKind::Laplace);
        assert_eq!(approx.noise_kind(), NoiseKind::Gaussian);

        let generator = approx.noise_generator(&bounds(), 1.0).expect("gaussian");
        assert_eq!(generator.mechanism_name(), "gaussian");
        assert!(generator.scale() > 0.0);
    }

    #[test]
    fn test_laplace_scale() {
        let spec = PrivacySpec::new(0.5, 0.0).expect("valid spec");
        let params = BoundingParams::new(2, -3.0, 1.0).expect("valid bounds");

        let generator = spec.noise_generator(&params, 1.0).expect("laplace");
        // l1 = 2 * 3, b = l1 / 0.5
        assert!((generator.scale() - 12.0).abs() < 1e-12);
        assert!(generator.bounds_contributions());
    }

    #[test]
    fn test_test_modes_add_no_noise() {
        let mut rng = NoiseSeed::from_bytes([1u8; 32]).stream(0);

        let with = PrivacySpec::no_noise_with_bounding(1.0, 0.0).expect("valid spec");
        let generator = with.noise_generator(&bounds(), 1.0).expect("generator");
        assert_eq!(generator.add_noise(0.5, &mut rng), 0.5);
        assert_eq!(generator.scale(), 0.0);
        assert!(generator.bounds_contributions());

        let without = PrivacySpec::no_noise_without_bounding(1.0, 0.0).expect("valid spec");
        let generator = without.noise_generator(&bounds(), 1.0).expect("generator");
        assert_eq!(generator.add_noise(-0.5, &mut rng), -0.5);
        assert!(!generator.bounds_contributions());
    }

    #[test]
    fn test_test_modes_still_spend_budget() {
        let spec = PrivacySpec::no_noise_with_bounding(1.0, 0.0).expect("valid spec");
        spec.noise_generator(&bounds(), 1.0).expect("first");
        assert!(spec.noise_generator(&bounds(), 1.0).is_err());
    }

    #[test]
    fn test_concurrent_consumption_never_overspends() {
        let spec = Arc::new(PrivacySpec::new(1.0, 0.0).expect("valid spec"));

        let handles: Vec<_> = (0..32)
            .map(|_| {
                let spec = Arc::clone(&spec);
                std::thread::spawn(move || spec.consume(0.1).is_ok())
            })
            .collect();

        let granted = handles
            .into_iter()
            .map(|h| h.join().expect("thread"))
            .filter(|ok| *ok)
            .count();

        assert_eq!(granted, 10);
        assert!(spec.epsilon_spent() <= 1.0 + 1e-9);
    }
}
