//! Noise adapter: Implementations of NoiseMechanism.
//!
//! Provides the Laplace and Gaussian mechanisms plus the noise-free variant
//! used by the test-only privacy modes, and the ChaCha20 random source they
//! draw from.
//!
//! # Randomness
//!
//! Every partition gets its own ChaCha20 stream derived from one 32-byte
//! master seed, so draws are independent across partitions and results do
//! not depend on which worker thread handled which partition.

use std::f64::consts::PI;
use std::sync::Arc;

use rand::rngs::OsRng;
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;

use crate::domain::{Budget, ConfigError, NoiseKind, Sensitivity};
use crate::ports::NoiseMechanism;

/// Laplace mechanism for pure epsilon-DP.
///
/// Scale `b = l1 / epsilon`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LaplaceMechanism;

impl NoiseMechanism for LaplaceMechanism {
    fn name(&self) -> &'static str {
        "laplace"
    }

    fn calibrate(&self, budget: &Budget, sensitivity: &Sensitivity) -> Result<f64, ConfigError> {
        // With public partitions Laplace noise cannot use delta.
        if budget.delta != 0.0 {
            return Err(ConfigError::NoiseKindMismatch(format!(
                "laplace noise requires delta = 0, got {}",
                budget.delta
            )));
        }
        Ok(sensitivity.l1 / budget.epsilon)
    }

    fn sample(&self, scale: f64, rng: &mut dyn RngCore) -> f64 {
        if scale == 0.0 {
            return 0.0;
        }

        // Inverse CDF over (-0.5, 0.5); both endpoints would give ln(0).
        let u = open_unit(rng) - 0.5;
        let inner = 1.0 - 2.0 * u.abs();
        -scale * u.signum() * inner.ln()
    }
}

/// Gaussian mechanism for (epsilon, delta)-DP.
///
/// `sigma` is the smallest value whose exact privacy loss stays within the
/// budget (the analytic Gaussian mechanism of Balle and Wang, 2018): with
/// `d = l2`,
///
/// `delta(sigma) = Phi(d / 2sigma - eps sigma / d) - e^eps Phi(-d / 2sigma - eps sigma / d)`
///
/// is decreasing in `sigma`, and bisection finds where it meets `delta`.
/// Valid for every epsilon, unlike the classic `sqrt(2 ln(1.25 / delta))`
/// bound which only holds below 1.
#[derive(Debug, Clone, Copy, Default)]
pub struct GaussianMechanism;

impl NoiseMechanism for GaussianMechanism {
    fn name(&self) -> &'static str {
        "gaussian"
    }

    fn calibrate(&self, budget: &Budget, sensitivity: &Sensitivity) -> Result<f64, ConfigError> {
        if budget.delta <= 0.0 {
            return Err(ConfigError::NoiseKindMismatch(
                "gaussian noise requires delta > 0".to_string(),
            ));
        }
        analytic_gaussian_sigma(budget.epsilon, budget.delta, sensitivity.l2)
    }

    fn sample(&self, scale: f64, rng: &mut dyn RngCore) -> f64 {
        if scale == 0.0 {
            return 0.0;
        }

        // Box-Muller; u1 must be strictly positive.
        let u1 = open_unit(rng);
        let u2: f64 = rng.gen();

        scale * (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
    }
}

/// Uniform draw from the open interval (0, 1).
fn open_unit(rng: &mut dyn RngCore) -> f64 {
    loop {
        let u: f64 = rng.gen();
        if u != 0.0 {
            return u;
        }
    }
}

const MAX_DOUBLINGS: usize = 1_000;
const BISECTION_STEPS: usize = 200;

/// Exact delta of the Gaussian mechanism with noise `sigma` and L2
/// sensitivity `l2` at privacy level `epsilon`.
pub fn gaussian_delta(epsilon: f64, sigma: f64, l2: f64) -> f64 {
    let a = l2 / (2.0 * sigma) - epsilon * sigma / l2;
    let b = -l2 / (2.0 * sigma) - epsilon * sigma / l2;
    // e^eps would overflow long before the product does.
    let delta = ln_std_normal_cdf(a).exp() - (epsilon + ln_std_normal_cdf(b)).exp();
    delta.max(0.0)
}

fn analytic_gaussian_sigma(epsilon: f64, delta: f64, l2: f64) -> Result<f64, ConfigError> {
    if l2 == 0.0 {
        return Ok(0.0);
    }

    let fits = |sigma: f64| gaussian_delta(epsilon, sigma, l2) <= delta;

    let mut lo = 0.0;
    let mut hi = l2;
    let mut doublings = 0;
    while !fits(hi) {
        lo = hi;
        hi *= 2.0;
        doublings += 1;
        if doublings > MAX_DOUBLINGS || !hi.is_finite() {
            return Err(ConfigError::InvalidBudget(format!(
                "no finite gaussian noise satisfies epsilon {epsilon}, delta {delta}"
            )));
        }
    }

    // Invariant: fits(hi), and lo is either 0 or does not fit.
    for _ in 0..BISECTION_STEPS {
        let mid = 0.5 * (lo + hi);
        if mid <= lo || mid >= hi {
            break;
        }
        if fits(mid) {
            hi = mid;
        } else {
            lo = mid;
        }
    }
    Ok(hi)
}

/// `ln Phi(x)` for the standard normal CDF, without underflow in the tail.
fn ln_std_normal_cdf(x: f64) -> f64 {
    ln_erfc(-x / std::f64::consts::SQRT_2) - std::f64::consts::LN_2
}

/// `ln erfc(x)`; Chebyshev fit with fractional error below 1.2e-7.
fn ln_erfc(x: f64) -> f64 {
    let z = x.abs();
    let t = 1.0 / (1.0 + 0.5 * z);
    let poly = -1.265_512_23
        + t * (1.000_023_68
            + t * (0.374_091_96
                + t * (0.096_784_18
                    + t * (-0.186_288_06
                        + t * (0.278_868_07
                            + t * (-1.135_203_98
                                + t * (1.488_515_87 + t * (-0.822_152_23 + t * 0.170_872_77))))))));
    let ln_tail = t.ln() - z * z + poly;
    if x >= 0.0 {
        ln_tail
    } else {
        (2.0 - ln_tail.exp()).ln()
    }
}

/// Deterministic stand-in that never adds noise. Provides no privacy.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoNoise;

impl NoiseMechanism for NoNoise {
    fn name(&self) -> &'static str {
        "none"
    }

    fn calibrate(&self, _budget: &Budget, _sensitivity: &Sensitivity) -> Result<f64, ConfigError> {
        Ok(0.0)
    }

    fn sample(&self, _scale: f64, _rng: &mut dyn RngCore) -> f64 {
        0.0
    }
}

/// The real mechanism for a noise family.
#[must_use]
pub fn mechanism_for(kind: NoiseKind) -> Arc<dyn NoiseMechanism> {
    match kind {
        NoiseKind::Laplace => Arc::new(LaplaceMechanism),
        NoiseKind::Gaussian => Arc::new(GaussianMechanism),
    }
}

/// Master seed for per-partition noise streams.
#[derive(Clone, PartialEq, Eq)]
pub struct NoiseSeed([u8; 32]);

impl NoiseSeed {
    /// Fresh seed from OS entropy.
    #[must_use]
    pub fn from_entropy() -> Self {
        let mut seed = [0u8; 32];
        OsRng.fill_bytes(&mut seed);
        Self(seed)
    }

    /// Fixed seed, for reproducible runs and tests.
    #[must_use]
    pub fn from_bytes(seed: [u8; 32]) -> Self {
        Self(seed)
    }

    /// Parse 64 hex characters.
    ///
    /// # Errors
    /// `InvalidOption` if the input is not exactly 32 hex-encoded bytes.
    pub fn from_hex(hex: &str) -> Result<Self, ConfigError> {
        let hex = hex.trim();
        if hex.len() != 64 || !hex.is_ascii() {
            return Err(ConfigError::InvalidOption(
                "seed must be 64 hex characters".to_string(),
            ));
        }

        let mut seed = [0u8; 32];
        for (i, byte) in seed.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&hex[2 * i..2 * i + 2], 16).map_err(|_| {
                ConfigError::InvalidOption("seed must be 64 hex characters".to_string())
            })?;
        }
        Ok(Self(seed))
    }

    /// Independent generator for the partition at `index`.
    #[must_use]
    pub fn stream(&self, index: u64) -> ChaCha20Rng {
        let mut rng = ChaCha20Rng::from_seed(self.0);
        rng.set_stream(index);
        rng
    }
}

impl std::fmt::Debug for NoiseSeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("NoiseSeed([REDACTED])")
    }
}
