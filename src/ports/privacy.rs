//! Differential Privacy port: Trait for noise-adding mechanisms.
//!
//! The summation code is written once against [`NoiseMechanism`] and works
//! with any implementation, including the noise-free test variants.

use rand::RngCore;

use crate::domain::{Budget, ConfigError, Sensitivity};

/// Errors that can occur while spending privacy budget.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DpError {
    #[error(
        "Privacy budget exhausted: requested (ε={requested_epsilon}, δ={requested_delta}), \
         remaining (ε={remaining_epsilon}, δ={remaining_delta})"
    )]
    BudgetExhausted {
        requested_epsilon: f64,
        requested_delta: f64,
        remaining_epsilon: f64,
        remaining_delta: f64,
    },

    #[error("Invalid budget fraction: {0} (must be in (0, 1])")]
    InvalidFraction(f64),

    #[error("Privacy budget ledger unavailable")]
    LedgerUnavailable,

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Capability: produce a noise sample of a given scale from a random source.
///
/// Implementations must be stateless apart from configuration so a single
/// instance can serve every partition concurrently.
pub trait NoiseMechanism: Send + Sync + std::fmt::Debug {
    /// Short name used in logs and run reports.
    fn name(&self) -> &'static str;

    /// Derive the noise scale for a budget share and sensitivity.
    ///
    /// The scale must grow with sensitivity and shrink with epsilon.
    ///
    /// # Errors
    /// Returns error if the budget cannot be used with this mechanism.
    fn calibrate(&self, budget: &Budget, sensitivity: &Sensitivity) -> Result<f64, ConfigError>;

    /// Draw one zero-centered sample with the given scale.
    fn sample(&self, scale: f64, rng: &mut dyn RngCore) -> f64;
}
