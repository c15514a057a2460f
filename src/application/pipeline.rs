//! Private sum pipeline: parse → bound → sum with noise → accumulate → format.
//!
//! The result is fully computed before the output sink is touched, so a
//! failed run never leaves partial output behind.

use std::path::Path;

use serde::Serialize;

use super::config::SumConfig;
use super::sum::{PrivateSum, SumOutput};
use crate::adapters::text;
use crate::domain::{ConfigError, MechanismMode, Record};
use crate::PrivsumError;

/// Outcome of one pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutput {
    /// Per-partition results
    pub sum: SumOutput,

    /// The accumulated scalar, formatted
    pub rendered: String,
}

impl PipelineOutput {
    #[must_use]
    pub fn report(&self) -> RunReport {
        RunReport {
            result: self.rendered.clone(),
            mode: self.sum.mode,
            noise: self.sum.noise,
            noise_scale: self.sum.noise_scale,
            epsilon_spent: self.sum.budget.epsilon,
            delta_spent: self.sum.budget.delta,
            partitions: self.sum.partitions.len(),
            generated_at: chrono::Utc::now(),
        }
    }
}

/// Machine-readable summary of a run. Contains only released values.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub result: String,
    pub mode: MechanismMode,
    pub noise: &'static str,
    pub noise_scale: f64,
    pub epsilon_spent: f64,
    pub delta_spent: f64,
    pub partitions: usize,
    pub generated_at: chrono::DateTime<chrono::Utc>,
}

/// Runs a private sum over line-oriented input.
#[derive(Debug, Clone)]
pub struct PrivateSumPipeline {
    config: SumConfig,
}

impl PrivateSumPipeline {
    /// Create a pipeline; the configuration is validated up front.
    ///
    /// # Errors
    /// Returns `ConfigError` for any invalid option.
    pub fn new(config: SumConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Aggregate already-parsed records.
    ///
    /// Each call builds a fresh privacy spec, so each run has the full budget.
    ///
    /// # Errors
    /// Returns error on invalid configuration or budget refusal.
    pub fn run_records(&self, records: Vec<Record>) -> Result<PipelineOutput, PrivsumError> {
        let spec = self.config.privacy_spec()?;
        let bounds = self.config.bounding_params()?;
        let partitions = self.config.partition_set()?;

        let mut sum = PrivateSum::new(&spec, bounds, &partitions);
        if let Some(workers) = self.config.workers {
            sum = sum.with_workers(workers);
        }
        if let Some(seed) = self.config.noise_seed()? {
            sum = sum.with_seed(seed);
        }

        let partition = self.config.default_partition;
        let output = sum.run(records.into_iter().map(|r| r.into_contribution(partition)))?;
        let rendered = output.accumulate().render();

        tracing::info!(
            "Generated private sum (ε={}, δ={}) over {} partition(s)",
            output.budget.epsilon,
            output.budget.delta,
            output.partitions.len()
        );

        Ok(PipelineOutput { sum: output, rendered })
    }

    /// Parse and aggregate in-memory text.
    ///
    /// # Errors
    /// Returns `ParseError` on the first malformed line, before any budget is spent.
    pub fn run_text(&self, input: &str) -> Result<PipelineOutput, PrivsumError> {
        let records = text::parse_records(input)?;
        self.run_records(records)
    }

    /// Read `input`, aggregate, and write the formatted result to `output`.
    ///
    /// `output` is only created when the whole run succeeds.
    ///
    /// # Errors
    /// Returns error on I/O failure, malformed input, or privacy refusal.
    pub fn run_file(&self, input: &Path, output: &Path) -> Result<PipelineOutput, PrivsumError> {
        tracing::info!("Reading input records");
        let records = text::read_records_from_path(input)?;
        let result = self.run_records(records)?;

        tracing::info!("Writing text output");
        text::write_output(output, &result.rendered)?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::ParseError;

    const INPUT: &str = "uid,value\n1,0.5\n2,-3\n3,2";

    fn pipeline(mode: MechanismMode) -> PrivateSumPipeline {
        PrivateSumPipeline::new(SumConfig {
            mode,
            ..SumConfig::default()
        })
        .expect("valid config")
    }

    #[test]
    fn test_no_noise_with_bounding() {
        let out = pipeline(MechanismMode::NoNoiseWithBounding)
            .run_text(INPUT)
            .expect("run");
        assert_eq!(out.rendered, "0.500000");
    }

    #[test]
    fn test_no_noise_without_bounding() {
        let out = pipeline(MechanismMode::NoNoiseWithoutBounding)
            .run_text(INPUT)
            .expect("run");
        assert_eq!(out.rendered, "-0.500000");
    }

    #[test]
    fn test_parse_error_aborts() {
        let err = pipeline(MechanismMode::NoNoiseWithBounding)
            .run_text("uid,value\n1,abc")
            .expect_err("malformed");
        assert!(matches!(err, PrivsumError::Parse(ParseError::Value { line: 2, .. })));
    }

    #[test]
    fn test_invalid_config_rejected_up_front() {
        let err = PrivateSumPipeline::new(SumConfig {
            epsilon: -1.0,
            ..SumConfig::default()
        })
        .expect_err("invalid epsilon");
        assert!(matches!(err, ConfigError::InvalidBudget(_)));
    }

    #[test]
    fn test_each_run_has_full_budget() {
        let p = pipeline(MechanismMode::NoNoiseWithBounding);
        p.run_text(INPUT).expect("first run");
        p.run_text(INPUT).expect("second run gets a fresh spec");
    }

    #[test]
    fn test_records_outside_default_partition_dropped() {
        let p = PrivateSumPipeline::new(SumConfig {
            mode: MechanismMode::NoNoiseWithBounding,
            partitions: vec![1],
            default_partition: 0,
            ..SumConfig::default()
        })
        .expect("valid config");

        let out = p.run_text(INPUT).expect("run");
        assert_eq!(out.rendered, "0.000000");
        assert_eq!(out.sum.partitions.len(), 1);
    }

    #[test]
    fn test_report() {
        let out = pipeline(MechanismMode::NoNoiseWithBounding)
            .run_text(INPUT)
            .expect("run");
        let report = serde_json::to_value(out.report()).expect("serialize");

        assert_eq!(report["result"], "0.500000");
        assert_eq!(report["mode"], "no-noise-with-bounding");
        assert_eq!(report["noise"], "none");
        assert_eq!(report["partitions"], 1);
    }

    #[test]
    fn test_run_file_writes_only_on_success() {
        let dir = tempfile::tempdir().expect("temp dir");
        let good = dir.path().join("good.csv");
        let bad = dir.path().join("bad.csv");
        let out_good = dir.path().join("good.out");
        let out_bad = dir.path().join("bad.out");
        std::fs::write(&good, INPUT).expect("write input");
        std::fs::write(&bad, "uid,value\n1,abc\n").expect("write input");

        let p = pipeline(MechanismMode::NoNoiseWithBounding);
        p.run_file(&good, &out_good).expect("run");
        assert_eq!(std::fs::read_to_string(&out_good).expect("output"), "0.500000\n");

        assert!(p.run_file(&bad, &out_bad).is_err());
        assert!(!out_bad.exists());
    }
}
