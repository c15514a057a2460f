//! privsum: differentially-private sum over a CSV of `(entity, value)` records.
//!
//! Main entry point for the command-line tool.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use privsum::{MechanismMode, NoiseKind, PrivateSumPipeline, SumConfig};

#[derive(Parser, Debug)]
#[command(name = "privsum", version, about = "Differentially-private sum over per-entity records")]
struct Cli {
    #[arg(long, help = "Input csv file with raw data (header, then <entity_id>,<value> lines)")]
    input_file: PathBuf,

    #[arg(long, help = "Output file for the released sum")]
    output_stats_file: PathBuf,

    #[arg(long, help = "JSON config file; flags and PRIVSUM_* variables override it")]
    config: Option<PathBuf>,

    #[arg(long, help = "Total epsilon budget (> 0)")]
    epsilon: Option<f64>,

    #[arg(long, help = "Total delta budget (in [0, 1))")]
    delta: Option<f64>,

    #[arg(long, allow_hyphen_values = true, help = "Lower clamping bound")]
    min_value: Option<f64>,

    #[arg(long, allow_hyphen_values = true, help = "Upper clamping bound")]
    max_value: Option<f64>,

    #[arg(long, help = "Maximum partitions a single entity may contribute to (>= 1)")]
    max_partitions_contributed: Option<usize>,

    #[arg(
        long,
        value_delimiter = ',',
        allow_hyphen_values = true,
        help = "Public partition keys, comma separated"
    )]
    partitions: Option<Vec<i64>>,

    #[arg(long, help = "real, no-noise-with-bounding or no-noise-without-bounding")]
    mode: Option<MechanismMode>,

    #[arg(long, help = "laplace or gaussian (default: laplace when delta is 0)")]
    noise_kind: Option<NoiseKind>,

    #[arg(long, help = "Worker threads for per-partition summation")]
    workers: Option<usize>,

    #[arg(long, help = "Master noise seed, 64 hex characters (reproducible runs only)")]
    seed: Option<String>,

    #[arg(long, help = "Print a machine-readable JSON run report")]
    json: bool,
}

impl Cli {
    fn into_config(self) -> Result<(SumConfig, PathBuf, PathBuf, bool)> {
        let base = match &self.config {
            Some(path) => SumConfig::from_json_file(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => SumConfig::default(),
        };
        let mut config = base.with_env_overrides();

        if let Some(v) = self.epsilon {
            config.epsilon = v;
        }
        if let Some(v) = self.delta {
            config.delta = v;
        }
        if let Some(v) = self.min_value {
            config.min_value = v;
        }
        if let Some(v) = self.max_value {
            config.max_value = v;
        }
        if let Some(v) = self.max_partitions_contributed {
            config.max_partitions_contributed = v;
        }
        if let Some(v) = self.partitions {
            config.partitions = v;
        }
        if let Some(v) = self.mode {
            config.mode = v;
        }
        if let Some(v) = self.noise_kind {
            config.noise_kind = Some(v);
        }
        if let Some(v) = self.workers {
            config.workers = Some(v);
        }
        if let Some(v) = self.seed {
            config.seed = Some(v);
        }

        Ok((config, self.input_file, self.output_stats_file, self.json))
    }
}

/// Logs go to stderr so stdout stays clean for `--json`; set
/// `PRIVSUM_LOG_FILE` to append them to a file instead.
fn init_logging() -> Result<WorkerGuard> {
    let (writer, guard) = match std::env::var("PRIVSUM_LOG_FILE") {
        Ok(log_file) => {
            if let Some(parent) = std::path::Path::new(&log_file).parent() {
                // Best-effort: the open below reports the real error.
                let _ = std::fs::create_dir_all(parent);
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&log_file)
                .with_context(|| format!("Failed to open log file {log_file}"))?;
            tracing_appender::non_blocking(file)
        }
        Err(_) => tracing_appender::non_blocking(std::io::stderr()),
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(writer))
        .init();

    Ok(guard)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = init_logging()?;

    let (config, input, output, json) = cli.into_config()?;
    let pipeline = PrivateSumPipeline::new(config).context("Invalid configuration")?;

    tracing::info!("Starting private sum...");
    let result = pipeline
        .run_file(&input, &output)
        .context("Private sum failed; no output was written")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result.report())?);
    }

    tracing::info!("Private sum complete.");
    Ok(())
}
