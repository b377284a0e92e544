use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use slog::info;

use hbcore::analysis::{DelineationMethod, DetectorMethod};
use hbcore::config::{DEFAULT_PAD_LEN, DEFAULT_PROGRESS_INTERVAL, DEFAULT_SAMPLING_RATE};
use hbcore::log::{create_logger, LogLevel};
use hbcore::{run_batch, BatchConfig, FailurePolicy, LoaderOptions};

fn positive_float(s: &str) -> Result<f64, String> {
    let value = s.parse::<f64>().map_err(|e| e.to_string())?;
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(format!("`{s}` is not a positive number"))
    }
}

/// Detect R peaks and delineate P, Q, S and T waves in every row of an ECG
/// signal matrix.
///
/// Reads a CSV file with one signal per row, right-padded with empty cells or
/// NaN, and writes a JSON object mapping each row index to its peak indices.
#[derive(Parser, Debug)]
#[command(author, version)]
struct Args {
    /// The CSV file of ECG signals to read
    #[arg(env = "HBPEAKS_INPUT")]
    input: PathBuf,

    /// The path to write the JSON peak file to
    #[arg(short = 'o', long = "output", env = "HBPEAKS_OUTPUT")]
    output: PathBuf,

    /// The sampling rate of the signals, in Hz
    #[arg(
        short = 'r',
        long = "sampling-rate",
        env = "HBPEAKS_SAMPLING_RATE",
        default_value_t = DEFAULT_SAMPLING_RATE,
        value_parser = positive_float,
    )]
    sampling_rate: f64,

    /// The R-peak detection strategy
    #[arg(short = 'd', long, value_enum, env = "HBPEAKS_DETECTOR", default_value_t = DetectorMethod::Promac)]
    detector: DetectorMethod,

    /// The wave delineation strategy
    #[arg(short = 'l', long, value_enum, env = "HBPEAKS_DELINEATOR", default_value_t = DelineationMethod::Peak)]
    delineator: DelineationMethod,

    /// How many median-valued samples to append to each signal before delineation
    #[arg(long = "pad", env = "HBPEAKS_PAD", default_value_t = DEFAULT_PAD_LEN)]
    pad_len: usize,

    /// Log progress every this many rows, 0 to disable
    #[arg(long = "progress-every", env = "HBPEAKS_PROGRESS_EVERY", default_value_t = DEFAULT_PROGRESS_INTERVAL)]
    progress_interval: usize,

    /// Abort on the first row that cannot be analyzed instead of recording it as empty
    #[arg(long, env = "HBPEAKS_FAIL_FAST")]
    fail_fast: bool,

    /// Treat the first line of the input as data rather than column names
    #[arg(long, env = "HBPEAKS_NO_HEADER")]
    no_header: bool,

    /// Also write a JSON report of the run to this path
    #[arg(long, env = "HBPEAKS_REPORT")]
    report: Option<PathBuf>,

    #[arg(long, value_enum, env = "HBPEAKS_LOG_LEVEL", default_value_t = LogLevel::Info)]
    log_level: LogLevel,
}

impl Args {
    fn into_config(self) -> BatchConfig {
        let mut config = BatchConfig::new(self.input, self.output);
        config.report = self.report;
        config.sampling_rate = self.sampling_rate;
        config.detector = self.detector;
        config.delineator = self.delineator;
        config.pad_len = self.pad_len;
        config.progress_interval = self.progress_interval;
        config.policy = if self.fail_fast {
            FailurePolicy::FailFast
        } else {
            FailurePolicy::BestEffort
        };
        config.loader = LoaderOptions {
            has_header: !self.no_header,
            ..Default::default()
        };
        config
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let logger = create_logger("hbpeaks", args.log_level);
    let config = args.into_config();
    info!(logger, "starting peak extraction";
        "detector" => ?config.detector,
        "delineator" => ?config.delineator,
        "sampling_rate" => config.sampling_rate);

    let report = run_batch(&config, &logger)
        .with_context(|| format!("peak extraction over {} failed", config.input.display()))?;

    info!(logger, "finished";
        "rows" => report.rows,
        "failed" => report.failures.len(),
        "elapsed_ms" => (report.finished - report.started).num_milliseconds());
    Ok(())
}
