use std::path::PathBuf;

use crate::analysis::{DelineationMethod, DetectorMethod};
use crate::batch::FailurePolicy;
use crate::storage::LoaderOptions;

pub const DEFAULT_SAMPLING_RATE: f64 = 300.0;
/// Median-valued samples appended to each signal before delineation.
pub const DEFAULT_PAD_LEN: usize = 10;
pub const DEFAULT_PROGRESS_INTERVAL: usize = 100;

/// Everything one batch run needs to know.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    /// Where to write the batch report, if anywhere
    pub report: Option<PathBuf>,
    /// Hz
    pub sampling_rate: f64,
    pub detector: DetectorMethod,
    pub delineator: DelineationMethod,
    pub pad_len: usize,
    /// Log progress every this many rows; 0 disables it
    pub progress_interval: usize,
    pub policy: FailurePolicy,
    pub loader: LoaderOptions,
}

impl BatchConfig {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            report: None,
            sampling_rate: DEFAULT_SAMPLING_RATE,
            detector: DetectorMethod::default(),
            delineator: DelineationMethod::default(),
            pad_len: DEFAULT_PAD_LEN,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            policy: FailurePolicy::default(),
            loader: LoaderOptions::default(),
        }
    }
}
