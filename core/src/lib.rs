//! Batch R-peak detection and P/Q/S/T wave delineation for matrices of ECG
//! signals, one signal per row.
//!
//! [`run_batch`] loads a CSV signal matrix, runs a [`RowProcessor`] over
//! every row and saves the resulting [`PeakAggregate`] as JSON. Detection and
//! delineation sit behind the [`PeakDetector`] and [`Delineator`] traits.

pub mod analysis;
pub mod batch;
pub mod config;
pub mod log;
pub mod mock;
pub mod storage;

pub use analysis::{
    AnalysisError, DelineationMethod, Delineator, DetectorMethod, PeakDetector, PeakLabel,
    PeakSet,
};
pub use batch::{
    process_matrix, run_batch, trim_missing, BatchError, BatchReport, BatchRun, FailurePolicy,
    PeakAggregate, RowFailure, RowOutcome, RowProcessor,
};
pub use config::BatchConfig;
pub use storage::{load_peaks, load_signal_matrix, save_peaks, LoaderOptions, StorageError};
