use std::collections::btree_map::{self, BTreeMap};

use chrono::{DateTime, Utc};
use ndarray::{Array1, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use slog::{debug, info, warn, Logger};
use thiserror::Error;

use crate::analysis::filter::pad_median;
use crate::analysis::{AnalysisError, Delineator, PeakDetector, PeakLabel, PeakSet};
use crate::config::{BatchConfig, DEFAULT_PAD_LEN};
use crate::storage::{self, StorageError};

#[derive(Debug, Error)]
pub enum BatchError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("row {row} failed: {source}")]
    Row {
        row: usize,
        #[source]
        source: AnalysisError,
    },
    #[error("row {0} was already recorded")]
    DuplicateRow(usize),
}

/// What to do when a single row cannot be analyzed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Abort the whole batch on the first failing row
    FailFast,
    /// Log the failure, record an empty peak set and carry on
    #[default]
    BestEffort,
}

/// Drop every missing-value marker from a padded row.
pub fn trim_missing(row: ArrayView1<f64>) -> Array1<f64> {
    row.iter().copied().filter(|v| !v.is_nan()).collect()
}

#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    Detected(PeakSet),
    Failed(AnalysisError),
}

/// Turns one padded matrix row into its peak set: trim, find R peaks,
/// pad the tail with the median, delineate around the R peaks.
#[derive(Debug, Clone)]
pub struct RowProcessor<D, L> {
    detector: D,
    delineator: L,
    sampling_rate: f64,
    pad_len: usize,
}

impl<D: PeakDetector, L: Delineator> RowProcessor<D, L> {
    pub fn new(detector: D, delineator: L, sampling_rate: f64) -> Self {
        Self {
            detector,
            delineator,
            sampling_rate,
            pad_len: DEFAULT_PAD_LEN,
        }
    }

    pub fn with_pad_len(mut self, pad_len: usize) -> Self {
        self.pad_len = pad_len;
        self
    }

    pub fn process_row(&self, row: ArrayView1<f64>) -> Result<PeakSet, AnalysisError> {
        let trimmed = trim_missing(row);
        let r_peaks = self.detector.detect(trimmed.view(), self.sampling_rate)?;
        // padding keeps the last heartbeat's T wave away from the edge
        let padded = pad_median(trimmed.view(), self.pad_len)?;
        let mut peaks = self
            .delineator
            .delineate(padded.view(), &r_peaks, self.sampling_rate)?;
        peaks.insert(PeakLabel::RPeaks, r_peaks);
        peaks.retain_below(padded.len());
        Ok(peaks)
    }

    pub fn process(&self, row: ArrayView1<f64>) -> RowOutcome {
        match self.process_row(row) {
            Ok(peaks) => RowOutcome::Detected(peaks),
            Err(reason) => RowOutcome::Failed(reason),
        }
    }
}

/// Peak sets keyed by the row they came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeakAggregate(BTreeMap<usize, PeakSet>);

impl PeakAggregate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the peaks of `row`. A row is only ever recorded once.
    pub fn insert(&mut self, row: usize, peaks: PeakSet) -> Result<(), BatchError> {
        match self.0.entry(row) {
            btree_map::Entry::Occupied(_) => Err(BatchError::DuplicateRow(row)),
            btree_map::Entry::Vacant(slot) => {
                slot.insert(peaks);
                Ok(())
            }
        }
    }

    pub fn get(&self, row: usize) -> Option<&PeakSet> {
        self.0.get(&row)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, usize, PeakSet> {
        self.0.iter()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowFailure {
    pub row: usize,
    pub reason: String,
}

/// Summary of a batch run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub rows: usize,
    pub succeeded: usize,
    pub failures: Vec<RowFailure>,
    /// Rows analyzed without error in which no R peak was found
    pub rows_without_peaks: Vec<usize>,
    pub started: DateTime<Utc>,
    pub finished: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchRun {
    pub peaks: PeakAggregate,
    pub report: BatchReport,
}

/// Run `processor` over every row of `matrix`, in order.
pub fn process_matrix<D: PeakDetector, L: Delineator>(
    processor: &RowProcessor<D, L>,
    matrix: ArrayView2<f64>,
    policy: FailurePolicy,
    progress_interval: usize,
    logger: &Logger,
) -> Result<BatchRun, BatchError> {
    let started = Utc::now();
    let nr_samples = matrix.nrows();
    let mut peaks = PeakAggregate::new();
    let mut failures = Vec::new();
    let mut rows_without_peaks = Vec::new();

    for (row, signal) in matrix.rows().into_iter().enumerate() {
        match processor.process(signal) {
            RowOutcome::Detected(set) => {
                if set.get(PeakLabel::RPeaks).is_empty() {
                    debug!(logger, "no R peaks found"; "row" => row);
                    rows_without_peaks.push(row);
                }
                peaks.insert(row, set)?;
            }
            RowOutcome::Failed(reason) => match policy {
                FailurePolicy::FailFast => return Err(BatchError::Row { row, source: reason }),
                FailurePolicy::BestEffort => {
                    warn!(logger, "row could not be analyzed"; "row" => row, "reason" => %reason);
                    failures.push(RowFailure {
                        row,
                        reason: reason.to_string(),
                    });
                    peaks.insert(row, PeakSet::new())?;
                }
            },
        }
        if progress_interval > 0 && row % progress_interval == 0 {
            info!(logger, "{} / {} iterations done.", row, nr_samples);
        }
    }

    let report = BatchReport {
        rows: nr_samples,
        succeeded: nr_samples - failures.len(),
        failures,
        rows_without_peaks,
        started,
        finished: Utc::now(),
    };
    Ok(BatchRun { peaks, report })
}

/// Load the signal matrix named by `config`, extract the peaks of every
/// row and save them.
pub fn run_batch(config: &BatchConfig, logger: &Logger) -> Result<BatchReport, BatchError> {
    let matrix = storage::load_signal_matrix(&config.input, &config.loader)?;
    info!(logger, "loaded signal matrix";
        "input" => %config.input.display(),
        "rows" => matrix.nrows(),
        "columns" => matrix.ncols());

    let processor = RowProcessor::new(config.detector, config.delineator, config.sampling_rate)
        .with_pad_len(config.pad_len);
    let run = process_matrix(
        &processor,
        matrix.view(),
        config.policy,
        config.progress_interval,
        logger,
    )?;
    info!(logger, "done with peak detection";
        "succeeded" => run.report.succeeded,
        "failed" => run.report.failures.len(),
        "without_peaks" => run.report.rows_without_peaks.len());

    storage::save_peaks(&config.output, &run.peaks)?;
    if let Some(path) = &config.report {
        storage::save_report(path, &run.report)?;
    }
    info!(logger, "saved successfully"; "output" => %config.output.display());
    Ok(run.report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{DelineationMethod, DetectorMethod};
    use crate::mock::SyntheticEcg;
    use crate::storage::matrix_from_rows;
    use ndarray::{arr1, Array2};
    use slog::o;

    fn logger() -> Logger {
        Logger::root(slog::Discard, o!())
    }

    fn processor() -> RowProcessor<DetectorMethod, DelineationMethod> {
        RowProcessor::new(DetectorMethod::Promac, DelineationMethod::Peak, 300.0)
    }

    /// Rejects every signal.
    struct BrokenDetector;

    impl PeakDetector for BrokenDetector {
        fn detect(&self, _: ArrayView1<f64>, _: f64) -> Result<Vec<usize>, AnalysisError> {
            Err(AnalysisError::NonFinite)
        }
    }

    fn two_row_matrix() -> Array2<f64> {
        let clean = SyntheticEcg::default().generate().to_vec();
        let stub = clean[..5].to_vec();
        matrix_from_rows(vec![clean, stub])
    }

    #[test]
    fn trimming_drops_markers_and_is_idempotent() {
        let row = arr1(&[1.0, f64::NAN, 2.0, 3.0, f64::NAN, f64::NAN]);
        let once = trim_missing(row.view());
        assert_eq!(once, arr1(&[1.0, 2.0, 3.0]));
        assert_eq!(trim_missing(once.view()), once);
    }

    #[test]
    fn aggregate_rejects_duplicate_rows() {
        let mut aggregate = PeakAggregate::new();
        aggregate.insert(0, PeakSet::new()).unwrap();
        assert!(matches!(
            aggregate.insert(0, PeakSet::new()),
            Err(BatchError::DuplicateRow(0))
        ));
        assert_eq!(aggregate.len(), 1);
    }

    #[test]
    fn best_effort_keeps_one_entry_per_row() {
        let matrix = two_row_matrix();
        let run = process_matrix(
            &processor(),
            matrix.view(),
            FailurePolicy::BestEffort,
            1,
            &logger(),
        )
        .unwrap();

        assert_eq!(run.peaks.len(), 2);
        assert_eq!(run.peaks.iter().map(|(&row, _)| row).collect::<Vec<_>>(), vec![0, 1]);

        let r_count = run.peaks.get(0).unwrap().get(PeakLabel::RPeaks).len();
        assert!(r_count.abs_diff(3000 / 300) <= 1, "found {r_count} R peaks");
        assert!(run.peaks.get(1).unwrap().is_empty());

        assert_eq!(run.report.rows, 2);
        assert_eq!(run.report.succeeded, 1);
        assert_eq!(run.report.failures.len(), 1);
        assert_eq!(run.report.failures[0].row, 1);
        assert!(run.report.finished >= run.report.started);
    }

    #[test]
    fn fail_fast_aborts_on_bad_row() {
        let matrix = two_row_matrix();
        let err = process_matrix(
            &processor(),
            matrix.view(),
            FailurePolicy::FailFast,
            0,
            &logger(),
        )
        .unwrap_err();
        match err {
            BatchError::Row { row, source } => {
                assert_eq!(row, 1);
                assert_eq!(
                    source,
                    AnalysisError::SignalTooShort {
                        len: 5,
                        required: 300
                    }
                );
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn peak_indices_are_sorted_and_bounded() {
        let ecg = SyntheticEcg {
            heart_rate: 72.0,
            duration: 8.0,
            ..Default::default()
        }
        .with_noise(0.01, 3);
        let matrix = matrix_from_rows(vec![ecg.generate().to_vec()]);
        let processor = processor().with_pad_len(25);
        let peaks = processor.process_row(matrix.row(0)).unwrap();

        let bound = ecg.len() + 25;
        for (label, indices) in peaks.iter() {
            assert!(indices.windows(2).all(|w| w[0] < w[1]), "{label:?}");
            assert!(indices.iter().all(|&i| i < bound), "{label:?}");
        }
        assert!(!peaks.get(PeakLabel::RPeaks).is_empty());
    }

    #[test]
    fn flat_row_is_recorded_without_peaks() {
        let matrix = Array2::from_elem((1, 600), 0.5);
        let run = process_matrix(
            &processor(),
            matrix.view(),
            FailurePolicy::FailFast,
            100,
            &logger(),
        )
        .unwrap();
        assert!(run.peaks.get(0).unwrap().is_empty());
        assert_eq!(run.report.rows_without_peaks, vec![0]);
        assert!(run.report.failures.is_empty());
    }

    #[test]
    fn detector_failures_are_isolated_per_row() {
        let processor = RowProcessor::new(BrokenDetector, DelineationMethod::Peak, 300.0);
        let matrix = Array2::from_elem((3, 400), 1.0);
        let run = process_matrix(
            &processor,
            matrix.view(),
            FailurePolicy::BestEffort,
            0,
            &logger(),
        )
        .unwrap();
        assert_eq!(run.peaks.len(), 3);
        assert_eq!(run.report.succeeded, 0);
        assert!(run.report.failures.iter().all(|f| f.reason.contains("non-finite")));
    }

    #[test]
    fn empty_matrix_gives_empty_aggregate() {
        let matrix = Array2::<f64>::zeros((0, 12));
        let run = process_matrix(
            &processor(),
            matrix.view(),
            FailurePolicy::BestEffort,
            100,
            &logger(),
        )
        .unwrap();
        assert!(run.peaks.is_empty());
        assert_eq!(run.report.rows, 0);
    }
}
