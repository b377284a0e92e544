use std::collections::btree_map::{self, BTreeMap};

use find_peaks::PeakFinder;
use ndarray::ArrayView1;
use ndarray_stats::errors::{MinMaxError, QuantileError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod delineate;
pub mod ecg;
pub mod filter;
mod tests;

pub use delineate::{DelineationMethod, PeakDelineator, WindowDelineator};
pub use ecg::{
    DetectorMethod, NeurokitDetector, PanTompkinsDetector, ProminenceDetector, PromacDetector,
};

/// Minimum signal duration, in seconds, any detector will look at.
pub const MIN_DURATION: f64 = 1.0;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("signal has {len} samples but at least {required} are needed")]
    SignalTooShort { len: usize, required: usize },
    #[error("signal contains non-finite values")]
    NonFinite,
    #[error("sampling rate must be a positive number of Hz, got {0}")]
    InvalidSamplingRate(f64),
    #[error("filter design failed: {0}")]
    Filter(String),
    #[error("reference peak {index} lies outside a signal of {len} samples")]
    PeakOutOfBounds { index: usize, len: usize },
    #[error("cannot take extrema of the signal: {0}")]
    Extrema(#[from] MinMaxError),
    #[error("cannot take quantiles of the signal: {0}")]
    Quantile(#[from] QuantileError),
}

/// The waveform features a peak set can hold. Serialized with the
/// column names downstream feature extraction expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PeakLabel {
    #[serde(rename = "ECG_R_Peaks")]
    RPeaks,
    #[serde(rename = "ECG_P_Peaks")]
    PPeaks,
    #[serde(rename = "ECG_Q_Peaks")]
    QPeaks,
    #[serde(rename = "ECG_S_Peaks")]
    SPeaks,
    #[serde(rename = "ECG_T_Peaks")]
    TPeaks,
    #[serde(rename = "ECG_P_Onsets")]
    POnsets,
    #[serde(rename = "ECG_T_Offsets")]
    TOffsets,
}

impl PeakLabel {
    pub const ALL: [PeakLabel; 7] = [
        PeakLabel::RPeaks,
        PeakLabel::PPeaks,
        PeakLabel::QPeaks,
        PeakLabel::SPeaks,
        PeakLabel::TPeaks,
        PeakLabel::POnsets,
        PeakLabel::TOffsets,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PeakLabel::RPeaks => "ECG_R_Peaks",
            PeakLabel::PPeaks => "ECG_P_Peaks",
            PeakLabel::QPeaks => "ECG_Q_Peaks",
            PeakLabel::SPeaks => "ECG_S_Peaks",
            PeakLabel::TPeaks => "ECG_T_Peaks",
            PeakLabel::POnsets => "ECG_P_Onsets",
            PeakLabel::TOffsets => "ECG_T_Offsets",
        }
    }
}

/// Sample indices of every waveform feature found in one signal.
///
/// Each sequence is kept sorted ascending without duplicates. Every label
/// in [`PeakLabel::ALL`] is present, possibly with no indices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeakSet(BTreeMap<PeakLabel, Vec<usize>>);

impl Default for PeakSet {
    fn default() -> Self {
        Self::new()
    }
}

impl PeakSet {
    pub fn new() -> Self {
        Self(PeakLabel::ALL.iter().map(|&label| (label, Vec::new())).collect())
    }

    pub fn get(&self, label: PeakLabel) -> &[usize] {
        self.0.get(&label).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Replace the indices stored under `label`, sorting and deduplicating them.
    pub fn insert(&mut self, label: PeakLabel, mut indices: Vec<usize>) {
        indices.sort_unstable();
        indices.dedup();
        self.0.insert(label, indices);
    }

    /// Drop every index at or past `bound`.
    pub fn retain_below(&mut self, bound: usize) {
        for indices in self.0.values_mut() {
            indices.retain(|&i| i < bound);
        }
    }

    /// True if no label holds any index.
    pub fn is_empty(&self) -> bool {
        self.0.values().all(|v| v.is_empty())
    }

    pub fn iter(&self) -> btree_map::Iter<'_, PeakLabel, Vec<usize>> {
        self.0.iter()
    }
}

/// Finds the reference (R) peaks of an ECG signal.
pub trait PeakDetector {
    fn detect(&self, signal: ArrayView1<f64>, sampling_rate: f64)
        -> Result<Vec<usize>, AnalysisError>;
}

/// Locates the secondary waves of each heartbeat given its R peak.
pub trait Delineator {
    fn delineate(
        &self,
        signal: ArrayView1<f64>,
        r_peaks: &[usize],
        sampling_rate: f64,
    ) -> Result<PeakSet, AnalysisError>;
}

/// Reject signals no detector can work with.
pub fn check_signal(signal: ArrayView1<f64>, sampling_rate: f64) -> Result<(), AnalysisError> {
    if !(sampling_rate.is_finite() && sampling_rate > 0.0) {
        return Err(AnalysisError::InvalidSamplingRate(sampling_rate));
    }
    let required = ((MIN_DURATION * sampling_rate).ceil() as usize).max(3);
    if signal.len() < required {
        return Err(AnalysisError::SignalTooShort {
            len: signal.len(),
            required,
        });
    }
    if signal.iter().any(|v| !v.is_finite()) {
        return Err(AnalysisError::NonFinite);
    }
    Ok(())
}

/// Convert a duration in seconds to a whole number of samples.
pub(crate) fn samples(seconds: f64, sampling_rate: f64) -> usize {
    (seconds * sampling_rate).round().max(0.0) as usize
}

/// Positions of the local maxima of `signal`, ascending.
pub(crate) fn local_maxima(
    signal: ArrayView1<f64>,
    min_prominence: f64,
    min_distance: usize,
) -> Vec<usize> {
    if signal.len() < 3 {
        return Vec::new();
    }
    let data = signal.to_vec();
    let peaks = PeakFinder::new(&data)
        .with_min_prominence(min_prominence)
        .with_min_distance(min_distance.max(1))
        .find_peaks();

    let mut peaks: Vec<usize> = peaks.iter().map(|p| p.position.start).collect();
    peaks.sort_unstable();
    peaks
}

pub(crate) fn local_minima(
    signal: ArrayView1<f64>,
    min_prominence: f64,
    min_distance: usize,
) -> Vec<usize> {
    let inverted = signal.mapv(|v| -v);
    local_maxima(inverted.view(), min_prominence, min_distance)
}
