use clap::ValueEnum;
use ndarray::{s, Array1, ArrayView1};
use ndarray_stats::QuantileExt;

use crate::analysis::filter::{
    bandpass_filter, boxcar_smooth, gaussian_kernel, gradient, moving_window_integration,
};
use crate::analysis::{check_signal, local_maxima, samples, AnalysisError, PeakDetector};

/// The R-peak detection strategy to run over each signal.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum DetectorMethod {
    /// Thresholded, smoothed absolute gradient
    Neurokit,
    /// Band-pass, derivative, squaring, integration and adaptive thresholds
    #[value(name = "pantompkins")]
    PanTompkins,
    /// Local maxima with a minimum prominence and refractory distance
    Prominence,
    /// Probabilistic consensus of the other detectors
    #[default]
    Promac,
}

impl PeakDetector for DetectorMethod {
    fn detect(
        &self,
        signal: ArrayView1<f64>,
        sampling_rate: f64,
    ) -> Result<Vec<usize>, AnalysisError> {
        match self {
            DetectorMethod::Neurokit => NeurokitDetector::default().detect(signal, sampling_rate),
            DetectorMethod::PanTompkins => {
                PanTompkinsDetector::default().detect(signal, sampling_rate)
            }
            DetectorMethod::Prominence => {
                ProminenceDetector::default().detect(signal, sampling_rate)
            }
            DetectorMethod::Promac => PromacDetector::default().detect(signal, sampling_rate),
        }
    }
}

/// QRS complexes are the stretches where the smoothed absolute gradient
/// rises well above its slower running average; the R peak is the
/// maximum of each stretch.
#[derive(Debug, Clone, PartialEq)]
pub struct NeurokitDetector {
    /// Seconds
    pub smooth_window: f64,
    /// Seconds
    pub average_window: f64,
    pub gradient_threshold_weight: f64,
    pub min_length_weight: f64,
    /// Seconds between consecutive peaks
    pub min_delay: f64,
}

impl Default for NeurokitDetector {
    fn default() -> Self {
        Self {
            smooth_window: 0.1,
            average_window: 0.75,
            gradient_threshold_weight: 1.5,
            min_length_weight: 0.4,
            min_delay: 0.3,
        }
    }
}

impl PeakDetector for NeurokitDetector {
    fn detect(
        &self,
        signal: ArrayView1<f64>,
        sampling_rate: f64,
    ) -> Result<Vec<usize>, AnalysisError> {
        check_signal(signal, sampling_rate)?;

        let absgrad = gradient(signal).mapv(f64::abs);
        let smooth_kernel = samples(self.smooth_window, sampling_rate).max(1);
        let average_kernel = samples(self.average_window, sampling_rate).max(1);
        let smoothgrad = boxcar_smooth(absgrad.view(), smooth_kernel);
        let avggrad = boxcar_smooth(smoothgrad.view(), average_kernel);
        let min_delay = samples(self.min_delay, sampling_rate);

        let qrs: Vec<bool> = smoothgrad
            .iter()
            .zip(avggrad.iter())
            .map(|(&smooth, &avg)| smooth > self.gradient_threshold_weight * avg)
            .collect();

        let beg_qrs: Vec<usize> = qrs
            .windows(2)
            .enumerate()
            .filter(|(_, w)| !w[0] && w[1])
            .map(|(i, _)| i)
            .collect();
        let Some(&first_beg) = beg_qrs.first() else {
            return Ok(Vec::new());
        };
        let end_qrs: Vec<usize> = qrs
            .windows(2)
            .enumerate()
            .filter(|(i, w)| w[0] && !w[1] && *i > first_beg)
            .map(|(i, _)| i)
            .collect();

        let num_qrs = beg_qrs.len().min(end_qrs.len());
        if num_qrs == 0 {
            return Ok(Vec::new());
        }
        let mean_len = beg_qrs
            .iter()
            .zip(end_qrs.iter())
            .map(|(&b, &e)| e as f64 - b as f64)
            .sum::<f64>()
            / num_qrs as f64;
        let min_len = mean_len * self.min_length_weight;

        let mut peaks: Vec<usize> = Vec::new();
        for (&beg, &end) in beg_qrs.iter().zip(end_qrs.iter()) {
            if end <= beg || ((end - beg) as f64) < min_len {
                continue;
            }
            let Ok(offset) = signal.slice(s![beg..end]).argmax() else {
                continue;
            };
            let peak = beg + offset;
            if peaks.last().map_or(true, |&last| peak.saturating_sub(last) > min_delay) {
                peaks.push(peak);
            }
        }
        Ok(peaks)
    }
}

/// Classic Pan-Tompkins: the squared derivative of the band-passed signal is
/// integrated over a short window, and candidate maxima are classified as
/// signal or noise against running estimates of both levels.
#[derive(Debug, Clone, PartialEq)]
pub struct PanTompkinsDetector {
    /// Hz
    pub band: (f64, f64),
    /// Seconds
    pub integration_window: f64,
    /// Seconds
    pub refractory_period: f64,
    /// Seconds of signal used to seed the thresholds
    pub learning_period: f64,
}

impl Default for PanTompkinsDetector {
    fn default() -> Self {
        Self {
            band: (5.0, 15.0),
            integration_window: 0.15,
            refractory_period: 0.2,
            learning_period: 2.0,
        }
    }
}

impl PanTompkinsDetector {
    fn filter(&self, signal: ArrayView1<f64>, fs: f64) -> Result<Array1<f64>, AnalysisError> {
        let (low, high) = self.band;
        // keep the upper edge below Nyquist for low sampling rates
        let high = high.min(0.45 * fs);
        let mean = signal.mean().unwrap_or(0.0);
        let centered = signal.mapv(|v| v - mean);
        if low >= high {
            return Ok(centered);
        }
        bandpass_filter(centered.view(), low, high, fs)
    }
}

impl PeakDetector for PanTompkinsDetector {
    fn detect(
        &self,
        signal: ArrayView1<f64>,
        sampling_rate: f64,
    ) -> Result<Vec<usize>, AnalysisError> {
        check_signal(signal, sampling_rate)?;

        let filtered = self.filter(signal, sampling_rate)?;
        let squared = gradient(filtered.view()).mapv(|d| d * d);
        let window = samples(self.integration_window, sampling_rate).max(1);
        let integrated = moving_window_integration(squared.view(), window);
        let refractory = samples(self.refractory_period, sampling_rate).max(1);
        let candidates = local_maxima(integrated.view(), 0.0, refractory);

        let learning = samples(self.learning_period, sampling_rate)
            .clamp(1, integrated.len());
        let head = integrated.slice(s![..learning]);
        let mut spki = *head.max()? / 3.0;
        let mut npki = head.mean().unwrap_or(0.0) / 2.0;
        let mut threshold = npki + 0.25 * (spki - npki);

        let mut peaks: Vec<usize> = Vec::new();
        for candidate in candidates {
            let value = integrated[candidate];
            if value > threshold {
                spki = 0.125 * value + 0.875 * spki;
                // the integrator lags the QRS, so look back one window
                let start = candidate.saturating_sub(window);
                let offset = signal.slice(s![start..=candidate]).argmax()?;
                let peak = start + offset;
                let merge = peaks
                    .last()
                    .map_or(false, |&last| peak <= last || peak - last < refractory);
                if !merge {
                    peaks.push(peak);
                } else if let Some(last) = peaks.last_mut() {
                    if signal[peak] > signal[*last] {
                        *last = peak;
                    }
                }
            } else {
                npki = 0.125 * value + 0.875 * npki;
            }
            threshold = npki + 0.25 * (spki - npki);
        }
        Ok(peaks)
    }
}

/// R peaks as the local maxima standing out by a fixed fraction of the
/// signal range, at least one refractory period apart.
#[derive(Debug, Clone, PartialEq)]
pub struct ProminenceDetector {
    /// Fraction of `max - min`
    pub relative_prominence: f64,
    /// Seconds
    pub min_distance: f64,
}

impl Default for ProminenceDetector {
    fn default() -> Self {
        Self {
            relative_prominence: 0.5,
            min_distance: 0.3,
        }
    }
}

impl PeakDetector for ProminenceDetector {
    fn detect(
        &self,
        signal: ArrayView1<f64>,
        sampling_rate: f64,
    ) -> Result<Vec<usize>, AnalysisError> {
        check_signal(signal, sampling_rate)?;

        let range = signal.max()? - signal.min()?;
        if range <= 0.0 {
            return Ok(Vec::new());
        }
        let prominence = self.relative_prominence * range;
        let distance = samples(self.min_distance, sampling_rate);
        Ok(local_maxima(signal, prominence, distance))
    }
}

/// Each member detector votes with a Gaussian centered on every peak it
/// reports; peaks of the normalized vote above `threshold` are kept and
/// moved onto the nearby signal maximum.
#[derive(Debug, Clone, PartialEq)]
pub struct PromacDetector {
    pub methods: Vec<DetectorMethod>,
    pub threshold: f64,
    /// Seconds
    pub gaussian_sd: f64,
}

impl Default for PromacDetector {
    fn default() -> Self {
        Self {
            methods: vec![
                DetectorMethod::Neurokit,
                DetectorMethod::PanTompkins,
                DetectorMethod::Prominence,
            ],
            threshold: 0.33,
            gaussian_sd: 0.1,
        }
    }
}

impl PeakDetector for PromacDetector {
    fn detect(
        &self,
        signal: ArrayView1<f64>,
        sampling_rate: f64,
    ) -> Result<Vec<usize>, AnalysisError> {
        check_signal(signal, sampling_rate)?;

        let n = signal.len();
        let sd = (self.gaussian_sd * sampling_rate).max(1.0);
        let kernel = gaussian_kernel(sd);
        let half = kernel.len() / 2;

        let mut votes = Array1::<f64>::zeros(n);
        for method in self.methods.iter().filter(|m| **m != DetectorMethod::Promac) {
            for peak in method.detect(signal, sampling_rate)? {
                for (k, &weight) in kernel.iter().enumerate() {
                    if let Some(i) = (peak + k).checked_sub(half).filter(|&i| i < n) {
                        votes[i] += weight;
                    }
                }
            }
        }

        let top = *votes.max()?;
        if top <= 0.0 {
            return Ok(Vec::new());
        }
        votes.mapv_inplace(|v| {
            let v = v / top;
            if v < self.threshold {
                0.0
            } else {
                v
            }
        });

        let snap = (sd / 2.0).round() as usize;
        let mut peaks: Vec<usize> = Vec::new();
        for candidate in local_maxima(votes.view(), 0.0, 1) {
            let start = candidate.saturating_sub(snap);
            let end = (candidate + snap + 1).min(n);
            let peak = start + signal.slice(s![start..end]).argmax()?;
            peaks.push(peak);
        }
        peaks.sort_unstable();
        peaks.dedup();
        Ok(peaks)
    }
}
