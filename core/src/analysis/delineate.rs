use clap::ValueEnum;
use ndarray::{s, ArrayView1};
use ndarray_stats::QuantileExt;

use crate::analysis::filter::gradient;
use crate::analysis::{
    local_maxima, local_minima, samples, AnalysisError, Delineator, PeakLabel, PeakSet,
};

/// The wave delineation strategy, anchored on previously detected R peaks.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum DelineationMethod {
    /// Local extrema inside each heartbeat
    #[default]
    Peak,
    /// Extrema of fixed windows around each R peak
    Window,
}

impl Delineator for DelineationMethod {
    fn delineate(
        &self,
        signal: ArrayView1<f64>,
        r_peaks: &[usize],
        sampling_rate: f64,
    ) -> Result<PeakSet, AnalysisError> {
        match self {
            DelineationMethod::Peak => {
                PeakDelineator::default().delineate(signal, r_peaks, sampling_rate)
            }
            DelineationMethod::Window => {
                WindowDelineator::default().delineate(signal, r_peaks, sampling_rate)
            }
        }
    }
}

/// Waves found for a single heartbeat, as absolute signal indices.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Waves {
    p: Option<usize>,
    q: Option<usize>,
    s: Option<usize>,
    t: Option<usize>,
    p_onset: Option<usize>,
    t_offset: Option<usize>,
}

impl Waves {
    fn collect_into(beats: &[Waves]) -> PeakSet {
        let pick = |f: fn(&Waves) -> Option<usize>| beats.iter().filter_map(f).collect::<Vec<_>>();
        let mut peaks = PeakSet::new();
        peaks.insert(PeakLabel::PPeaks, pick(|w| w.p));
        peaks.insert(PeakLabel::QPeaks, pick(|w| w.q));
        peaks.insert(PeakLabel::SPeaks, pick(|w| w.s));
        peaks.insert(PeakLabel::TPeaks, pick(|w| w.t));
        peaks.insert(PeakLabel::POnsets, pick(|w| w.p_onset));
        peaks.insert(PeakLabel::TOffsets, pick(|w| w.t_offset));
        peaks
    }
}

/// A window `[start, end)` of the signal around one R peak.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Heartbeat {
    start: usize,
    rpeak: usize,
    end: usize,
}

fn check_peaks(r_peaks: &[usize], len: usize) -> Result<(), AnalysisError> {
    match r_peaks.iter().find(|&&r| r >= len) {
        Some(&index) => Err(AnalysisError::PeakOutOfBounds { index, len }),
        None => Ok(()),
    }
}

/// Mean R-R interval in seconds, one second when it cannot be measured.
fn mean_rr(r_peaks: &[usize], sampling_rate: f64) -> f64 {
    if r_peaks.len() < 2 {
        return 1.0;
    }
    let first = r_peaks[0] as f64;
    let last = r_peaks[r_peaks.len() - 1] as f64;
    let mean = (last - first) / (r_peaks.len() - 1) as f64 / sampling_rate;
    if mean > 0.0 {
        mean
    } else {
        1.0
    }
}

fn segment_heartbeats(
    len: usize,
    r_peaks: &[usize],
    sampling_rate: f64,
    ratio_pre: f64,
) -> Vec<Heartbeat> {
    let rr = mean_rr(r_peaks, sampling_rate);
    let pre = samples(ratio_pre * rr, sampling_rate);
    let post = samples((1.0 - ratio_pre) * rr, sampling_rate);
    r_peaks
        .iter()
        .map(|&rpeak| Heartbeat {
            start: rpeak.saturating_sub(pre),
            rpeak,
            end: (rpeak + post + 1).min(len),
        })
        .collect()
}

/// Index of the sharpest upward bend of `signal[start..end]`.
fn max_curvature(signal: ArrayView1<f64>, start: usize, end: usize) -> Option<usize> {
    if end <= start || end - start < 2 {
        return None;
    }
    let curvature = gradient(gradient(signal.slice(s![start..end])).view());
    curvature.argmax().ok().map(|i| start + i)
}

fn argmin_in(signal: ArrayView1<f64>, start: usize, end: usize) -> Option<usize> {
    if end <= start {
        return None;
    }
    signal.slice(s![start..end]).argmin().ok().map(|i| start + i)
}

fn argmax_in(signal: ArrayView1<f64>, start: usize, end: usize) -> Option<usize> {
    if end <= start {
        return None;
    }
    signal.slice(s![start..end]).argmax().ok().map(|i| start + i)
}

/// Delineates each heartbeat from its own local extrema: Q is the last
/// trough before R, S the first trough after it, P and T the tallest
/// bumps beyond Q and S. Onsets and offsets sit at the point of greatest
/// curvature outside P and T.
#[derive(Debug, Clone, PartialEq)]
pub struct PeakDelineator {
    /// Share of the mean R-R interval placed before each R peak
    pub ratio_pre: f64,
    /// Minimum extremum prominence as a fraction of the heartbeat range
    pub relative_prominence: f64,
}

impl Default for PeakDelineator {
    fn default() -> Self {
        Self {
            ratio_pre: 0.35,
            relative_prominence: 0.01,
        }
    }
}

impl PeakDelineator {
    fn delineate_beat(&self, signal: ArrayView1<f64>, beat: Heartbeat) -> Waves {
        let segment = signal.slice(s![beat.start..beat.end]);
        let (Ok(&high), Ok(&low)) = (segment.max(), segment.min()) else {
            return Waves::default();
        };
        let prominence = self.relative_prominence * (high - low);
        let r = beat.rpeak - beat.start;

        let q = local_minima(segment.slice(s![..r]), prominence, 1)
            .last()
            .copied();
        let p = q.and_then(|q| tallest(segment, local_maxima(segment.slice(s![..q]), prominence, 1)));
        let s_wave = local_minima(segment.slice(s![r + 1..]), prominence, 1)
            .first()
            .map(|&i| r + 1 + i);
        let t = s_wave.and_then(|sw| {
            let offset = sw + 1;
            let maxima = local_maxima(segment.slice(s![offset..]), prominence, 1);
            tallest(segment, maxima.into_iter().map(|i| offset + i).collect())
        });

        let p_onset = p.and_then(|p| max_curvature(segment, 0, p));
        let t_offset = t.and_then(|t| max_curvature(segment, t, segment.len()));

        let shift = |i: Option<usize>| i.map(|i| beat.start + i);
        Waves {
            p: shift(p),
            q: shift(q),
            s: shift(s_wave),
            t: shift(t),
            p_onset: shift(p_onset),
            t_offset: shift(t_offset),
        }
    }
}

fn tallest(segment: ArrayView1<f64>, candidates: Vec<usize>) -> Option<usize> {
    candidates
        .into_iter()
        .max_by(|&a, &b| segment[a].total_cmp(&segment[b]))
}

impl Delineator for PeakDelineator {
    fn delineate(
        &self,
        signal: ArrayView1<f64>,
        r_peaks: &[usize],
        sampling_rate: f64,
    ) -> Result<PeakSet, AnalysisError> {
        check_peaks(r_peaks, signal.len())?;
        let beats: Vec<Waves> = segment_heartbeats(signal.len(), r_peaks, sampling_rate, self.ratio_pre)
            .into_iter()
            .map(|beat| self.delineate_beat(signal, beat))
            .collect();
        Ok(Waves::collect_into(&beats))
    }
}

/// Delineates with fixed search windows relative to R, for signals too
/// noisy for the local extrema to be trusted. All windows are in seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowDelineator {
    pub qs_window: f64,
    pub p_window: f64,
    pub t_window: (f64, f64),
    pub onset_window: f64,
}

impl Default for WindowDelineator {
    fn default() -> Self {
        Self {
            qs_window: 0.1,
            p_window: 0.2,
            t_window: (0.05, 0.4),
            onset_window: 0.15,
        }
    }
}

impl Delineator for WindowDelineator {
    fn delineate(
        &self,
        signal: ArrayView1<f64>,
        r_peaks: &[usize],
        sampling_rate: f64,
    ) -> Result<PeakSet, AnalysisError> {
        let len = signal.len();
        check_peaks(r_peaks, len)?;

        let qs = samples(self.qs_window, sampling_rate).max(1);
        let pw = samples(self.p_window, sampling_rate).max(1);
        let (t_from, t_to) = (
            samples(self.t_window.0, sampling_rate),
            samples(self.t_window.1, sampling_rate),
        );
        let onset = samples(self.onset_window, sampling_rate).max(2);

        let beats: Vec<Waves> = r_peaks
            .iter()
            .map(|&r| {
                let q = argmin_in(signal, r.saturating_sub(qs), r);
                let s_wave = argmin_in(signal, r + 1, (r + qs + 1).min(len));
                let p = q.and_then(|q| argmax_in(signal, q.saturating_sub(pw), q));
                let t = s_wave.and_then(|sw| {
                    argmax_in(signal, (sw + t_from).min(len), (sw + t_to + 1).min(len))
                });
                Waves {
                    p,
                    q,
                    s: s_wave,
                    t,
                    p_onset: p.and_then(|p| max_curvature(signal, p.saturating_sub(onset), p)),
                    t_offset: t.and_then(|t| max_curvature(signal, t, (t + onset).min(len))),
                }
            })
            .collect();
        Ok(Waves::collect_into(&beats))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array1;

    #[test]
    fn heartbeats_scale_with_rate() {
        let beats = segment_heartbeats(1000, &[100, 300, 500], 100.0, 0.35);
        assert_eq!(
            beats[1],
            Heartbeat {
                start: 230,
                rpeak: 300,
                end: 431
            }
        );
        assert_eq!(beats[0].start, 30);
    }

    #[test]
    fn single_peak_assumes_one_second() {
        assert_eq!(mean_rr(&[42], 250.0), 1.0);
        let beats = segment_heartbeats(100, &[50], 100.0, 0.35);
        assert_eq!(beats[0].start, 15);
        assert_eq!(beats[0].end, 100);
    }

    #[test]
    fn out_of_bounds_peak_is_rejected() {
        let signal = Array1::<f64>::zeros(50);
        let err = PeakDelineator::default()
            .delineate(signal.view(), &[10, 50], 100.0)
            .unwrap_err();
        assert_eq!(err, AnalysisError::PeakOutOfBounds { index: 50, len: 50 });
    }

    #[test]
    fn no_peaks_yields_empty_waves() {
        let signal = Array1::<f64>::zeros(500);
        for method in [DelineationMethod::Peak, DelineationMethod::Window] {
            let set = method.delineate(signal.view(), &[], 250.0).unwrap();
            assert!(set.is_empty());
        }
    }

    #[test]
    fn curvature_peaks_beside_a_bump() {
        let signal = Array1::from_shape_fn(41, |i| {
            let x = (i as f64 - 20.0) / 4.0;
            (-0.5 * x * x).exp()
        });
        let bend = max_curvature(signal.view(), 0, 20).unwrap();
        // second derivative of a Gaussian peaks at sqrt(3) sd from its center
        assert!((12..=14).contains(&bend), "bend at {bend}");
    }
}
