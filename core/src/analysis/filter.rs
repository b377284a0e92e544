use biquad::{Biquad, Coefficients, DirectForm1, ToHertz, Type, Q_BUTTERWORTH_F64};
use ndarray::{Array1, ArrayView1};
use ndarray_stats::{interpolate::Midpoint, Quantile1dExt};
use noisy_float::types::n64;

use crate::analysis::AnalysisError;

/// Zero-phase Butterworth band-pass: a low-pass and a high-pass biquad run
/// forward over the data, then both again over the reversed result.
pub fn bandpass_filter(
    data: ArrayView1<f64>,
    lowcut: f64,
    highcut: f64,
    fs: f64,
) -> Result<Array1<f64>, AnalysisError> {
    let low_coeff = design(Type::LowPass, highcut, fs)?;
    let high_coeff = design(Type::HighPass, lowcut, fs)?;

    let low_forward = forward_filter(data, &low_coeff);
    let band_forward = forward_filter(low_forward.view(), &high_coeff);
    let low_full = backward_filter(band_forward.view(), &low_coeff);
    let band_full = backward_filter(low_full.view(), &high_coeff);

    Ok(band_full)
}

fn design(filter_type: Type<f64>, cutoff: f64, fs: f64) -> Result<Coefficients<f64>, AnalysisError> {
    Coefficients::<f64>::from_params(filter_type, fs.hz(), cutoff.hz(), Q_BUTTERWORTH_F64).map_err(
        |e| AnalysisError::Filter(format!("{e:?} for a {cutoff} Hz cutoff at {fs} Hz")),
    )
}

fn forward_filter(data: ArrayView1<f64>, coefficients: &Coefficients<f64>) -> Array1<f64> {
    let mut filter = DirectForm1::<f64>::new(*coefficients);
    data.iter().map(|&sample| filter.run(sample)).collect()
}

fn backward_filter(data: ArrayView1<f64>, coefficients: &Coefficients<f64>) -> Array1<f64> {
    let mut filter = DirectForm1::<f64>::new(*coefficients);
    let mut processed: Vec<f64> = data.iter().rev().map(|&sample| filter.run(sample)).collect();
    processed.reverse();
    Array1::from_vec(processed)
}

/// First derivative by central differences, one-sided at both ends.
pub fn gradient(data: ArrayView1<f64>) -> Array1<f64> {
    let n = data.len();
    if n < 2 {
        return Array1::zeros(n);
    }
    Array1::from_shape_fn(n, |i| match i {
        0 => data[1] - data[0],
        i if i == n - 1 => data[n - 1] - data[n - 2],
        i => (data[i + 1] - data[i - 1]) / 2.0,
    })
}

/// Centered moving average over `size` samples. The window shrinks at the
/// edges instead of assuming values outside the signal.
pub fn boxcar_smooth(data: ArrayView1<f64>, size: usize) -> Array1<f64> {
    let n = data.len();
    if size <= 1 || n == 0 {
        return data.to_owned();
    }
    let cumulative = prefix_sums(data);
    let before = size / 2;
    let after = size - before - 1;
    Array1::from_shape_fn(n, |i| {
        let start = i.saturating_sub(before);
        let end = (i + after + 1).min(n);
        (cumulative[end] - cumulative[start]) / (end - start) as f64
    })
}

/// Trailing moving average over `size` samples, as used for the
/// integration stage of Pan-Tompkins.
pub fn moving_window_integration(data: ArrayView1<f64>, size: usize) -> Array1<f64> {
    let n = data.len();
    if size <= 1 || n == 0 {
        return data.to_owned();
    }
    let cumulative = prefix_sums(data);
    Array1::from_shape_fn(n, |i| {
        let start = (i + 1).saturating_sub(size);
        (cumulative[i + 1] - cumulative[start]) / size as f64
    })
}

fn prefix_sums(data: ArrayView1<f64>) -> Vec<f64> {
    let mut sums = Vec::with_capacity(data.len() + 1);
    sums.push(0.0);
    let mut total = 0.0;
    for &v in data.iter() {
        total += v;
        sums.push(total);
    }
    sums
}

/// Median of a finite signal; the mean of the two middle values when the
/// length is even.
pub fn median(data: ArrayView1<f64>) -> Result<f64, AnalysisError> {
    if data.iter().any(|v| v.is_nan()) {
        return Err(AnalysisError::NonFinite);
    }
    let mut ordered = data.mapv(n64);
    let m = ordered.quantile_mut(n64(0.5), &Midpoint)?;
    Ok(m.raw())
}

/// Append `pad_len` copies of the signal's median to its end.
pub fn pad_median(data: ArrayView1<f64>, pad_len: usize) -> Result<Array1<f64>, AnalysisError> {
    if pad_len == 0 {
        return Ok(data.to_owned());
    }
    let fill = median(data)?;
    Ok(data
        .iter()
        .copied()
        .chain(std::iter::repeat(fill).take(pad_len))
        .collect())
}

/// Normal density sampled on `[-4 sd, 4 sd]`, one value per sample.
pub fn gaussian_kernel(sd: f64) -> Array1<f64> {
    let half = (4.0 * sd).ceil() as usize;
    let norm = 1.0 / (sd * (2.0 * std::f64::consts::PI).sqrt());
    Array1::from_shape_fn(2 * half + 1, |i| {
        let x = i as f64 - half as f64;
        norm * (-0.5 * (x / sd).powi(2)).exp()
    })
}
