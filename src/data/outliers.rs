//! Robust sigma clipping around the median.

use super::stats::{median, median_absolute_deviation};

/// Scale factor turning a MAD into a normal-equivalent standard deviation.
pub const MAD_TO_SIGMA: f64 = 1.4826;

/// Default clipping threshold, in robust sigmas.
pub const DEFAULT_SIGMA: f64 = 3.0;

/// `1.4826 · MAD` of `data`.
pub fn robust_sigma(data: &[f64]) -> f64 {
    MAD_TO_SIGMA * median_absolute_deviation(data)
}

/// Keep the values within `median ± sigma_threshold · robust_sigma`
/// (inclusive), in their original order. Returns the kept values and one
/// keep flag per input value.
///
/// A zero robust sigma means the sample is too flat to judge, so everything
/// is kept.
pub fn reject_outliers(data: &[f64], sigma_threshold: f64) -> (Vec<f64>, Vec<bool>) {
    if data.is_empty() {
        return (Vec::new(), Vec::new());
    }

    let center = median(data);
    let sigma = robust_sigma(data);
    if sigma == 0.0 {
        return (data.to_vec(), vec![true; data.len()]);
    }

    let lower = center - sigma_threshold * sigma;
    let upper = center + sigma_threshold * sigma;
    let mask: Vec<bool> = data.iter().map(|&v| v >= lower && v <= upper).collect();
    let kept = data
        .iter()
        .zip(&mask)
        .filter(|(_, keep)| **keep)
        .map(|(v, _)| *v)
        .collect();
    (kept, mask)
}
