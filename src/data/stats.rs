//! Summary statistics of one parameter within one observation.
//!
//! All statistics are computed over the finite values only. Anything that
//! cannot be computed (empty sample, too few points, zero spread, too few
//! time bins) is NaN so every record of a parameter carries the same columns.

// ---------------------------------------------------------------------------
// Metric catalogue
// ---------------------------------------------------------------------------

/// Metric suffixes, in output order.
pub const STATISTICS: [&str; 11] = [
    "mean", "median", "sigma", "mad", "min", "max", "ptp", "p01", "p99", "skew", "kurtosis",
];

/// Averaging time scales for binned noise, in hours.
pub const BIN_WIDTHS_HOURS: [f64; 3] = [1.0, 3.0, 6.0];

/// Suffixes matching [`BIN_WIDTHS_HOURS`].
pub const BINNED_STATISTICS: [&str; 3] = ["bin_noise_1h", "bin_noise_3h", "bin_noise_6h"];

/// Metric suffixes emitted for a source, with or without binned noise.
pub fn metric_names(binned: bool) -> Vec<&'static str> {
    let mut names = STATISTICS.to_vec();
    if binned {
        names.extend(BINNED_STATISTICS);
    }
    names
}

/// Human-readable meaning of a statistic column (`FLUX_p99`) or metric (`p99`).
pub fn stat_definition(column: &str) -> Option<&'static str> {
    const DEFINITIONS: [(&str, &str); 14] = [
        ("mean", "Average value"),
        ("median", "Middle value (less sensitive to outliers)"),
        ("sigma", "Standard deviation"),
        ("mad", "Median Absolute Deviation"),
        ("min", "Minimum value"),
        ("max", "Maximum value"),
        ("ptp", "Peak-to-peak range (max - min)"),
        ("p01", "1st percentile"),
        ("p99", "99th percentile"),
        ("skew", "Distribution asymmetry"),
        ("kurtosis", "Distribution tail heaviness"),
        ("bin_noise_1h", "Scatter of 1-hour binned means"),
        ("bin_noise_3h", "Scatter of 3-hour binned means"),
        ("bin_noise_6h", "Scatter of 6-hour binned means"),
    ];
    DEFINITIONS
        .iter()
        .find(|(key, _)| column == *key || column.ends_with(&format!("_{key}")))
        .map(|(_, text)| *text)
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Summary {
    pub mean: f64,
    pub median: f64,
    /// Population standard deviation.
    pub sigma: f64,
    /// Median absolute deviation (unscaled).
    pub mad: f64,
    pub min: f64,
    pub max: f64,
    pub ptp: f64,
    pub p01: f64,
    pub p99: f64,
    /// Biased sample skewness, needs at least 3 values.
    pub skew: f64,
    /// Biased excess kurtosis, needs at least 4 values.
    pub kurtosis: f64,
    /// Binned noise for each of [`BIN_WIDTHS_HOURS`].
    pub bin_noise: [f64; 3],
}

impl Summary {
    pub fn empty() -> Self {
        Self {
            mean: f64::NAN,
            median: f64::NAN,
            sigma: f64::NAN,
            mad: f64::NAN,
            min: f64::NAN,
            max: f64::NAN,
            ptp: f64::NAN,
            p01: f64::NAN,
            p99: f64::NAN,
            skew: f64::NAN,
            kurtosis: f64::NAN,
            bin_noise: [f64::NAN; 3],
        }
    }

    pub fn get(&self, metric: &str) -> Option<f64> {
        let value = match metric {
            "mean" => self.mean,
            "median" => self.median,
            "sigma" => self.sigma,
            "mad" => self.mad,
            "min" => self.min,
            "max" => self.max,
            "ptp" => self.ptp,
            "p01" => self.p01,
            "p99" => self.p99,
            "skew" => self.skew,
            "kurtosis" => self.kurtosis,
            other => {
                let idx = BINNED_STATISTICS.iter().position(|b| *b == other)?;
                self.bin_noise[idx]
            }
        };
        Some(value)
    }

    /// `{prefix}_{metric}` columns in catalogue order.
    pub fn columns(&self, prefix: &str, binned: bool) -> Vec<(String, f64)> {
        metric_names(binned)
            .into_iter()
            .map(|metric| {
                let value = self.get(metric).unwrap_or(f64::NAN);
                (format!("{prefix}_{metric}"), value)
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Estimators
// ---------------------------------------------------------------------------

fn sorted_finite(data: &[f64]) -> Vec<f64> {
    let mut v: Vec<f64> = data.iter().copied().filter(|x| x.is_finite()).collect();
    v.sort_by(f64::total_cmp);
    v
}

fn median_of_sorted(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    match n {
        0 => f64::NAN,
        _ if n % 2 == 1 => sorted[n / 2],
        _ => (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0,
    }
}

/// Median of the finite values.
pub fn median(data: &[f64]) -> f64 {
    median_of_sorted(&sorted_finite(data))
}

/// Median absolute deviation from the median, finite values only.
pub fn median_absolute_deviation(data: &[f64]) -> f64 {
    let center = median(data);
    let deviations: Vec<f64> = data
        .iter()
        .filter(|x| x.is_finite())
        .map(|x| (x - center).abs())
        .collect();
    median(&deviations)
}

/// Percentile `p` (0–100) with linear interpolation between order statistics.
pub fn percentile_of_sorted(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let rank = (sorted.len() - 1) as f64 * p / 100.0;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    sorted[lo] + (rank - lo as f64) * (sorted[hi] - sorted[lo])
}

fn population_std(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt()
}

/// Standard deviation of the per-bin means of `data`, binned on `times_hours`.
///
/// `[min, max]` of the times is cut into `ceil(span / width)` bins of equal
/// width, each right-open except the last. Fewer than two non-empty bins
/// gives NaN.
pub fn binned_noise(data: &[f64], times_hours: &[f64], bin_width_hours: f64) -> f64 {
    if data.len() < 2 || data.len() != times_hours.len() || bin_width_hours <= 0.0 {
        return f64::NAN;
    }
    let t0 = times_hours.iter().copied().fold(f64::INFINITY, f64::min);
    let t1 = times_hours.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !t0.is_finite() || !t1.is_finite() || t1 <= t0 {
        return f64::NAN;
    }
    let n_bins = ((t1 - t0) / bin_width_hours).ceil() as usize;
    if n_bins < 2 {
        return f64::NAN;
    }

    let mut sums = vec![0.0; n_bins];
    let mut counts = vec![0usize; n_bins];
    for (&value, &t) in data.iter().zip(times_hours) {
        if !t.is_finite() || !value.is_finite() {
            continue;
        }
        // The last bin is closed, so `t1` lands in it.
        let bin = (((t - t0) / bin_width_hours).floor() as usize).min(n_bins - 1);
        sums[bin] += value;
        counts[bin] += 1;
    }

    let means: Vec<f64> = sums
        .iter()
        .zip(&counts)
        .filter(|(_, c)| **c > 0)
        .map(|(s, c)| s / *c as f64)
        .collect();
    if means.len() < 2 {
        return f64::NAN;
    }
    population_std(&means)
}

/// Compute every statistic of `data`. When `times_hours` has one entry per
/// value, binned noise is computed as well.
pub fn summarize(data: &[f64], times_hours: Option<&[f64]>) -> Summary {
    let sorted = sorted_finite(data);
    if sorted.is_empty() {
        return Summary::empty();
    }

    let n = sorted.len() as f64;
    let mean = sorted.iter().sum::<f64>() / n;
    let central_moment = |k: i32| sorted.iter().map(|v| (v - mean).powi(k)).sum::<f64>() / n;
    let m2 = central_moment(2);
    let median = median_of_sorted(&sorted);
    let min = sorted[0];
    let max = sorted[sorted.len() - 1];

    let skew = if sorted.len() >= 3 && m2 > 0.0 {
        central_moment(3) / m2.powf(1.5)
    } else {
        f64::NAN
    };
    let kurtosis = if sorted.len() >= 4 && m2 > 0.0 {
        central_moment(4) / (m2 * m2) - 3.0
    } else {
        f64::NAN
    };

    let mut bin_noise = [f64::NAN; 3];
    if let Some(times) = times_hours.filter(|t| t.len() == data.len()) {
        let (values, times): (Vec<f64>, Vec<f64>) = data
            .iter()
            .zip(times)
            .filter(|(v, t)| v.is_finite() && t.is_finite())
            .map(|(v, t)| (*v, *t))
            .unzip();
        for (slot, width) in bin_noise.iter_mut().zip(BIN_WIDTHS_HOURS) {
            *slot = binned_noise(&values, &times, width);
        }
    }

    Summary {
        mean,
        median,
        sigma: m2.sqrt(),
        mad: median_absolute_deviation(&sorted),
        min,
        max,
        ptp: max - min,
        p01: percentile_of_sorted(&sorted, 1.0),
        p99: percentile_of_sorted(&sorted, 99.0),
        skew,
        kurtosis,
        bin_noise,
    }
}
