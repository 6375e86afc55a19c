//! Robust statistics for background estimation and frame combination

use thiserror::Error;

/// Errors from the statistics helpers.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StatsError {
    #[error("insufficient data to compute {what}: {total} total values, 0 finite")]
    NoValidData { what: &'static str, total: usize },

    #[error("sigma clip factor must be positive and finite, got {0}")]
    InvalidSigma(f64),
}

/// Summary produced by [`sigma_clipped_stats`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClippedStats {
    pub mean: f64,
    pub median: f64,
    /// Population standard deviation of the retained samples
    pub std_dev: f64,
    /// Number of samples that survived clipping
    pub retained: usize,
    /// Number of clipping passes that rejected at least one sample
    pub iterations: usize,
}

/// Calculate median of a slice of f64 values
///
/// Non-finite values are dropped before the median is taken. For even-length
/// data, returns the average of the two middle values.
///
/// # Returns
///
/// * `Ok(median)` - The median value
/// * `Err(StatsError::NoValidData)` - If no finite values remain
pub fn median(values: &[f64]) -> Result<f64, StatsError> {
    let mut valid_values: Vec<f64> = values.iter().filter(|v| v.is_finite()).copied().collect();

    median_in_place(&mut valid_values).ok_or(StatsError::NoValidData {
        what: "median",
        total: values.len(),
    })
}

/// Median of a scratch buffer, reordering it in place.
///
/// Intended for hot loops (per-pixel stacking) where the caller owns a reusable
/// buffer. Returns `None` for an empty buffer. NaN values sort after every
/// finite value, so callers wanting NaN-free output filter them first.
pub fn median_in_place(values: &mut [f64]) -> Option<f64> {
    let n = values.len();
    if n == 0 {
        return None;
    }

    let mid = n / 2;
    let (lower, upper, _) = values.select_nth_unstable_by(mid, f64::total_cmp);
    let upper = *upper;

    if n % 2 == 0 {
        let lower_max = lower.iter().copied().max_by(f64::total_cmp)?;
        Some((lower_max + upper) / 2.0)
    } else {
        Some(upper)
    }
}

/// Mean and population standard deviation. Returns `(NaN, NaN)` when empty.
pub fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (f64::NAN, f64::NAN);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

/// Iteratively sigma-clipped mean, median and standard deviation.
///
/// Each pass rejects samples farther than `sigma * std_dev` from the current
/// median and recomputes the statistics. Clipping stops when a pass rejects
/// nothing or after `max_iterations` passes. Non-finite samples are ignored.
pub fn sigma_clipped_stats(
    values: &[f64],
    sigma: f64,
    max_iterations: usize,
) -> Result<ClippedStats, StatsError> {
    if !sigma.is_finite() || sigma <= 0.0 {
        return Err(StatsError::InvalidSigma(sigma));
    }

    let mut kept: Vec<f64> = values.iter().filter(|v| v.is_finite()).copied().collect();
    let mut current = summarize(&mut kept).ok_or(StatsError::NoValidData {
        what: "sigma-clipped statistics",
        total: values.len(),
    })?;

    while current.iterations < max_iterations {
        let bound = sigma * current.std_dev;
        let center = current.median;
        let trial: Vec<f64> = kept
            .iter()
            .copied()
            .filter(|v| (v - center).abs() <= bound)
            .collect();

        if trial.len() == kept.len() || trial.is_empty() {
            break;
        }

        kept = trial;
        let iterations = current.iterations + 1;
        current = match summarize(&mut kept) {
            Some(stats) => ClippedStats {
                iterations,
                ..stats
            },
            None => break,
        };
    }

    Ok(current)
}

fn summarize(values: &mut [f64]) -> Option<ClippedStats> {
    let (mean, std_dev) = mean_std(values);
    let median = median_in_place(values)?;
    Some(ClippedStats {
        mean,
        median,
        std_dev,
        retained: values.len(),
        iterations: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_median_odd_and_even() {
        assert_eq!(median(&[3.0, 1.0, 2.0]).unwrap(), 2.0);
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]).unwrap(), 2.5);
    }

    #[test]
    fn test_median_filters_non_finite() {
        let values = [f64::NAN, 5.0, f64::INFINITY, 1.0, 3.0];
        assert_eq!(median(&values).unwrap(), 3.0);
    }

    #[test]
    fn test_median_all_nan_errors() {
        let err = median(&[f64::NAN, f64::NAN]).unwrap_err();
        assert_eq!(
            err,
            StatsError::NoValidData {
                what: "median",
                total: 2
            }
        );
    }

    #[test]
    fn test_median_in_place_matches_sorted() {
        let mut values = vec![9.0, -1.0, 4.0, 4.0, 7.0, 0.5];
        let expected = {
            let mut sorted = values.clone();
            sorted.sort_by(f64::total_cmp);
            (sorted[2] + sorted[3]) / 2.0
        };
        assert_eq!(median_in_place(&mut values), Some(expected));
        assert_eq!(median_in_place(&mut []), None);
    }

    #[test]
    fn test_mean_std_population() {
        let (mean, std) = mean_std(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert_relative_eq!(mean, 5.0);
        assert_relative_eq!(std, 2.0);
    }

    #[test]
    fn test_sigma_clip_rejects_outliers() {
        let mut values: Vec<f64> = (0..200).map(|i| 100.0 + ((i % 7) as f64 - 3.0)).collect();
        values.extend([5000.0, 8000.0, -4000.0]);

        let stats = sigma_clipped_stats(&values, 3.0, 10).unwrap();

        assert_eq!(stats.retained, 200);
        assert!(stats.iterations >= 1);
        assert_relative_eq!(stats.median, 100.0);
        assert!((stats.mean - 100.0).abs() < 0.1);
        assert!(stats.std_dev < 2.5, "std {} should exclude outliers", stats.std_dev);
    }

    #[test]
    fn test_sigma_clip_constant_data_converges_immediately() {
        let stats = sigma_clipped_stats(&[7.0; 50], 3.0, 10).unwrap();
        assert_eq!(stats.iterations, 0);
        assert_eq!(stats.retained, 50);
        assert_eq!(stats.std_dev, 0.0);
        assert_eq!(stats.median, 7.0);
    }

    #[test]
    fn test_sigma_clip_respects_iteration_cap() {
        let mut values: Vec<f64> = (0..100).map(|i| i as f64).collect();
        values.push(1.0e6);
        let stats = sigma_clipped_stats(&values, 3.0, 0).unwrap();
        assert_eq!(stats.iterations, 0);
        assert_eq!(stats.retained, 101);
    }

    #[test]
    fn test_sigma_clip_invalid_sigma() {
        assert_eq!(
            sigma_clipped_stats(&[1.0, 2.0], 0.0, 5),
            Err(StatsError::InvalidSigma(0.0))
        );
        assert!(sigma_clipped_stats(&[f64::NAN], 3.0, 5).is_err());
    }
}
