//! Statistical helpers shared by the baseline engine, detector, and probes.
//!
//! All estimators are small pure functions over `f64` slices. Population
//! standard deviation is used throughout so behavior stays stable as the
//! sample grows.

/// Arithmetic mean; `None` on an empty slice
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Weighted mean: sum(value * weight) / sum(weight).
///
/// Pairs with non-positive weight are skipped; `None` when no weight remains.
pub fn weighted_mean(values: &[f64], weights: &[f64]) -> Option<f64> {
    debug_assert_eq!(values.len(), weights.len());
    let mut weighted = 0.0;
    let mut total = 0.0;
    for (v, w) in values.iter().zip(weights) {
        if *w > 0.0 {
            weighted += v * w;
            total += w;
        }
    }
    if total > 0.0 {
        Some(weighted / total)
    } else {
        None
    }
}

/// Population standard deviation around the given mean
pub fn population_stddev(values: &[f64], mean: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Median of the values; `None` on an empty slice
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Least-squares slope of `values` against their index (one unit per sample).
///
/// `None` with fewer than two samples.
pub fn linear_slope(values: &[f64]) -> Option<f64> {
    let n = values.len();
    if n < 2 {
        return None;
    }
    let n_f = n as f64;
    let x_mean = (n_f - 1.0) / 2.0;
    let y_mean = values.iter().sum::<f64>() / n_f;

    let mut num = 0.0;
    let mut den = 0.0;
    for (i, y) in values.iter().enumerate() {
        let dx = i as f64 - x_mean;
        num += dx * (y - y_mean);
        den += dx * dx;
    }
    if den == 0.0 {
        return None;
    }
    Some(num / den)
}

/// Relative change in percent: (current - baseline) / baseline * 100.
///
/// `None` when the baseline is zero or not positive-definite.
pub fn relative_change_pct(current: f64, baseline: f64) -> Option<f64> {
    if baseline <= 0.0 {
        return None;
    }
    Some((current - baseline) / baseline * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_and_median() {
        assert_eq!(mean(&[]), None);
        assert_eq!(mean(&[2.0, 4.0]), Some(3.0));
        assert_eq!(median(&[1.0, 3.0, 2.0]), Some(2.0));
        assert_eq!(median(&[1.0, 2.0, 3.0, 4.0]), Some(2.5));
    }

    #[test]
    fn test_weighted_mean_skips_nonpositive_weights() {
        let values = [2.0, 6.0, 100.0];
        let weights = [100.0, 300.0, 0.0];
        // (200 + 1800) / 400 = 5.0, the zero-weight value is ignored
        assert_eq!(weighted_mean(&values, &weights), Some(5.0));
        assert_eq!(weighted_mean(&[1.0], &[0.0]), None);
    }

    #[test]
    fn test_population_stddev() {
        // population stddev of {2, 4, 4, 4, 5, 5, 7, 9} is exactly 2
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let m = mean(&values).unwrap();
        assert!((population_stddev(&values, m) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_linear_slope() {
        assert_eq!(linear_slope(&[1.0]), None);
        let slope = linear_slope(&[0.0, 1.0, 2.0, 3.0]).unwrap();
        assert!((slope - 1.0).abs() < 1e-12);
        let slope = linear_slope(&[3.0, 2.0, 1.0, 0.0]).unwrap();
        assert!((slope + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_relative_change() {
        assert_eq!(relative_change_pct(15.0, 10.0), Some(50.0));
        assert_eq!(relative_change_pct(5.0, 0.0), None);
    }
}
