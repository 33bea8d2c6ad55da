use crate::models::{DataPoint, PricePair};
use serde::Serialize;

/// Per-period ratio above which (or below the inverse of which) a move is treated
/// as a corporate action rather than a return.
pub const ANTI_SPLIT_RATIO: f64 = 3.0;

/// Anti-split events tolerated before the scan stops.
pub const ANTI_SPLIT_MAX_EVENTS: u32 = 3;

/// Benchmark variance at or below this is treated as zero.
pub const VARIANCE_EPSILON: f64 = 1e-12;

/// Paired log returns extracted from a real price series.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReturnSample {
    pub asset: Vec<f64>,
    pub benchmark: Vec<f64>,
    pub sample_size: usize,
    pub anti_split_events: u32,
    pub anti_split_triggered: bool,
}

fn is_split_like(ratio: f64) -> bool {
    ratio > ANTI_SPLIT_RATIO || ratio < 1.0 / ANTI_SPLIT_RATIO
}

/// Log returns of both legs over consecutive periods.
///
/// A transition where either leg moves by more than 3x is skipped and counted.
/// Once more than `ANTI_SPLIT_MAX_EVENTS` are seen the scan stops and the returns
/// collected so far are kept. Transitions touching a non-positive price are
/// skipped without counting.
pub fn compute_log_returns<P>(series: &[DataPoint<P, PricePair>]) -> ReturnSample {
    let mut sample = ReturnSample::default();

    for window in series.windows(2) {
        let prev = window[0].value;
        let curr = window[1].value;
        if prev.asset <= 0.0 || prev.benchmark <= 0.0 || curr.asset <= 0.0 || curr.benchmark <= 0.0 {
            continue;
        }

        let ratio_a = curr.asset / prev.asset;
        let ratio_b = curr.benchmark / prev.benchmark;
        if is_split_like(ratio_a) || is_split_like(ratio_b) {
            sample.anti_split_events += 1;
            sample.anti_split_triggered = true;
            if sample.anti_split_events > ANTI_SPLIT_MAX_EVENTS {
                tracing::warn!(
                    "Anti-split guard tripped {} times, stopping return scan",
                    sample.anti_split_events
                );
                break;
            }
            continue;
        }

        sample.asset.push(ratio_a.ln());
        sample.benchmark.push(ratio_b.ln());
    }

    sample.sample_size = sample.asset.len();
    sample
}

/// Log returns of a single series. No anti-split filtering.
pub fn single_log_returns<P>(series: &[DataPoint<P, f64>]) -> Vec<f64> {
    series
        .windows(2)
        .filter(|w| w[0].value > 0.0 && w[1].value > 0.0)
        .map(|w| (w[1].value / w[0].value).ln())
        .collect()
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// `exp(periods_per_year * mean) - 1`. `None` for empty input or a non-positive period count.
pub fn annualized_real_return(log_returns: &[f64], periods_per_year: u32) -> Option<f64> {
    if log_returns.is_empty() || periods_per_year == 0 {
        return None;
    }
    Some((periods_per_year as f64 * mean(log_returns)).exp() - 1.0)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct BetaEstimate {
    pub beta: f64,
    pub benchmark_variance: f64,
    pub correlation: f64,
}

/// Sample beta (Bessel-corrected) of `asset` against `benchmark`.
///
/// Fewer than two paired observations, or a benchmark variance at or below
/// `VARIANCE_EPSILON`, yields the all-zero estimate.
pub fn estimate_beta(asset: &[f64], benchmark: &[f64]) -> BetaEstimate {
    let n = asset.len().min(benchmark.len());
    if n < 2 {
        return BetaEstimate::default();
    }
    let (asset, benchmark) = (&asset[..n], &benchmark[..n]);

    let mean_a = mean(asset);
    let mean_b = mean(benchmark);

    let mut sum_ab = 0.0;
    let mut sum_aa = 0.0;
    let mut sum_bb = 0.0;
    for (a, b) in asset.iter().zip(benchmark.iter()) {
        let da = a - mean_a;
        let db = b - mean_b;
        sum_ab += da * db;
        sum_aa += da * da;
        sum_bb += db * db;
    }

    let dof = (n - 1) as f64;
    let covariance = sum_ab / dof;
    let var_a = sum_aa / dof;
    let var_b = sum_bb / dof;

    if var_b <= VARIANCE_EPSILON {
        return BetaEstimate::default();
    }

    let sd_a = var_a.sqrt();
    let sd_b = var_b.sqrt();
    let correlation = if sd_a > 0.0 && sd_b > 0.0 {
        covariance / (sd_a * sd_b)
    } else {
        0.0
    };

    BetaEstimate {
        beta: covariance / var_b,
        benchmark_variance: var_b,
        correlation,
    }
}

/// CAPM alpha: `Ri - (rf + beta * (Rm - rf))`.
pub fn capm_alpha(asset_return: f64, benchmark_return: f64, risk_free: f64, beta: f64) -> f64 {
    asset_return - capm_expected_return(benchmark_return, risk_free, beta)
}

/// Return the security market line predicts for `beta`.
pub fn capm_expected_return(benchmark_return: f64, risk_free: f64, beta: f64) -> f64 {
    risk_free + beta * (benchmark_return - risk_free)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(values: &[(f64, f64)]) -> Vec<DataPoint<usize, PricePair>> {
        values
            .iter()
            .enumerate()
            .map(|(i, (a, b))| DataPoint::new(i, PricePair { asset: *a, benchmark: *b }))
            .collect()
    }

    #[test]
    fn test_log_returns_basic() {
        let s = pairs(&[(100.0, 10.0), (110.0, 11.0), (99.0, 11.0)]);
        let r = compute_log_returns(&s);
        assert_eq!(r.sample_size, 2);
        assert!((r.asset[0] - 1.1f64.ln()).abs() < 1e-12);
        assert!((r.asset[1] - 0.9f64.ln()).abs() < 1e-12);
        assert_eq!(r.benchmark[1], 0.0);
        assert!(!r.anti_split_triggered);
    }

    #[test]
    fn test_split_ratio_is_excluded() {
        let s = pairs(&[(10.0, 100.0), (11.0, 101.0), (55.0, 102.0), (56.0, 103.0)]);
        let r = compute_log_returns(&s);
        assert_eq!(r.sample_size, 2);
        assert_eq!(r.anti_split_events, 1);
        assert!(r.anti_split_triggered);
        assert!(r.asset.iter().all(|x| x.abs() < 0.2));
    }

    #[test]
    fn test_scan_stops_after_too_many_splits() {
        let s = pairs(&[
            (10.0, 1.0),
            (50.0, 1.0),  // event 1
            (10.0, 1.0),  // event 2
            (11.0, 1.0),  // kept
            (50.0, 1.0),  // event 3
            (51.0, 1.0),  // kept
            (250.0, 1.0), // event 4: stop
            (251.0, 1.0),
        ]);
        let r = compute_log_returns(&s);
        assert_eq!(r.anti_split_events, 4);
        assert_eq!(r.sample_size, 2);
    }

    #[test]
    fn test_non_positive_prices_are_skipped_without_counting() {
        let s = pairs(&[(10.0, 1.0), (0.0, 1.0), (11.0, 1.0), (12.0, 1.0)]);
        let r = compute_log_returns(&s);
        assert_eq!(r.anti_split_events, 0);
        assert_eq!(r.sample_size, 1);
    }

    #[test]
    fn test_annualized_real_return() {
        assert_eq!(annualized_real_return(&[], 12), None);
        assert_eq!(annualized_real_return(&[0.01], 0), None);
        let r = annualized_real_return(&[0.01, 0.01], 12).unwrap();
        assert!((r - (0.12f64.exp() - 1.0)).abs() < 1e-12);
    }

    #[test]
    fn test_beta_reference_values() {
        let asset = [0.02, -0.01, 0.03, 0.01];
        let bench = [0.01, -0.02, 0.02, 0.015];
        let est = estimate_beta(&asset, &bench);

        let cov: f64 = 0.0008375 / 3.0;
        let var_b: f64 = 0.00096875 / 3.0;
        let var_a: f64 = 0.000875 / 3.0;
        assert!((est.beta - cov / var_b).abs() < 1e-6);
        assert!((est.beta - 0.864516).abs() < 1e-6);
        assert!((est.benchmark_variance - var_b).abs() < 1e-12);
        assert!((est.correlation - cov / (var_a.sqrt() * var_b.sqrt())).abs() < 1e-6);
    }

    #[test]
    fn test_beta_degenerate_inputs() {
        assert_eq!(estimate_beta(&[0.1], &[0.2]), BetaEstimate::default());
        assert_eq!(estimate_beta(&[0.1, 0.2, 0.3], &[0.05, 0.05, 0.05]), BetaEstimate::default());
    }

    #[test]
    fn test_capm_alpha() {
        // Ri 10%, Rm 8%, rf 2%, beta 1.5 -> expected 11%, alpha -1%
        assert!((capm_expected_return(0.08, 0.02, 1.5) - 0.11).abs() < 1e-12);
        assert!((capm_alpha(0.10, 0.08, 0.02, 1.5) + 0.01).abs() < 1e-12);
    }

    #[test]
    fn test_single_log_returns() {
        let s: Vec<DataPoint<usize, f64>> = vec![DataPoint::new(0, 100.0), DataPoint::new(1, 0.0), DataPoint::new(2, 110.0), DataPoint::new(3, 121.0)];
        let r = single_log_returns(&s);
        assert_eq!(r.len(), 1);
        assert!((r[0] - 1.1f64.ln()).abs() < 1e-12);
    }
}
