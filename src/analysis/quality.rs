use crate::analysis::statistics::VARIANCE_EPSILON;
use crate::models::Frequency;
use serde::Serialize;

/// Fewer observations than this blocks the result.
pub const MIN_OBSERVATIONS_RED: usize = 12;
/// Fewer observations than this downgrades the result.
pub const MIN_OBSERVATIONS_WARNING: usize = 30;
/// Share of the window lost to CPI clipping above which the result is downgraded.
pub const MAX_CLIPPED_FRACTION: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityLevel {
    Green,
    Yellow,
    Red,
}

impl QualityLevel {
    pub fn classify(sample_size: usize, clipped_fraction: f64, benchmark_variance: f64, cpi_resolved: bool) -> Self {
        if sample_size < MIN_OBSERVATIONS_RED || benchmark_variance <= VARIANCE_EPSILON || !cpi_resolved {
            return QualityLevel::Red;
        }
        if sample_size < MIN_OBSERVATIONS_WARNING || clipped_fraction > MAX_CLIPPED_FRACTION {
            return QualityLevel::Yellow;
        }
        QualityLevel::Green
    }

    pub fn message(&self) -> &'static str {
        match self {
            QualityLevel::Green => "Enough data for a reliable estimate.",
            QualityLevel::Yellow => "Estimate is usable but the sample is short or partly outside CPI coverage.",
            QualityLevel::Red => "Computation is unreliable: too few observations, a flat benchmark or missing CPI.",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QualityMetrics {
    pub sample_size: usize,
    pub clipped_fraction: f64,
    pub benchmark_variance: f64,
    pub cpi_resolved: bool,
}

/// Reliability level plus the metrics that produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityVerdict {
    pub level: QualityLevel,
    pub metrics: QualityMetrics,
    /// Sample is shorter than one year of the chosen frequency (24 months for monthly).
    pub below_frequency_baseline: bool,
    pub message: String,
}

impl QualityVerdict {
    pub fn evaluate(metrics: QualityMetrics, frequency: Frequency) -> Self {
        let level = QualityLevel::classify(
            metrics.sample_size,
            metrics.clipped_fraction,
            metrics.benchmark_variance,
            metrics.cpi_resolved,
        );
        let below_frequency_baseline = metrics.sample_size < frequency.baseline_observations();
        if level != QualityLevel::Green {
            tracing::info!(
                "Quality {:?}: n={}, clipped={:.2}, var={:.3e}, cpi_ok={}",
                level,
                metrics.sample_size,
                metrics.clipped_fraction,
                metrics.benchmark_variance,
                metrics.cpi_resolved
            );
        }

        QualityVerdict {
            level,
            metrics,
            below_frequency_baseline,
            message: level.message().to_string(),
        }
    }

    pub fn is_blocking(&self) -> bool {
        self.level == QualityLevel::Red
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_reference_cases() {
        assert_eq!(QualityLevel::classify(10, 0.0, 0.002, true), QualityLevel::Red);
        assert_eq!(QualityLevel::classify(200, 0.05, 0.002, true), QualityLevel::Green);
    }

    #[test]
    fn test_classify_red_conditions() {
        assert_eq!(QualityLevel::classify(200, 0.0, 1e-13, true), QualityLevel::Red);
        assert_eq!(QualityLevel::classify(200, 0.0, 0.002, false), QualityLevel::Red);
    }

    #[test]
    fn test_classify_yellow_conditions() {
        assert_eq!(QualityLevel::classify(20, 0.0, 0.002, true), QualityLevel::Yellow);
        assert_eq!(QualityLevel::classify(200, 0.25, 0.002, true), QualityLevel::Yellow);
        assert_eq!(QualityLevel::classify(30, 0.2, 0.002, true), QualityLevel::Green);
    }

    #[test]
    fn test_verdict_reports_frequency_baseline() {
        let metrics = QualityMetrics { sample_size: 100, clipped_fraction: 0.0, benchmark_variance: 0.001, cpi_resolved: true };
        let daily = QualityVerdict::evaluate(metrics, Frequency::Daily);
        assert_eq!(daily.level, QualityLevel::Green);
        assert!(daily.below_frequency_baseline);

        let monthly = QualityVerdict::evaluate(metrics, Frequency::Monthly);
        assert!(!monthly.below_frequency_baseline);
        assert!(!monthly.is_blocking());
    }
}
