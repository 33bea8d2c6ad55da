use crate::analysis::deflator::{clip_to_cpi_range, deflate};
use crate::core::timeseries::{resample_monthly, window_filter};
use crate::error::{AnalyzerError, Result};
use crate::fetcher::DataSource;
use crate::models::{CpiIndexMap, DataPoint, MonthKey, PricePoint, SyntheticIndex};
use crate::registry::BasketDefinition;
use futures_util::stream::{self, StreamExt};
use std::collections::{BTreeMap, HashMap};

/// Base level of every synthetic index.
pub const INDEX_BASE: f64 = 100.0;
/// CPI-anchored window used when the caller asks for the full history.
pub const DEFAULT_ANCHOR_MONTHS: u32 = 120;
/// Fetches in flight at once.
pub const DEFAULT_CONCURRENCY: usize = 8;

#[derive(Debug, Clone)]
pub struct BasketSpec<'a> {
    pub name: &'a str,
    pub tickers: &'a [&'a str],
    pub min_coverage: usize,
    pub warn_below: Option<usize>,
}

impl<'a> From<&'a BasketDefinition> for BasketSpec<'a> {
    fn from(def: &'a BasketDefinition) -> Self {
        BasketSpec {
            name: def.id,
            tickers: def.tickers,
            min_coverage: def.min_coverage,
            warn_below: def.warn_below,
        }
    }
}

fn valid_points(series: &[PricePoint]) -> usize {
    series.iter().filter(|dp| dp.value.is_finite() && dp.value > 0.0).count()
}

/// Fetches every constituent under bounded parallelism and builds the equal-weight real index.
///
/// A failed fetch only removes that constituent.
pub async fn build_equal_weight_index(
    basket: &BasketSpec<'_>,
    lookback_months: Option<u32>,
    cpi: &CpiIndexMap,
    source: &dyn DataSource,
    concurrency: usize,
) -> Result<SyntheticIndex> {
    tracing::info!(
        "Building synthetic {} from {} constituents ({} in flight)",
        basket.name,
        basket.tickers.len(),
        concurrency.max(1)
    );

    let results: Vec<(&str, Vec<PricePoint>)> = stream::iter(basket.tickers.iter().copied())
        .map(|ticker| async move {
            match source.fetch_data(ticker).await {
                Ok(series) => (ticker, series),
                Err(e) => {
                    tracing::warn!("{}: constituent {} dropped ({})", basket.name, ticker, e);
                    (ticker, Vec::new())
                }
            }
        })
        .buffered(concurrency.max(1))
        .collect()
        .await;

    let usable: Vec<Vec<PricePoint>> = results
        .into_iter()
        .filter(|(_, series)| valid_points(series) >= 2)
        .map(|(_, series)| series)
        .collect();

    if usable.len() < basket.min_coverage {
        return Err(AnalyzerError::InsufficientCoverage {
            basket: basket.name.to_string(),
            usable: usable.len(),
            required: basket.min_coverage,
        });
    }
    if let Some(threshold) = basket.warn_below {
        if usable.len() < threshold {
            tracing::warn!(
                "{}: only {} of {} constituents usable (below {})",
                basket.name,
                usable.len(),
                basket.tickers.len(),
                threshold
            );
        }
    }

    aggregate_equal_weight(basket.name, &usable, lookback_months, cpi)
}

/// Per constituent: monthly resample, window, clip, deflate. Then averages the
/// log-returns of the constituents present in both months of each step and
/// compounds from `INDEX_BASE`.
pub fn aggregate_equal_weight(
    name: &str,
    constituents: &[Vec<PricePoint>],
    lookback_months: Option<u32>,
    cpi: &CpiIndexMap,
) -> Result<SyntheticIndex> {
    let end = cpi
        .last_month()
        .ok_or_else(|| AnalyzerError::CpiUnavailable(format!("empty CPI map for {name}")))?;
    let start = end.minus_months(lookback_months.unwrap_or(DEFAULT_ANCHOR_MONTHS));

    let mut by_month: BTreeMap<MonthKey, HashMap<usize, f64>> = BTreeMap::new();
    for (idx, series) in constituents.iter().enumerate() {
        let monthly = resample_monthly(series);
        let windowed = window_filter(&monthly, lookback_months);
        let clip = clip_to_cpi_range(&windowed, cpi);
        if clip.series.is_empty() {
            continue;
        }
        for dp in deflate(&clip.series, cpi) {
            if dp.period < start || dp.period > end {
                continue;
            }
            let row = by_month.entry(dp.period).or_default();
            if dp.value.is_finite() && dp.value > 0.0 {
                row.insert(idx, dp.value);
            }
        }
    }

    if by_month.len() < 2 {
        return Err(AnalyzerError::InsufficientCoverage {
            basket: format!("{name} (months with data)"),
            usable: by_month.len(),
            required: 2,
        });
    }

    let months: Vec<(&MonthKey, &HashMap<usize, f64>)> = by_month.iter().collect();
    let mut level = INDEX_BASE;
    let mut series = Vec::with_capacity(months.len());
    series.push(DataPoint::new(*months[0].0, level));
    let mut total_components = 0usize;

    for pair in months.windows(2) {
        let (_, prev) = pair[0];
        let (month, curr) = pair[1];

        let mut sum = 0.0;
        let mut count = 0usize;
        for (idx, price) in curr {
            if let Some(prev_price) = prev.get(idx) {
                if *price > 0.0 && *prev_price > 0.0 {
                    sum += (price / prev_price).ln();
                    count += 1;
                }
            }
        }
        total_components += count;

        // No overlap carries the index flat.
        if count > 0 {
            level *= (sum / count as f64).exp();
        }
        series.push(DataPoint::new(*month, level));
    }

    let steps = months.len() - 1;
    Ok(SyntheticIndex {
        series,
        average_components_per_period: total_components as f64 / steps as f64,
        usable_constituents: constituents.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::NaiveDate;

    fn ym(s: &str) -> MonthKey {
        s.parse().unwrap()
    }

    fn flat_cpi(from_year: i32, years: i32) -> CpiIndexMap {
        let mut values = Vec::new();
        for y in from_year..from_year + years {
            for m in 1..=12 {
                values.push((MonthKey::new(y, m).unwrap(), 100.0));
            }
        }
        CpiIndexMap::new("flat", values)
    }

    fn daily(points: &[(&str, f64)]) -> Vec<PricePoint> {
        points
            .iter()
            .map(|(d, v)| DataPoint::new(NaiveDate::parse_from_str(d, "%Y-%m-%d").unwrap(), *v))
            .collect()
    }

    #[test]
    fn test_single_constituent_two_periods() {
        let cpi = flat_cpi(2023, 1);
        let series = daily(&[("2023-11-30", 50.0), ("2023-12-29", 55.0)]);
        let index = aggregate_equal_weight("one", &[series], None, &cpi).unwrap();

        assert_eq!(index.series.len(), 2);
        assert_eq!(index.series[0].period, ym("2023-11"));
        assert_eq!(index.series[0].value, 100.0);
        let r = (55.0f64 / 50.0).ln();
        assert!((index.series[1].value - 100.0 * r.exp()).abs() < 1e-9);
        assert_eq!(index.average_components_per_period, 1.0);
    }

    #[test]
    fn test_partial_coverage_and_flat_carry() {
        let cpi = flat_cpi(2023, 1);
        let a = daily(&[("2023-01-31", 10.0), ("2023-02-28", 11.0), ("2023-03-31", 12.1)]);
        // b skips February, so it contributes to no step
        let b = daily(&[("2023-01-31", 20.0), ("2023-03-31", 40.0)]);
        // c only exists in April: the March→April step has no overlap
        let c = daily(&[("2023-04-28", 5.0), ("2023-04-30", 5.0)]);
        let index = aggregate_equal_weight("mix", &[a, b, c], None, &cpi).unwrap();

        let values: Vec<f64> = index.series.iter().map(|p| p.value).collect();
        assert_eq!(values.len(), 4);
        assert!((values[1] - 110.0).abs() < 1e-9);
        assert!((values[2] - 121.0).abs() < 1e-9);
        assert!((values[3] - 121.0).abs() < 1e-9);
        assert!((index.average_components_per_period - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_cpi_anchored_window_drops_old_months() {
        let cpi = flat_cpi(2023, 1);
        let series = daily(&[("2022-12-30", 1.0), ("2023-10-31", 10.0), ("2023-11-30", 11.0), ("2023-12-29", 12.0)]);
        let index = aggregate_equal_weight("w", &[series], Some(1), &cpi).unwrap();
        assert_eq!(index.series.first().unwrap().period, ym("2023-11"));
        assert_eq!(index.series.len(), 2);
    }

    #[test]
    fn test_single_month_is_insufficient() {
        let cpi = flat_cpi(2023, 1);
        let series = daily(&[("2023-12-01", 10.0), ("2023-12-29", 12.0)]);
        let result = aggregate_equal_weight("short", &[series], None, &cpi);
        assert!(matches!(result, Err(AnalyzerError::InsufficientCoverage { .. })));
    }

    /// Serves `usable` tickers with data and fails the rest.
    struct PartialSource {
        usable: Vec<String>,
    }

    #[async_trait]
    impl DataSource for PartialSource {
        fn name(&self) -> &str {
            "partial"
        }

        async fn fetch_data(&self, ticker: &str) -> Result<Vec<PricePoint>> {
            if self.usable.iter().any(|t| t == ticker) {
                Ok(daily(&[("2023-10-31", 10.0), ("2023-11-30", 10.5), ("2023-12-29", 11.0)]))
            } else if ticker.ends_with('9') {
                Err(AnalyzerError::NetworkFailure("timeout".into()))
            } else {
                Ok(daily(&[("2023-12-29", 11.0)]))
            }
        }
    }

    const TWENTY: &[&str] = &[
        "T0", "T1", "T2", "T3", "T4", "T5", "T6", "T7", "T8", "T9", "T10", "T11", "T12", "T13", "T14", "T15", "T16",
        "T17", "T18", "T19",
    ];

    #[tokio::test]
    async fn test_seven_of_twenty_fails_min_eight() {
        let source = PartialSource { usable: (0..7).map(|i| format!("T{i}")).collect() };
        let spec = BasketSpec { name: "test", tickers: TWENTY, min_coverage: 8, warn_below: None };
        let result = build_equal_weight_index(&spec, None, &flat_cpi(2023, 1), &source, 4).await;
        assert_eq!(
            result,
            Err(AnalyzerError::InsufficientCoverage { basket: "test".into(), usable: 7, required: 8 })
        );
    }

    #[tokio::test]
    async fn test_eight_of_twenty_builds() {
        let source = PartialSource { usable: (0..8).map(|i| format!("T{i}")).collect() };
        let spec = BasketSpec { name: "test", tickers: TWENTY, min_coverage: 8, warn_below: Some(10) };
        let index = build_equal_weight_index(&spec, None, &flat_cpi(2023, 1), &source, DEFAULT_CONCURRENCY)
            .await
            .unwrap();
        assert_eq!(index.usable_constituents, 8);
        assert_eq!(index.series.len(), 3);
        assert!((index.average_components_per_period - 8.0).abs() < 1e-12);
        assert!((index.series[2].value - 110.0).abs() < 1e-9);
    }
}
