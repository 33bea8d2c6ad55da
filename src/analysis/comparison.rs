use crate::models::{DataPoint, PricePoint};
use chrono::Datelike;
use serde::Serialize;
use std::collections::BTreeMap;

/// Last positive value of each calendar year.
pub fn resample_to_annual(series: &[PricePoint]) -> Vec<DataPoint<i32, f64>> {
    let mut by_year = BTreeMap::new();
    for dp in series {
        if !(dp.value.is_finite() && dp.value > 0.0) {
            continue;
        }
        let year = dp.period.year();
        match by_year.get(&year) {
            Some((date, _)) if *date > dp.period => {}
            _ => {
                by_year.insert(year, (dp.period, dp.value));
            }
        }
    }
    by_year
        .into_iter()
        .map(|(year, (_, value))| DataPoint::new(year, value))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnualComparisonRow {
    pub year: i32,
    pub first: f64,
    pub second: f64,
}

/// Years present in both series, each rebased to 100 at the first common year.
pub fn align_and_normalize_annual(first: &[PricePoint], second: &[PricePoint]) -> Vec<AnnualComparisonRow> {
    let a: BTreeMap<i32, f64> = resample_to_annual(first).into_iter().map(|dp| (dp.period, dp.value)).collect();
    let b = resample_to_annual(second);

    let common: Vec<(i32, f64, f64)> = b
        .iter()
        .filter_map(|dp| a.get(&dp.period).map(|va| (dp.period, *va, dp.value)))
        .collect();

    let (base_a, base_b) = match common.first() {
        Some(&(_, va, vb)) => (va, vb),
        None => return Vec::new(),
    };

    common
        .into_iter()
        .map(|(year, va, vb)| AnnualComparisonRow {
            year,
            first: 100.0 * va / base_a,
            second: 100.0 * vb / base_b,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn p(date: &str, value: f64) -> PricePoint {
        DataPoint::new(NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(), value)
    }

    #[test]
    fn test_annual_keeps_last_positive_value() {
        let s = vec![p("2022-06-01", 5.0), p("2022-12-30", 6.0), p("2023-03-01", 7.0), p("2023-12-29", 0.0)];
        let annual = resample_to_annual(&s);
        assert_eq!(annual, vec![DataPoint::new(2022, 6.0), DataPoint::new(2023, 7.0)]);
    }

    #[test]
    fn test_normalized_on_first_common_year() {
        let btc = vec![p("2020-12-31", 29000.0), p("2021-12-31", 46000.0), p("2022-12-30", 16500.0)];
        let ndx = vec![p("2021-12-31", 15600.0), p("2022-12-30", 10400.0)];
        let rows = align_and_normalize_annual(&btc, &ndx);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].year, 2021);
        assert_eq!(rows[0].first, 100.0);
        assert_eq!(rows[0].second, 100.0);
        assert!((rows[1].first - 100.0 * 16500.0 / 46000.0).abs() < 1e-9);
        assert!((rows[1].second - 100.0 * 10400.0 / 15600.0).abs() < 1e-9);
    }
}
