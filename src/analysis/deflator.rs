use crate::models::{CpiIndexMap, DataPoint, Period, PriceValue};

/// A series trimmed to the periods the CPI map can deflate.
#[derive(Debug, Clone, PartialEq)]
pub struct ClipResult<P, V> {
    pub series: Vec<DataPoint<P, V>>,
    /// True when at least one period fell outside the CPI coverage.
    pub clipped: bool,
    /// Periods dropped by the clip.
    pub dropped: usize,
    pub first_period: Option<P>,
    pub last_period: Option<P>,
    /// True when any kept period relies on a carried-forward CPI value.
    pub interpolated: bool,
}

impl<P, V> ClipResult<P, V> {
    /// Share of the input that was dropped, in `[0, 1]`.
    pub fn clipped_fraction(&self) -> f64 {
        let total = self.series.len() + self.dropped;
        if total == 0 {
            0.0
        } else {
            self.dropped as f64 / total as f64
        }
    }
}

/// Drops periods whose month has no resolvable CPI (before the first CPI month).
///
/// Periods after the last published CPI month (or in a gap) stay and resolve by
/// carry-forward; `interpolated` reports that on the result.
pub fn clip_to_cpi_range<P: Period, V: Copy>(series: &[DataPoint<P, V>], cpi: &CpiIndexMap) -> ClipResult<P, V> {
    let mut kept = Vec::with_capacity(series.len());
    let mut interpolated = false;
    for dp in series {
        if let Some(lookup) = cpi.resolve(dp.period.month_key()) {
            interpolated |= lookup.interpolated;
            kept.push(*dp);
        }
    }

    let dropped = series.len() - kept.len();
    let first_period = kept.first().map(|dp| dp.period);
    let last_period = kept.last().map(|dp| dp.period);

    ClipResult {
        series: kept,
        clipped: dropped > 0,
        dropped,
        first_period,
        last_period,
        interpolated,
    }
}

/// Converts nominal values into real values rebased on the first period.
///
/// `real(t) = nominal(t) / (cpi(t) / cpi(t0))`. Returns an empty series when the
/// base CPI cannot be resolved. Periods with no CPI or an invalid value are skipped.
pub fn deflate<P: Period, V: PriceValue>(series: &[DataPoint<P, V>], cpi: &CpiIndexMap) -> Vec<DataPoint<P, V>> {
    let first = match series.first() {
        Some(dp) => dp,
        None => return Vec::new(),
    };

    let base = match cpi.resolve(first.period.month_key()) {
        Some(lookup) if lookup.value > 0.0 => lookup.value,
        _ => {
            tracing::debug!("No base CPI for {}, cannot deflate", first.period);
            return Vec::new();
        }
    };

    series
        .iter()
        .filter(|dp| dp.value.is_valid())
        .filter_map(|dp| {
            let lookup = cpi.resolve(dp.period.month_key())?;
            if lookup.value <= 0.0 {
                return None;
            }
            let ratio = lookup.value / base;
            Some(DataPoint::new(dp.period, dp.value.deflate(ratio)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MonthKey, PricePair};
    use chrono::NaiveDate;

    fn ym(s: &str) -> MonthKey {
        s.parse().unwrap()
    }

    fn cpi() -> CpiIndexMap {
        CpiIndexMap::new(
            "test",
            vec![(ym("2023-01"), 100.0), (ym("2023-02"), 110.0), (ym("2023-03"), 121.0)],
        )
    }

    #[test]
    fn test_deflate_rebases_on_first_period() {
        let s = vec![
            DataPoint::new(ym("2023-01"), 50.0),
            DataPoint::new(ym("2023-02"), 55.0),
            DataPoint::new(ym("2023-03"), 60.5),
        ];
        let real = deflate(&s, &cpi());
        assert_eq!(real.len(), 3);
        for dp in &real {
            assert!((dp.value - 50.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_deflate_is_scale_invariant() {
        let s: Vec<_> = [("2023-01", 10.0), ("2023-02", 13.0), ("2023-03", 12.0)]
            .iter()
            .map(|(m, v)| DataPoint::new(ym(m), *v))
            .collect();
        let scaled: Vec<_> = s.iter().map(|dp| DataPoint::new(dp.period, dp.value * 7.5)).collect();

        let a = deflate(&s, &cpi());
        let b = deflate(&scaled, &cpi());
        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x.value * 7.5 - y.value).abs() < 1e-9);
        }
    }

    #[test]
    fn test_constant_cpi_is_identity() {
        let flat = CpiIndexMap::new("flat", vec![(ym("2023-01"), 100.0), (ym("2023-02"), 100.0)]);
        let s = vec![
            DataPoint::new(NaiveDate::from_ymd_opt(2023, 1, 5).unwrap(), 3.0),
            DataPoint::new(NaiveDate::from_ymd_opt(2023, 2, 9).unwrap(), 4.0),
        ];
        assert_eq!(deflate(&s, &flat), s);
    }

    #[test]
    fn test_deflate_pairs_both_legs() {
        let s = vec![
            DataPoint::new(ym("2023-01"), PricePair { asset: 10.0, benchmark: 100.0 }),
            DataPoint::new(ym("2023-02"), PricePair { asset: 11.0, benchmark: 110.0 }),
        ];
        let real = deflate(&s, &cpi());
        assert!((real[1].value.asset - 10.0).abs() < 1e-9);
        assert!((real[1].value.benchmark - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_deflate_without_base_cpi_is_empty() {
        let s = vec![DataPoint::new(ym("2022-06"), 10.0), DataPoint::new(ym("2023-02"), 11.0)];
        assert!(deflate(&s, &cpi()).is_empty());
    }

    #[test]
    fn test_clip_drops_uncovered_head_and_flags_tail() {
        let s = vec![
            DataPoint::new(ym("2022-11"), 1.0),
            DataPoint::new(ym("2022-12"), 1.0),
            DataPoint::new(ym("2023-01"), 1.0),
            DataPoint::new(ym("2023-05"), 1.0),
        ];
        let clip = clip_to_cpi_range(&s, &cpi());
        assert!(clip.clipped);
        assert_eq!(clip.dropped, 2);
        assert_eq!(clip.series.len(), 2);
        assert_eq!(clip.first_period, Some(ym("2023-01")));
        assert_eq!(clip.last_period, Some(ym("2023-05")));
        assert!(clip.interpolated);
        assert!((clip.clipped_fraction() - 0.5).abs() < 1e-12);
    }
}
