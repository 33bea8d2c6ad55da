use crate::models::{AlignedPair, DataPoint, Frequency, MonthKey, Period, PricePair, PricePoint};
use chrono::{Datelike, NaiveDate};
use std::collections::BTreeMap;

/// Inner-joins two daily series on date.
///
/// Only dates present in BOTH series with a positive close survive.
/// Output is sorted chronologically.
pub fn align_by_date(asset: &[PricePoint], benchmark: &[PricePoint]) -> Vec<AlignedPair> {
    // 1. Index the benchmark by date, skipping unusable prices
    let bench_map: BTreeMap<NaiveDate, f64> = benchmark
        .iter()
        .filter(|dp| dp.value.is_finite() && dp.value > 0.0)
        .map(|dp| (dp.period, dp.value))
        .collect();

    // 2. Walk the asset and keep matches
    let mut aligned: BTreeMap<NaiveDate, PricePair> = BTreeMap::new();
    for dp in asset {
        if !(dp.value.is_finite() && dp.value > 0.0) {
            continue;
        }
        if let Some(&bench) = bench_map.get(&dp.period) {
            aligned.insert(dp.period, PricePair { asset: dp.value, benchmark: bench });
        }
    }

    aligned
        .into_iter()
        .map(|(period, value)| DataPoint { period, value })
        .collect()
}

/// Last observation of each calendar month, keyed by month.
pub fn resample_monthly<V: Copy>(series: &[DataPoint<NaiveDate, V>]) -> Vec<DataPoint<MonthKey, V>> {
    let mut by_month: BTreeMap<MonthKey, (NaiveDate, V)> = BTreeMap::new();
    for dp in series {
        let key = MonthKey::from_date(dp.period);
        match by_month.get(&key) {
            Some((last, _)) if *last > dp.period => {}
            _ => {
                by_month.insert(key, (dp.period, dp.value));
            }
        }
    }

    by_month
        .into_iter()
        .map(|(period, (_, value))| DataPoint { period, value })
        .collect()
}

/// Week bucket: `ceil((day_of_year + weekday_of_jan_1) / 7)`, Sunday = 0.
pub fn week_number(date: NaiveDate) -> u32 {
    let jan1_weekday = NaiveDate::from_ymd_opt(date.year(), 1, 1)
        .map(|d| d.weekday().num_days_from_sunday())
        .unwrap_or(0);
    (date.ordinal() + jan1_weekday).div_ceil(7)
}

/// Last observation of each week, keyed by the date of that observation.
pub fn resample_weekly<V: Copy>(series: &[DataPoint<NaiveDate, V>]) -> Vec<DataPoint<NaiveDate, V>> {
    let mut by_week: BTreeMap<(i32, u32), DataPoint<NaiveDate, V>> = BTreeMap::new();
    for dp in series {
        let key = (dp.period.year(), week_number(dp.period));
        match by_week.get(&key) {
            Some(last) if last.period > dp.period => {}
            _ => {
                by_week.insert(key, *dp);
            }
        }
    }
    by_week.into_values().collect()
}

/// A resampled series: monthly output is re-keyed by month, the rest keep dates.
#[derive(Debug, Clone, PartialEq)]
pub enum Resampled<V> {
    Dated(Vec<DataPoint<NaiveDate, V>>),
    Monthly(Vec<DataPoint<MonthKey, V>>),
}

impl<V> Resampled<V> {
    pub fn len(&self) -> usize {
        match self {
            Resampled::Dated(s) => s.len(),
            Resampled::Monthly(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Resamples to `frequency`. Daily is a pass-through.
pub fn resample<V: Copy>(series: &[DataPoint<NaiveDate, V>], frequency: Frequency) -> Resampled<V> {
    match frequency {
        Frequency::Daily => Resampled::Dated(series.to_vec()),
        Frequency::Weekly => Resampled::Dated(resample_weekly(series)),
        Frequency::Monthly => Resampled::Monthly(resample_monthly(series)),
    }
}

/// Keeps periods within `lookback_months` of the last period. `None` keeps everything.
pub fn window_filter<P: Period, V: Copy>(
    series: &[DataPoint<P, V>],
    lookback_months: Option<u32>,
) -> Vec<DataPoint<P, V>> {
    let end = match series.last() {
        Some(dp) => dp.period,
        None => return Vec::new(),
    };
    let months = match lookback_months {
        Some(m) => m,
        None => return series.to_vec(),
    };
    let start = end.months_back(months);

    series
        .iter()
        .filter(|dp| dp.period >= start && dp.period <= end)
        .copied()
        .collect()
}
