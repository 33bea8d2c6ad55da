use serde::{Deserialize, Serialize};
use chrono::{Datelike, Months, NaiveDate};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// PERIODS
// ============================================================================

/// Calendar month, ordered chronologically. Serialized as "YYYY-MM".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MonthKey {
    year: i32,
    month: u32,
}

impl MonthKey {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        if (1..=12).contains(&month) {
            Some(Self { year, month })
        } else {
            None
        }
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self { year: date.year(), month: date.month() }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// Same month `months` earlier (12 months back from 2024-03 is 2023-03).
    pub fn minus_months(&self, months: u32) -> Self {
        let index = self.year as i64 * 12 + (self.month as i64 - 1) - months as i64;
        Self {
            year: index.div_euclid(12) as i32,
            month: index.rem_euclid(12) as u32 + 1,
        }
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for MonthKey {
    type Err = String;

    /// Accepts "YYYY-MM" or any longer date string starting with it ("YYYY-MM-DD").
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let head = s.get(..7).ok_or_else(|| format!("invalid month key: {s}"))?;
        let (year, month) = head
            .split_once('-')
            .ok_or_else(|| format!("invalid month key: {s}"))?;
        let year: i32 = year.parse().map_err(|_| format!("invalid year in {s}"))?;
        let month: u32 = month.parse().map_err(|_| format!("invalid month in {s}"))?;
        MonthKey::new(year, month).ok_or_else(|| format!("month out of range in {s}"))
    }
}

impl TryFrom<String> for MonthKey {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MonthKey> for String {
    fn from(key: MonthKey) -> Self {
        key.to_string()
    }
}

/// A position on a time axis: a raw trading date or a calendar month.
pub trait Period: Copy + Ord + fmt::Display {
    /// Month whose CPI applies to this period.
    fn month_key(&self) -> MonthKey;

    /// Start of a lookback window ending at `self`.
    fn months_back(&self, months: u32) -> Self;
}

impl Period for NaiveDate {
    fn month_key(&self) -> MonthKey {
        MonthKey::from_date(*self)
    }

    fn months_back(&self, months: u32) -> Self {
        self.checked_sub_months(Months::new(months))
            .unwrap_or(NaiveDate::MIN)
    }
}

impl Period for MonthKey {
    fn month_key(&self) -> MonthKey {
        *self
    }

    fn months_back(&self, months: u32) -> Self {
        self.minus_months(months)
    }
}

// ============================================================================
// SERIES
// ============================================================================

/// One observation on a series. `P` is the period type, `V` the value shape.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct DataPoint<P = NaiveDate, V = f64> {
    pub period: P,
    pub value: V,
}

impl<P, V> DataPoint<P, V> {
    pub fn new(period: P, value: V) -> Self {
        Self { period, value }
    }
}

/// Nominal close of one asset on one date.
pub type PricePoint = DataPoint<NaiveDate, f64>;

/// Asset and benchmark prices on the same period.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct PricePair {
    pub asset: f64,
    pub benchmark: f64,
}

/// Output of an inner join of two price series.
pub type AlignedPair<P = NaiveDate> = DataPoint<P, PricePair>;

/// Value shapes that can be divided by a deflation ratio.
pub trait PriceValue: Copy {
    fn is_valid(&self) -> bool;
    fn deflate(self, ratio: f64) -> Self;
}

impl PriceValue for f64 {
    fn is_valid(&self) -> bool {
        self.is_finite() && *self > 0.0
    }

    fn deflate(self, ratio: f64) -> Self {
        self / ratio
    }
}

impl PriceValue for PricePair {
    fn is_valid(&self) -> bool {
        self.asset.is_valid() && self.benchmark.is_valid()
    }

    fn deflate(self, ratio: f64) -> Self {
        PricePair {
            asset: self.asset / ratio,
            benchmark: self.benchmark / ratio,
        }
    }
}

/// Resampling target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Weekly,
    #[default]
    Monthly,
}

impl Frequency {
    pub fn periods_per_year(&self) -> u32 {
        match self {
            Frequency::Daily => 252,
            Frequency::Weekly => 52,
            Frequency::Monthly => 12,
        }
    }

    /// Sample size below which a result is not considered representative for this frequency.
    pub fn baseline_observations(&self) -> usize {
        match self {
            Frequency::Daily => 252,
            Frequency::Weekly => 52,
            Frequency::Monthly => 24,
        }
    }

    /// Annual rate expressed per period of this frequency.
    pub fn periodic_rate(&self, annual: f64) -> f64 {
        annual / self.periods_per_year() as f64
    }
}

impl FromStr for Frequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "daily" | "d" => Ok(Frequency::Daily),
            "weekly" | "w" => Ok(Frequency::Weekly),
            "monthly" | "m" => Ok(Frequency::Monthly),
            other => Err(format!("unknown frequency '{other}' (daily, weekly, monthly)")),
        }
    }
}

/// Lookback window in months for the UI window options. `MAX` is unbounded.
pub fn window_months(option: &str) -> Result<Option<u32>, String> {
    match option.trim().to_uppercase().as_str() {
        "6M" => Ok(Some(6)),
        "1Y" => Ok(Some(12)),
        "3Y" => Ok(Some(36)),
        "5Y" => Ok(Some(60)),
        "10Y" => Ok(Some(120)),
        "MAX" | "" => Ok(None),
        other => Err(format!("unknown window '{other}' (6M, 1Y, 3Y, 5Y, 10Y, MAX)")),
    }
}

// ============================================================================
// CPI
// ============================================================================

/// Result of a month lookup on the CPI map.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CpiLookup {
    pub value: f64,
    pub interpolated: bool,
}

/// Monthly CPI index values keyed by month. Only positive values are stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CpiIndexMap {
    pub series_id: String,
    values: BTreeMap<MonthKey, f64>,
}

impl CpiIndexMap {
    pub fn new(series_id: impl Into<String>, values: impl IntoIterator<Item = (MonthKey, f64)>) -> Self {
        let values = values
            .into_iter()
            .filter(|(_, v)| v.is_finite() && *v > 0.0)
            .collect();
        Self { series_id: series_id.into(), values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn first_month(&self) -> Option<MonthKey> {
        self.values.keys().next().copied()
    }

    pub fn last_month(&self) -> Option<MonthKey> {
        self.values.keys().next_back().copied()
    }

    pub fn get(&self, month: MonthKey) -> Option<f64> {
        self.values.get(&month).copied()
    }

    /// Exact value for `month`, or the latest earlier month carried forward.
    pub fn resolve(&self, month: MonthKey) -> Option<CpiLookup> {
        if let Some(&value) = self.values.get(&month) {
            return Some(CpiLookup { value, interpolated: false });
        }
        self.values
            .range(..month)
            .next_back()
            .map(|(_, &value)| CpiLookup { value, interpolated: true })
    }
}

/// Free-text metadata of a candidate CPI series from the catalog search.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeriesDescriptor {
    pub id: String,
    pub description: String,
    pub title: String,
    pub units: String,
    pub frequency: String,
}

// ============================================================================
// BONDS
// ============================================================================

/// Canonical bond row. Adapters map `c`/`close` and `yield`/`ytm`/`tea` onto it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BondObservation {
    pub date: NaiveDate,
    pub close: Option<f64>,
    /// Annual yield in percent (5.2 means 5.2%).
    pub yield_percent: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskFreeSource {
    DirectYield,
    EstimatedFromPrices,
    Fixed,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskFreeEstimate {
    pub annual_real_rate: f64,
    pub source: RiskFreeSource,
}

// ============================================================================
// SYNTHETIC INDEX
// ============================================================================

pub type SyntheticIndexPoint = DataPoint<MonthKey, f64>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyntheticIndex {
    pub series: Vec<SyntheticIndexPoint>,
    pub average_components_per_period: f64,
    pub usable_constituents: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ym(s: &str) -> MonthKey {
        s.parse().unwrap()
    }

    #[test]
    fn test_month_key_parse_and_display() {
        assert_eq!(ym("2023-07").to_string(), "2023-07");
        assert_eq!(ym("2023-07-19"), ym("2023-07"));
        assert!("2023-13".parse::<MonthKey>().is_err());
        assert!("2023".parse::<MonthKey>().is_err());
    }

    #[test]
    fn test_month_key_minus_months_crosses_years() {
        assert_eq!(ym("2024-03").minus_months(12), ym("2023-03"));
        assert_eq!(ym("2024-01").minus_months(1), ym("2023-12"));
        assert_eq!(ym("2024-06").minus_months(30), ym("2021-12"));
    }

    #[test]
    fn test_month_key_serializes_as_string_map_key() {
        let map = CpiIndexMap::new("x", vec![(ym("2023-01"), 100.0), (ym("2023-02"), 101.0)]);
        let json = serde_json::to_string(&map).unwrap();
        assert!(json.contains("\"2023-01\":100.0"));
        let back: CpiIndexMap = serde_json::from_str(&json).unwrap();
        assert_eq!(back, map);
    }

    #[test]
    fn test_cpi_resolve_exact_and_carry_forward() {
        let map = CpiIndexMap::new(
            "x",
            vec![(ym("2023-01"), 100.0), (ym("2023-02"), 0.0), (ym("2023-04"), 110.0)],
        );
        assert_eq!(map.resolve(ym("2023-01")), Some(CpiLookup { value: 100.0, interpolated: false }));
        // Non-positive values never enter the map, so February carries January forward.
        assert_eq!(map.resolve(ym("2023-02")), Some(CpiLookup { value: 100.0, interpolated: true }));
        assert_eq!(map.resolve(ym("2023-03")), Some(CpiLookup { value: 100.0, interpolated: true }));
        assert_eq!(map.resolve(ym("2023-09")), Some(CpiLookup { value: 110.0, interpolated: true }));
        assert_eq!(map.resolve(ym("2022-12")), None);
    }

    #[test]
    fn test_window_months_options() {
        assert_eq!(window_months("6M"), Ok(Some(6)));
        assert_eq!(window_months("1y"), Ok(Some(12)));
        assert_eq!(window_months("10Y"), Ok(Some(120)));
        assert_eq!(window_months("MAX"), Ok(None));
        assert!(window_months("2W").is_err());
    }

    #[test]
    fn test_frequency_constants() {
        assert_eq!(Frequency::Daily.periods_per_year(), 252);
        assert_eq!(Frequency::Weekly.baseline_observations(), 52);
        assert_eq!(Frequency::Monthly.baseline_observations(), 24);
        assert!((Frequency::Monthly.periodic_rate(0.12) - 0.01).abs() < 1e-12);
        assert_eq!("weekly".parse::<Frequency>(), Ok(Frequency::Weekly));
    }
}
