use async_trait::async_trait;
use crate::error::Result;
use crate::models::{BondObservation, DataPoint, MonthKey, PricePoint, SeriesDescriptor};

pub mod http;
pub mod series_api;
pub mod data912;
pub mod yahoo;
pub mod cached;

/// Daily price history of one ticker, sorted by date.
#[async_trait]
pub trait DataSource: Send + Sync {
    fn name(&self) -> &str;
    async fn fetch_data(&self, ticker: &str) -> Result<Vec<PricePoint>>;
}

/// Daily bond history, optionally carrying a quoted yield.
#[async_trait]
pub trait BondSource: Send + Sync {
    fn name(&self) -> &str;
    async fn fetch_bond_series(&self, ticker: &str) -> Result<Vec<BondObservation>>;
}

/// Official statistics catalog holding the CPI.
#[async_trait]
pub trait CpiSource: Send + Sync {
    fn name(&self) -> &str;
    async fn search_series(&self, query: &str) -> Result<Vec<SeriesDescriptor>>;
    async fn fetch_monthly(&self, series_id: &str) -> Result<Vec<DataPoint<MonthKey, f64>>>;
}
