use async_trait::async_trait;
use crate::error::{AnalyzerError, Result};
use crate::models::{BondObservation, DataPoint, PricePoint};
use super::{http, BondSource, DataSource};
use chrono::NaiveDate;
use reqwest::Client;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

/// Historical endpoints of the Data912 market data API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Market {
    Stocks,
    Cedears,
    Bonds,
}

impl Market {
    pub fn path(&self) -> &'static str {
        match self {
            Market::Stocks => "stocks",
            Market::Cedears => "cedears",
            Market::Bonds => "bonds",
        }
    }
}

/// Index name that only exists as a synthetic basket here.
const SYNTHETIC_ONLY: &str = "MERVAL";

pub struct Data912Fetcher {
    base_url: String,
    client: Client,
    /// Markets tried in order for equity tickers.
    equity_markets: Vec<Market>,
}

impl Data912Fetcher {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: http::build_client(timeout),
            equity_markets: vec![Market::Stocks, Market::Cedears],
        }
    }

    pub fn with_markets(mut self, markets: Vec<Market>) -> Self {
        self.equity_markets = markets;
        self
    }

    fn url(&self, market: Market, ticker: &str) -> String {
        format!("{}/historical/{}/{}", self.base_url, market.path(), ticker)
    }

    async fn fetch_rows(&self, market: Market, ticker: &str) -> Result<Vec<Value>> {
        let url = self.url(market, ticker);
        let json = http::get_json(&self.client, &url, "data912", ticker).await?;
        let rows = Self::unwrap_rows(json);
        if rows.is_empty() {
            return Err(AnalyzerError::NoHistory(ticker.to_string()));
        }
        Ok(rows)
    }
}

fn normalize_ticker(ticker: &str) -> Result<String> {
    let t = ticker.trim().to_uppercase();
    if t.is_empty() {
        return Err(AnalyzerError::InvalidInput("empty ticker".to_string()));
    }
    if t == SYNTHETIC_ONLY {
        return Err(AnalyzerError::InvalidInput(
            "MERVAL is not a ticker, use the synthetic MERVAL basket as benchmark".to_string(),
        ));
    }
    Ok(t)
}

#[async_trait]
impl DataSource for Data912Fetcher {
    fn name(&self) -> &str {
        "data912"
    }

    async fn fetch_data(&self, ticker: &str) -> Result<Vec<PricePoint>> {
        let ticker = normalize_ticker(ticker)?;

        let mut last_err = AnalyzerError::NoHistory(ticker.clone());
        for market in &self.equity_markets {
            match self.fetch_rows(*market, &ticker).await {
                Ok(rows) => {
                    let points = Self::parse_prices(&rows);
                    if points.is_empty() {
                        last_err = AnalyzerError::NoHistory(ticker.clone());
                        continue;
                    }
                    tracing::debug!("Data912 {} ({}): {} points", ticker, market.path(), points.len());
                    return Ok(points);
                }
                // Only "no history" moves on to the next market.
                Err(AnalyzerError::NoHistory(_)) => {
                    last_err = AnalyzerError::NoHistory(ticker.clone());
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_err)
    }
}

#[async_trait]
impl BondSource for Data912Fetcher {
    fn name(&self) -> &str {
        "data912"
    }

    async fn fetch_bond_series(&self, ticker: &str) -> Result<Vec<BondObservation>> {
        let ticker = normalize_ticker(ticker)?;
        let rows = self.fetch_rows(Market::Bonds, &ticker).await?;
        let observations = Self::parse_bonds(&rows);
        if observations.is_empty() {
            return Err(AnalyzerError::NoHistory(ticker));
        }
        Ok(observations)
    }
}

fn number(v: Option<&Value>) -> Option<f64> {
    let parsed = match v? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    parsed.filter(|x: &f64| x.is_finite())
}

fn row_date(row: &Value) -> Option<NaiveDate> {
    let raw = row.get("date").or_else(|| row.get("Date"))?.as_str()?;
    let day = raw.get(..10)?;
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

fn row_close(row: &Value) -> Option<f64> {
    number(row.get("c")).or_else(|| number(row.get("close")))
}

impl Data912Fetcher {
    /// Accepts a bare array or one wrapped in `{data: []}` / `{prices: []}`.
    fn unwrap_rows(json: Value) -> Vec<Value> {
        match json {
            Value::Array(rows) => rows,
            Value::Object(mut obj) => match obj.remove("data").or_else(|| obj.remove("prices")) {
                Some(Value::Array(rows)) => rows,
                _ => Vec::new(),
            },
            _ => Vec::new(),
        }
    }

    /// Sorted by date; duplicate dates keep the last row.
    fn parse_prices(rows: &[Value]) -> Vec<PricePoint> {
        let mut by_date = BTreeMap::new();
        for row in rows {
            if let (Some(date), Some(close)) = (row_date(row), row_close(row)) {
                by_date.insert(date, close);
            }
        }
        by_date.into_iter().map(|(d, c)| DataPoint::new(d, c)).collect()
    }

    fn parse_bonds(rows: &[Value]) -> Vec<BondObservation> {
        let mut by_date = BTreeMap::new();
        for row in rows {
            let date = match row_date(row) {
                Some(d) => d,
                None => continue,
            };
            let yield_percent = number(row.get("yield"))
                .or_else(|| number(row.get("ytm")))
                .or_else(|| number(row.get("tea")));
            by_date.insert(date, BondObservation { date, close: row_close(row), yield_percent });
        }
        by_date.into_values().collect()
    }
}
