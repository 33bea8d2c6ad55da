use crate::error::{AnalyzerError, Result};
use crate::models::{DataPoint, PricePoint};
use super::DataSource;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::collections::BTreeMap;
use time::OffsetDateTime;
use yahoo_finance_api as yahoo;

/// Daily closes from Yahoo Finance. Used for benchmark fallback tickers (^IXIC, QQQ).
pub struct YahooFetcher {
    history_years: i64,
}

impl YahooFetcher {
    pub fn new() -> Self {
        YahooFetcher { history_years: 20 }
    }
}

impl Default for YahooFetcher {
    fn default() -> Self {
        Self::new()
    }
}

fn classify(err: yahoo::YahooError, symbol: &str) -> AnalyzerError {
    let msg = err.to_string();
    let lower = msg.to_lowercase();
    if lower.contains("429") || lower.contains("too many") {
        AnalyzerError::RateLimited { source_name: "yahoo".to_string() }
    } else if lower.contains("404") || lower.contains("not found") || lower.contains("empty") || lower.contains("no quotes") {
        AnalyzerError::NoHistory(symbol.to_string())
    } else {
        AnalyzerError::NetworkFailure(format!("yahoo: {msg}"))
    }
}

#[async_trait]
impl DataSource for YahooFetcher {
    fn name(&self) -> &str {
        "yahoo"
    }

    async fn fetch_data(&self, symbol: &str) -> Result<Vec<PricePoint>> {
        let provider = yahoo::YahooConnector::new()
            .map_err(|e| AnalyzerError::NetworkFailure(format!("yahoo connector: {e}")))?;

        // The Yahoo client works in `time`, not `chrono`
        let now = OffsetDateTime::now_utc();
        let start = now - time::Duration::days(365 * self.history_years);

        let resp = provider
            .get_quote_history(symbol, start, now)
            .await
            .map_err(|e| classify(e, symbol))?;
        let quotes = resp.quotes().map_err(|e| classify(e, symbol))?;

        let mut by_date = BTreeMap::new();
        for quote in quotes {
            if !(quote.close.is_finite() && quote.close > 0.0) {
                continue;
            }
            if let Some(ts) = Utc.timestamp_opt(quote.timestamp as i64, 0).single() {
                by_date.insert(ts.date_naive(), quote.close);
            }
        }

        if by_date.is_empty() {
            return Err(AnalyzerError::NoHistory(symbol.to_string()));
        }
        tracing::debug!("Yahoo {}: {} points", symbol, by_date.len());

        Ok(by_date.into_iter().map(|(d, c)| DataPoint::new(d, c)).collect())
    }
}
