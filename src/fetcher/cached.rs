use async_trait::async_trait;
use crate::core::cache::TtlCache;
use crate::error::Result;
use crate::models::{BondObservation, PricePoint};
use super::{BondSource, DataSource};
use std::sync::Arc;

/// Wraps a source with the durable per-ticker cache.
///
/// Only successful, non-empty fetches are stored. A cache failure is a miss.
pub struct CachedSource<S: ?Sized> {
    inner: Arc<S>,
    cache: TtlCache,
}

impl<S: ?Sized> CachedSource<S> {
    pub fn new(inner: Arc<S>, cache: TtlCache) -> Self {
        Self { inner, cache }
    }
}

fn key(kind: &str, source: &str, ticker: &str) -> String {
    format!("{}:{}:{}", kind, source, ticker.trim().to_uppercase())
}

#[async_trait]
impl<S: DataSource + ?Sized> DataSource for CachedSource<S> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn fetch_data(&self, ticker: &str) -> Result<Vec<PricePoint>> {
        let key = key("series", self.inner.name(), ticker);
        if let Some((points, stored_at)) = self.cache.get_json::<Vec<PricePoint>>(&key).await {
            tracing::debug!("Cache hit for {} (stored {})", key, stored_at);
            return Ok(points);
        }

        let points = self.inner.fetch_data(ticker).await?;
        if !points.is_empty() {
            self.cache.set_json(&key, &points).await;
        }
        Ok(points)
    }
}

#[async_trait]
impl<S: BondSource + ?Sized> BondSource for CachedSource<S> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn fetch_bond_series(&self, ticker: &str) -> Result<Vec<BondObservation>> {
        let key = key("bond", self.inner.name(), ticker);
        if let Some((rows, _)) = self.cache.get_json::<Vec<BondObservation>>(&key).await {
            return Ok(rows);
        }

        let rows = self.inner.fetch_bond_series(ticker).await?;
        if !rows.is_empty() {
            self.cache.set_json(&key, &rows).await;
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cache::{ManualClock, MemoryStore};
    use crate::error::AnalyzerError;
    use crate::models::DataPoint;
    use chrono::{NaiveDate, TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingSource {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl DataSource for CountingSource {
        fn name(&self) -> &str {
            "counting"
        }

        async fn fetch_data(&self, ticker: &str) -> Result<Vec<PricePoint>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if ticker == "NONE" {
                return Err(AnalyzerError::NoHistory(ticker.to_string()));
            }
            Ok(vec![DataPoint::new(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(), 10.0)])
        }
    }

    #[tokio::test]
    async fn test_second_fetch_is_served_from_cache_until_expiry() {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 3, 0, 0, 0).unwrap()));
        let cache = TtlCache::new(Arc::new(MemoryStore::new()), clock.clone(), Duration::from_secs(600));
        let inner = Arc::new(CountingSource { calls: AtomicUsize::new(0) });
        let cached = CachedSource::new(inner.clone(), cache);

        assert_eq!(cached.fetch_data("ggal").await.unwrap().len(), 1);
        assert_eq!(cached.fetch_data("GGAL").await.unwrap().len(), 1);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);

        clock.advance(Duration::from_secs(601));
        cached.fetch_data("GGAL").await.unwrap();
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_errors_are_not_cached() {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 3, 0, 0, 0).unwrap()));
        let cache = TtlCache::new(Arc::new(MemoryStore::new()), clock, Duration::from_secs(600));
        let inner = Arc::new(CountingSource { calls: AtomicUsize::new(0) });
        let cached = CachedSource::new(inner.clone(), cache);

        assert!(cached.fetch_data("NONE").await.is_err());
        assert!(cached.fetch_data("NONE").await.is_err());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }
}
