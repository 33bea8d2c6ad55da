use crate::core::cache::TtlCache;
use crate::error::{AnalyzerError, Result};
use crate::fetcher::CpiSource;
use crate::models::{CpiIndexMap, CpiLookup, MonthKey};
use chrono::{DateTime, Utc};
use std::sync::{Arc, RwLock};

pub mod scoring;

/// Catalog query for the general-level CPI.
pub const SEARCH_QUERY: &str = "ipc nivel general";
/// Fewer valid monthly points than this is treated as an unusable series.
pub const MIN_CPI_POINTS: usize = 12;

const CACHE_KEY: &str = "cpi:index_map";

/// Owns the CPI map: search, fetch, validation and both cache layers.
pub struct CpiProvider {
    source: Arc<dyn CpiSource>,
    cache: TtlCache,
    default_series_id: String,
    snapshot: RwLock<Option<(Arc<CpiIndexMap>, DateTime<Utc>)>>,
}

impl CpiProvider {
    pub fn new(source: Arc<dyn CpiSource>, cache: TtlCache, default_series_id: impl Into<String>) -> Self {
        Self {
            source,
            cache,
            default_series_id: default_series_id.into(),
            snapshot: RwLock::new(None),
        }
    }

    fn fresh_snapshot(&self) -> Option<Arc<CpiIndexMap>> {
        let guard = self.snapshot.read().unwrap_or_else(|e| e.into_inner());
        match guard.as_ref() {
            Some((map, stored_at)) if self.cache.is_fresh(*stored_at) => Some(map.clone()),
            _ => None,
        }
    }

    fn publish(&self, map: Arc<CpiIndexMap>, stored_at: DateTime<Utc>) {
        let mut guard = self.snapshot.write().unwrap_or_else(|e| e.into_inner());
        *guard = Some((map, stored_at));
    }

    /// Current CPI map. A fresh cached copy short-circuits the network;
    /// `force_refresh` skips both cache layers.
    pub async fn fetch_cpi_index(&self, force_refresh: bool) -> Result<Arc<CpiIndexMap>> {
        if !force_refresh {
            if let Some(map) = self.fresh_snapshot() {
                return Ok(map);
            }
            if let Some((map, stored_at)) = self.cache.get_json::<CpiIndexMap>(CACHE_KEY).await {
                if map.len() >= MIN_CPI_POINTS {
                    tracing::debug!("CPI loaded from durable cache (stored {})", stored_at);
                    let map = Arc::new(map);
                    self.publish(map.clone(), stored_at);
                    return Ok(map);
                }
            }
        }

        let map = Arc::new(self.download().await?);
        self.cache.set_json(CACHE_KEY, map.as_ref()).await;
        self.publish(map.clone(), self.cache.clock().now());
        Ok(map)
    }

    async fn download(&self) -> Result<CpiIndexMap> {
        let series_id = match self.source.search_series(SEARCH_QUERY).await {
            Ok(candidates) => scoring::select_series_id(&candidates, &self.default_series_id),
            Err(e) => {
                tracing::warn!("CPI catalog search failed ({}), using default series", e);
                self.default_series_id.clone()
            }
        };

        let points = self
            .source
            .fetch_monthly(&series_id)
            .await
            .map_err(|e| AnalyzerError::CpiUnavailable(format!("{series_id}: {e}")))?;

        let map = CpiIndexMap::new(series_id.clone(), points.into_iter().map(|dp| (dp.period, dp.value)));
        if map.len() < MIN_CPI_POINTS {
            return Err(AnalyzerError::CpiUnavailable(format!(
                "{series_id} has {} valid monthly points, {MIN_CPI_POINTS} required",
                map.len()
            )));
        }

        tracing::info!(
            "CPI series {} loaded: {} months ({:?}..{:?})",
            series_id,
            map.len(),
            map.first_month().map(|m| m.to_string()),
            map.last_month().map(|m| m.to_string())
        );
        Ok(map)
    }
}

/// Exact CPI for `month`, or the latest earlier value marked as interpolated.
pub fn resolve_index_for_month(map: &CpiIndexMap, month: MonthKey) -> Option<CpiLookup> {
    map.resolve(month)
}
