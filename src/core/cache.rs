use async_trait::async_trait;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::db;

/// Source of "now". Injected so TTL expiry can be tested deterministically.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(start) }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += chrono::Duration::from_std(by).unwrap_or(chrono::Duration::zero());
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Key-value backing for the TTL cache. Backings are interchangeable.
#[async_trait]
pub trait CacheStore: Send + Sync {
    fn name(&self) -> &str;
    async fn load(&self, key: &str) -> Result<Option<(String, DateTime<Utc>)>>;
    async fn save(&self, key: &str, payload: &str, stored_at: DateTime<Utc>) -> Result<()>;
}

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CacheStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn load(&self, key: &str) -> Result<Option<(String, DateTime<Utc>)>> {
        let row = db::get_cache_entry(&self.pool, key).await?;
        Ok(row.map(|r| (r.payload, r.stored_at)))
    }

    async fn save(&self, key: &str, payload: &str, stored_at: DateTime<Utc>) -> Result<()> {
        db::put_cache_entry(&self.pool, key, payload, stored_at).await
    }
}

#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, (String, DateTime<Utc>)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn load(&self, key: &str) -> Result<Option<(String, DateTime<Utc>)>> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(key).cloned())
    }

    async fn save(&self, key: &str, payload: &str, stored_at: DateTime<Utc>) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), (payload.to_string(), stored_at));
        Ok(())
    }
}

/// JSON values with a time-to-live on top of a `CacheStore`.
///
/// The cache is advisory: store and decode failures are logged and read as misses.
#[derive(Clone)]
pub struct TtlCache {
    store: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl TtlCache {
    pub fn new(store: Arc<dyn CacheStore>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self { store, clock, ttl }
    }

    /// Same backing and clock, different TTL.
    pub fn with_ttl(&self, ttl: Duration) -> Self {
        Self { store: self.store.clone(), clock: self.clock.clone(), ttl }
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// True while an entry written at `stored_at` is still fresh.
    pub fn is_fresh(&self, stored_at: DateTime<Utc>) -> bool {
        let age = self.clock.now().signed_duration_since(stored_at);
        match chrono::Duration::from_std(self.ttl) {
            Ok(ttl) => age >= chrono::Duration::zero() && age < ttl,
            Err(_) => true,
        }
    }

    /// Fresh value and the time it was stored.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<(T, DateTime<Utc>)> {
        let (payload, stored_at) = match self.store.load(key).await {
            Ok(Some(entry)) => entry,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!("Cache read failed for '{}' ({}): {}", key, self.store.name(), e);
                return None;
            }
        };

        if !self.is_fresh(stored_at) {
            tracing::debug!("Cache entry '{}' expired (stored {})", key, stored_at);
            return None;
        }

        match serde_json::from_str(&payload) {
            Ok(value) => Some((value, stored_at)),
            Err(e) => {
                tracing::warn!("Cache entry '{}' could not be decoded: {}", key, e);
                None
            }
        }
    }

    pub async fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        let payload = match serde_json::to_string(value) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!("Cache entry '{}' could not be encoded: {}", key, e);
                return;
            }
        };
        if let Err(e) = self.store.save(key, &payload, self.clock.now()).await {
            tracing::warn!("Cache write failed for '{}' ({}): {}", key, self.store.name(), e);
        }
    }
}
