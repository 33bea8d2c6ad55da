use anyhow::{Context, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Official CPI (IPC-GBA Nivel General, base Dec-2016, monthly).
pub const DEFAULT_CPI_SERIES_ID: &str = "101.1_I2NG_2016_M_22";

/// Runtime configuration, read from the environment (and `.env` when present).
#[derive(Debug, Clone)]
pub struct Settings {
    pub series_api_base: String,
    pub data912_base: String,
    pub default_cpi_series_id: String,
    pub http_timeout: Duration,
    pub fetch_concurrency: usize,
    pub cpi_cache_ttl: Duration,
    pub ticker_cache_ttl: Duration,
    pub retry_attempts: u32,
    pub data_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            series_api_base: "https://apis.datos.gob.ar/series/api".to_string(),
            data912_base: "https://data912.com".to_string(),
            default_cpi_series_id: DEFAULT_CPI_SERIES_ID.to_string(),
            http_timeout: Duration::from_secs(15),
            fetch_concurrency: 8,
            cpi_cache_ttl: Duration::from_secs(24 * 60 * 60),
            ticker_cache_ttl: Duration::from_secs(6 * 60 * 60),
            retry_attempts: 3,
            data_dir: PathBuf::from("./data"),
        }
    }
}

impl Settings {
    /// Loads `.env` (if any) and overlays environment variables on the defaults.
    pub fn from_env() -> Result<Self> {
        if let Err(e) = dotenvy::dotenv() {
            tracing::debug!("No .env loaded: {}", e);
        }

        let defaults = Settings::default();
        Ok(Settings {
            series_api_base: env_string("RRA_SERIES_API_BASE").unwrap_or(defaults.series_api_base),
            data912_base: env_string("RRA_DATA912_BASE").unwrap_or(defaults.data912_base),
            default_cpi_series_id: env_string("RRA_CPI_SERIES_ID").unwrap_or(defaults.default_cpi_series_id),
            http_timeout: env_parse::<u64>("RRA_HTTP_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.http_timeout),
            fetch_concurrency: env_parse::<usize>("RRA_FETCH_CONCURRENCY")?
                .map(|n| n.max(1))
                .unwrap_or(defaults.fetch_concurrency),
            cpi_cache_ttl: env_parse::<u64>("RRA_CPI_CACHE_TTL_HOURS")?
                .map(|h| Duration::from_secs(h * 3600))
                .unwrap_or(defaults.cpi_cache_ttl),
            ticker_cache_ttl: env_parse::<u64>("RRA_TICKER_CACHE_TTL_HOURS")?
                .map(|h| Duration::from_secs(h * 3600))
                .unwrap_or(defaults.ticker_cache_ttl),
            retry_attempts: env_parse::<u32>("RRA_RETRY_ATTEMPTS")?
                .map(|n| n.max(1))
                .unwrap_or(defaults.retry_attempts),
            data_dir: env_string("RRA_DATA_DIR").map(PathBuf::from).unwrap_or(defaults.data_dir),
        })
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env_string(key) {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .with_context(|| format!("Invalid value for {key}: '{raw}'")),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let s = Settings::default();
        assert_eq!(s.fetch_concurrency, 8);
        assert_eq!(s.cpi_cache_ttl, Duration::from_secs(86_400));
        assert_eq!(s.http_timeout, Duration::from_secs(15));
        assert_eq!(s.default_cpi_series_id, DEFAULT_CPI_SERIES_ID);
    }

    #[test]
    fn test_env_parse_rejects_garbage() {
        std::env::set_var("RRA_TEST_PARSE_GARBAGE", "eight");
        let parsed = env_parse::<usize>("RRA_TEST_PARSE_GARBAGE");
        assert!(parsed.is_err());
        std::env::remove_var("RRA_TEST_PARSE_GARBAGE");
    }
}
