use crate::error::{AnalyzerError, Result};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

pub struct RateLimiter;

impl RateLimiter {
    const BASE_MS: u64 = 500;
    const MAX_MS: u64 = 8_000;

    /// Jittered exponential delay for retry `attempt` (0-based).
    pub fn backoff(attempt: u32) -> Duration {
        let exp = Self::BASE_MS.saturating_mul(1u64 << attempt.min(16)).min(Self::MAX_MS);
        let jitter = {
            let mut rng = rand::thread_rng();
            rng.gen_range(0..=exp / 2)
        };
        Duration::from_millis(exp + jitter)
    }

    /// Runs `op` up to `attempts` times, retrying only on `RateLimited`.
    pub async fn with_backoff<T, F, Fut>(label: &str, attempts: u32, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = attempts.max(1);
        let mut attempt = 0;
        loop {
            match op().await {
                Err(AnalyzerError::RateLimited { source_name }) if attempt + 1 < attempts => {
                    let delay = Self::backoff(attempt);
                    tracing::warn!(
                        "{}: rate limited by {}, retry {}/{} in {:?}",
                        label,
                        source_name,
                        attempt + 1,
                        attempts - 1,
                        delay
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_backoff_grows_and_is_capped() {
        let first = RateLimiter::backoff(0);
        assert!(first >= Duration::from_millis(500) && first <= Duration::from_millis(750));
        let late = RateLimiter::backoff(20);
        assert!(late >= Duration::from_millis(8_000) && late <= Duration::from_millis(12_000));
    }

    #[tokio::test]
    async fn test_retries_only_rate_limits() {
        let calls = AtomicU32::new(0);
        let result: Result<u32> = RateLimiter::with_backoff("test", 3, || async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(AnalyzerError::RateLimited { source_name: "x".into() })
            } else {
                Ok(n)
            }
        })
        .await;
        assert_eq!(result, Ok(2));

        let calls = AtomicU32::new(0);
        let result: Result<u32> = RateLimiter::with_backoff("test", 3, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(AnalyzerError::NoHistory("x".into()))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = RateLimiter::with_backoff("test", 3, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(AnalyzerError::RateLimited { source_name: "x".into() })
        })
        .await;
        assert!(matches!(result, Err(AnalyzerError::RateLimited { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
