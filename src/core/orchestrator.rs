use crate::analysis::comparison::{align_and_normalize_annual, AnnualComparisonRow};
use crate::analysis::deflator::{clip_to_cpi_range, deflate};
use crate::analysis::quality::{QualityMetrics, QualityVerdict};
use crate::analysis::risk_free::resolve_real_yield;
use crate::analysis::statistics::{
    annualized_real_return, capm_alpha, capm_expected_return, compute_log_returns, estimate_beta, ReturnSample,
};
use crate::analysis::synthetic::{build_equal_weight_index, BasketSpec};
use crate::config::Settings;
use crate::core::cache::{SqliteStore, SystemClock, TtlCache};
use crate::core::rate_limiter::RateLimiter;
use crate::core::timeseries::{align_by_date, resample, resample_monthly, window_filter, Resampled};
use crate::cpi::CpiProvider;
use crate::error::{AnalyzerError, Result};
use crate::fetcher::cached::CachedSource;
use crate::fetcher::data912::Data912Fetcher;
use crate::fetcher::series_api::SeriesApiFetcher;
use crate::fetcher::yahoo::YahooFetcher;
use crate::fetcher::{BondSource, DataSource};
use crate::models::{
    AlignedPair, CpiIndexMap, DataPoint, Frequency, MonthKey, Period, PricePair, PricePoint, RiskFreeEstimate,
    RiskFreeSource, SyntheticIndex,
};
use crate::registry::{self, BasketDefinition};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Correlations below this (in absolute value) are flagged on the report.
pub const LOW_CORRELATION: f64 = 0.2;

#[derive(Debug, Clone, PartialEq)]
pub enum BenchmarkSpec {
    Ticker(String),
    /// Name of a registered basket (see `registry::get_basket`).
    Basket(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum RiskFreeInput {
    /// Real annual rate as a decimal (0.02 = 2%).
    Fixed(f64),
    /// Inflation-linked bond ticker.
    Bond(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BetaCapmRequest {
    pub asset: String,
    pub benchmark: BenchmarkSpec,
    pub risk_free: RiskFreeInput,
    pub frequency: Frequency,
    pub lookback_months: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyntheticSummary {
    pub basket: String,
    pub usable_constituents: usize,
    pub average_components_per_period: f64,
    pub periods: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BetaCapmReport {
    pub asset: String,
    pub benchmark: String,
    /// Ticker actually used when the requested benchmark could not be loaded.
    pub fallback_used: Option<String>,
    pub frequency: Frequency,

    pub beta: f64,
    pub correlation: f64,
    pub benchmark_variance: f64,
    pub low_correlation: bool,
    pub real_asset_annual_return: Option<f64>,
    pub real_benchmark_annual_return: Option<f64>,
    pub risk_free_rate: f64,
    pub risk_free_source: RiskFreeSource,
    pub risk_free_periodic: f64,
    pub expected_return: Option<f64>,
    pub alpha: Option<f64>,

    pub sample_size: usize,
    pub anti_split_events: u32,
    pub anti_split_triggered: bool,
    pub cpi_series_id: String,
    pub cpi_clipped: bool,
    pub cpi_interpolated: bool,
    pub first_period: Option<String>,
    pub last_period: Option<String>,
    pub synthetic: Option<SyntheticSummary>,
    pub quality: QualityVerdict,
}

/// Real returns of an aligned pair plus the CPI diagnostics that produced them.
struct PairedReturns {
    sample: ReturnSample,
    clipped: bool,
    clipped_fraction: f64,
    interpolated: bool,
    cpi_resolved: bool,
    first_period: Option<String>,
    last_period: Option<String>,
}

fn paired_real_returns<P: Period>(
    series: &[AlignedPair<P>],
    cpi: &CpiIndexMap,
    lookback_months: Option<u32>,
) -> PairedReturns {
    let windowed = window_filter(series, lookback_months);
    let clip = clip_to_cpi_range(&windowed, cpi);
    let real = deflate(&clip.series, cpi);
    PairedReturns {
        sample: compute_log_returns(&real),
        clipped: clip.clipped,
        clipped_fraction: clip.clipped_fraction(),
        interpolated: clip.interpolated,
        cpi_resolved: !real.is_empty(),
        first_period: clip.first_period.map(|p| p.to_string()),
        last_period: clip.last_period.map(|p| p.to_string()),
    }
}

enum ResolvedBenchmark {
    Prices { label: String, series: Vec<PricePoint>, fallback: Option<String> },
    Synthetic { label: String, index: SyntheticIndex },
}

/// Composes CPI, fetchers and the calculation pipeline into one report per request.
pub struct Analyzer {
    cpi: Arc<CpiProvider>,
    prices: Arc<dyn DataSource>,
    bonds: Arc<dyn BondSource>,
    /// Secondary source for benchmark fallbacks (index tickers the primary does not carry).
    fallback: Option<Arc<dyn DataSource>>,
    settings: Settings,
}

impl Analyzer {
    pub fn new(cpi: Arc<CpiProvider>, prices: Arc<dyn DataSource>, bonds: Arc<dyn BondSource>, settings: Settings) -> Self {
        Self { cpi, prices, bonds, fallback: None, settings }
    }

    pub fn with_fallback_source(mut self, source: Arc<dyn DataSource>) -> Self {
        self.fallback = Some(source);
        self
    }

    /// Wires the HTTP adapters and the SQLite cache from `settings`.
    pub async fn connect(settings: Settings) -> anyhow::Result<Self> {
        let pool = crate::db::init(&settings.data_dir).await?;
        let cache = TtlCache::new(Arc::new(SqliteStore::new(pool)), Arc::new(SystemClock), settings.cpi_cache_ttl);
        let ticker_cache = cache.with_ttl(settings.ticker_cache_ttl);

        let series_api = Arc::new(SeriesApiFetcher::new(&settings.series_api_base, settings.http_timeout));
        let data912 = Arc::new(Data912Fetcher::new(&settings.data912_base, settings.http_timeout));
        let cached = Arc::new(CachedSource::new(data912, ticker_cache.clone()));
        let yahoo = Arc::new(CachedSource::new(Arc::new(YahooFetcher::new()), ticker_cache));

        let cpi = Arc::new(CpiProvider::new(series_api, cache, settings.default_cpi_series_id.clone()));
        Ok(Analyzer::new(cpi, cached.clone(), cached, settings).with_fallback_source(yahoo))
    }

    pub fn cpi_provider(&self) -> &CpiProvider {
        &self.cpi
    }

    async fn fetch_prices(&self, source: &dyn DataSource, ticker: &str) -> Result<Vec<PricePoint>> {
        RateLimiter::with_backoff(ticker, self.settings.retry_attempts, || source.fetch_data(ticker)).await
    }

    /// Benchmark ticker from the primary source; on a network failure, the same
    /// ticker from the fallback source.
    async fn fetch_benchmark_ticker(&self, ticker: &str) -> Result<(Vec<PricePoint>, Option<String>)> {
        match self.fetch_prices(self.prices.as_ref(), ticker).await {
            Ok(series) => Ok((series, None)),
            Err(AnalyzerError::NetworkFailure(msg)) => match &self.fallback {
                Some(fallback) => {
                    tracing::warn!("Benchmark {} unavailable ({}), trying {}", ticker, msg, fallback.name());
                    let series = self.fetch_prices(fallback.as_ref(), ticker).await?;
                    Ok((series, Some(format!("{} via {}", ticker, fallback.name()))))
                }
                None => Err(AnalyzerError::NetworkFailure(msg)),
            },
            Err(e) => Err(e),
        }
    }

    /// Builds a registered basket's synthetic real index.
    pub async fn build_basket(&self, basket: &BasketDefinition, lookback_months: Option<u32>) -> Result<SyntheticIndex> {
        let cpi = self.cpi.fetch_cpi_index(false).await?;
        build_equal_weight_index(
            &BasketSpec::from(basket),
            lookback_months,
            &cpi,
            self.prices.as_ref(),
            self.settings.fetch_concurrency,
        )
        .await
    }

    /// Ticker from the primary source, or from the fallback source when the
    /// primary has no history for it or cannot be reached.
    async fn fetch_from_any_source(&self, ticker: &str) -> Result<Vec<PricePoint>> {
        let err = match self.fetch_prices(self.prices.as_ref(), ticker).await {
            Ok(series) => return Ok(series),
            Err(e @ (AnalyzerError::NoHistory(_) | AnalyzerError::NetworkFailure(_))) => e,
            Err(e) => return Err(e),
        };
        match &self.fallback {
            Some(fallback) => {
                tracing::info!("{} not on {} ({}), trying {}", ticker, self.prices.name(), err, fallback.name());
                self.fetch_prices(fallback.as_ref(), ticker).await
            }
            None => Err(err),
        }
    }

    /// Year-end levels of a ticker against a ticker or basket, both rebased to 100
    /// at their first common year. A basket leg is its synthetic real index, or
    /// the basket's fallback ticker when the index cannot be built.
    pub async fn annual_comparison(&self, first: &str, second: &BenchmarkSpec) -> Result<Vec<AnnualComparisonRow>> {
        let a = self.fetch_from_any_source(first).await?;
        let (label, b) = match second {
            BenchmarkSpec::Ticker(ticker) => (ticker.clone(), self.fetch_from_any_source(ticker).await?),
            BenchmarkSpec::Basket(name) => {
                let cpi = self.cpi.fetch_cpi_index(false).await?;
                match self.resolve_benchmark(second, &cpi, None).await? {
                    ResolvedBenchmark::Prices { series, fallback, .. } => {
                        (fallback.unwrap_or_else(|| name.clone()), series)
                    }
                    ResolvedBenchmark::Synthetic { index, .. } => (name.clone(), index_as_dated(&index)),
                }
            }
        };

        let rows = align_and_normalize_annual(&a, &b);
        if rows.is_empty() {
            return Err(AnalyzerError::NoHistory(format!("{first} and {label} share no calendar year")));
        }
        tracing::info!("Annual comparison {} vs {}: {} years", first, label, rows.len());
        Ok(rows)
    }

    async fn resolve_benchmark(&self, spec: &BenchmarkSpec, cpi: &CpiIndexMap, lookback: Option<u32>) -> Result<ResolvedBenchmark> {
        let name = match spec {
            BenchmarkSpec::Ticker(ticker) => {
                let (series, fallback) = self.fetch_benchmark_ticker(ticker).await?;
                return Ok(ResolvedBenchmark::Prices { label: ticker.clone(), series, fallback });
            }
            BenchmarkSpec::Basket(name) => name,
        };

        let basket = registry::get_basket(name)
            .ok_or_else(|| AnalyzerError::InvalidInput(format!("unknown basket '{name}'")))?;

        let built = build_equal_weight_index(
            &BasketSpec::from(basket),
            lookback,
            cpi,
            self.prices.as_ref(),
            self.settings.fetch_concurrency,
        )
        .await;

        let err = match built {
            Ok(index) => return Ok(ResolvedBenchmark::Synthetic { label: basket.label.to_string(), index }),
            Err(e) => e,
        };

        if basket.fallback_tickers.is_empty() {
            return Err(err);
        }
        tracing::warn!("Synthetic {} failed ({}), trying fallback tickers", basket.id, err);

        let source = self.fallback.as_ref().unwrap_or(&self.prices);
        for ticker in basket.fallback_tickers {
            match self.fetch_prices(source.as_ref(), ticker).await {
                Ok(series) if series.len() >= 2 => {
                    return Ok(ResolvedBenchmark::Prices {
                        label: basket.label.to_string(),
                        series,
                        fallback: Some(ticker.to_string()),
                    });
                }
                Ok(_) => tracing::warn!("Fallback {} returned too little history", ticker),
                Err(e) => tracing::warn!("Fallback {} failed: {}", ticker, e),
            }
        }
        Err(err)
    }

    async fn resolve_risk_free(&self, input: &RiskFreeInput, cpi: &CpiIndexMap, lookback: Option<u32>) -> Result<RiskFreeEstimate> {
        match input {
            RiskFreeInput::Fixed(rate) => {
                if !rate.is_finite() {
                    return Err(AnalyzerError::InvalidInput("risk-free rate must be a number".to_string()));
                }
                Ok(RiskFreeEstimate { annual_real_rate: *rate, source: RiskFreeSource::Fixed })
            }
            RiskFreeInput::Bond(ticker) => {
                if !registry::is_cer_ticker(ticker) {
                    tracing::info!("{} is not in the CER list, resolving anyway", ticker);
                }
                RateLimiter::with_backoff(ticker, self.settings.retry_attempts, || {
                    resolve_real_yield(ticker, cpi, lookback, self.bonds.as_ref())
                })
                .await
            }
        }
    }

    pub async fn compute(&self, request: &BetaCapmRequest) -> Result<BetaCapmReport> {
        let asset = request.asset.trim().to_uppercase();
        if asset.is_empty() {
            return Err(AnalyzerError::InvalidInput("asset ticker is required".to_string()));
        }
        tracing::info!("Beta/CAPM for {} vs {:?} ({:?}, {:?} months)", asset, request.benchmark, request.frequency, request.lookback_months);

        // 1. CPI
        let cpi = self.cpi.fetch_cpi_index(false).await?;

        // 2. Asset history
        let asset_series = self.fetch_prices(self.prices.as_ref(), &asset).await?;

        // 3. Benchmark
        let benchmark = self.resolve_benchmark(&request.benchmark, &cpi, request.lookback_months).await?;

        // 4. Real returns
        let (paired, frequency, benchmark_label, fallback_used, synthetic) = match benchmark {
            ResolvedBenchmark::Prices { label, series, fallback } => {
                let aligned = align_by_date(&asset_series, &series);
                let paired = match resample(&aligned, request.frequency) {
                    Resampled::Dated(rows) => paired_real_returns(&rows, &cpi, request.lookback_months),
                    Resampled::Monthly(rows) => paired_real_returns(&rows, &cpi, request.lookback_months),
                };
                (paired, request.frequency, label, fallback, None)
            }
            ResolvedBenchmark::Synthetic { label, index } => {
                let paired = asset_against_index(&asset_series, &index, &cpi, request.lookback_months);
                let summary = SyntheticSummary {
                    basket: label.clone(),
                    usable_constituents: index.usable_constituents,
                    average_components_per_period: index.average_components_per_period,
                    periods: index.series.len(),
                };
                if request.frequency != Frequency::Monthly {
                    tracing::info!("Synthetic benchmark is monthly, ignoring {:?}", request.frequency);
                }
                (paired, Frequency::Monthly, label, None, Some(summary))
            }
        };

        // 5. Risk-free, beta, CAPM
        let rf = self.resolve_risk_free(&request.risk_free, &cpi, request.lookback_months).await?;
        let sample = &paired.sample;
        let estimate = estimate_beta(&sample.asset, &sample.benchmark);
        let periods = frequency.periods_per_year();
        let asset_return = annualized_real_return(&sample.asset, periods);
        let benchmark_return = annualized_real_return(&sample.benchmark, periods);

        let (expected_return, alpha) = match (asset_return, benchmark_return) {
            (Some(ri), Some(rm)) => (
                Some(capm_expected_return(rm, rf.annual_real_rate, estimate.beta)),
                Some(capm_alpha(ri, rm, rf.annual_real_rate, estimate.beta)),
            ),
            _ => (None, None),
        };

        let quality = QualityVerdict::evaluate(
            QualityMetrics {
                sample_size: sample.sample_size,
                clipped_fraction: paired.clipped_fraction,
                benchmark_variance: estimate.benchmark_variance,
                cpi_resolved: paired.cpi_resolved,
            },
            frequency,
        );

        Ok(BetaCapmReport {
            asset,
            benchmark: benchmark_label,
            fallback_used,
            frequency,
            beta: estimate.beta,
            correlation: estimate.correlation,
            benchmark_variance: estimate.benchmark_variance,
            low_correlation: estimate.correlation.abs() < LOW_CORRELATION,
            real_asset_annual_return: asset_return,
            real_benchmark_annual_return: benchmark_return,
            risk_free_rate: rf.annual_real_rate,
            risk_free_source: rf.source,
            risk_free_periodic: frequency.periodic_rate(rf.annual_real_rate),
            expected_return,
            alpha,
            sample_size: sample.sample_size,
            anti_split_events: sample.anti_split_events,
            anti_split_triggered: sample.anti_split_triggered,
            cpi_series_id: cpi.series_id.clone(),
            cpi_clipped: paired.clipped,
            cpi_interpolated: paired.interpolated,
            first_period: paired.first_period,
            last_period: paired.last_period,
            synthetic,
            quality,
        })
    }
}

/// Synthetic index levels placed on the first day of their month.
fn index_as_dated(index: &SyntheticIndex) -> Vec<PricePoint> {
    index
        .series
        .iter()
        .filter_map(|p| {
            NaiveDate::from_ymd_opt(p.period.year(), p.period.month(), 1).map(|date| DataPoint::new(date, p.value))
        })
        .collect()
}

/// Asset: monthly resample, window, clip, deflate. Then an inner join by month with
/// the synthetic index, which is already in real terms.
fn asset_against_index(
    asset: &[PricePoint],
    index: &SyntheticIndex,
    cpi: &CpiIndexMap,
    lookback_months: Option<u32>,
) -> PairedReturns {
    let monthly = resample_monthly(asset);
    let windowed = window_filter(&monthly, lookback_months);
    let clip = clip_to_cpi_range(&windowed, cpi);
    let real = deflate(&clip.series, cpi);

    let index_by_month: BTreeMap<MonthKey, f64> = index.series.iter().map(|p| (p.period, p.value)).collect();
    let joined: Vec<DataPoint<MonthKey, PricePair>> = real
        .iter()
        .filter_map(|dp| {
            index_by_month
                .get(&dp.period)
                .map(|&bench| DataPoint::new(dp.period, PricePair { asset: dp.value, benchmark: bench }))
        })
        .collect();

    PairedReturns {
        sample: compute_log_returns(&joined),
        clipped: clip.clipped,
        clipped_fraction: clip.clipped_fraction(),
        interpolated: clip.interpolated,
        cpi_resolved: !real.is_empty(),
        first_period: joined.first().map(|p| p.period.to_string()),
        last_period: joined.last().map(|p| p.period.to_string()),
    }
}
