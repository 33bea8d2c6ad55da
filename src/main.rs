use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use real_return_analyzer_lib::models::{window_months, Frequency};
use real_return_analyzer_lib::registry;
use real_return_analyzer_lib::{Analyzer, BenchmarkSpec, BetaCapmRequest, RiskFreeInput, Settings};
use serde_json::json;

#[derive(Parser)]
#[command(name = "real-return-analyzer", version, about = "Inflation-adjusted beta, CAPM alpha and synthetic benchmarks")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Real beta and CAPM alpha of an asset against a benchmark.
    Beta(BetaArgs),
    /// Load (or refresh) the official CPI series and summarize it.
    Cpi {
        /// Skip both cache layers.
        #[arg(long)]
        refresh: bool,
    },
    /// List the registered baskets, or build one.
    Baskets {
        /// Basket to build (e.g. merval, nasdaq100).
        #[arg(long)]
        build: Option<String>,
        /// Window: 6M, 1Y, 3Y, 5Y, 10Y or MAX.
        #[arg(long, default_value = "MAX")]
        window: String,
    },
    /// Year-end comparison of a ticker against a ticker or basket, rebased to 100.
    Compare {
        /// Ticker (e.g. BTC-USD).
        first: String,
        /// Ticker or basket name.
        #[arg(default_value = "nasdaq100")]
        second: String,
    },
}

#[derive(Parser)]
struct BetaArgs {
    /// Asset ticker (e.g. GGAL).
    #[arg(long, short)]
    asset: String,
    /// Benchmark ticker or basket name (merval, nasdaq100).
    #[arg(long, short, default_value = "merval")]
    benchmark: String,
    /// Fixed real risk-free rate as a decimal (0.02 = 2%).
    #[arg(long, conflicts_with = "bond")]
    rf: Option<f64>,
    /// Inflation-linked bond used as real risk-free reference (e.g. TX26).
    #[arg(long)]
    bond: Option<String>,
    /// daily, weekly or monthly.
    #[arg(long, short, default_value = "monthly")]
    frequency: String,
    /// 6M, 1Y, 3Y, 5Y, 10Y or MAX.
    #[arg(long, short, default_value = "5Y")]
    window: String,
}

fn parse_window(raw: &str) -> Result<Option<u32>> {
    window_months(raw).map_err(anyhow::Error::msg)
}

fn benchmark_spec(raw: &str) -> BenchmarkSpec {
    match registry::get_basket(raw) {
        Some(basket) => BenchmarkSpec::Basket(basket.id.to_string()),
        None => BenchmarkSpec::Ticker(raw.trim().to_uppercase()),
    }
}

fn build_request(args: BetaArgs) -> Result<BetaCapmRequest> {
    let frequency: Frequency = args.frequency.parse().map_err(anyhow::Error::msg)?;
    let lookback_months = parse_window(&args.window)?;

    let benchmark = benchmark_spec(&args.benchmark);
    let risk_free = match (args.rf, args.bond) {
        (_, Some(bond)) => RiskFreeInput::Bond(bond.trim().to_uppercase()),
        (Some(rate), None) => RiskFreeInput::Fixed(rate),
        (None, None) => RiskFreeInput::Fixed(0.0),
    };

    Ok(BetaCapmRequest { asset: args.asset, benchmark, risk_free, frequency, lookback_months })
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    real_return_analyzer_lib::init_tracing()?;

    let cli = Cli::parse();
    let settings = Settings::from_env()?;

    // Listing needs no network or database.
    if let Commands::Baskets { build: None, .. } = &cli.command {
        let baskets: Vec<_> = registry::list_baskets()
            .into_iter()
            .map(|b| json!({ "id": b.id, "label": b.label, "size": b.size(), "min_coverage": b.min_coverage }))
            .collect();
        return print_json(&json!({ "baskets": baskets, "cer_bonds": registry::CER_TICKERS }));
    }

    let analyzer = Analyzer::connect(settings).await.context("Failed to initialize analyzer")?;

    let outcome = match cli.command {
        Commands::Beta(args) => {
            let request = build_request(args)?;
            analyzer.compute(&request).await.map(|report| print_json(&report))
        }
        Commands::Cpi { refresh } => analyzer.cpi_provider().fetch_cpi_index(refresh).await.map(|map| {
            let last = map.last_month();
            print_json(&json!({
                "series_id": map.series_id,
                "months": map.len(),
                "first_month": map.first_month().map(|m| m.to_string()),
                "last_month": last.map(|m| m.to_string()),
                "last_value": last.and_then(|m| map.get(m)),
            }))
        }),
        Commands::Baskets { build: Some(name), window } => {
            let basket = registry::get_basket(&name).with_context(|| format!("Unknown basket '{name}'"))?;
            let lookback = parse_window(&window)?;
            analyzer.build_basket(basket, lookback).await.map(|index| print_json(&index))
        }
        Commands::Baskets { build: None, .. } => Ok(Ok(())),
        Commands::Compare { first, second } => analyzer
            .annual_comparison(&first.trim().to_uppercase(), &benchmark_spec(&second))
            .await
            .map(|rows| print_json(&rows)),
    };

    match outcome {
        Ok(printed) => printed,
        Err(e) => {
            tracing::error!("{}", e);
            eprintln!("{}", e.user_message());
            std::process::exit(if e.is_retryable() { 75 } else { 1 });
        }
    }
}
