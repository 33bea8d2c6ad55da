pub mod analysis;
pub mod config;
pub mod core;
pub mod cpi;
pub mod db;
pub mod error;
pub mod fetcher;
pub mod models;
pub mod registry;

pub use crate::config::Settings;
pub use crate::core::orchestrator::{Analyzer, BenchmarkSpec, BetaCapmReport, BetaCapmRequest, RiskFreeInput};
pub use crate::error::{AnalyzerError, Result};

use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Installs the global `tracing` subscriber, filtered by `RUST_LOG` (default `info`).
pub fn init_tracing() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
