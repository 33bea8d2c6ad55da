use crate::analysis::deflator::{clip_to_cpi_range, deflate};
use crate::analysis::statistics::{annualized_real_return, single_log_returns};
use crate::core::timeseries::{resample_monthly, window_filter};
use crate::error::{AnalyzerError, Result};
use crate::fetcher::BondSource;
use crate::models::{BondObservation, CpiIndexMap, DataPoint, Frequency, RiskFreeEstimate, RiskFreeSource};

/// Real annual yield of an inflation-linked bond.
///
/// A quoted yield (percent) on any row wins. Otherwise the yield is estimated from
/// the deflated monthly closes, annualized at 12 periods per year.
pub fn estimate_real_yield(
    bond: &str,
    rows: &[BondObservation],
    cpi: &CpiIndexMap,
    lookback_months: Option<u32>,
) -> Result<RiskFreeEstimate> {
    if let Some(pct) = rows.iter().find_map(|r| r.yield_percent.filter(|y| y.is_finite())) {
        return Ok(RiskFreeEstimate {
            annual_real_rate: pct / 100.0,
            source: RiskFreeSource::DirectYield,
        });
    }

    let closes: Vec<DataPoint> = rows
        .iter()
        .filter_map(|r| r.close.filter(|c| c.is_finite() && *c > 0.0).map(|c| DataPoint::new(r.date, c)))
        .collect();

    let monthly = resample_monthly(&closes);
    let windowed = window_filter(&monthly, lookback_months);
    let clip = clip_to_cpi_range(&windowed, cpi);
    let real = deflate(&clip.series, cpi);
    if real.len() < 2 {
        return Err(AnalyzerError::NoYieldAvailable(format!(
            "{bond}: {} real monthly observations",
            real.len()
        )));
    }

    let returns = single_log_returns(&real);
    if returns.len() < 2 {
        return Err(AnalyzerError::NoYieldAvailable(format!(
            "{bond}: {} monthly real returns, 2 required",
            returns.len()
        )));
    }
    let annual = annualized_real_return(&returns, Frequency::Monthly.periods_per_year())
        .ok_or_else(|| AnalyzerError::NoYieldAvailable(format!("{bond}: no usable monthly returns")))?;

    tracing::debug!("{}: real yield {:.4} estimated from {} monthly returns", bond, annual, returns.len());
    Ok(RiskFreeEstimate {
        annual_real_rate: annual,
        source: RiskFreeSource::EstimatedFromPrices,
    })
}

/// Fetches the bond history and resolves its real yield.
pub async fn resolve_real_yield(
    bond: &str,
    cpi: &CpiIndexMap,
    lookback_months: Option<u32>,
    source: &dyn BondSource,
) -> Result<RiskFreeEstimate> {
    let rows = match source.fetch_bond_series(bond).await {
        Ok(rows) => rows,
        Err(AnalyzerError::NoHistory(_)) => {
            return Err(AnalyzerError::NoYieldAvailable(format!("{bond}: no history")));
        }
        Err(e) => return Err(e),
    };
    estimate_real_yield(bond, &rows, cpi, lookback_months)
}
