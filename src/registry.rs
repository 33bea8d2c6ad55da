use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::HashMap;

/// A named equal-weight basket and its coverage gates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BasketDefinition {
    pub id: &'static str,
    pub label: &'static str,
    pub tickers: &'static [&'static str],
    /// Fewer usable constituents than this fails the build.
    pub min_coverage: usize,
    /// Fewer usable constituents than this still builds, with a warning.
    pub warn_below: Option<usize>,
    /// Tickers tried, in order, when the basket cannot be built.
    pub fallback_tickers: &'static [&'static str],
}

impl BasketDefinition {
    pub fn size(&self) -> usize {
        self.tickers.len()
    }
}

pub const MERVAL_BASKET: &[&str] = &[
    "GGAL", "YPFD", "PAM", "TGSU2", "TXAR", "BYMA", "ALUA", "CEPU", "PAMP", "SUPV", "BMA", "CRES", "TECO2",
    "MIRG", "COME", "BIOX", "VIST",
];

pub const NASDAQ_100_BASKET: &[&str] = &[
    "NVDA", "AAPL", "MSFT", "AMZN", "GOOGL", "GOOG", "META", "AVGO", "TSLA", "WMT", "ASML", "MU", "COST", "AMD",
    "NFLX", "PLTR", "CSCO", "LRCX", "AMAT", "TMUS", "INTC", "LIN", "PEP", "TXN", "AMGN", "KLAC", "GILD", "ISRG",
    "ADI", "HON", "QCOM", "SHOP", "PDD", "ARM", "BKNG", "PANW", "APP", "VRTX", "CMCSA", "CEG", "SBUX", "ADBE",
    "INTU", "CRWD", "MELI", "WDC", "MAR", "STX", "ADP", "REGN", "MNST", "SNPS", "ORLY", "CTAS", "CDNS", "MDLZ",
    "CSX", "ABNB", "WBD", "AEP", "DASH", "MRVL", "PCAR", "ROST", "NXPI", "FTNT", "BKR", "MPWR", "FAST", "FER",
    "IDXX", "EA", "EXC", "FANG", "ADSK", "XEL", "CCEP", "ALNY", "DDOG", "MSTR", "MCHP", "ODFL", "KDP", "WDAY",
    "PYPL", "GEHC", "TRI", "CPRT", "TTWO", "AXON", "ROP", "PAYX", "INSM", "CTSH", "CHTR", "KHC", "ZS", "DXCM",
    "VRSK", "TEAM", "CSGP",
];

/// Inflation-linked (CER) bonds offered as real risk-free references.
pub const CER_TICKERS: &[&str] = &[
    "TZX26", "X31L6", "TZX06", "TX26", "X30N6", "TZXD6", "TZXM7", "TZXA7", "TZXY7", "TZX27", "TZXD7", "TZX28",
    "TX28", "TX31", "DICP", "PARP",
];

pub static BASKETS: Lazy<HashMap<&'static str, BasketDefinition>> = Lazy::new(|| {
    let mut m = HashMap::new();

    m.insert(
        "merval",
        BasketDefinition {
            id: "merval",
            label: "MERVAL (synthetic, equal-weight)",
            tickers: MERVAL_BASKET,
            min_coverage: 8,
            warn_below: None,
            fallback_tickers: &[],
        },
    );

    m.insert(
        "nasdaq100",
        BasketDefinition {
            id: "nasdaq100",
            label: "Nasdaq-100 (synthetic, equal-weight)",
            tickers: NASDAQ_100_BASKET,
            min_coverage: 1,
            warn_below: Some(60),
            fallback_tickers: &["^IXIC", "QQQ"],
        },
    );

    m
});

/// Case-insensitive lookup. "NDX" and "nasdaq-100" resolve to the Nasdaq basket.
pub fn get_basket(name: &str) -> Option<&'static BasketDefinition> {
    let key = name.trim().to_lowercase().replace(['-', '_', ' '], "");
    let key = match key.as_str() {
        "ndx" | "nasdaq" => "nasdaq100".to_string(),
        _ => key,
    };
    BASKETS.get(key.as_str())
}

/// All baskets, sorted by id.
pub fn list_baskets() -> Vec<&'static BasketDefinition> {
    let mut all: Vec<_> = BASKETS.values().collect();
    all.sort_by_key(|b| b.id);
    all
}

pub fn is_cer_ticker(ticker: &str) -> bool {
    let t = ticker.trim().to_uppercase();
    CER_TICKERS.contains(&t.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basket_sizes_and_gates() {
        let merval = get_basket("MERVAL").unwrap();
        assert_eq!(merval.size(), 17);
        assert_eq!(merval.min_coverage, 8);

        let ndx = get_basket("Nasdaq-100").unwrap();
        assert_eq!(ndx.size(), 101);
        assert_eq!(ndx.min_coverage, 1);
        assert_eq!(ndx.warn_below, Some(60));
        assert_eq!(ndx.fallback_tickers, &["^IXIC", "QQQ"]);
        assert_eq!(get_basket("ndx").unwrap().id, "nasdaq100");
        assert!(get_basket("ibex").is_none());
    }

    #[test]
    fn test_cer_universe() {
        assert_eq!(CER_TICKERS.len(), 16);
        assert!(is_cer_ticker("tx26"));
        assert!(!is_cer_ticker("GGAL"));
    }

    #[test]
    fn test_list_is_sorted() {
        let ids: Vec<_> = list_baskets().iter().map(|b| b.id).collect();
        assert_eq!(ids, vec!["merval", "nasdaq100"]);
    }
}
