use thiserror::Error;

/// Failures surfaced by the fetch layer and the calculation layer.
///
/// Data-quality problems are not errors: they travel as a `QualityLevel` on the report.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalyzerError {
    #[error("CPI series unavailable: {0}")]
    CpiUnavailable(String),

    #[error("rate limited by {source_name}")]
    RateLimited { source_name: String },

    #[error("no price history for {0}")]
    NoHistory(String),

    #[error("network failure: {0}")]
    NetworkFailure(String),

    #[error("insufficient coverage for {basket}: {usable} usable constituents, {required} required")]
    InsufficientCoverage {
        basket: String,
        usable: usize,
        required: usize,
    },

    #[error("no real yield available for {0}")]
    NoYieldAvailable(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, AnalyzerError>;

impl AnalyzerError {
    /// Transient failures that may succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AnalyzerError::RateLimited { .. } | AnalyzerError::NetworkFailure(_))
    }

    /// Message for the presentation layer: "retry later" vs "no data exists".
    pub fn user_message(&self) -> String {
        match self {
            AnalyzerError::RateLimited { .. } | AnalyzerError::NetworkFailure(_) => {
                format!("Temporary problem, retry later ({self}).")
            }
            AnalyzerError::CpiUnavailable(_) => {
                "Could not load the official CPI series; real returns cannot be computed right now. Retry later.".to_string()
            }
            AnalyzerError::NoHistory(ticker) => format!("No price history exists for {ticker}."),
            AnalyzerError::InsufficientCoverage { .. } | AnalyzerError::NoYieldAvailable(_) => {
                format!("Not enough data exists: {self}.")
            }
            AnalyzerError::InvalidInput(msg) => format!("Invalid request: {msg}."),
        }
    }
}
