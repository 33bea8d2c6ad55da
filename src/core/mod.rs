pub mod cache;
pub mod orchestrator;
pub mod rate_limiter;
pub mod timeseries;
