pub mod comparison;
pub mod deflator;
pub mod quality;
pub mod risk_free;
pub mod statistics;
pub mod synthetic;
