//! Statistical algorithms for analysing equity curves and trade datasets.
//!
//! eg/ [`metric::sharpe::SharpeRatio`], [`metric::drawdown::DrawdownGenerator`],
//! [`metric::profit_factor::ProfitFactor`], etc.

/// Financial metrics computed from returns, trades and equity curves.
pub mod metric;

/// Streaming dispersion statistics (mean, variance).
pub mod dispersion;
