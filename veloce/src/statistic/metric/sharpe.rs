use serde::{Deserialize, Serialize};

/// Annualised Sharpe Ratio.
///
/// Sharpe Ratio measures the risk-adjusted return of an investment by
/// comparing its excess returns to their standard deviation.
///
/// See docs: <https://www.investopedia.com/articles/07/sharpe_ratio.asp>
#[derive(Debug, Copy, Clone, PartialEq, PartialOrd, Default, Deserialize, Serialize)]
pub struct SharpeRatio {
    pub value: f64,
}

impl SharpeRatio {
    /// Calculate the annualised [`SharpeRatio`] from per-period return
    /// statistics.
    ///
    /// Zero standard deviation yields a ratio of zero (a flat equity curve
    /// earns no risk-adjusted credit).
    pub fn calculate(
        risk_free_return: f64,
        mean_return: f64,
        std_dev_returns: f64,
        periods_per_year: f64,
    ) -> Self {
        if std_dev_returns == 0.0 {
            return Self { value: 0.0 };
        }
        Self {
            value: (mean_return - risk_free_return) / std_dev_returns * periods_per_year.sqrt(),
        }
    }
}
