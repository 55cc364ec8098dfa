use serde::{Deserialize, Serialize};

/// Annualised Sortino Ratio.
///
/// Like Sharpe, but penalises only downside volatility: the deviation of
/// returns below the target (risk-free) rate.
///
/// See docs: <https://www.investopedia.com/terms/s/sortinoratio.asp>
#[derive(Debug, Copy, Clone, PartialEq, PartialOrd, Default, Deserialize, Serialize)]
pub struct SortinoRatio {
    pub value: f64,
}

impl SortinoRatio {
    /// Calculate the annualised [`SortinoRatio`] from a per-period return
    /// series.
    ///
    /// Zero downside deviation yields a ratio of zero, mirroring the Sharpe
    /// convention for degenerate series.
    pub fn calculate(risk_free_return: f64, returns: &[f64], periods_per_year: f64) -> Self {
        if returns.is_empty() {
            return Self { value: 0.0 };
        }

        let mean_return = returns.iter().sum::<f64>() / returns.len() as f64;
        let downside_sq_sum: f64 = returns
            .iter()
            .map(|ret| (ret - risk_free_return).min(0.0).powi(2))
            .sum();
        let downside_dev = (downside_sq_sum / returns.len() as f64).sqrt();

        if downside_dev == 0.0 {
            return Self { value: 0.0 };
        }
        Self {
            value: (mean_return - risk_free_return) / downside_dev * periods_per_year.sqrt(),
        }
    }
}
