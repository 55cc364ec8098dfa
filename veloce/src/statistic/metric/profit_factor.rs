use serde::{Deserialize, Serialize};

/// Profit Factor: gross profit over gross loss across closed trades.
///
/// A series with no gross loss reports `+inf`.
#[derive(Debug, Copy, Clone, PartialEq, PartialOrd, Default, Deserialize, Serialize)]
pub struct ProfitFactor {
    pub value: f64,
}

impl ProfitFactor {
    /// Calculate the [`ProfitFactor`] from absolute gross profit and gross
    /// loss (both non-negative).
    pub fn calculate(gross_profit: f64, gross_loss: f64) -> Self {
        if gross_loss == 0.0 {
            return Self {
                value: f64::INFINITY,
            };
        }
        Self {
            value: gross_profit / gross_loss,
        }
    }
}
