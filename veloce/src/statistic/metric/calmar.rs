use serde::{Deserialize, Serialize};

/// Calmar Ratio: annualised return over maximum drawdown.
///
/// See docs: <https://www.investopedia.com/terms/c/calmarratio.asp>
#[derive(Debug, Copy, Clone, PartialEq, PartialOrd, Default, Deserialize, Serialize)]
pub struct CalmarRatio {
    pub value: f64,
}

impl CalmarRatio {
    /// Calculate the [`CalmarRatio`] from a total return and the maximum
    /// drawdown fraction over the same window.
    ///
    /// With no drawdown the ratio is reported as zero rather than infinite.
    pub fn calculate(total_return: f64, max_drawdown: f64) -> Self {
        if max_drawdown == 0.0 {
            return Self { value: 0.0 };
        }
        Self {
            value: total_return / max_drawdown,
        }
    }
}
