/// Annualised risk-adjusted return over total volatility.
pub mod sharpe;

/// Annualised risk-adjusted return over downside volatility.
pub mod sortino;

/// Annualised return over maximum drawdown.
pub mod calmar;

/// Peak-to-trough equity declines.
pub mod drawdown;

/// Gross profit over gross loss.
pub mod profit_factor;

/// Fraction of closed round-trip trades that won.
pub mod win_rate;
