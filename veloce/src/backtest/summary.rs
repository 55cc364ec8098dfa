use crate::statistic::{
    dispersion::Dispersion,
    metric::{
        calmar::CalmarRatio, drawdown::DrawdownGenerator, profit_factor::ProfitFactor,
        sharpe::SharpeRatio, sortino::SortinoRatio, win_rate::WinRate,
    },
};
use prettytable::{row, Table};
use rust_decimal::{prelude::ToPrimitive, Decimal};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use veloce_data::time::TimestampNs;
use veloce_execution::Fill;
use veloce_instrument::{Side, Symbol};

/// One sampled point of the equity curve.
#[derive(Debug, Copy, Clone, PartialEq, Deserialize, Serialize)]
pub struct EquityPoint {
    pub ts: TimestampNs,
    pub equity: f64,
}

/// One sampled point of the drawdown curve.
#[derive(Debug, Copy, Clone, PartialEq, Deserialize, Serialize)]
pub struct DrawdownPoint {
    pub ts: TimestampNs,
    pub drawdown: f64,
}

/// A closed round-trip trade reconstructed from the fill stream.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TradeRecord {
    pub symbol: Symbol,
    pub side: Side,
    pub qty: Decimal,
    pub entry_ts: TimestampNs,
    pub exit_ts: TimestampNs,
    pub avg_entry_price: Decimal,
    pub avg_exit_price: Decimal,
    /// Price PnL of the round trip, excluding fees.
    pub gross_pnl: Decimal,
    pub fees: Decimal,
}

impl TradeRecord {
    /// PnL net of fees.
    pub fn net_pnl(&self) -> Decimal {
        self.gross_pnl - self.fees
    }
}

/// Full result of one backtest: summary metrics plus the vectors they were
/// computed from.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BacktestResult {
    pub strategy_name: SmolStr,
    pub symbol: Symbol,
    pub start_ts: TimestampNs,
    pub end_ts: TimestampNs,

    pub initial_balance: Decimal,
    pub final_balance: Decimal,
    pub final_equity: f64,

    pub total_return: f64,
    pub max_drawdown: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub calmar_ratio: f64,
    pub win_rate: f64,
    pub profit_factor: f64,

    pub trade_count: usize,
    pub total_fees: Decimal,

    pub trades: Vec<TradeRecord>,
    pub equity_curve: Vec<EquityPoint>,
    pub drawdown_curve: Vec<DrawdownPoint>,
}

impl BacktestResult {
    /// Assemble a result from the raw session outputs.
    pub fn generate(
        strategy_name: SmolStr,
        symbol: Symbol,
        start_ts: TimestampNs,
        end_ts: TimestampNs,
        initial_balance: Decimal,
        final_balance: Decimal,
        fills: &[Fill],
        equity_curve: Vec<EquityPoint>,
        periods_per_year: f64,
        risk_free_return: f64,
    ) -> Self {
        let trades = round_trips(fills);
        let total_fees: Decimal = fills.iter().map(|fill| fill.fee).sum();

        let initial = initial_balance.to_f64().unwrap_or(0.0);
        let final_equity = equity_curve
            .last()
            .map(|point| point.equity)
            .unwrap_or(initial);
        let total_return = if initial == 0.0 {
            0.0
        } else {
            (final_equity - initial) / initial
        };

        // Per-sample returns feed the ratio metrics
        let mut returns = Vec::with_capacity(equity_curve.len().saturating_sub(1));
        for window in equity_curve.windows(2) {
            if window[0].equity != 0.0 {
                returns.push((window[1].equity - window[0].equity) / window[0].equity);
            }
        }
        let mut dispersion = Dispersion::default();
        for ret in &returns {
            dispersion.update(*ret);
        }

        let mut drawdowns = equity_curve
            .first()
            .map(|point| DrawdownGenerator::init(point.ts, point.equity));
        let mut drawdown_curve = Vec::with_capacity(equity_curve.len());
        if let Some(generator) = drawdowns.as_mut() {
            for point in equity_curve.iter().skip(1) {
                generator.update(point.ts, point.equity);
                drawdown_curve.push(DrawdownPoint {
                    ts: point.ts,
                    drawdown: generator
                        .generate()
                        .map(|drawdown| drawdown.value)
                        .unwrap_or(0.0),
                });
            }
        }
        let max_drawdown = drawdowns
            .map(|generator| generator.max_drawdown())
            .unwrap_or(0.0);

        let (wins, losses, gross_profit, gross_loss) = trades.iter().fold(
            (0u64, 0u64, 0.0f64, 0.0f64),
            |(wins, losses, profit, loss), trade| {
                let pnl = trade.net_pnl().to_f64().unwrap_or(0.0);
                if pnl > 0.0 {
                    (wins + 1, losses, profit + pnl, loss)
                } else if pnl < 0.0 {
                    (wins, losses + 1, profit, loss + pnl.abs())
                } else {
                    (wins, losses, profit, loss)
                }
            },
        );

        Self {
            strategy_name,
            symbol,
            start_ts,
            end_ts,
            initial_balance,
            final_balance,
            final_equity,
            total_return,
            max_drawdown,
            sharpe_ratio: SharpeRatio::calculate(
                risk_free_return,
                dispersion.mean(),
                dispersion.std_dev(),
                periods_per_year,
            )
            .value,
            sortino_ratio: SortinoRatio::calculate(risk_free_return, &returns, periods_per_year)
                .value,
            calmar_ratio: CalmarRatio::calculate(total_return, max_drawdown).value,
            win_rate: WinRate::calculate(wins, losses).value,
            profit_factor: ProfitFactor::calculate(gross_profit, gross_loss).value,
            trade_count: trades.len(),
            total_fees,
            trades,
            equity_curve,
            drawdown_curve,
        }
    }
}

impl std::fmt::Display for BacktestResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut table = Table::new();
        table.add_row(row!["Metric", "Value"]);
        table.add_row(row!["Strategy", self.strategy_name]);
        table.add_row(row!["Symbol", self.symbol]);
        table.add_row(row!["Initial Balance", self.initial_balance]);
        table.add_row(row!["Final Balance", self.final_balance]);
        table.add_row(row![
            "Total Return",
            format!("{:.4}%", self.total_return * 100.0)
        ]);
        table.add_row(row![
            "Max Drawdown",
            format!("{:.4}%", self.max_drawdown * 100.0)
        ]);
        table.add_row(row!["Sharpe Ratio", format!("{:.4}", self.sharpe_ratio)]);
        table.add_row(row!["Sortino Ratio", format!("{:.4}", self.sortino_ratio)]);
        table.add_row(row!["Calmar Ratio", format!("{:.4}", self.calmar_ratio)]);
        table.add_row(row!["Win Rate", format!("{:.2}%", self.win_rate * 100.0)]);
        table.add_row(row!["Profit Factor", format!("{:.4}", self.profit_factor)]);
        table.add_row(row!["Trades", self.trade_count]);
        table.add_row(row!["Fees", self.total_fees]);
        write!(f, "{table}")
    }
}

/// Reconstruct closed round-trip trades from a fill stream.
///
/// A round trip opens when a symbol's net position leaves zero and closes
/// when it returns to zero; crossing through zero closes the old trip and
/// opens a new one at the crossing fill's price.
pub fn round_trips(fills: &[Fill]) -> Vec<TradeRecord> {
    #[derive(Debug)]
    struct OpenTrip {
        side: Side,
        entry_ts: TimestampNs,
        open_qty: Decimal,
        entry_value: Decimal,
        entry_qty: Decimal,
        exit_value: Decimal,
        exit_qty: Decimal,
        fees: Decimal,
    }

    let mut open: fnv::FnvHashMap<Symbol, OpenTrip> = fnv::FnvHashMap::default();
    let mut trades = Vec::new();

    for fill in fills {
        let mut fill_qty = fill.qty;
        let mut fill_fee = fill.fee;

        while fill_qty > Decimal::ZERO {
            match open.get_mut(&fill.symbol) {
                None => {
                    open.insert(
                        fill.symbol.clone(),
                        OpenTrip {
                            side: fill.side,
                            entry_ts: fill.ts,
                            open_qty: fill_qty,
                            entry_value: fill.price * fill_qty,
                            entry_qty: fill_qty,
                            exit_value: Decimal::ZERO,
                            exit_qty: Decimal::ZERO,
                            fees: fill_fee,
                        },
                    );
                    fill_qty = Decimal::ZERO;
                }
                Some(trip) if trip.side == fill.side => {
                    trip.open_qty += fill_qty;
                    trip.entry_value += fill.price * fill_qty;
                    trip.entry_qty += fill_qty;
                    trip.fees += fill_fee;
                    fill_qty = Decimal::ZERO;
                }
                Some(trip) => {
                    let close_qty = trip.open_qty.min(fill_qty);
                    let fee_share = if fill.qty.is_zero() {
                        Decimal::ZERO
                    } else {
                        fill_fee * close_qty / fill_qty
                    };
                    trip.open_qty -= close_qty;
                    trip.exit_value += fill.price * close_qty;
                    trip.exit_qty += close_qty;
                    trip.fees += fee_share;
                    fill_qty -= close_qty;
                    fill_fee -= fee_share;

                    if trip.open_qty.is_zero() {
                        let trip = open.remove(&fill.symbol).expect("trip present");
                        let avg_entry = trip.entry_value / trip.entry_qty;
                        let avg_exit = trip.exit_value / trip.exit_qty;
                        let gross = match trip.side {
                            Side::Buy => (avg_exit - avg_entry) * trip.exit_qty,
                            Side::Sell => (avg_entry - avg_exit) * trip.exit_qty,
                        };
                        trades.push(TradeRecord {
                            symbol: fill.symbol.clone(),
                            side: trip.side,
                            qty: trip.exit_qty,
                            entry_ts: trip.entry_ts,
                            exit_ts: fill.ts,
                            avg_entry_price: avg_entry,
                            avg_exit_price: avg_exit,
                            gross_pnl: gross,
                            fees: trip.fees,
                        });
                    }
                }
            }
        }
    }

    trades
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use veloce_execution::{ClientOrderId, Liquidity};

    fn fill(side: Side, qty: Decimal, price: Decimal, fee: Decimal, ts_ms: i64) -> Fill {
        Fill::new(
            ClientOrderId::new(format!("f{ts_ms}")),
            Symbol::new("BTCUSDT"),
            side,
            qty,
            price,
            fee,
            Liquidity::Taker,
            TimestampNs::from_millis(ts_ms),
        )
    }

    #[test]
    fn test_round_trips_simple_long() {
        let fills = vec![
            fill(Side::Buy, dec!(1), dec!(100), dec!(0.1), 1),
            fill(Side::Sell, dec!(1), dec!(110), dec!(0.1), 2),
        ];

        let trades = round_trips(&fills);
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].side, Side::Buy);
        assert_eq!(trades[0].gross_pnl, dec!(10));
        assert_eq!(trades[0].fees, dec!(0.2));
        assert_eq!(trades[0].net_pnl(), dec!(9.8));
    }

    #[test]
    fn test_round_trips_scaled_entry_and_cross() {
        let fills = vec![
            fill(Side::Buy, dec!(1), dec!(100), dec!(0), 1),
            fill(Side::Buy, dec!(1), dec!(110), dec!(0), 2),
            // Sell 3 closes the 2-lot long (avg 105) and opens a 1-lot short
            fill(Side::Sell, dec!(3), dec!(120), dec!(0), 3),
            fill(Side::Buy, dec!(1), dec!(90), dec!(0), 4),
        ];

        let trades = round_trips(&fills);
        assert_eq!(trades.len(), 2);

        assert_eq!(trades[0].side, Side::Buy);
        assert_eq!(trades[0].qty, dec!(2));
        assert_eq!(trades[0].avg_entry_price, dec!(105));
        assert_eq!(trades[0].gross_pnl, dec!(30));

        assert_eq!(trades[1].side, Side::Sell);
        assert_eq!(trades[1].qty, dec!(1));
        assert_eq!(trades[1].gross_pnl, dec!(30));
    }

    #[test]
    fn test_open_position_produces_no_trade() {
        let fills = vec![fill(Side::Buy, dec!(1), dec!(100), dec!(0.1), 1)];
        assert!(round_trips(&fills).is_empty());
    }

    #[test]
    fn test_result_generate_metrics() {
        let fills = vec![
            fill(Side::Buy, dec!(1), dec!(100), dec!(0.5), 1),
            fill(Side::Sell, dec!(1), dec!(110), dec!(0.5), 2),
            fill(Side::Buy, dec!(1), dec!(110), dec!(0.5), 3),
            fill(Side::Sell, dec!(1), dec!(105), dec!(0.5), 4),
        ];
        let equity_curve = vec![
            EquityPoint {
                ts: TimestampNs::from_millis(0),
                equity: 1000.0,
            },
            EquityPoint {
                ts: TimestampNs::from_millis(2),
                equity: 1009.0,
            },
            EquityPoint {
                ts: TimestampNs::from_millis(4),
                equity: 1003.0,
            },
        ];

        let result = BacktestResult::generate(
            SmolStr::new("momentum"),
            Symbol::new("BTCUSDT"),
            TimestampNs::ZERO,
            TimestampNs::from_millis(10),
            dec!(1000),
            dec!(1003),
            &fills,
            equity_curve,
            365.0,
            0.0,
        );

        assert_eq!(result.trade_count, 2);
        assert_eq!(result.win_rate, 0.5);
        assert!((result.total_return - 0.003).abs() < 1e-12);
        assert!(result.max_drawdown > 0.0);
        // One +9 net win, one -6 net loss
        assert!((result.profit_factor - 1.5).abs() < 1e-9);
        assert_eq!(result.total_fees, dec!(2));
    }
}
