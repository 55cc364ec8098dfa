use crate::engine::state::{account::quote_asset, EngineState};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;
use veloce_execution::order::OrderRequest;

/// Why the risk gate refused an order. Tags are the snake_case reasons that
/// appear on `order_update{status=REJECTED}` events.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, Error)]
pub enum RiskRejection {
    #[error("kill switch engaged")]
    KillSwitch,

    #[error("open order count {open} at limit {limit}")]
    TooManyOrders { open: usize, limit: usize },

    #[error("projected position {projected} exceeds limit {limit}")]
    PositionLimit { projected: Decimal, limit: Decimal },

    #[error("projected notional {projected} exceeds limit {limit}")]
    NotionalLimit { projected: Decimal, limit: Decimal },

    #[error("daily loss {loss} breached limit {limit}")]
    DailyLoss { loss: Decimal, limit: Decimal },

    #[error("insufficient balance: required {required}, free {free}")]
    InsufficientBalance { required: Decimal, free: Decimal },
}

impl RiskRejection {
    /// Snake_case tag used on the NDJSON event stream.
    pub fn tag(&self) -> &'static str {
        match self {
            RiskRejection::KillSwitch => "risk_kill_switch",
            RiskRejection::TooManyOrders { .. } => "risk_too_many_orders",
            RiskRejection::PositionLimit { .. } => "risk_position_limit",
            RiskRejection::NotionalLimit { .. } => "risk_notional_limit",
            RiskRejection::DailyLoss { .. } => "risk_daily_loss",
            RiskRejection::InsufficientBalance { .. } => "risk_insufficient_balance",
        }
    }
}

/// Pre-trade limits enforced on every submission.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RiskConfig {
    /// Absolute position size limit per symbol, in base units.
    pub max_position_size: Decimal,
    /// Quote-denominated notional limit per symbol.
    pub max_notional: Decimal,
    /// Fraction of start-of-day equity that may be lost before the kill
    /// switch trips (eg/ `0.05` for 5%).
    pub daily_loss_limit: Decimal,
    pub max_open_orders: usize,
    pub kill_switch_enabled: bool,
    /// Informational threshold surfaced to outer layers; no effect here.
    pub require_confirmation_above: Option<Decimal>,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_position_size: Decimal::MAX,
            max_notional: Decimal::MAX,
            daily_loss_limit: Decimal::ONE,
            max_open_orders: usize::MAX,
            kill_switch_enabled: false,
            require_confirmation_above: None,
        }
    }
}

/// Pre-trade gate and post-fill risk accounting.
///
/// Checks run in a fixed order and the first failure short-circuits; risk
/// never partially admits an order. A breached daily-loss limit also engages
/// the kill switch, which rejects every subsequent submission until reset.
#[derive(Debug, Clone)]
pub struct RiskEngine {
    config: RiskConfig,
    kill_switch: bool,
    start_of_day_equity: Decimal,
    realized_today: Decimal,
}

impl RiskEngine {
    /// Construct a `RiskEngine`, anchoring the daily loss limit at the
    /// provided start-of-day equity.
    pub fn new(config: RiskConfig, start_of_day_equity: Decimal) -> Self {
        Self {
            kill_switch: config.kill_switch_enabled,
            config,
            start_of_day_equity,
            realized_today: Decimal::ZERO,
        }
    }

    pub fn kill_switch_engaged(&self) -> bool {
        self.kill_switch
    }

    /// Manually engage the kill switch.
    pub fn engage_kill_switch(&mut self) {
        self.kill_switch = true;
    }

    /// Reset the kill switch and re-anchor the daily loss window.
    pub fn reset(&mut self, start_of_day_equity: Decimal) {
        self.kill_switch = self.config.kill_switch_enabled;
        self.start_of_day_equity = start_of_day_equity;
        self.realized_today = Decimal::ZERO;
    }

    /// Daily loss so far.
    ///
    /// Counts realized PnL only: folding unrealized PnL into the gate would
    /// block the very exit orders that close a losing position, since the
    /// adverse move is already marked by the time the exit is submitted.
    fn daily_loss(&self) -> Decimal {
        -self.realized_today
    }

    /// Pre-trade check. Ordering is normative:
    /// kill switch, open orders, position, notional, daily loss, balance.
    pub fn check(
        &mut self,
        state: &EngineState,
        request: &OrderRequest,
    ) -> Result<(), RiskRejection> {
        if self.kill_switch {
            return Err(RiskRejection::KillSwitch);
        }

        let open = state.orders.open_count();
        if open >= self.config.max_open_orders {
            return Err(RiskRejection::TooManyOrders {
                open,
                limit: self.config.max_open_orders,
            });
        }

        let signed_qty = request.qty * Decimal::from(request.side.sign());
        let current_qty = state
            .position(&request.symbol)
            .map(|position| position.net_qty)
            .unwrap_or(Decimal::ZERO);
        let projected = (current_qty + signed_qty).abs();
        if projected > self.config.max_position_size {
            return Err(RiskRejection::PositionLimit {
                projected,
                limit: self.config.max_position_size,
            });
        }

        // Market orders before any market data carry no price; the notional
        // and balance checks defer to the executor, which rejects them anyway
        let reference_price = request.price.or_else(|| state.mark(&request.symbol));

        if let Some(reference_price) = reference_price {
            let projected_notional = projected * reference_price;
            if projected_notional > self.config.max_notional {
                return Err(RiskRejection::NotionalLimit {
                    projected: projected_notional,
                    limit: self.config.max_notional,
                });
            }
        }

        let loss = self.daily_loss();
        let loss_limit = self.config.daily_loss_limit * self.start_of_day_equity;
        if loss >= loss_limit {
            warn!(%loss, %loss_limit, "daily loss limit breached, engaging kill switch");
            self.kill_switch = true;
            return Err(RiskRejection::DailyLoss {
                loss,
                limit: loss_limit,
            });
        }

        if let Some(reference_price) = reference_price {
            let required = request.notional(reference_price);
            let free = state.account.free(&quote_asset(&request.symbol));
            if required > free {
                return Err(RiskRejection::InsufficientBalance { required, free });
            }
        }

        Ok(())
    }

    /// Post-fill accounting: fold realized PnL into the daily loss window.
    ///
    /// The breach itself is detected by the next pre-trade check, which
    /// rejects with `risk_daily_loss` and engages the kill switch; every
    /// submission after that is rejected with `risk_kill_switch`.
    pub fn on_fill(&mut self, realized_delta: Decimal) {
        self.realized_today += realized_delta;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::state::account::AccountState;
    use rust_decimal_macros::dec;
    use veloce_data::time::TimestampNs;
    use veloce_execution::{
        order::{OrderKind, TimeInForce},
        ClientOrderId,
    };
    use veloce_instrument::{Side, Symbol, Venue};

    fn request(cid: &str, side: Side, qty: Decimal, price: Decimal) -> OrderRequest {
        OrderRequest {
            cid: ClientOrderId::new(cid),
            symbol: Symbol::new("BTCUSDT"),
            venue: Venue::Sim,
            side,
            kind: OrderKind::Limit,
            tif: TimeInForce::GoodUntilCancelled,
            qty,
            price: Some(price),
            ts_created: TimestampNs::ZERO,
        }
    }

    fn state_with_balance(free: Decimal) -> EngineState {
        EngineState::new(AccountState::with_deposit("USDT", free))
    }

    fn config() -> RiskConfig {
        RiskConfig {
            max_position_size: dec!(10),
            max_notional: dec!(1000000),
            daily_loss_limit: dec!(0.05),
            max_open_orders: 5,
            kill_switch_enabled: false,
            require_confirmation_above: None,
        }
    }

    #[test]
    fn test_check_ordering_first_failure_wins() {
        struct TestCase {
            name: &'static str,
            configure: fn(&mut RiskEngine, &mut EngineState),
            request: OrderRequest,
            expected_tag: &'static str,
        }

        let cases = vec![
            TestCase {
                name: "kill switch first",
                configure: |risk, _| risk.engage_kill_switch(),
                request: request("t", Side::Buy, dec!(1), dec!(100)),
                expected_tag: "risk_kill_switch",
            },
            TestCase {
                name: "position limit",
                configure: |_, _| {},
                request: request("t", Side::Buy, dec!(11), dec!(100)),
                expected_tag: "risk_position_limit",
            },
            TestCase {
                name: "insufficient balance",
                configure: |_, _| {},
                request: request("t", Side::Buy, dec!(5), dec!(5000)),
                expected_tag: "risk_insufficient_balance",
            },
        ];

        for (index, test) in cases.into_iter().enumerate() {
            let mut state = state_with_balance(dec!(10000));
            let mut risk = RiskEngine::new(config(), dec!(10000));
            (test.configure)(&mut risk, &mut state);

            let actual = risk.check(&state, &test.request).unwrap_err();
            assert_eq!(
                actual.tag(),
                test.expected_tag,
                "TC{index} ({}) failed",
                test.name
            );
        }
    }

    #[test]
    fn test_open_order_limit() {
        let mut state = state_with_balance(dec!(100000));
        let mut risk = RiskEngine::new(
            RiskConfig {
                max_open_orders: 1,
                ..config()
            },
            dec!(100000),
        );

        state.orders.submit(&request("a", Side::Buy, dec!(1), dec!(100))).unwrap();

        let rejection = risk
            .check(&state, &request("b", Side::Buy, dec!(1), dec!(100)))
            .unwrap_err();
        assert_eq!(rejection.tag(), "risk_too_many_orders");
    }

    #[test]
    fn test_notional_limit() {
        let state = state_with_balance(dec!(1000000));
        let mut risk = RiskEngine::new(
            RiskConfig {
                max_notional: dec!(400),
                ..config()
            },
            dec!(1000000),
        );

        let rejection = risk
            .check(&state, &request("t", Side::Buy, dec!(5), dec!(100)))
            .unwrap_err();
        assert_eq!(rejection.tag(), "risk_notional_limit");

        assert!(risk
            .check(&state, &request("t", Side::Buy, dec!(3), dec!(100)))
            .is_ok());
    }

    #[test]
    fn test_daily_loss_rejects_then_kill_switch_takes_over() {
        let state = state_with_balance(dec!(10000));
        let mut risk = RiskEngine::new(config(), dec!(10000));

        // Two losing closed trades totalling -550 on 10_000 equity at 5%
        risk.on_fill(dec!(-300));
        risk.on_fill(dec!(-250));
        assert!(!risk.kill_switch_engaged());

        // First submission after the breach reports the daily loss and trips
        // the switch
        let rejection = risk
            .check(&state, &request("t", Side::Buy, dec!(1), dec!(100)))
            .unwrap_err();
        assert_eq!(rejection.tag(), "risk_daily_loss");
        assert!(risk.kill_switch_engaged());

        // Every subsequent submission hits the switch first
        let rejection = risk
            .check(&state, &request("t2", Side::Buy, dec!(1), dec!(100)))
            .unwrap_err();
        assert_eq!(rejection.tag(), "risk_kill_switch");
    }

    #[test]
    fn test_reset_clears_kill_switch_and_window() {
        let state = state_with_balance(dec!(10000));
        let mut risk = RiskEngine::new(config(), dec!(10000));
        risk.on_fill(dec!(-600));
        risk.check(&state, &request("t", Side::Buy, dec!(1), dec!(100)))
            .unwrap_err();
        assert!(risk.kill_switch_engaged());

        risk.reset(dec!(9400));
        assert!(!risk.kill_switch_engaged());
        assert!(risk
            .check(&state, &request("t", Side::Buy, dec!(1), dec!(100)))
            .is_ok());
    }
}
