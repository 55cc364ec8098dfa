use crate::strategy::{Action, ParamSpec, Params, Strategy, StrategyContext};
use rust_decimal::{
    prelude::{FromPrimitive, ToPrimitive},
    Decimal,
};
use smol_str::SmolStr;
use std::collections::VecDeque;
use veloce_data::{
    event::{EventTypeTag, MarketEvent},
    time::TimestampNs,
};
use veloce_execution::{
    order::{OrderKind, OrderRequest, TimeInForce},
    ClientOrderId,
};
use veloce_instrument::{Side, Symbol, Venue};

/// Fast/slow moving-average crossover momentum strategy.
///
/// Goes long one unit of `qty` on a golden cross (fast SMA crossing above
/// slow) and exits on a death cross. Orders are immediate-or-cancel limits
/// priced at the triggering close, so backtest fills stay deterministic.
pub struct MomentumStrategy {
    id: SmolStr,
    symbol: Symbol,
    venue: Venue,
    fast: usize,
    slow: usize,
    qty: Decimal,
    closes: VecDeque<f64>,
    long: bool,
    order_seq: u64,
}

impl std::fmt::Debug for MomentumStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MomentumStrategy")
            .field("id", &self.id)
            .field("fast", &self.fast)
            .field("slow", &self.slow)
            .field("long", &self.long)
            .finish()
    }
}

impl MomentumStrategy {
    pub fn param_specs() -> Vec<ParamSpec> {
        vec![
            ParamSpec::new("fast", 2.0, 200.0, 10.0),
            ParamSpec::new("slow", 3.0, 500.0, 20.0),
            ParamSpec::new("qty", 0.000001, 1_000_000.0, 1.0),
        ]
    }

    pub fn build(params: &Params) -> Box<dyn Strategy> {
        Box::new(Self {
            id: SmolStr::default(),
            symbol: Symbol::new("BTCUSDT"),
            venue: Venue::Sim,
            fast: params.get("fast").copied().unwrap_or(10.0) as usize,
            slow: params.get("slow").copied().unwrap_or(20.0) as usize,
            qty: Decimal::from_f64(params.get("qty").copied().unwrap_or(1.0))
                .unwrap_or(Decimal::ONE),
            closes: VecDeque::new(),
            long: false,
            order_seq: 0,
        })
    }

    fn sma(&self, window: usize) -> Option<f64> {
        if self.closes.len() < window {
            return None;
        }
        let sum: f64 = self.closes.iter().rev().take(window).sum();
        Some(sum / window as f64)
    }

    fn order(&mut self, side: Side, price: Decimal, ts: TimestampNs) -> Action {
        self.order_seq += 1;
        Action::Submit(OrderRequest {
            cid: ClientOrderId::new(format!("{}-{}", self.id, self.order_seq)),
            symbol: self.symbol.clone(),
            venue: self.venue,
            side,
            kind: OrderKind::Limit,
            tif: TimeInForce::ImmediateOrCancel,
            qty: self.qty,
            price: Some(price),
            ts_created: ts,
        })
    }
}

impl Strategy for MomentumStrategy {
    fn on_init(&mut self, ctx: &StrategyContext) {
        self.id = ctx.id.clone();
        self.symbol = ctx.instrument.symbol.clone();
        self.venue = ctx.instrument.venue;
        self.fast = ctx.params.get("fast").copied().unwrap_or(10.0) as usize;
        self.slow = ctx.params.get("slow").copied().unwrap_or(20.0) as usize;
        if let Some(qty) = ctx.params.get("qty").and_then(|qty| Decimal::from_f64(*qty)) {
            self.qty = qty;
        }
    }

    fn on_market_event(&mut self, event: &MarketEvent) -> Vec<Action> {
        let Some(price) = event.reference_price() else {
            return Vec::new();
        };
        let Some(close) = price.to_f64() else {
            return Vec::new();
        };

        self.closes.push_back(close);
        if self.closes.len() > self.slow + 1 {
            self.closes.pop_front();
        }

        let (Some(fast), Some(slow)) = (self.sma(self.fast), self.sma(self.slow)) else {
            return Vec::new();
        };

        if fast > slow && !self.long {
            self.long = true;
            return vec![self.order(Side::Buy, price, event.ts)];
        }
        if fast < slow && self.long {
            self.long = false;
            return vec![self.order(Side::Sell, price, event.ts)];
        }
        Vec::new()
    }

    fn subscriptions(&self) -> Vec<veloce_execution::venue::StreamSpec> {
        [
            EventTypeTag::Kline,
            EventTypeTag::Trade,
            EventTypeTag::PriceTick,
        ]
        .into_iter()
        .map(|tag| veloce_execution::venue::StreamSpec::new(self.venue, self.symbol.clone(), tag))
        .collect()
    }
}
