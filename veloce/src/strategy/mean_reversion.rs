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

/// Rolling-band mean reversion strategy.
///
/// Buys when price drops below `mean - k * stdev` of the lookback window and
/// exits when price recovers above the mean. Short entries are symmetric.
pub struct MeanReversionStrategy {
    id: SmolStr,
    symbol: Symbol,
    venue: Venue,
    lookback: usize,
    k: f64,
    qty: Decimal,
    closes: VecDeque<f64>,
    held: Option<Side>,
    order_seq: u64,
}

impl std::fmt::Debug for MeanReversionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeanReversionStrategy")
            .field("id", &self.id)
            .field("lookback", &self.lookback)
            .field("k", &self.k)
            .field("held", &self.held)
            .finish()
    }
}

impl MeanReversionStrategy {
    pub fn param_specs() -> Vec<ParamSpec> {
        vec![
            ParamSpec::new("lookback", 5.0, 500.0, 20.0),
            ParamSpec::new("k", 0.5, 5.0, 2.0),
            ParamSpec::new("qty", 0.000001, 1_000_000.0, 1.0),
        ]
    }

    pub fn build(params: &Params) -> Box<dyn Strategy> {
        Box::new(Self {
            id: SmolStr::default(),
            symbol: Symbol::new("BTCUSDT"),
            venue: Venue::Sim,
            lookback: params.get("lookback").copied().unwrap_or(20.0) as usize,
            k: params.get("k").copied().unwrap_or(2.0),
            qty: Decimal::from_f64(params.get("qty").copied().unwrap_or(1.0))
                .unwrap_or(Decimal::ONE),
            closes: VecDeque::new(),
            held: None,
            order_seq: 0,
        })
    }

    fn bands(&self) -> Option<(f64, f64, f64)> {
        if self.closes.len() < self.lookback {
            return None;
        }
        let window: Vec<f64> = self.closes.iter().rev().take(self.lookback).copied().collect();
        let mean = window.iter().sum::<f64>() / window.len() as f64;
        let variance =
            window.iter().map(|close| (close - mean).powi(2)).sum::<f64>() / window.len() as f64;
        let stdev = variance.sqrt();
        Some((mean - self.k * stdev, mean, mean + self.k * stdev))
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

impl Strategy for MeanReversionStrategy {
    fn on_init(&mut self, ctx: &StrategyContext) {
        self.id = ctx.id.clone();
        self.symbol = ctx.instrument.symbol.clone();
        self.venue = ctx.instrument.venue;
        self.lookback = ctx.params.get("lookback").copied().unwrap_or(20.0) as usize;
        self.k = ctx.params.get("k").copied().unwrap_or(2.0);
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
        if self.closes.len() > self.lookback {
            self.closes.pop_front();
        }

        let Some((lower, mean, upper)) = self.bands() else {
            return Vec::new();
        };

        match self.held {
            None if close < lower => {
                self.held = Some(Side::Buy);
                vec![self.order(Side::Buy, price, event.ts)]
            }
            None if close > upper => {
                self.held = Some(Side::Sell);
                vec![self.order(Side::Sell, price, event.ts)]
            }
            // Recovery to the mean exits by flipping the held side
            Some(side)
                if (side == Side::Buy && close >= mean)
                    || (side == Side::Sell && close <= mean) =>
            {
                self.held = None;
                vec![self.order(side.inverse(), price, event.ts)]
            }
            _ => Vec::new(),
        }
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
