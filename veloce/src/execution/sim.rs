use crate::execution::ExecutionEvent;
use fnv::FnvHashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;
use veloce_data::{
    event::{BookTop, MarketEvent, MarketEventKind},
    time::TimestampNs,
};
use veloce_execution::{
    order::{
        id::{ClientOrderId, VenueOrderId},
        OrderKind, OrderRequest, TimeInForce,
    },
    Fill, Liquidity,
};
use veloce_instrument::{Side, Symbol};

/// Configuration for constructing a [`SimExecutor`] via the new() constructor
/// method.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct SimConfig {
    /// Fee rate applied to fills that rested before executing.
    pub fee_rate_maker: Decimal,
    /// Fee rate applied to fills that crossed the spread on arrival.
    pub fee_rate_taker: Decimal,
    /// Absolute price penalty applied to market orders.
    pub slippage: Decimal,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            fee_rate_maker: Decimal::new(2, 4),  // 0.0002
            fee_rate_taker: Decimal::new(4, 4),  // 0.0004
            slippage: Decimal::ZERO,
        }
    }
}

/// A client order resting in the simulated book.
#[derive(Debug, Clone, Eq, PartialEq)]
struct RestingOrder {
    cid: ClientOrderId,
    side: Side,
    price: Decimal,
    remaining: Decimal,
    /// Submission order, for time priority within a price level.
    seq: u64,
}

/// Per-symbol simulated market: the client's resting orders plus the latest
/// observed liquidity.
#[derive(Debug, Clone, Default)]
struct SymbolBook {
    /// Sorted so the best bid (highest price, earliest seq) is last.
    bids: Vec<RestingOrder>,
    /// Sorted so the best ask (lowest price, earliest seq) is last.
    asks: Vec<RestingOrder>,
    last_top: Option<BookTop>,
    /// Last traded/closed price, synthetic liquidity for tick-only feeds.
    last_price: Option<Decimal>,
}

impl SymbolBook {
    fn sort(&mut self) {
        // Best-last vectors: pop() yields the next order in price-time priority
        self.bids
            .sort_by(|a, b| a.price.cmp(&b.price).then(b.seq.cmp(&a.seq)));
        self.asks
            .sort_by(|a, b| b.price.cmp(&a.price).then(b.seq.cmp(&a.seq)));
    }

    fn remove(&mut self, cid: &ClientOrderId) -> Option<RestingOrder> {
        for orders in [&mut self.bids, &mut self.asks] {
            if let Some(index) = orders.iter().position(|order| &order.cid == cid) {
                return Some(orders.remove(index));
            }
        }
        None
    }
}

/// Deterministic fill simulator.
///
/// Maintains a per-symbol book of the client's open orders and matches them
/// against incoming market events with price-time priority. Given the same
/// sequence of market events and order requests, the emitted fills are
/// byte-identical: no wall time is read and all identifiers derive from
/// counters.
#[derive(Debug)]
pub struct SimExecutor {
    config: SimConfig,
    books: FnvHashMap<Symbol, SymbolBook>,
    submit_seq: u64,
    venue_order_seq: u64,
}

impl Default for SimExecutor {
    fn default() -> Self {
        Self::new(SimConfig::default())
    }
}

impl SimExecutor {
    /// Constructs a new [`SimExecutor`] component.
    pub fn new(config: SimConfig) -> Self {
        Self {
            config,
            books: FnvHashMap::default(),
            submit_seq: 0,
            venue_order_seq: 0,
        }
    }

    /// Total resting orders across all symbols.
    pub fn resting_count(&self) -> usize {
        self.books
            .values()
            .map(|book| book.bids.len() + book.asks.len())
            .sum()
    }

    fn next_venue_order_id(&mut self) -> VenueOrderId {
        self.venue_order_seq += 1;
        VenueOrderId::new(format!("sim-{}", self.venue_order_seq))
    }

    /// Place an order, returning the acceptance/rejection and any immediate
    /// fills in emission order.
    pub fn place(&mut self, request: &OrderRequest, now: TimestampNs) -> Vec<ExecutionEvent> {
        match request.kind {
            OrderKind::Market => self.place_market(request, now),
            OrderKind::Limit => self.place_limit(request, now),
        }
    }

    fn place_market(&mut self, request: &OrderRequest, now: TimestampNs) -> Vec<ExecutionEvent> {
        let slippage = self.config.slippage;
        let book = self.books.entry(request.symbol.clone()).or_default();

        // Market orders cross the latest top of book; without one they cannot
        // be priced.
        let Some(top) = book.last_top.clone() else {
            return vec![ExecutionEvent::Rejected {
                cid: request.cid.clone(),
                reason: "sim_no_book".to_string(),
                ts: now,
            }];
        };

        let (price, available) = match request.side {
            Side::Buy => (top.ask_px + slippage, top.ask_qty),
            Side::Sell => (top.bid_px - slippage, top.bid_qty),
        };

        let venue_order_id = self.next_venue_order_id();
        let mut events = vec![ExecutionEvent::Accepted {
            cid: request.cid.clone(),
            venue_order_id,
            ts: now,
        }];

        let fill_qty = request.qty.min(available);
        if fill_qty > Decimal::ZERO {
            events.push(ExecutionEvent::Fill(self.fill(
                request,
                fill_qty,
                price,
                Liquidity::Taker,
                now,
            )));
        }
        // Unfilled remainder of a market order never rests
        if fill_qty < request.qty {
            events.push(ExecutionEvent::CancelOk {
                cid: request.cid.clone(),
                ts: now,
            });
        }
        events
    }

    fn place_limit(&mut self, request: &OrderRequest, now: TimestampNs) -> Vec<ExecutionEvent> {
        let limit_price = match request.price {
            Some(price) => price,
            None => {
                return vec![ExecutionEvent::Rejected {
                    cid: request.cid.clone(),
                    reason: "missing_limit_price".to_string(),
                    ts: now,
                }];
            }
        };

        // Determine immediately crossable liquidity from the latest top of
        // book, falling back to the last traded price for tick-only feeds.
        let book = self.books.entry(request.symbol.clone()).or_default();
        let crossable: Option<(Decimal, Option<Decimal>)> = match (&book.last_top, book.last_price)
        {
            (Some(top), _) => match request.side {
                Side::Buy if top.ask_px <= limit_price => Some((top.ask_px, Some(top.ask_qty))),
                Side::Sell if top.bid_px >= limit_price => Some((top.bid_px, Some(top.bid_qty))),
                _ => None,
            },
            (None, Some(last)) => match request.side {
                Side::Buy if last <= limit_price => Some((last, None)),
                Side::Sell if last >= limit_price => Some((last, None)),
                _ => None,
            },
            (None, None) => None,
        };

        if matches!(request.tif, TimeInForce::PostOnly) && crossable.is_some() {
            return vec![ExecutionEvent::Rejected {
                cid: request.cid.clone(),
                reason: "post_only_would_cross".to_string(),
                ts: now,
            }];
        }

        if matches!(request.tif, TimeInForce::FillOrKill) {
            let fillable = crossable
                .map(|(_, qty)| qty.unwrap_or(Decimal::MAX))
                .unwrap_or(Decimal::ZERO);
            if fillable < request.qty {
                return vec![ExecutionEvent::Rejected {
                    cid: request.cid.clone(),
                    reason: "fok_insufficient_liquidity".to_string(),
                    ts: now,
                }];
            }
        }

        let venue_order_id = self.next_venue_order_id();
        let mut events = vec![ExecutionEvent::Accepted {
            cid: request.cid.clone(),
            venue_order_id,
            ts: now,
        }];

        // One immediate (taker) matching pass
        let mut remaining = request.qty;
        if let Some((price, available)) = crossable {
            let fill_qty = available.map(|qty| qty.min(remaining)).unwrap_or(remaining);
            if fill_qty > Decimal::ZERO {
                events.push(ExecutionEvent::Fill(self.fill(
                    request,
                    fill_qty,
                    price,
                    Liquidity::Taker,
                    now,
                )));
                remaining -= fill_qty;
            }
        }

        if remaining > Decimal::ZERO {
            match request.tif {
                TimeInForce::ImmediateOrCancel => {
                    events.push(ExecutionEvent::CancelOk {
                        cid: request.cid.clone(),
                        ts: now,
                    });
                }
                // FillOrKill fully filled above or rejected before this point
                _ => {
                    self.submit_seq += 1;
                    let resting = RestingOrder {
                        cid: request.cid.clone(),
                        side: request.side,
                        price: limit_price,
                        remaining,
                        seq: self.submit_seq,
                    };
                    let book = self.books.entry(request.symbol.clone()).or_default();
                    match request.side {
                        Side::Buy => book.bids.push(resting),
                        Side::Sell => book.asks.push(resting),
                    }
                    book.sort();
                }
            }
        }

        events
    }

    /// Cancel a resting order.
    pub fn cancel(&mut self, cid: &ClientOrderId, symbol: &Symbol, now: TimestampNs) -> ExecutionEvent {
        let removed = self
            .books
            .get_mut(symbol)
            .and_then(|book| book.remove(cid));

        match removed {
            Some(_) => ExecutionEvent::CancelOk {
                cid: cid.clone(),
                ts: now,
            },
            None => ExecutionEvent::CancelFailed {
                cid: cid.clone(),
                reason: "unknown_order".to_string(),
                ts: now,
            },
        }
    }

    /// Process an incoming market event: refresh the observed liquidity and
    /// match resting orders, returning fills in price-time priority order.
    pub fn on_market_event(&mut self, event: &MarketEvent) -> Vec<Fill> {
        let maker_rate = self.config.fee_rate_maker;
        let book = self.books.entry(event.symbol.clone()).or_default();

        let mut fills = Vec::new();
        match &event.kind {
            MarketEventKind::Trade(trade) => {
                // A resting Buy at P fills against a trade at or below P when
                // the aggressor was a buyer-taker; symmetric for Sell.
                if !trade.is_buyer_maker {
                    fills.extend(Self::match_side(
                        &mut book.bids,
                        Side::Buy,
                        trade.price,
                        Some(trade.qty),
                        trade.price,
                        maker_rate,
                        event,
                    ));
                } else {
                    fills.extend(Self::match_side(
                        &mut book.asks,
                        Side::Sell,
                        trade.price,
                        Some(trade.qty),
                        trade.price,
                        maker_rate,
                        event,
                    ));
                }
            }
            MarketEventKind::BookTop(top) => {
                fills.extend(Self::match_side(
                    &mut book.bids,
                    Side::Buy,
                    top.ask_px,
                    Some(top.ask_qty),
                    top.ask_px,
                    maker_rate,
                    event,
                ));
                fills.extend(Self::match_side(
                    &mut book.asks,
                    Side::Sell,
                    top.bid_px,
                    Some(top.bid_qty),
                    top.bid_px,
                    maker_rate,
                    event,
                ));
            }
            MarketEventKind::Kline(kline) => {
                // Synthetic tick at the close with the bar volume as liquidity
                fills.extend(Self::match_side(
                    &mut book.bids,
                    Side::Buy,
                    kline.close,
                    Some(kline.volume),
                    kline.close,
                    maker_rate,
                    event,
                ));
                fills.extend(Self::match_side(
                    &mut book.asks,
                    Side::Sell,
                    kline.close,
                    Some(kline.volume),
                    kline.close,
                    maker_rate,
                    event,
                ));
            }
            MarketEventKind::PriceTick(tick) => {
                fills.extend(Self::match_side(
                    &mut book.bids,
                    Side::Buy,
                    tick.price,
                    None,
                    tick.price,
                    maker_rate,
                    event,
                ));
                fills.extend(Self::match_side(
                    &mut book.asks,
                    Side::Sell,
                    tick.price,
                    None,
                    tick.price,
                    maker_rate,
                    event,
                ));
            }
            MarketEventKind::BookDelta(_) => {}
        }

        Self::observe(book, &event.kind);
        if !fills.is_empty() {
            debug!(symbol = %event.symbol, count = fills.len(), "sim matched resting orders");
        }
        fills
    }

    fn observe(book: &mut SymbolBook, kind: &MarketEventKind) {
        match kind {
            MarketEventKind::Trade(trade) => book.last_price = Some(trade.price),
            MarketEventKind::BookTop(top) => {
                book.last_price = Some(top.mid_price());
                book.last_top = Some(top.clone());
            }
            MarketEventKind::Kline(kline) => book.last_price = Some(kline.close),
            MarketEventKind::PriceTick(tick) => book.last_price = Some(tick.price),
            MarketEventKind::BookDelta(_) => {}
        }
    }

    /// Match one side's resting orders against available liquidity at
    /// `tick_price`, filling best-price-first with time priority, capped by
    /// `liquidity` (None = unlimited).
    fn match_side(
        orders: &mut Vec<RestingOrder>,
        side: Side,
        tick_price: Decimal,
        liquidity: Option<Decimal>,
        fill_price: Decimal,
        fee_rate: Decimal,
        event: &MarketEvent,
    ) -> Vec<Fill> {
        let mut remaining_liquidity = liquidity;
        let mut fills = Vec::new();

        let remaining_best = loop {
            let Some(mut best) = orders.pop() else {
                break None;
            };

            let crosses = match side {
                Side::Buy => tick_price <= best.price,
                Side::Sell => tick_price >= best.price,
            };
            if !crosses || remaining_liquidity == Some(Decimal::ZERO) {
                break Some(best);
            }

            let fill_qty = match remaining_liquidity {
                Some(liquidity) => best.remaining.min(liquidity),
                None => best.remaining,
            };
            if fill_qty <= Decimal::ZERO {
                break Some(best);
            }

            fills.push(Fill::new(
                best.cid.clone(),
                event.symbol.clone(),
                side,
                fill_qty,
                fill_price,
                fee_rate * fill_price * fill_qty,
                Liquidity::Maker,
                event.ts,
            ));

            if let Some(liquidity) = remaining_liquidity.as_mut() {
                *liquidity -= fill_qty;
            }
            best.remaining -= fill_qty;
            if best.remaining > Decimal::ZERO {
                break Some(best);
            }
        };

        if let Some(best) = remaining_best {
            orders.push(best);
        }
        fills
    }

    fn fill(
        &self,
        request: &OrderRequest,
        qty: Decimal,
        price: Decimal,
        liquidity: Liquidity,
        ts: TimestampNs,
    ) -> Fill {
        let rate = match liquidity {
            Liquidity::Maker => self.config.fee_rate_maker,
            Liquidity::Taker => self.config.fee_rate_taker,
        };
        Fill::new(
            request.cid.clone(),
            request.symbol.clone(),
            request.side,
            qty,
            price,
            rate * price * qty,
            liquidity,
            ts,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use veloce_data::event::PublicTrade;
    use veloce_instrument::Venue;

    fn request(
        cid: &str,
        side: Side,
        qty: Decimal,
        price: Decimal,
        tif: TimeInForce,
    ) -> OrderRequest {
        OrderRequest {
            cid: ClientOrderId::new(cid),
            symbol: Symbol::new("BTCUSDT"),
            venue: Venue::Sim,
            side,
            kind: OrderKind::Limit,
            tif,
            qty,
            price: Some(price),
            ts_created: TimestampNs::ZERO,
        }
    }

    fn market_request(cid: &str, side: Side, qty: Decimal) -> OrderRequest {
        OrderRequest {
            cid: ClientOrderId::new(cid),
            symbol: Symbol::new("BTCUSDT"),
            venue: Venue::Sim,
            side,
            kind: OrderKind::Market,
            tif: TimeInForce::ImmediateOrCancel,
            qty,
            price: None,
            ts_created: TimestampNs::ZERO,
        }
    }

    fn trade_event(price: Decimal, qty: Decimal, is_buyer_maker: bool, ts_ms: i64) -> MarketEvent {
        MarketEvent::trade(
            Symbol::new("BTCUSDT"),
            Venue::Sim,
            TimestampNs::from_millis(ts_ms),
            PublicTrade::new(price, qty, is_buyer_maker, ts_ms as u64),
        )
    }

    fn top_event(
        bid_px: Decimal,
        bid_qty: Decimal,
        ask_px: Decimal,
        ask_qty: Decimal,
        ts_ms: i64,
    ) -> MarketEvent {
        MarketEvent::book_top(
            Symbol::new("BTCUSDT"),
            Venue::Sim,
            TimestampNs::from_millis(ts_ms),
            BookTop::new(bid_px, bid_qty, ask_px, ask_qty),
        )
    }

    fn now() -> TimestampNs {
        TimestampNs::from_millis(1)
    }

    #[test]
    fn test_resting_buy_fills_on_crossing_trade_at_trade_price() {
        let mut sim = SimExecutor::default();

        let events = sim.place(
            &request(
                "t1",
                Side::Buy,
                dec!(0.001),
                dec!(50000),
                TimeInForce::GoodUntilCancelled,
            ),
            now(),
        );
        assert!(matches!(events[0], ExecutionEvent::Accepted { .. }));
        assert_eq!(events.len(), 1);
        assert_eq!(sim.resting_count(), 1);

        let fills = sim.on_market_event(&trade_event(dec!(49999.5), dec!(1), false, 2));
        assert_eq!(fills.len(), 1);
        assert_eq!(fills[0].qty, dec!(0.001));
        assert_eq!(fills[0].price, dec!(49999.5));
        assert_eq!(fills[0].liquidity, Liquidity::Maker);
        assert_eq!(sim.resting_count(), 0);
    }

    #[test]
    fn test_trade_aggressor_side_gates_matching() {
        let mut sim = SimExecutor::default();
        sim.place(
            &request(
                "bid",
                Side::Buy,
                dec!(1),
                dec!(100),
                TimeInForce::GoodUntilCancelled,
            ),
            now(),
        );

        // A buyer-maker trade (aggressive sell) does not fill the bid
        assert!(sim
            .on_market_event(&trade_event(dec!(99), dec!(1), true, 2))
            .is_empty());

        // A buyer-taker trade at or below the bid price fills it
        let fills = sim.on_market_event(&trade_event(dec!(99), dec!(1), false, 3));
        assert_eq!(fills.len(), 1);
    }

    #[test]
    fn test_partial_fill_consumes_trade_liquidity() {
        let mut sim = SimExecutor::default();
        sim.place(
            &request(
                "t2",
                Side::Sell,
                dec!(1.0),
                dec!(3200),
                TimeInForce::GoodUntilCancelled,
            ),
            now(),
        );

        let fills = sim.on_market_event(&trade_event(dec!(3201), dec!(0.3), true, 2));
        assert_eq!(fills.len(), 1);
        assert_eq!(fills[0].qty, dec!(0.3));
        assert_eq!(fills[0].price, dec!(3201));
        assert_eq!(sim.resting_count(), 1);

        // Cancel removes the remainder
        let event = sim.cancel(&ClientOrderId::new("t2"), &Symbol::new("BTCUSDT"), now());
        assert!(matches!(event, ExecutionEvent::CancelOk { .. }));
        assert_eq!(sim.resting_count(), 0);
    }

    #[test]
    fn test_price_time_priority_across_resting_orders() {
        let mut sim = SimExecutor::default();
        sim.place(
            &request(
                "better-first",
                Side::Buy,
                dec!(1),
                dec!(101),
                TimeInForce::GoodUntilCancelled,
            ),
            now(),
        );
        sim.place(
            &request(
                "worse",
                Side::Buy,
                dec!(1),
                dec!(100),
                TimeInForce::GoodUntilCancelled,
            ),
            now(),
        );
        sim.place(
            &request(
                "better-second",
                Side::Buy,
                dec!(1),
                dec!(101),
                TimeInForce::GoodUntilCancelled,
            ),
            now(),
        );

        // 2.5 units of liquidity at 100: better price first, then seq
        let fills = sim.on_market_event(&trade_event(dec!(100), dec!(2.5), false, 2));
        let cids: Vec<&str> = fills.iter().map(|fill| fill.cid.as_str()).collect();
        assert_eq!(cids, vec!["better-first", "better-second", "worse"]);
        assert_eq!(fills[2].qty, dec!(0.5));
    }

    #[test]
    fn test_ioc_cancels_remainder_after_one_pass() {
        let mut sim = SimExecutor::default();
        sim.on_market_event(&top_event(dec!(49999), dec!(1), dec!(50000), dec!(0.4), 1));

        let events = sim.place(
            &request(
                "t6",
                Side::Buy,
                dec!(1.0),
                dec!(50000),
                TimeInForce::ImmediateOrCancel,
            ),
            now(),
        );

        assert!(matches!(events[0], ExecutionEvent::Accepted { .. }));
        let ExecutionEvent::Fill(fill) = &events[1] else {
            panic!("expected fill, got {:?}", events[1]);
        };
        assert_eq!(fill.qty, dec!(0.4));
        assert_eq!(fill.liquidity, Liquidity::Taker);
        assert!(matches!(events[2], ExecutionEvent::CancelOk { .. }));
        assert_eq!(sim.resting_count(), 0);
    }

    #[test]
    fn test_fok_rejects_without_full_liquidity() {
        let mut sim = SimExecutor::default();
        sim.on_market_event(&top_event(dec!(49999), dec!(1), dec!(50000), dec!(0.4), 1));

        let events = sim.place(
            &request(
                "fok",
                Side::Buy,
                dec!(1.0),
                dec!(50000),
                TimeInForce::FillOrKill,
            ),
            now(),
        );
        assert_eq!(events.len(), 1);
        let ExecutionEvent::Rejected { reason, .. } = &events[0] else {
            panic!("expected rejection");
        };
        assert_eq!(reason, "fok_insufficient_liquidity");

        // With enough liquidity the same order fully fills
        sim.on_market_event(&top_event(dec!(49999), dec!(1), dec!(50000), dec!(2.0), 2));
        let events = sim.place(
            &request(
                "fok2",
                Side::Buy,
                dec!(1.0),
                dec!(50000),
                TimeInForce::FillOrKill,
            ),
            now(),
        );
        assert!(matches!(events[1], ExecutionEvent::Fill(_)));
    }

    #[test]
    fn test_post_only_rejects_when_crossing() {
        let mut sim = SimExecutor::default();
        sim.on_market_event(&top_event(dec!(49999), dec!(1), dec!(50000), dec!(1), 1));

        let events = sim.place(
            &request(
                "po",
                Side::Buy,
                dec!(1),
                dec!(50000),
                TimeInForce::PostOnly,
            ),
            now(),
        );
        let ExecutionEvent::Rejected { reason, .. } = &events[0] else {
            panic!("expected rejection");
        };
        assert_eq!(reason, "post_only_would_cross");

        // Non-crossing post-only rests
        let events = sim.place(
            &request(
                "po2",
                Side::Buy,
                dec!(1),
                dec!(49998),
                TimeInForce::PostOnly,
            ),
            now(),
        );
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], ExecutionEvent::Accepted { .. }));
        assert_eq!(sim.resting_count(), 1);
    }

    #[test]
    fn test_market_order_crosses_with_slippage_or_rejects_without_book() {
        let mut sim = SimExecutor::new(SimConfig {
            slippage: dec!(0.5),
            ..SimConfig::default()
        });

        // No book yet: rejected
        let events = sim.place(&market_request("m1", Side::Buy, dec!(1)), now());
        let ExecutionEvent::Rejected { reason, .. } = &events[0] else {
            panic!("expected rejection");
        };
        assert_eq!(reason, "sim_no_book");

        sim.on_market_event(&top_event(dec!(99), dec!(2), dec!(101), dec!(2), 1));

        let events = sim.place(&market_request("m2", Side::Buy, dec!(1)), now());
        let ExecutionEvent::Fill(fill) = &events[1] else {
            panic!("expected fill");
        };
        assert_eq!(fill.price, dec!(101.5));
        assert_eq!(fill.liquidity, Liquidity::Taker);

        let events = sim.place(&market_request("m3", Side::Sell, dec!(1)), now());
        let ExecutionEvent::Fill(fill) = &events[1] else {
            panic!("expected fill");
        };
        assert_eq!(fill.price, dec!(98.5));
    }

    #[test]
    fn test_maker_taker_fee_rates() {
        let mut sim = SimExecutor::new(SimConfig {
            fee_rate_maker: dec!(0.001),
            fee_rate_taker: dec!(0.002),
            slippage: Decimal::ZERO,
        });

        // Taker fill via immediate cross
        sim.on_market_event(&top_event(dec!(99), dec!(1), dec!(100), dec!(1), 1));
        let events = sim.place(
            &request(
                "taker",
                Side::Buy,
                dec!(1),
                dec!(100),
                TimeInForce::ImmediateOrCancel,
            ),
            now(),
        );
        let ExecutionEvent::Fill(fill) = &events[1] else {
            panic!("expected fill");
        };
        assert_eq!(fill.fee, dec!(0.200));

        // Maker fill via resting order
        sim.place(
            &request(
                "maker",
                Side::Buy,
                dec!(1),
                dec!(98),
                TimeInForce::GoodUntilCancelled,
            ),
            now(),
        );
        let fills = sim.on_market_event(&trade_event(dec!(98), dec!(1), false, 2));
        assert_eq!(fills[0].fee, dec!(0.098));
    }

    #[test]
    fn test_limit_ioc_fills_against_last_price_on_tick_only_feed() {
        let mut sim = SimExecutor::default();
        sim.on_market_event(&trade_event(dec!(100), dec!(1), false, 1));

        let events = sim.place(
            &request(
                "tick",
                Side::Buy,
                dec!(1),
                dec!(100),
                TimeInForce::ImmediateOrCancel,
            ),
            now(),
        );
        let ExecutionEvent::Fill(fill) = &events[1] else {
            panic!("expected fill against last price");
        };
        assert_eq!(fill.price, dec!(100));
        assert_eq!(fill.qty, dec!(1));
    }

    #[test]
    fn test_determinism_same_inputs_same_fills() {
        let run = || {
            let mut sim = SimExecutor::default();
            let mut fills = Vec::new();
            sim.place(
                &request(
                    "a",
                    Side::Buy,
                    dec!(2),
                    dec!(100),
                    TimeInForce::GoodUntilCancelled,
                ),
                now(),
            );
            sim.place(
                &request(
                    "b",
                    Side::Buy,
                    dec!(1),
                    dec!(100),
                    TimeInForce::GoodUntilCancelled,
                ),
                now(),
            );
            for ts in 2..10 {
                fills.extend(sim.on_market_event(&trade_event(
                    dec!(100),
                    dec!(0.7),
                    false,
                    ts,
                )));
            }
            fills
        };

        assert_eq!(run(), run());
    }
}
