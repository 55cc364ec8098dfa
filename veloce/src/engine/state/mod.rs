use fnv::FnvHashMap;
use rust_decimal::Decimal;
use veloce_data::event::MarketEvent;
use veloce_instrument::Symbol;

use self::{account::AccountState, order::OrderStore, position::Position};

/// Session account balances and margin holds.
pub mod account;

/// Aggregated per-client-order state machine.
pub mod order;

/// Net positions and PnL arithmetic.
pub mod position;

/// Centralised mutable state owned by the engine loop.
///
/// Strictly single-writer: only the engine's dispatch thread mutates it;
/// other threads receive copies over the snapshot reply channel.
#[derive(Debug, Default)]
pub struct EngineState {
    pub orders: OrderStore,
    pub account: AccountState,
    positions: FnvHashMap<Symbol, Position>,
    marks: FnvHashMap<Symbol, Decimal>,
}

impl EngineState {
    pub fn new(account: AccountState) -> Self {
        Self {
            orders: OrderStore::new(),
            account,
            positions: FnvHashMap::default(),
            marks: FnvHashMap::default(),
        }
    }

    /// Update the last known mark price from a market event.
    pub fn update_mark(&mut self, event: &MarketEvent) {
        if let Some(price) = event.reference_price() {
            self.marks.insert(event.symbol.clone(), price);
        }
    }

    /// Last known mark price for `symbol`.
    pub fn mark(&self, symbol: &Symbol) -> Option<Decimal> {
        self.marks.get(symbol).copied()
    }

    /// Mutable position for `symbol`, created flat on first touch.
    pub fn position_mut(&mut self, symbol: &Symbol) -> &mut Position {
        self.positions
            .entry(symbol.clone())
            .or_insert_with(|| Position::new_flat(symbol.clone()))
    }

    /// Read-only position for `symbol`, if any fills have touched it.
    pub fn position(&self, symbol: &Symbol) -> Option<&Position> {
        self.positions.get(symbol)
    }

    /// Iterate all positions.
    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    /// Sum of unrealized PnL across positions, marked at the latest prices.
    ///
    /// Positions without a known mark contribute zero.
    pub fn unrealized_pnl(&self) -> Decimal {
        self.positions
            .values()
            .map(|position| {
                self.marks
                    .get(&position.symbol)
                    .map(|mark| position.unrealized_pnl(*mark))
                    .unwrap_or(Decimal::ZERO)
            })
            .sum()
    }

    /// Account equity: balance total plus unrealized PnL.
    pub fn equity(&self) -> Decimal {
        self.account.total() + self.unrealized_pnl()
    }
}
