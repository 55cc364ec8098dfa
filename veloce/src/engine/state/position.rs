use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use veloce_instrument::{Side, Symbol};

/// Net position in one instrument.
///
/// `net_qty` is signed: positive long, negative short. `avg_entry_price` is
/// the volume-weighted entry of the open quantity; realized PnL accumulates
/// as closing fills land.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct Position {
    pub symbol: Symbol,
    pub net_qty: Decimal,
    pub avg_entry_price: Decimal,
    pub realized_pnl: Decimal,
}

impl Position {
    pub fn new_flat(symbol: Symbol) -> Self {
        Self {
            symbol,
            net_qty: Decimal::ZERO,
            avg_entry_price: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.net_qty.is_zero()
    }

    /// Unrealized PnL of the open quantity marked at `mark`.
    pub fn unrealized_pnl(&self, mark: Decimal) -> Decimal {
        (mark - self.avg_entry_price) * self.net_qty
    }

    /// Fold a fill into the position, returning the realized PnL delta it
    /// produced (zero for opening/increasing fills).
    pub fn apply_fill(&mut self, side: Side, qty: Decimal, price: Decimal) -> Decimal {
        let signed_qty = qty * Decimal::from(side.sign());

        // Same direction (or flat): increase position, re-weight entry
        if self.net_qty.is_zero() || (self.net_qty > Decimal::ZERO) == (signed_qty > Decimal::ZERO)
        {
            let new_net = self.net_qty + signed_qty;
            self.avg_entry_price = (self.avg_entry_price * self.net_qty.abs()
                + price * signed_qty.abs())
                / new_net.abs();
            self.net_qty = new_net;
            return Decimal::ZERO;
        }

        // Opposing direction: close up to the open quantity, realize PnL
        let close_qty = self.net_qty.abs().min(signed_qty.abs());
        let direction = if self.net_qty > Decimal::ZERO {
            Decimal::ONE
        } else {
            Decimal::NEGATIVE_ONE
        };
        let realized = (price - self.avg_entry_price) * close_qty * direction;
        self.realized_pnl += realized;

        let new_net = self.net_qty + signed_qty;
        if new_net.is_zero() {
            self.avg_entry_price = Decimal::ZERO;
        } else if (new_net > Decimal::ZERO) != (self.net_qty > Decimal::ZERO) {
            // Crossed through flat: residual opens at the fill price
            self.avg_entry_price = price;
        }
        self.net_qty = new_net;

        realized
    }
}
