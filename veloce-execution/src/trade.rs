use crate::order::id::ClientOrderId;
use derive_more::{Constructor, Display};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use veloce_data::time::TimestampNs;
use veloce_instrument::{Side, Symbol};

/// Whether the client order rested (`Maker`) or aggressed (`Taker`) when the
/// fill occurred. Determines the fee rate applied.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display,
)]
#[serde(rename_all = "snake_case")]
pub enum Liquidity {
    Maker,
    Taker,
}

/// Immutable record of one execution against a client order.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, Constructor)]
pub struct Fill {
    pub cid: ClientOrderId,
    pub symbol: Symbol,
    pub side: Side,
    pub qty: Decimal,
    pub price: Decimal,
    pub fee: Decimal,
    pub liquidity: Liquidity,
    pub ts: TimestampNs,
}

impl Fill {
    /// Quote-denominated value of the fill, excluding fees.
    pub fn gross_value(&self) -> Decimal {
        self.price * self.qty
    }
}
