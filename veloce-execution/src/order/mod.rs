use crate::error::ValidationError;
use derive_more::{Constructor, Display};
use id::{ClientOrderId, VenueOrderId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use veloce_data::time::TimestampNs;
use veloce_instrument::{Side, Symbol, Venue};

/// `Order` related identifiers.
pub mod id;

/// Execution kind of an order.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display,
)]
#[serde(rename_all = "snake_case")]
pub enum OrderKind {
    Market,
    Limit,
}

/// Time-in-force policy of an order.
///
/// `PostOnly` (venue alias "GTX") is distinct from `GoodUntilCancelled`: it
/// rests like GTC but is rejected outright if it would cross the book on
/// arrival.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display,
)]
#[serde(rename_all = "snake_case")]
pub enum TimeInForce {
    GoodUntilCancelled,
    ImmediateOrCancel,
    FillOrKill,
    PostOnly,
}

/// Request to open an order, as submitted by a strategy or an external
/// command.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, Constructor)]
pub struct OrderRequest {
    pub cid: ClientOrderId,
    pub symbol: Symbol,
    pub venue: Venue,
    pub side: Side,
    pub kind: OrderKind,
    pub tif: TimeInForce,
    pub qty: Decimal,
    /// Required for `Limit` orders, ignored for `Market`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,
    pub ts_created: TimestampNs,
}

impl OrderRequest {
    /// Validate the request shape before it reaches the risk gate.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.cid.is_empty() {
            return Err(ValidationError::EmptyClientOrderId);
        }
        if self.qty <= Decimal::ZERO {
            return Err(ValidationError::NonPositiveQuantity { qty: self.qty });
        }
        match self.kind {
            OrderKind::Limit => match self.price {
                Some(price) if price > Decimal::ZERO => {}
                _ => return Err(ValidationError::MissingLimitPrice),
            },
            OrderKind::Market => {
                if matches!(self.tif, TimeInForce::PostOnly) {
                    return Err(ValidationError::BadTifForMarket);
                }
            }
        }
        Ok(())
    }

    /// Notional value of the request (`price × qty`), using `reference_price`
    /// for market orders.
    pub fn notional(&self, reference_price: Decimal) -> Decimal {
        self.price.unwrap_or(reference_price) * self.qty
    }
}

/// Status of an order within the engine's lifecycle state machine.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display,
)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    PendingNew,
    Accepted,
    PartiallyFilled,
    Filled,
    PendingCancel,
    Cancelled,
    Rejected,
    Expired,
}

impl OrderStatus {
    /// Terminal statuses admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled
                | OrderStatus::Cancelled
                | OrderStatus::Rejected
                | OrderStatus::Expired
        )
    }

    /// Wire representation used on the NDJSON event stream.
    pub fn as_wire_str(&self) -> &'static str {
        match self {
            OrderStatus::PendingNew => "PENDING_NEW",
            OrderStatus::Accepted => "ACCEPTED",
            OrderStatus::PartiallyFilled => "PARTIALLY_FILLED",
            OrderStatus::Filled => "FILLED",
            OrderStatus::PendingCancel => "PENDING_CANCEL",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Rejected => "REJECTED",
            OrderStatus::Expired => "EXPIRED",
        }
    }
}

/// Aggregated state of a single client order.
///
/// One snapshot exists per [`ClientOrderId`] for the whole session; it is
/// mutated only by the owning order store and copied out for readers.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct OrderSnapshot {
    pub cid: ClientOrderId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub venue_order_id: Option<VenueOrderId>,
    pub symbol: Symbol,
    pub venue: Venue,
    pub side: Side,
    pub kind: OrderKind,
    pub tif: TimeInForce,
    pub order_qty: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit_price: Option<Decimal>,
    pub status: OrderStatus,
    pub executed_qty: Decimal,
    pub avg_price: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_reason: Option<String>,
    pub last_ts: TimestampNs,
}

impl OrderSnapshot {
    /// Construct the initial `PendingNew` snapshot from an accepted request.
    pub fn from_request(request: &OrderRequest) -> Self {
        Self {
            cid: request.cid.clone(),
            venue_order_id: None,
            symbol: request.symbol.clone(),
            venue: request.venue,
            side: request.side,
            kind: request.kind,
            tif: request.tif,
            order_qty: request.qty,
            limit_price: request.price,
            status: OrderStatus::PendingNew,
            executed_qty: Decimal::ZERO,
            avg_price: Decimal::ZERO,
            last_reason: None,
            last_ts: request.ts_created,
        }
    }

    /// Quantity still unexecuted.
    pub fn remaining_qty(&self) -> Decimal {
        self.order_qty - self.executed_qty
    }

    /// `true` when the executed quantity has reached the order quantity.
    pub fn is_fully_filled(&self) -> bool {
        self.executed_qty >= self.order_qty
    }

    /// Fold a fill into the aggregate `executed_qty` / `avg_price`.
    ///
    /// `avg_price` is the quantity-weighted average across all fills.
    pub fn apply_fill(&mut self, qty: Decimal, price: Decimal, ts: TimestampNs) {
        let executed_before = self.executed_qty;
        self.executed_qty += qty;
        self.avg_price = if self.executed_qty.is_zero() {
            Decimal::ZERO
        } else {
            (self.avg_price * executed_before + price * qty) / self.executed_qty
        };
        self.status = if self.is_fully_filled() {
            OrderStatus::Filled
        } else {
            OrderStatus::PartiallyFilled
        };
        self.last_ts = ts;
    }
}
