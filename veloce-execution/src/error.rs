use crate::order::id::{ClientOrderId, VenueOrderId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Request-shape errors caught before an order reaches the risk gate.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, Error)]
pub enum ValidationError {
    #[error("client order id must be non-empty")]
    EmptyClientOrderId,

    #[error("duplicate client order id: {0}")]
    DuplicateClientOrderId(ClientOrderId),

    #[error("order quantity must be positive, got {qty}")]
    NonPositiveQuantity { qty: Decimal },

    #[error("limit orders require a positive price")]
    MissingLimitPrice,

    #[error("post-only is not a valid time-in-force for market orders")]
    BadTifForMarket,

    #[error("unknown symbol: {0}")]
    UnknownSymbol(String),
}

impl ValidationError {
    /// Snake_case tag used on the NDJSON event stream.
    pub fn tag(&self) -> &'static str {
        match self {
            ValidationError::EmptyClientOrderId => "bad_params",
            ValidationError::DuplicateClientOrderId(_) => "duplicate_client_id",
            ValidationError::NonPositiveQuantity { .. } => "bad_params",
            ValidationError::MissingLimitPrice => "bad_params",
            ValidationError::BadTifForMarket => "bad_tif_for_market",
            ValidationError::UnknownSymbol(_) => "unknown_symbol",
        }
    }
}

/// Balance arithmetic failures. Always indicate a rejected operation, never a
/// mutated balance.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, Error)]
pub enum BalanceError {
    #[error("insufficient free balance: requested {requested}, free {free}")]
    InsufficientFree { requested: Decimal, free: Decimal },

    #[error("insufficient locked balance: requested {requested}, locked {locked}")]
    InsufficientLocked { requested: Decimal, locked: Decimal },
}

/// Transport-level failures when talking to a venue.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, Error)]
pub enum ConnectivityError {
    #[error("venue request timed out")]
    Timeout,

    #[error("venue connection dropped")]
    Disconnected,
}

/// All errors an executor can surface.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, Error)]
pub enum ExecutionError {
    #[error("connectivity: {0}")]
    Connectivity(#[from] ConnectivityError),

    #[error("venue rejected order: {reason}")]
    VenueReject { reason: String },

    #[error("venue does not know order: {0}")]
    UnknownOrder(VenueOrderId),

    #[error("no order book known for the instrument")]
    NoBook,

    #[error("simulated execution: {0}")]
    Simulated(String),
}

impl ExecutionError {
    /// `true` for failures where the venue outcome is unknown and the order
    /// must be reconciled before a retry is safe.
    pub fn is_uncertain(&self) -> bool {
        matches!(self, ExecutionError::Connectivity(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_tags() {
        assert_eq!(
            ValidationError::DuplicateClientOrderId(ClientOrderId::new("dup")).tag(),
            "duplicate_client_id"
        );
        assert_eq!(ValidationError::BadTifForMarket.tag(), "bad_tif_for_market");
        assert_eq!(
            ValidationError::UnknownSymbol("XYZ".into()).tag(),
            "unknown_symbol"
        );
    }

    #[test]
    fn test_uncertain_execution_errors() {
        assert!(ExecutionError::Connectivity(ConnectivityError::Timeout).is_uncertain());
        assert!(
            !ExecutionError::VenueReject {
                reason: "margin".into()
            }
            .is_uncertain()
        );
    }
}
