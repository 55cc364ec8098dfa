use serde::{Deserialize, Serialize};
use veloce_data::time::TimestampNs;
use veloce_execution::{
    order::id::{ClientOrderId, VenueOrderId},
    venue::UserStreamEvent,
    Fill, OrderStatus,
};

/// Deterministic fill simulator.
pub mod sim;

/// Venue-backed live executor.
pub mod live;

/// Normalized outcome of an executor interaction, consumed by the engine
/// dispatch loop.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub enum ExecutionEvent {
    /// Order accepted by the venue (or simulator).
    Accepted {
        cid: ClientOrderId,
        venue_order_id: VenueOrderId,
        ts: TimestampNs,
    },
    /// Order rejected before resting.
    Rejected {
        cid: ClientOrderId,
        reason: String,
        ts: TimestampNs,
    },
    /// An execution against a live order.
    Fill(Fill),
    /// A cancel completed.
    CancelOk { cid: ClientOrderId, ts: TimestampNs },
    /// A cancel failed (eg/ unknown or already-terminal order on the venue).
    CancelFailed {
        cid: ClientOrderId,
        reason: String,
        ts: TimestampNs,
    },
    /// The venue expired a resting order.
    Expired { cid: ClientOrderId, ts: TimestampNs },
    /// Venue outcome unknown after retries; manual reconciliation required.
    ReconcileRequired { cid: ClientOrderId, ts: TimestampNs },
}

impl ExecutionEvent {
    /// Translate a venue user-stream event into the engine's execution event
    /// model. Balance updates and in-flight statuses carry no lifecycle
    /// transition and map to `None`.
    pub fn from_user_stream(event: UserStreamEvent) -> Option<Self> {
        match event {
            UserStreamEvent::Fill(fill) => Some(ExecutionEvent::Fill(fill)),
            UserStreamEvent::OrderUpdate {
                cid,
                venue_order_id,
                status,
                reason,
                ts,
            } => match status {
                OrderStatus::Accepted => Some(ExecutionEvent::Accepted {
                    cid,
                    venue_order_id,
                    ts,
                }),
                OrderStatus::Rejected => Some(ExecutionEvent::Rejected {
                    cid,
                    reason: reason.unwrap_or_else(|| "venue_reject".to_string()),
                    ts,
                }),
                OrderStatus::Cancelled => Some(ExecutionEvent::CancelOk { cid, ts }),
                OrderStatus::Expired => Some(ExecutionEvent::Expired { cid, ts }),
                // Fill-driven statuses arrive as explicit fills
                _ => None,
            },
            UserStreamEvent::BalanceUpdate { .. } => None,
        }
    }
}
