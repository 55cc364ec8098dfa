use crate::{
    balance::Balance,
    error::ExecutionError,
    order::{
        id::{ClientOrderId, VenueOrderId},
        OrderRequest, OrderStatus,
    },
    trade::Fill,
};
use async_trait::async_trait;
use derive_more::Constructor;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use veloce_data::{event::EventTypeTag, event::MarketEvent, time::TimestampNs};
use veloce_instrument::{Symbol, Venue};

/// Acknowledgement that a venue accepted an order, carrying the venue-assigned
/// identifier.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, Constructor)]
pub struct OrderAck {
    pub cid: ClientOrderId,
    pub venue_order_id: VenueOrderId,
    pub ts: TimestampNs,
}

/// Acknowledgement that a venue cancelled an order.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, Constructor)]
pub struct CancelAck {
    pub venue_order_id: VenueOrderId,
    pub ts: TimestampNs,
}

/// Specification of one public market data stream to subscribe to.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Deserialize, Serialize, Constructor)]
pub struct StreamSpec {
    pub venue: Venue,
    pub symbol: Symbol,
    pub event_type: EventTypeTag,
}

/// Account or order update delivered on the venue user stream.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UserStreamEvent {
    OrderUpdate {
        cid: ClientOrderId,
        venue_order_id: VenueOrderId,
        status: OrderStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        ts: TimestampNs,
    },
    Fill(Fill),
    BalanceUpdate {
        asset: SmolStr,
        balance: Balance,
        ts: TimestampNs,
    },
}

/// Capability a live executor uses to reach an exchange.
///
/// Symbol format conversion, authentication, rate limiting and reconnects are
/// adapter concerns; the core sees only normalized requests and events.
#[async_trait]
pub trait VenueAdapter: Send + Sync {
    /// Venue this adapter talks to.
    fn venue(&self) -> Venue;

    /// Place an order.
    ///
    /// A `Connectivity` error means the venue outcome is unknown: the caller
    /// must reconcile by `cid` via [`Self::lookup`] before retrying.
    async fn place(&self, request: OrderRequest) -> Result<OrderAck, ExecutionError>;

    /// Cancel an order by venue id.
    async fn cancel(&self, venue_order_id: VenueOrderId) -> Result<CancelAck, ExecutionError>;

    /// Look up the venue's view of an order by client id, used to reconcile
    /// uncertain placements.
    async fn lookup(&self, cid: ClientOrderId) -> Result<Option<OrderAck>, ExecutionError>;

    /// Subscribe to a public market data stream.
    async fn subscribe(
        &self,
        spec: StreamSpec,
    ) -> Result<BoxStream<'static, MarketEvent>, ExecutionError>;

    /// Subscribe to the private account/order update stream.
    async fn subscribe_user_stream(
        &self,
    ) -> Result<BoxStream<'static, UserStreamEvent>, ExecutionError>;

    /// Most recent venue-reported time, used for clock skew tracking.
    async fn venue_time(&self) -> Result<TimestampNs, ExecutionError>;
}
