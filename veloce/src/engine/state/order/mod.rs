use indexmap::IndexMap;
use fnv::FnvHashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use veloce_data::time::TimestampNs;
use veloce_execution::{
    error::ValidationError,
    order::{
        id::{ClientOrderId, VenueOrderId},
        OrderRequest, OrderSnapshot, OrderStatus,
    },
};

/// Fatal order store errors. Any [`OrderStoreError::IllegalTransition`]
/// indicates a broken lifecycle invariant and terminates the engine.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Error)]
pub enum OrderStoreError {
    #[error("illegal order transition for {cid}: {from} on input '{input}'")]
    IllegalTransition {
        cid: ClientOrderId,
        from: OrderStatus,
        input: &'static str,
    },

    #[error("unknown client order id: {0}")]
    UnknownOrder(ClientOrderId),
}

/// Result of applying a fill to the store.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum FillOutcome {
    /// Fill applied; carries the updated snapshot.
    Applied(OrderSnapshot),
    /// Fill arrived after a terminal cancel and was dropped.
    Stale,
}

/// Result of a cancel request.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub enum CancelOutcome {
    /// Order moved to `PendingCancel`.
    Requested,
    /// Order already terminal; cancel is an idempotent no-op.
    AlreadyTerminal,
    /// A cancel is already in flight; duplicate collapsed.
    AlreadyPending,
    /// Order has not been acknowledged yet; caller should retry after ack.
    NotAcked,
}

/// Counters tracking tolerated anomalies.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default, Deserialize, Serialize)]
pub struct OrderStoreMetrics {
    pub stale_fills: u64,
    pub duplicate_submits: u64,
}

/// Synchronous store owning every [`OrderSnapshot`] of the session.
///
/// Orders are keyed by [`ClientOrderId`] with a secondary
/// [`VenueOrderId`] index, and are retained after reaching a terminal status
/// for audit. All mutation happens through the lifecycle operations below;
/// external readers obtain copies via [`Self::query`] / [`Self::snapshot`].
#[derive(Debug, Clone, Default)]
pub struct OrderStore {
    orders: IndexMap<ClientOrderId, OrderSnapshot>,
    by_venue_id: FnvHashMap<VenueOrderId, ClientOrderId>,
    metrics: OrderStoreMetrics,
}

impl OrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn metrics(&self) -> OrderStoreMetrics {
        self.metrics
    }

    /// Number of orders in a non-terminal status.
    pub fn open_count(&self) -> usize {
        self.orders
            .values()
            .filter(|order| !order.status.is_terminal())
            .count()
    }

    /// Record a submitted request as `PendingNew`.
    ///
    /// Rejects duplicate client order ids without touching the existing
    /// record.
    pub fn submit(&mut self, request: &OrderRequest) -> Result<OrderSnapshot, ValidationError> {
        if self.orders.contains_key(&request.cid) {
            self.metrics.duplicate_submits += 1;
            warn!(cid = %request.cid, "rejecting duplicate client order id");
            return Err(ValidationError::DuplicateClientOrderId(request.cid.clone()));
        }

        let snapshot = OrderSnapshot::from_request(request);
        self.orders.insert(request.cid.clone(), snapshot.clone());
        Ok(snapshot)
    }

    /// Transition `PendingNew -> Accepted`, recording the venue id when known.
    pub fn on_accept(
        &mut self,
        cid: &ClientOrderId,
        venue_order_id: Option<VenueOrderId>,
        ts: TimestampNs,
    ) -> Result<OrderSnapshot, OrderStoreError> {
        let order = self.order_mut(cid)?;
        if order.status != OrderStatus::PendingNew {
            return Err(OrderStoreError::IllegalTransition {
                cid: cid.clone(),
                from: order.status,
                input: "accept",
            });
        }
        order.status = OrderStatus::Accepted;
        order.last_ts = ts;
        order.venue_order_id = venue_order_id.clone();
        let snapshot = order.clone();
        if let Some(venue_id) = venue_order_id {
            self.by_venue_id.insert(venue_id, cid.clone());
        }
        Ok(snapshot)
    }

    /// Transition `PendingNew -> Rejected`.
    pub fn on_reject(
        &mut self,
        cid: &ClientOrderId,
        reason: impl Into<String>,
        ts: TimestampNs,
    ) -> Result<OrderSnapshot, OrderStoreError> {
        let order = self.order_mut(cid)?;
        if order.status != OrderStatus::PendingNew {
            return Err(OrderStoreError::IllegalTransition {
                cid: cid.clone(),
                from: order.status,
                input: "reject",
            });
        }
        order.status = OrderStatus::Rejected;
        order.last_reason = Some(reason.into());
        order.last_ts = ts;
        Ok(order.clone())
    }

    /// Apply a fill, updating `executed_qty` / `avg_price` atomically before
    /// any downstream event is emitted.
    ///
    /// Fills landing on a `Cancelled` order are tolerated as stale venue
    /// races and dropped with a metric increment; fills on any other terminal
    /// status are lifecycle violations.
    pub fn on_fill(
        &mut self,
        cid: &ClientOrderId,
        qty: Decimal,
        price: Decimal,
        ts: TimestampNs,
    ) -> Result<FillOutcome, OrderStoreError> {
        let order = self.order_mut(cid)?;
        match order.status {
            OrderStatus::Accepted | OrderStatus::PartiallyFilled | OrderStatus::PendingCancel => {
                if qty > order.remaining_qty() {
                    return Err(OrderStoreError::IllegalTransition {
                        cid: cid.clone(),
                        from: order.status,
                        input: "fill exceeding remaining quantity",
                    });
                }
                order.apply_fill(qty, price, ts);
                Ok(FillOutcome::Applied(order.clone()))
            }
            OrderStatus::Cancelled => {
                self.metrics.stale_fills += 1;
                debug!(%cid, "dropping stale fill for cancelled order");
                Ok(FillOutcome::Stale)
            }
            from => Err(OrderStoreError::IllegalTransition {
                cid: cid.clone(),
                from,
                input: "fill",
            }),
        }
    }

    /// Request a cancel. Idempotent on terminal and pending-cancel orders.
    pub fn on_cancel_request(
        &mut self,
        cid: &ClientOrderId,
        ts: TimestampNs,
    ) -> Result<CancelOutcome, OrderStoreError> {
        let order = self.order_mut(cid)?;
        match order.status {
            OrderStatus::Accepted | OrderStatus::PartiallyFilled => {
                order.status = OrderStatus::PendingCancel;
                order.last_ts = ts;
                Ok(CancelOutcome::Requested)
            }
            OrderStatus::PendingCancel => Ok(CancelOutcome::AlreadyPending),
            OrderStatus::PendingNew => Ok(CancelOutcome::NotAcked),
            _ => Ok(CancelOutcome::AlreadyTerminal),
        }
    }

    /// Transition `PendingCancel -> Cancelled`.
    pub fn on_cancel_ok(
        &mut self,
        cid: &ClientOrderId,
        ts: TimestampNs,
    ) -> Result<OrderSnapshot, OrderStoreError> {
        let order = self.order_mut(cid)?;
        match order.status {
            OrderStatus::PendingCancel => {
                order.status = OrderStatus::Cancelled;
                order.last_ts = ts;
                Ok(order.clone())
            }
            from => Err(OrderStoreError::IllegalTransition {
                cid: cid.clone(),
                from,
                input: "cancel_ok",
            }),
        }
    }

    /// A venue cancel failed; roll `PendingCancel` back to its executable
    /// status so fills keep applying.
    pub fn on_cancel_failed(
        &mut self,
        cid: &ClientOrderId,
        ts: TimestampNs,
    ) -> Result<OrderSnapshot, OrderStoreError> {
        let order = self.order_mut(cid)?;
        match order.status {
            OrderStatus::PendingCancel => {
                order.status = if order.executed_qty.is_zero() {
                    OrderStatus::Accepted
                } else {
                    OrderStatus::PartiallyFilled
                };
                order.last_ts = ts;
                Ok(order.clone())
            }
            from => Err(OrderStoreError::IllegalTransition {
                cid: cid.clone(),
                from,
                input: "cancel_failed",
            }),
        }
    }

    /// Transition `Accepted | PartiallyFilled -> Expired`.
    pub fn on_expire(
        &mut self,
        cid: &ClientOrderId,
        ts: TimestampNs,
    ) -> Result<OrderSnapshot, OrderStoreError> {
        let order = self.order_mut(cid)?;
        match order.status {
            OrderStatus::Accepted | OrderStatus::PartiallyFilled => {
                order.status = OrderStatus::Expired;
                order.last_ts = ts;
                Ok(order.clone())
            }
            from => Err(OrderStoreError::IllegalTransition {
                cid: cid.clone(),
                from,
                input: "expire",
            }),
        }
    }

    /// Copy out the snapshot for `cid`, if tracked.
    pub fn query(&self, cid: &ClientOrderId) -> Option<OrderSnapshot> {
        self.orders.get(cid).cloned()
    }

    /// Copy out the snapshot mapped to a venue order id, if tracked.
    pub fn query_by_venue_id(&self, venue_order_id: &VenueOrderId) -> Option<OrderSnapshot> {
        self.by_venue_id
            .get(venue_order_id)
            .and_then(|cid| self.orders.get(cid))
            .cloned()
    }

    /// Copy out every snapshot, in submission order.
    pub fn snapshot(&self) -> Vec<OrderSnapshot> {
        self.orders.values().cloned().collect()
    }

    fn order_mut(&mut self, cid: &ClientOrderId) -> Result<&mut OrderSnapshot, OrderStoreError> {
        self.orders
            .get_mut(cid)
            .ok_or_else(|| OrderStoreError::UnknownOrder(cid.clone()))
    }
}
