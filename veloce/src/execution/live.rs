use crate::execution::ExecutionEvent;
use futures::{stream::FuturesUnordered, StreamExt};
use std::{collections::HashSet, sync::Arc, time::Duration};
use tracing::{debug, warn};
use veloce_data::time::TimestampNs;
use veloce_execution::{
    error::ExecutionError,
    order::{
        id::{ClientOrderId, VenueOrderId},
        OrderRequest,
    },
    venue::VenueAdapter,
};

/// Configuration for constructing a [`LiveExecutor`] via the new() constructor
/// method.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct LiveConfig {
    /// Maximum placement retries after an uncertain outcome.
    pub max_retries: u32,
    /// Base delay of the exponential retry backoff.
    pub backoff_base: Duration,
    /// Deadline applied to every venue RPC.
    pub rpc_timeout: Duration,
    /// Venue/local clock skew above which a warning is surfaced.
    pub skew_warn_threshold: Duration,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base: Duration::from_millis(250),
            rpc_timeout: Duration::from_secs(10),
            skew_warn_threshold: Duration::from_secs(1),
        }
    }
}

type PendingRpc = futures::future::BoxFuture<'static, Vec<ExecutionEvent>>;

/// Forwards orders to a [`VenueAdapter`] and translates venue responses back
/// into [`ExecutionEvent`]s for the engine loop.
///
/// Guarantees:
/// * **At-most-once placement**: an uncertain outcome (timeout, dropped
///   connection) is reconciled by client order id before any retry; if still
///   unknown after the retry budget, a `ReconcileRequired` event is emitted
///   and the order is left pending.
/// * **Idempotent cancels**: duplicate cancels for the same order collapse
///   while one is in flight, and "unknown order" cancel errors are surfaced
///   as failures for the engine to swallow on terminal orders.
pub struct LiveExecutor {
    adapter: Arc<dyn VenueAdapter>,
    config: LiveConfig,
    in_flight: FuturesUnordered<PendingRpc>,
    cancels_in_flight: HashSet<ClientOrderId>,
    /// Most recent venue-minus-local clock skew observation.
    last_skew_ns: i64,
}

impl std::fmt::Debug for LiveExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveExecutor")
            .field("venue", &self.adapter.venue())
            .field("in_flight", &self.in_flight.len())
            .field("last_skew_ns", &self.last_skew_ns)
            .finish()
    }
}

impl LiveExecutor {
    /// Constructs a new [`LiveExecutor`] over the provided adapter.
    pub fn new(adapter: Arc<dyn VenueAdapter>, config: LiveConfig) -> Self {
        Self {
            adapter,
            config,
            in_flight: FuturesUnordered::new(),
            cancels_in_flight: HashSet::new(),
            last_skew_ns: 0,
        }
    }

    /// Number of venue RPCs currently in flight.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Latest observed venue-minus-local clock skew in nanoseconds.
    pub fn last_skew_ns(&self) -> i64 {
        self.last_skew_ns
    }

    /// Enqueue an order placement. The RPC (with retries and reconciliation)
    /// runs when the engine polls [`Self::next_events`] between events.
    pub fn submit_place(&mut self, request: OrderRequest, now: TimestampNs) {
        let adapter = Arc::clone(&self.adapter);
        let config = self.config;

        self.in_flight.push(Box::pin(async move {
            place_with_retries(adapter, config, request, now).await
        }));
    }

    /// Enqueue an order cancel, collapsing duplicates while one is in flight.
    pub fn submit_cancel(
        &mut self,
        cid: ClientOrderId,
        venue_order_id: VenueOrderId,
        now: TimestampNs,
    ) {
        if !self.cancels_in_flight.insert(cid.clone()) {
            debug!(%cid, "cancel already in flight, collapsing duplicate");
            return;
        }

        let adapter = Arc::clone(&self.adapter);
        let timeout = self.config.rpc_timeout;
        self.in_flight.push(Box::pin(async move {
            let outcome = tokio::time::timeout(timeout, adapter.cancel(venue_order_id)).await;
            match outcome {
                Ok(Ok(ack)) => vec![ExecutionEvent::CancelOk {
                    cid,
                    ts: ack.ts,
                }],
                Ok(Err(error)) => vec![ExecutionEvent::CancelFailed {
                    cid,
                    reason: error.to_string(),
                    ts: now,
                }],
                Err(_) => vec![ExecutionEvent::CancelFailed {
                    cid,
                    reason: ExecutionError::Connectivity(
                        veloce_execution::error::ConnectivityError::Timeout,
                    )
                    .to_string(),
                    ts: now,
                }],
            }
        }));
    }

    /// Await the next completed venue RPC, returning its events.
    ///
    /// Returns `None` when nothing is in flight.
    pub async fn next_events(&mut self) -> Option<Vec<ExecutionEvent>> {
        let events = self.in_flight.next().await?;
        for event in &events {
            if let ExecutionEvent::CancelOk { cid, .. } | ExecutionEvent::CancelFailed { cid, .. } =
                event
            {
                self.cancels_in_flight.remove(cid);
            }
        }
        Some(events)
    }

    /// Drain every in-flight RPC, bounded by `deadline`. RPCs still pending
    /// at the deadline are reported as `ReconcileRequired` by their own
    /// retry logic on the venue side; here we simply stop waiting.
    pub async fn drain(&mut self, deadline: Duration) -> Vec<ExecutionEvent> {
        let mut drained = Vec::new();
        let _ = tokio::time::timeout(deadline, async {
            while let Some(events) = self.next_events().await {
                drained.extend(events);
            }
        })
        .await;
        drained
    }

    /// Sample venue time and update the skew estimate, warning when it
    /// exceeds the configured threshold.
    pub async fn track_skew(&mut self, local_now: TimestampNs) -> Option<i64> {
        let venue_time = self.adapter.venue_time().await.ok()?;
        let skew_ns = venue_time.as_nanos() - local_now.as_nanos();
        self.last_skew_ns = skew_ns;

        if skew_ns.unsigned_abs() > self.config.skew_warn_threshold.as_nanos() as u64 {
            warn!(
                venue = %self.adapter.venue(),
                skew_ms = skew_ns / 1_000_000,
                "venue clock skew above threshold"
            );
        }
        Some(skew_ns)
    }
}

/// Place an order with at-most-once semantics: uncertain outcomes reconcile
/// by client order id before retrying, and the retry budget is bounded.
async fn place_with_retries(
    adapter: Arc<dyn VenueAdapter>,
    config: LiveConfig,
    request: OrderRequest,
    now: TimestampNs,
) -> Vec<ExecutionEvent> {
    let cid = request.cid.clone();

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let backoff = config.backoff_base * 2u32.saturating_pow(attempt - 1);
            tokio::time::sleep(backoff).await;
        }

        let outcome = tokio::time::timeout(config.rpc_timeout, adapter.place(request.clone())).await;
        let error = match outcome {
            Ok(Ok(ack)) => {
                return vec![ExecutionEvent::Accepted {
                    cid,
                    venue_order_id: ack.venue_order_id,
                    ts: ack.ts,
                }];
            }
            Ok(Err(error)) if !error.is_uncertain() => {
                return vec![ExecutionEvent::Rejected {
                    cid,
                    reason: error.to_string(),
                    ts: now,
                }];
            }
            Ok(Err(error)) => error,
            Err(_) => ExecutionError::Connectivity(
                veloce_execution::error::ConnectivityError::Timeout,
            ),
        };

        // Uncertain outcome: the venue may or may not have the order.
        // Reconcile by cid before considering a retry.
        debug!(%cid, attempt, %error, "uncertain placement, reconciling by cid");
        match tokio::time::timeout(config.rpc_timeout, adapter.lookup(cid.clone())).await {
            Ok(Ok(Some(ack))) => {
                return vec![ExecutionEvent::Accepted {
                    cid,
                    venue_order_id: ack.venue_order_id,
                    ts: ack.ts,
                }];
            }
            Ok(Ok(None)) => continue,
            Ok(Err(_)) | Err(_) => continue,
        }
    }

    warn!(%cid, "placement outcome unknown after retries, reconcile required");
    vec![ExecutionEvent::ReconcileRequired { cid, ts: now }]
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::stream::BoxStream;
    use parking_lot::Mutex;
    use rust_decimal_macros::dec;
    use veloce_data::event::MarketEvent;
    use veloce_execution::{
        error::ConnectivityError,
        order::{OrderKind, TimeInForce},
        venue::{CancelAck, OrderAck, StreamSpec, UserStreamEvent},
    };
    use veloce_instrument::{Side, Symbol, Venue};

    /// Scripted adapter: pops one outcome per call.
    struct ScriptedAdapter {
        place_outcomes: Mutex<Vec<Result<OrderAck, ExecutionError>>>,
        lookup_outcomes: Mutex<Vec<Result<Option<OrderAck>, ExecutionError>>>,
        cancel_outcomes: Mutex<Vec<Result<CancelAck, ExecutionError>>>,
        cancel_calls: Mutex<u32>,
    }

    impl ScriptedAdapter {
        fn new() -> Self {
            Self {
                place_outcomes: Mutex::new(Vec::new()),
                lookup_outcomes: Mutex::new(Vec::new()),
                cancel_outcomes: Mutex::new(Vec::new()),
                cancel_calls: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl VenueAdapter for ScriptedAdapter {
        fn venue(&self) -> Venue {
            Venue::Binance
        }

        async fn place(&self, _: OrderRequest) -> Result<OrderAck, ExecutionError> {
            self.place_outcomes.lock().remove(0)
        }

        async fn cancel(&self, _: VenueOrderId) -> Result<CancelAck, ExecutionError> {
            *self.cancel_calls.lock() += 1;
            self.cancel_outcomes.lock().remove(0)
        }

        async fn lookup(&self, _: ClientOrderId) -> Result<Option<OrderAck>, ExecutionError> {
            self.lookup_outcomes.lock().remove(0)
        }

        async fn subscribe(
            &self,
            _: StreamSpec,
        ) -> Result<BoxStream<'static, MarketEvent>, ExecutionError> {
            Ok(Box::pin(futures::stream::empty()))
        }

        async fn subscribe_user_stream(
            &self,
        ) -> Result<BoxStream<'static, UserStreamEvent>, ExecutionError> {
            Ok(Box::pin(futures::stream::empty()))
        }

        async fn venue_time(&self) -> Result<TimestampNs, ExecutionError> {
            Ok(TimestampNs::from_secs(100))
        }
    }

    fn request(cid: &str) -> OrderRequest {
        OrderRequest {
            cid: ClientOrderId::new(cid),
            symbol: Symbol::new("BTCUSDT"),
            venue: Venue::Binance,
            side: Side::Buy,
            kind: OrderKind::Limit,
            tif: TimeInForce::GoodUntilCancelled,
            qty: dec!(1),
            price: Some(dec!(100)),
            ts_created: TimestampNs::ZERO,
        }
    }

    fn ack(cid: &str, venue_id: &str) -> OrderAck {
        OrderAck::new(
            ClientOrderId::new(cid),
            VenueOrderId::new(venue_id),
            TimestampNs::from_millis(5),
        )
    }

    fn fast_config() -> LiveConfig {
        LiveConfig {
            max_retries: 3,
            backoff_base: Duration::from_millis(1),
            rpc_timeout: Duration::from_millis(100),
            skew_warn_threshold: Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn test_place_success_emits_accept() {
        let adapter = Arc::new(ScriptedAdapter::new());
        adapter.place_outcomes.lock().push(Ok(ack("t1", "v1")));

        let mut executor = LiveExecutor::new(adapter, fast_config());
        executor.submit_place(request("t1"), TimestampNs::ZERO);

        let events = executor.next_events().await.unwrap();
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            ExecutionEvent::Accepted { cid, venue_order_id, .. }
                if cid.as_str() == "t1" && venue_order_id.as_str() == "v1"
        ));
    }

    #[tokio::test]
    async fn test_uncertain_place_reconciles_before_retry() {
        let adapter = Arc::new(ScriptedAdapter::new());
        // First attempt drops; reconcile finds the order on the venue
        adapter
            .place_outcomes
            .lock()
            .push(Err(ExecutionError::Connectivity(
                ConnectivityError::Disconnected,
            )));
        adapter.lookup_outcomes.lock().push(Ok(Some(ack("t1", "v9"))));

        let mut executor = LiveExecutor::new(adapter.clone(), fast_config());
        executor.submit_place(request("t1"), TimestampNs::ZERO);

        let events = executor.next_events().await.unwrap();
        assert!(matches!(
            &events[0],
            ExecutionEvent::Accepted { venue_order_id, .. } if venue_order_id.as_str() == "v9"
        ));
        // No second place call was made: at-most-once held
        assert!(adapter.place_outcomes.lock().is_empty());
    }

    #[tokio::test]
    async fn test_exhausted_retries_require_reconcile() {
        let adapter = Arc::new(ScriptedAdapter::new());
        for _ in 0..4 {
            adapter
                .place_outcomes
                .lock()
                .push(Err(ExecutionError::Connectivity(ConnectivityError::Timeout)));
            adapter.lookup_outcomes.lock().push(Ok(None));
        }

        let mut executor = LiveExecutor::new(adapter, fast_config());
        executor.submit_place(request("t1"), TimestampNs::from_millis(7));

        let events = executor.next_events().await.unwrap();
        assert_eq!(
            events,
            vec![ExecutionEvent::ReconcileRequired {
                cid: ClientOrderId::new("t1"),
                ts: TimestampNs::from_millis(7),
            }]
        );
    }

    #[tokio::test]
    async fn test_venue_reject_is_terminal_not_retried() {
        let adapter = Arc::new(ScriptedAdapter::new());
        adapter.place_outcomes.lock().push(Err(ExecutionError::VenueReject {
            reason: "insufficient margin".to_string(),
        }));

        let mut executor = LiveExecutor::new(adapter.clone(), fast_config());
        executor.submit_place(request("t1"), TimestampNs::ZERO);

        let events = executor.next_events().await.unwrap();
        assert!(matches!(&events[0], ExecutionEvent::Rejected { reason, .. }
            if reason.contains("insufficient margin")));
        assert!(adapter.place_outcomes.lock().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_cancels_collapse() {
        let adapter = Arc::new(ScriptedAdapter::new());
        adapter
            .cancel_outcomes
            .lock()
            .push(Ok(CancelAck::new(VenueOrderId::new("v1"), TimestampNs::ZERO)));

        let mut executor = LiveExecutor::new(adapter.clone(), fast_config());
        executor.submit_cancel(
            ClientOrderId::new("t1"),
            VenueOrderId::new("v1"),
            TimestampNs::ZERO,
        );
        executor.submit_cancel(
            ClientOrderId::new("t1"),
            VenueOrderId::new("v1"),
            TimestampNs::ZERO,
        );
        assert_eq!(executor.in_flight_count(), 1);

        let events = executor.next_events().await.unwrap();
        assert!(matches!(events[0], ExecutionEvent::CancelOk { .. }));
        assert_eq!(*adapter.cancel_calls.lock(), 1);

        // After completion a new cancel may be issued again
        adapter
            .cancel_outcomes
            .lock()
            .push(Err(ExecutionError::UnknownOrder(VenueOrderId::new("v1"))));
        executor.submit_cancel(
            ClientOrderId::new("t1"),
            VenueOrderId::new("v1"),
            TimestampNs::ZERO,
        );
        let events = executor.next_events().await.unwrap();
        assert!(matches!(events[0], ExecutionEvent::CancelFailed { .. }));
    }

    #[tokio::test]
    async fn test_track_skew() {
        let adapter = Arc::new(ScriptedAdapter::new());
        let mut executor = LiveExecutor::new(adapter, fast_config());

        // Venue reports t=100s, local t=98s: skew 2s
        let skew = executor
            .track_skew(TimestampNs::from_secs(98))
            .await
            .unwrap();
        assert_eq!(skew, 2_000_000_000);
        assert_eq!(executor.last_skew_ns(), 2_000_000_000);
    }
}
