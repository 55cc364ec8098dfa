use crate::strategy::runtime::{StrategyMetrics, StrategyStatus};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{json, Value};
use smol_str::SmolStr;
use tracing::error;
use veloce_data::{event::MarketEvent, event::MarketEventKind, time::TimestampNs};
use veloce_execution::{balance::Balance, Fill, OrderSnapshot};
use veloce_instrument::{Symbol, Venue};

/// One event on the engine's outbound NDJSON stream.
///
/// Each variant maps to a `type` tag; the emitter adds the `ts_ns` field and
/// serializes one JSON object per line. Optional fields are omitted rather
/// than serialized as null.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputEvent {
    /// Market data mirror (`trade`, `book_top`, `book_delta`, `kline`,
    /// `market` for coarse price ticks).
    Market(MarketEvent),
    OrderReceived {
        cid: SmolStr,
    },
    CancelReceived {
        cid: SmolStr,
    },
    QueryReceived {
        query: String,
    },
    StrategyCommandReceived {
        command: String,
    },
    /// Delta update of one order's lifecycle state.
    OrderUpdate {
        snapshot: OrderSnapshot,
        reason: Option<String>,
    },
    /// Full snapshot reply to a QUERY.
    OrderState {
        snapshot: OrderSnapshot,
    },
    Fill(Fill),
    Account {
        balances: Vec<AccountBalanceEntry>,
        positions: Vec<AccountPositionEntry>,
    },
    SubscriptionStatus {
        venue: Venue,
        symbol: Symbol,
        event_type: String,
        subscribed: bool,
    },
    Strategy {
        /// Suffix of the `strategy_` tag family (eg/ "loaded", "started").
        action: &'static str,
        payload: StrategyEventPayload,
    },
    RiskTriggered {
        reason: String,
    },
    KillSwitchEngaged {
        reason: String,
    },
    OrderReconcileRequired {
        cid: SmolStr,
    },
    EngineStarted {
        version: String,
    },
    EngineStopped {
        commands_processed: u64,
    },
    Error {
        message: String,
        tag: Option<&'static str>,
        line_no: Option<u64>,
    },
}

/// Balance line inside an `account` event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountBalanceEntry {
    pub asset: SmolStr,
    pub free: Decimal,
    pub locked: Decimal,
}

impl AccountBalanceEntry {
    pub fn new(asset: &SmolStr, balance: &Balance) -> Self {
        Self {
            asset: asset.clone(),
            free: balance.free,
            locked: balance.locked,
        }
    }
}

/// Position line inside an `account` event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountPositionEntry {
    pub symbol: Symbol,
    pub net_qty: Decimal,
    pub avg_entry_price: Decimal,
    pub realized_pnl: Decimal,
}

/// Payload of the `strategy_*` event family.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StrategyEventPayload {
    Status(StrategyStatus),
    StatusAll { strategies: Vec<StrategyStatus> },
    List { types: Vec<SmolStr> },
    Metrics { id: SmolStr, metrics: StrategyMetrics },
    MetricsSummary { strategies: Vec<StrategyStatus> },
    Message { message: String },
}

impl OutputEvent {
    /// The `type` tag this event serializes with.
    pub fn tag(&self) -> String {
        match self {
            OutputEvent::Market(event) => match event.kind {
                MarketEventKind::Trade(_) => "trade".to_string(),
                MarketEventKind::BookTop(_) => "book_top".to_string(),
                MarketEventKind::BookDelta(_) => "book_delta".to_string(),
                MarketEventKind::Kline(_) => "kline".to_string(),
                MarketEventKind::PriceTick(_) => "market".to_string(),
            },
            OutputEvent::OrderReceived { .. } => "order_received".to_string(),
            OutputEvent::CancelReceived { .. } => "cancel_received".to_string(),
            OutputEvent::QueryReceived { .. } => "query_received".to_string(),
            OutputEvent::StrategyCommandReceived { .. } => {
                "strategy_command_received".to_string()
            }
            OutputEvent::OrderUpdate { .. } => "order_update".to_string(),
            OutputEvent::OrderState { .. } => "order_state".to_string(),
            OutputEvent::Fill(_) => "fill".to_string(),
            OutputEvent::Account { .. } => "account".to_string(),
            OutputEvent::SubscriptionStatus { .. } => "subscription_status".to_string(),
            OutputEvent::Strategy { action, .. } => format!("strategy_{action}"),
            OutputEvent::RiskTriggered { .. } => "risk_triggered".to_string(),
            OutputEvent::KillSwitchEngaged { .. } => "kill_switch_engaged".to_string(),
            OutputEvent::OrderReconcileRequired { .. } => "order_reconcile_required".to_string(),
            OutputEvent::EngineStarted { .. } => "engine_started".to_string(),
            OutputEvent::EngineStopped { .. } => "engine_stopped".to_string(),
            OutputEvent::Error { .. } => "error".to_string(),
        }
    }

    /// Serialize the payload fields (everything except `type` / `ts_ns`).
    fn payload(&self) -> Value {
        match self {
            OutputEvent::Market(event) => market_payload(event),
            OutputEvent::OrderReceived { cid } => json!({ "cid": cid }),
            OutputEvent::CancelReceived { cid } => json!({ "cid": cid }),
            OutputEvent::QueryReceived { query } => json!({ "query": query }),
            OutputEvent::StrategyCommandReceived { command } => json!({ "command": command }),
            OutputEvent::OrderUpdate { snapshot, reason } => order_update_payload(snapshot, reason),
            OutputEvent::OrderState { snapshot } => {
                let mut value = to_value(snapshot);
                if let Value::Object(object) = &mut value {
                    object.insert(
                        "status".to_string(),
                        Value::String(snapshot.status.as_wire_str().to_string()),
                    );
                }
                value
            }
            OutputEvent::Fill(fill) => to_value(fill),
            OutputEvent::Account { balances, positions } => {
                json!({ "balances": balances, "positions": positions })
            }
            OutputEvent::SubscriptionStatus {
                venue,
                symbol,
                event_type,
                subscribed,
            } => json!({
                "venue": venue.as_str(),
                "symbol": symbol,
                "event_type": event_type,
                "subscribed": subscribed,
            }),
            OutputEvent::Strategy { payload, .. } => to_value(payload),
            OutputEvent::RiskTriggered { reason } => json!({ "reason": reason }),
            OutputEvent::KillSwitchEngaged { reason } => json!({ "reason": reason }),
            OutputEvent::OrderReconcileRequired { cid } => json!({ "cid": cid }),
            OutputEvent::EngineStarted { version } => json!({ "version": version }),
            OutputEvent::EngineStopped { commands_processed } => {
                json!({ "commands_processed": commands_processed })
            }
            OutputEvent::Error {
                message,
                tag,
                line_no,
            } => {
                let mut object = serde_json::Map::new();
                object.insert("message".to_string(), Value::String(message.clone()));
                if let Some(tag) = tag {
                    object.insert("reason".to_string(), Value::String((*tag).to_string()));
                }
                if let Some(line_no) = line_no {
                    object.insert("line_no".to_string(), json!(line_no));
                }
                Value::Object(object)
            }
        }
    }

    /// Render the full NDJSON object (without trailing newline).
    pub fn to_json_line(&self, ts: TimestampNs) -> String {
        let mut object = serde_json::Map::new();
        object.insert("type".to_string(), Value::String(self.tag()));
        object.insert("ts_ns".to_string(), json!(ts.as_nanos()));
        if let Value::Object(payload) = self.payload() {
            for (key, value) in payload {
                object.entry(key).or_insert(value);
            }
        }
        Value::Object(object).to_string()
    }
}

fn to_value<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|err| {
        error!(%err, "failed to serialize event payload");
        Value::Null
    })
}

fn market_payload(event: &MarketEvent) -> Value {
    let mut object = serde_json::Map::new();
    object.insert("symbol".to_string(), to_value(&event.symbol));
    object.insert(
        "venue".to_string(),
        Value::String(event.venue.as_str().to_string()),
    );
    let kind_value = match &event.kind {
        MarketEventKind::Trade(trade) => to_value(trade),
        MarketEventKind::BookTop(top) => to_value(top),
        MarketEventKind::BookDelta(delta) => to_value(delta),
        MarketEventKind::Kline(kline) => to_value(kline),
        MarketEventKind::PriceTick(tick) => to_value(tick),
    };
    if let Value::Object(fields) = kind_value {
        for (key, value) in fields {
            object.insert(key, value);
        }
    }
    Value::Object(object)
}

fn order_update_payload(snapshot: &OrderSnapshot, reason: &Option<String>) -> Value {
    let mut object = serde_json::Map::new();
    object.insert("cid".to_string(), to_value(&snapshot.cid));
    object.insert("symbol".to_string(), to_value(&snapshot.symbol));
    object.insert(
        "status".to_string(),
        Value::String(snapshot.status.as_wire_str().to_string()),
    );
    object.insert("executed_qty".to_string(), to_value(&snapshot.executed_qty));
    object.insert("avg_price".to_string(), to_value(&snapshot.avg_price));
    if let Some(venue_order_id) = &snapshot.venue_order_id {
        object.insert("venue_order_id".to_string(), to_value(venue_order_id));
    }
    if let Some(reason) = reason {
        object.insert("reason".to_string(), Value::String(reason.clone()));
    }
    Value::Object(object)
}

/// Consumes [`OutputEvent`]s produced by the engine loop.
pub trait EventSink: Send {
    fn emit(&mut self, ts: TimestampNs, event: OutputEvent);
}

/// [`EventSink`] writing one JSON object per line to any `Write` target
/// (stdout in production).
pub struct NdJsonEmitter<W: std::io::Write + Send> {
    writer: W,
}

impl<W: std::io::Write + Send> std::fmt::Debug for NdJsonEmitter<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NdJsonEmitter").finish()
    }
}

impl<W: std::io::Write + Send> NdJsonEmitter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }
}

impl<W: std::io::Write + Send> EventSink for NdJsonEmitter<W> {
    fn emit(&mut self, ts: TimestampNs, event: OutputEvent) {
        let line = event.to_json_line(ts);
        if let Err(err) = writeln!(self.writer, "{line}") {
            error!(%err, "failed to write event to NDJSON stream");
        }
    }
}

/// [`EventSink`] buffering events in memory, for tests and snapshot queries.
#[derive(Debug, Default)]
pub struct VecSink {
    pub events: Vec<(TimestampNs, OutputEvent)>,
}

impl VecSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tags of all captured events, in emission order.
    pub fn tags(&self) -> Vec<String> {
        self.events.iter().map(|(_, event)| event.tag()).collect()
    }

    /// Serialized NDJSON lines of all captured events.
    pub fn lines(&self) -> Vec<String> {
        self.events
            .iter()
            .map(|(ts, event)| event.to_json_line(*ts))
            .collect()
    }
}

impl EventSink for VecSink {
    fn emit(&mut self, ts: TimestampNs, event: OutputEvent) {
        self.events.push((ts, event));
    }
}

/// Shared handle over a [`VecSink`], letting a test or snapshot server keep
/// reading while the engine owns the sink.
impl EventSink for std::sync::Arc<parking_lot::Mutex<VecSink>> {
    fn emit(&mut self, ts: TimestampNs, event: OutputEvent) {
        self.lock().emit(ts, event);
    }
}
