#![allow(dead_code)]

use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::sync::Arc;
use veloce::{
    emit::{OutputEvent, VecSink},
    engine::{
        clock::VirtualClock, Engine, EngineConfig, EngineEvent, ExecutionHandler,
    },
    execution::sim::{SimConfig, SimExecutor},
    risk::RiskConfig,
};
use veloce_data::{
    event::{BookTop, MarketEvent, PublicTrade},
    time::TimestampNs,
};
use veloce_instrument::{Symbol, Venue};

pub type SharedSink = Arc<Mutex<VecSink>>;

/// A running engine over the deterministic simulator plus a shared sink to
/// inspect the emitted event stream.
pub fn running_engine(config: EngineConfig) -> (Engine<VirtualClock>, SharedSink) {
    let sink: SharedSink = Arc::new(Mutex::new(VecSink::new()));
    let clock = VirtualClock::new(TimestampNs::ZERO, TimestampNs::from_secs(3_600));
    let mut engine = Engine::new(
        config,
        clock,
        ExecutionHandler::Sim(SimExecutor::new(SimConfig::default())),
        Box::new(Arc::clone(&sink)),
    );
    engine.initialize().unwrap();
    engine.start().unwrap();
    (engine, sink)
}

pub fn default_engine() -> (Engine<VirtualClock>, SharedSink) {
    running_engine(EngineConfig {
        record_fills: true,
        ..EngineConfig::default()
    })
}

pub fn risk_engine(risk: RiskConfig, initial_balance: Decimal) -> (Engine<VirtualClock>, SharedSink) {
    running_engine(EngineConfig {
        risk,
        initial_balance,
        record_fills: true,
        ..EngineConfig::default()
    })
}

pub fn ts(ms: i64) -> TimestampNs {
    TimestampNs::from_millis(ms)
}

pub fn command(line_no: u64, line: &str) -> EngineEvent {
    EngineEvent::Command {
        line_no,
        line: line.to_string(),
    }
}

pub fn trade_event(
    symbol: &str,
    price: Decimal,
    qty: Decimal,
    is_buyer_maker: bool,
    ts_ms: i64,
) -> EngineEvent {
    EngineEvent::Market(MarketEvent::trade(
        Symbol::new(symbol),
        Venue::Sim,
        ts(ts_ms),
        PublicTrade::new(price, qty, is_buyer_maker, ts_ms as u64),
    ))
}

pub fn book_top_event(
    symbol: &str,
    bid_px: Decimal,
    bid_qty: Decimal,
    ask_px: Decimal,
    ask_qty: Decimal,
    ts_ms: i64,
) -> EngineEvent {
    EngineEvent::Market(MarketEvent::book_top(
        Symbol::new(symbol),
        Venue::Sim,
        ts(ts_ms),
        BookTop::new(bid_px, bid_qty, ask_px, ask_qty),
    ))
}

/// `(status, reason)` pairs of every emitted `order_update`, in order.
pub fn order_updates(sink: &SharedSink) -> Vec<(String, Option<String>)> {
    sink.lock()
        .events
        .iter()
        .filter_map(|(_, event)| match event {
            OutputEvent::OrderUpdate { snapshot, reason } => Some((
                snapshot.status.as_wire_str().to_string(),
                reason.clone(),
            )),
            _ => None,
        })
        .collect()
}

/// Event `type` tags in emission order, with `engine_started` stripped.
pub fn tags(sink: &SharedSink) -> Vec<String> {
    sink.lock()
        .tags()
        .into_iter()
        .filter(|tag| tag != "engine_started")
        .collect()
}

/// Serialized NDJSON lines of the full emitted stream.
pub fn ndjson_lines(sink: &SharedSink) -> Vec<String> {
    sink.lock().lines()
}
