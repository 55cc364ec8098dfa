//! Veloce paper-trading entry point.
//!
//! Reads line commands (`ORDER`, `CANCEL`, `STRATEGY`, ...) from stdin,
//! routes them through the engine with the deterministic sim executor, and
//! writes the NDJSON event stream to stdout. Logs go to stderr so the event
//! stream stays machine-parseable.
//!
//! Configuration is taken from the environment:
//! * `VELOCE_SYMBOL`  - default instrument (default `BTCUSDT`)
//! * `VELOCE_BALANCE` - starting quote balance (default `10000`)
//! * `VELOCE_JSON_LOGS` - set to `1` for JSON logs

use rust_decimal::Decimal;
use std::str::FromStr;
use tracing::{error, info};
use veloce::{
    emit::NdJsonEmitter,
    engine::{clock::LiveClock, Engine, EngineConfig, EngineEvent, ExecutionHandler},
    execution::sim::SimExecutor,
    logging,
};
use veloce_data::time::TimestampNs;
use veloce_instrument::{Symbol, Venue};

#[tokio::main]
async fn main() {
    if std::env::var("VELOCE_JSON_LOGS").is_ok_and(|value| value == "1") {
        logging::init_json_logging();
    } else {
        logging::init_logging();
    }

    let symbol = std::env::var("VELOCE_SYMBOL")
        .map(|value| Symbol::new(&value))
        .unwrap_or_else(|_| Symbol::new("BTCUSDT"));
    let initial_balance = std::env::var("VELOCE_BALANCE")
        .ok()
        .and_then(|value| Decimal::from_str(&value).ok())
        .unwrap_or_else(|| Decimal::new(10_000, 0));

    let config = EngineConfig {
        symbol,
        venue: Venue::Sim,
        initial_balance,
        queue_capacity: Some(65_536),
        ..EngineConfig::default()
    };

    let mut engine = Engine::new(
        config,
        LiveClock::new(),
        ExecutionHandler::Sim(SimExecutor::default()),
        Box::new(NdJsonEmitter::new(std::io::stdout())),
    );
    if let Err(err) = engine.initialize().and_then(|()| engine.start()) {
        error!(%err, "engine failed to start");
        return;
    }

    // Blocking stdin reader feeding the engine input channel; closing stdin
    // or Ctrl-C shuts the session down cleanly.
    let (tx, rx) = tokio::sync::mpsc::channel::<(TimestampNs, EngineEvent)>(1_024);

    let signal_tx = tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let ts = TimestampNs::from(chrono::Utc::now());
            let _ = signal_tx.send((ts, EngineEvent::Stop)).await;
        }
    });

    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut line = String::new();
        let mut line_no = 0u64;
        loop {
            line.clear();
            match stdin.read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    line_no += 1;
                    let event = EngineEvent::Command {
                        line_no,
                        line: line.trim_end().to_string(),
                    };
                    let ts = TimestampNs::from(chrono::Utc::now());
                    if tx.blocking_send((ts, event)).is_err() {
                        break;
                    }
                }
            }
        }
    });

    match engine.run_live(rx).await {
        Ok(()) => info!("session complete"),
        Err(err) => error!(%err, "engine terminated with fatal error"),
    }
}
