use crate::{
    backtest::summary::{BacktestResult, EquityPoint},
    emit::EventSink,
    engine::{
        clock::{EngineClock, VirtualClock},
        error::EngineError,
        Engine, EngineConfig, EngineEvent, EngineStatus, ExecutionHandler,
    },
    execution::sim::{SimConfig, SimExecutor},
    risk::RiskConfig,
    strategy::{Params, StrategyError},
};
use rust_decimal::{
    prelude::{FromPrimitive, ToPrimitive},
    Decimal,
};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use veloce_data::{
    event::MarketEvent,
    source::{DataError, DataSource, DataType, TimeFrame},
    time::TimestampNs,
};
use veloce_instrument::{Symbol, Venue};

/// Backtest result summary types.
pub mod summary;

/// All possible backtest errors.
#[derive(Debug, Clone, PartialEq, Serialize, Error)]
pub enum BacktestError {
    #[error("invalid config: {0}")]
    Config(String),

    #[error("data source: {0}")]
    Data(#[from] DataError),

    #[error("engine: {0}")]
    Engine(#[from] EngineError),

    #[error("strategy: {0}")]
    Strategy(#[from] StrategyError),
}

/// Configuration of one backtest run.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BacktestConfig {
    pub strategy_name: SmolStr,
    pub symbol: Symbol,
    pub start_ts: TimestampNs,
    pub end_ts: TimestampNs,
    pub initial_balance: Decimal,
    /// Fraction of capital risked per trade, in `[0, 1]`. Used to derive the
    /// default order quantity for strategies that accept a `qty` parameter.
    pub risk_per_trade: f64,
    /// Absolute position size cap enforced by the risk gate.
    pub max_position_size: Decimal,
    pub params: Params,
    pub data_type: DataType,
    pub time_frame: TimeFrame,
    pub sim: SimConfig,
    /// Annualised risk-free rate expressed per sample period.
    pub risk_free_return: f64,
    /// Sample the equity curve every N dispatched events (fills always
    /// sample).
    pub equity_sample_every: u64,
}

impl BacktestConfig {
    pub fn new(strategy_name: &str, symbol: &str, start_ts: TimestampNs, end_ts: TimestampNs) -> Self {
        Self {
            strategy_name: SmolStr::new(strategy_name),
            symbol: Symbol::new(symbol),
            start_ts,
            end_ts,
            initial_balance: Decimal::new(10_000, 0),
            risk_per_trade: 1.0,
            max_position_size: Decimal::MAX,
            params: Params::new(),
            data_type: DataType::Kline,
            time_frame: TimeFrame::M1,
            sim: SimConfig::default(),
            risk_free_return: 0.0,
            equity_sample_every: 1,
        }
    }

    fn validate(&self) -> Result<(), BacktestError> {
        if !(0.0..=1.0).contains(&self.risk_per_trade) {
            return Err(BacktestError::Config(format!(
                "risk_per_trade {} outside [0, 1]",
                self.risk_per_trade
            )));
        }
        if self.end_ts <= self.start_ts {
            return Err(BacktestError::Config(
                "end_ts must be after start_ts".to_string(),
            ));
        }
        if self.initial_balance <= Decimal::ZERO {
            return Err(BacktestError::Config(
                "initial_balance must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Replays historical market events through an [`Engine`] in virtual-clock
/// mode with the deterministic [`SimExecutor`], then computes a
/// [`BacktestResult`].
///
/// [`Self::step`] pops exactly one event, so external debuggers can drive the
/// harness event by event.
#[derive(Debug)]
pub struct BacktestHarness {
    engine: Engine<VirtualClock>,
    config: BacktestConfig,
    equity_curve: Vec<EquityPoint>,
    events_since_sample: u64,
    fills_sampled: usize,
}

impl BacktestHarness {
    /// Construct a harness over pre-loaded market events (sorted by ts).
    pub fn new(
        config: BacktestConfig,
        events: Vec<MarketEvent>,
        sink: Option<Box<dyn EventSink>>,
    ) -> Result<Self, BacktestError> {
        config.validate()?;

        let clock = VirtualClock::new(config.start_ts, config.end_ts);
        let engine_config = EngineConfig {
            symbol: config.symbol.clone(),
            venue: Venue::Sim,
            initial_balance: config.initial_balance,
            risk: RiskConfig {
                max_position_size: config.max_position_size,
                ..RiskConfig::default()
            },
            record_fills: true,
            ..EngineConfig::default()
        };
        let sink = sink.unwrap_or_else(|| Box::new(crate::emit::VecSink::new()));
        let mut engine = Engine::new(
            engine_config,
            clock,
            ExecutionHandler::Sim(SimExecutor::new(config.sim)),
            sink,
        );
        engine.initialize()?;

        // Strategies that size orders by `qty` default to risking
        // `risk_per_trade` of starting capital at the first observed price.
        let supports_qty = engine
            .strategies()
            .param_specs(config.strategy_name.as_str())
            .is_some_and(|specs| specs.iter().any(|spec| spec.name == "qty"));
        let params = if supports_qty {
            params_with_sized_qty(config.params.clone(), &config, &events)
        } else {
            config.params.clone()
        };
        engine.load_strategy(
            config.strategy_name.as_str(),
            config.strategy_name.as_str(),
            &params,
            config.symbol.clone(),
        )?;

        let mut loaded = 0usize;
        for event in events {
            let ts = event.ts;
            if ts < config.start_ts || ts > config.end_ts {
                continue;
            }
            engine.enqueue(ts, EngineEvent::Market(event))?;
            loaded += 1;
        }
        info!(events = loaded, strategy = %config.strategy_name, "backtest harness loaded");

        let initial_equity = config.initial_balance.to_f64().unwrap_or(0.0);
        Ok(Self {
            engine,
            equity_curve: vec![EquityPoint {
                ts: config.start_ts,
                equity: initial_equity,
            }],
            config,
            events_since_sample: 0,
            fills_sampled: 0,
        })
    }

    /// Construct a harness by loading events from a [`DataSource`].
    pub async fn from_source(
        config: BacktestConfig,
        source: &mut (dyn DataSource + Send),
        sink: Option<Box<dyn EventSink>>,
    ) -> Result<Self, BacktestError> {
        let events = source
            .get_data(
                &config.symbol,
                config.start_ts.as_millis(),
                config.end_ts.as_millis(),
                config.data_type,
                config.time_frame,
            )
            .await?;
        Self::new(config, events, sink)
    }

    /// Completion fraction of the virtual clock, in `[0, 1]`.
    pub fn progress(&self) -> f64 {
        self.engine.clock().progress()
    }

    /// Register a progress callback on the underlying engine (throttled to
    /// 100 ms wall-clock).
    pub fn on_progress(&mut self, callback: impl FnMut(f64) + Send + 'static) {
        self.engine.on_progress(callback);
    }

    /// Pop and dispatch exactly one event. Returns `false` once the run is
    /// complete (queue empty or virtual clock at the end).
    pub fn step(&mut self) -> Result<bool, BacktestError> {
        if !matches!(
            self.engine.status(),
            EngineStatus::Running | EngineStatus::Initialized
        ) {
            return Ok(false);
        }
        if self.engine.status() == EngineStatus::Initialized {
            self.engine.start()?;
        }

        let Some(ts) = self.engine.dispatch_next()? else {
            return Ok(false);
        };
        self.sample_equity(ts);

        Ok(self.engine.clock().now_ns() < self.config.end_ts)
    }

    /// Run to completion and generate the [`BacktestResult`].
    pub fn run(&mut self) -> Result<BacktestResult, BacktestError> {
        while self.step()? {}
        self.finish()
    }

    /// Stop the engine and assemble the result.
    pub fn finish(&mut self) -> Result<BacktestResult, BacktestError> {
        // Final equity sample at the clock's resting point
        self.sample_equity_forced(self.engine.clock().now_ns());
        self.engine.stop();
        self.engine.finish()?;

        let result = BacktestResult::generate(
            self.config.strategy_name.clone(),
            self.config.symbol.clone(),
            self.config.start_ts,
            self.config.end_ts,
            self.config.initial_balance,
            self.engine.state().account.total(),
            self.engine.fills(),
            std::mem::take(&mut self.equity_curve),
            self.config.time_frame.periods_per_year(),
            self.config.risk_free_return,
        );
        info!(
            trades = result.trade_count,
            total_return = result.total_return,
            "backtest complete"
        );
        Ok(result)
    }

    /// Immutable access to the underlying engine (step-mode debuggers).
    pub fn engine(&self) -> &Engine<VirtualClock> {
        &self.engine
    }

    fn sample_equity(&mut self, ts: TimestampNs) {
        self.events_since_sample += 1;
        let fills_now = self.engine.fills().len();
        let due = self.events_since_sample >= self.config.equity_sample_every
            || fills_now != self.fills_sampled;
        if due {
            self.fills_sampled = fills_now;
            self.sample_equity_forced(ts);
        }
    }

    fn sample_equity_forced(&mut self, ts: TimestampNs) {
        self.events_since_sample = 0;
        let equity = self.engine.state().equity().to_f64().unwrap_or(0.0);
        // Keep the curve strictly time-ordered with one sample per instant
        match self.equity_curve.last_mut() {
            Some(last) if last.ts == ts => last.equity = equity,
            _ => self.equity_curve.push(EquityPoint { ts, equity }),
        }
    }
}

/// Cloneable factory that runs an isolated backtest per parameter set, used
/// by the optimizer to fan trials out across threads.
#[derive(Debug, Clone)]
pub struct BacktestRunner {
    config: BacktestConfig,
    events: Arc<Vec<MarketEvent>>,
}

impl BacktestRunner {
    pub fn new(config: BacktestConfig, events: Vec<MarketEvent>) -> Self {
        Self {
            config,
            events: Arc::new(events),
        }
    }

    /// Run one trial with `params` overriding the configured strategy
    /// parameters. Each trial gets its own engine instance.
    pub fn run_with_params(&self, params: &Params) -> Result<BacktestResult, BacktestError> {
        let mut config = self.config.clone();
        config.params = params.clone();
        let mut harness = BacktestHarness::new(config, (*self.events).clone(), None)?;
        harness.run()
    }
}

/// Fill in a `qty` parameter sized from `risk_per_trade` when the caller did
/// not provide one and a reference price is known.
fn params_with_sized_qty(
    mut params: Params,
    config: &BacktestConfig,
    events: &[MarketEvent],
) -> Params {
    if !params.contains_key("qty") {
        let first_price = events
            .iter()
            .find_map(|event| event.reference_price())
            .and_then(|price| price.to_f64());
        if let Some(price) = first_price {
            if price > 0.0 && config.risk_per_trade > 0.0 {
                let balance = config.initial_balance.to_f64().unwrap_or(0.0);
                let qty = balance * config.risk_per_trade / price;
                if Decimal::from_f64(qty).is_some() && qty > 0.0 {
                    params.insert("qty".to_string(), qty);
                }
            }
        }
    }
    params
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use veloce_data::event::Kline;

    fn kline_events(closes: &[f64]) -> Vec<MarketEvent> {
        closes
            .iter()
            .enumerate()
            .map(|(index, close)| {
                let close = Decimal::from_f64(*close).unwrap();
                let start_ms = index as i64 * 60_000;
                let close_ms = start_ms + 60_000;
                MarketEvent::new(
                    Symbol::new("BTCUSDT"),
                    Venue::Sim,
                    TimestampNs::from_millis(close_ms),
                    Kline::new(close, close, close, close, dec!(100), start_ms, close_ms).into(),
                )
            })
            .collect()
    }

    fn config(bars: usize) -> BacktestConfig {
        BacktestConfig {
            params: Params::from_iter([
                ("fast".to_string(), 2.0),
                ("slow".to_string(), 4.0),
                ("qty".to_string(), 0.1),
            ]),
            ..BacktestConfig::new(
                "momentum",
                "BTCUSDT",
                TimestampNs::ZERO,
                TimestampNs::from_millis(bars as i64 * 60_000 + 60_000),
            )
        }
    }

    /// Closes engineered to force a golden cross then a death cross.
    fn trending_closes() -> Vec<f64> {
        let mut closes = vec![100.0; 5];
        closes.extend((1..=10).map(|step| 100.0 + step as f64 * 2.0));
        closes.extend((1..=10).map(|step| 120.0 - step as f64 * 3.0));
        closes
    }

    #[test]
    fn test_backtest_produces_trades_and_metrics() {
        let mut harness =
            BacktestHarness::new(config(25), kline_events(&trending_closes()), None).unwrap();
        let result = harness.run().unwrap();

        assert!(result.trade_count >= 1, "expected at least one round trip");
        assert!(!result.equity_curve.is_empty());
        assert_eq!(result.strategy_name, "momentum");

        // Balance round-trips exactly: initial + realized - fees
        let realized: Decimal = harness
            .engine()
            .state()
            .positions()
            .map(|position| position.realized_pnl)
            .sum();
        assert_eq!(
            result.final_balance,
            result.initial_balance + realized - result.total_fees
        );
    }

    #[test]
    fn test_backtest_determinism() {
        let run = || {
            let mut harness =
                BacktestHarness::new(config(25), kline_events(&trending_closes()), None).unwrap();
            harness.run().unwrap()
        };

        let first = run();
        let second = run();
        assert_eq!(first.trade_count, second.trade_count);
        assert_eq!(first.final_balance, second.final_balance);
        assert_eq!(first.total_return, second.total_return);
        assert_eq!(first.max_drawdown, second.max_drawdown);
        assert_eq!(first.equity_curve, second.equity_curve);
    }

    #[test]
    fn test_step_mode_single_event() {
        let mut harness =
            BacktestHarness::new(config(25), kline_events(&trending_closes()), None).unwrap();

        let before = harness.progress();
        assert!(harness.step().unwrap());
        let after = harness.progress();
        assert!(after > before);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = config(10);
        config.risk_per_trade = 1.5;
        let result = BacktestHarness::new(config, kline_events(&[100.0]), None);
        assert!(matches!(result, Err(BacktestError::Config(_))));
    }
}
