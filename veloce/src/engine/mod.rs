use crate::{
    command::{Command, CommandReader, QueryCommand, StrategyCommand},
    emit::{
        AccountBalanceEntry, AccountPositionEntry, EventSink, OutputEvent, StrategyEventPayload,
    },
    engine::{
        clock::{ClockError, EngineClock},
        error::EngineError,
        queue::{EventQueue, Priority, QueueMetrics},
        state::{account::quote_asset, order::CancelOutcome, order::FillOutcome, EngineState},
    },
    execution::{live::LiveExecutor, sim::SimExecutor, ExecutionEvent},
    risk::{RiskEngine, RiskRejection},
    strategy::{runtime::StrategyRuntime, Action},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::collections::HashSet;
use tracing::{debug, info, warn};
use veloce_data::{event::MarketEvent, time::TimestampNs};
use veloce_execution::{
    order::{OrderRequest, OrderSnapshot, OrderStatus},
    venue::StreamSpec,
    ClientOrderId, Fill,
};
use veloce_instrument::{Instrument, MarketKind, Symbol, Venue};

/// Engine clocks (wall and virtual).
pub mod clock;

/// Fatal engine errors.
pub mod error;

/// Priority event queue.
pub mod queue;

/// Engine-owned mutable state (orders, account, positions).
pub mod state;

/// Lifecycle status of an [`Engine`].
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize,
)]
#[serde(rename_all = "snake_case")]
pub enum EngineStatus {
    Idle,
    Initialized,
    Running,
    Paused,
    Stopping,
    Stopped,
    Error,
}

impl std::fmt::Display for EngineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self {
            EngineStatus::Idle => "idle",
            EngineStatus::Initialized => "initialized",
            EngineStatus::Running => "running",
            EngineStatus::Paused => "paused",
            EngineStatus::Stopping => "stopping",
            EngineStatus::Stopped => "stopped",
            EngineStatus::Error => "error",
        };
        f.write_str(tag)
    }
}

/// Input events dispatched by the engine loop, ordered by the event queue.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    Market(MarketEvent),
    /// A raw command line; parsing happens on the loop thread so parse errors
    /// carry the line number.
    Command { line_no: u64, line: String },
    /// A strategy timer coming due.
    Timer { strategy_id: SmolStr, name: SmolStr },
    /// Executor/venue feedback (live mode).
    Execution(ExecutionEvent),
    Stop,
}

impl EngineEvent {
    /// Queue priority of this event kind.
    pub fn priority(&self) -> Priority {
        match self {
            EngineEvent::Market(_) => Priority::Normal,
            EngineEvent::Command { .. } => Priority::High,
            EngineEvent::Timer { .. } => Priority::High,
            EngineEvent::Execution(_) => Priority::Critical,
            EngineEvent::Stop => Priority::Critical,
        }
    }
}

/// Executor variant owned by the engine.
#[derive(Debug)]
pub enum ExecutionHandler {
    Sim(SimExecutor),
    Live(LiveExecutor),
}

/// Configuration for constructing an [`Engine`] via the new() constructor
/// method.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Default instrument for strategies loaded without an explicit symbol.
    pub symbol: Symbol,
    /// Venue stamped on command-sourced orders.
    pub venue: Venue,
    /// Market kind of the traded instruments. The margin-style account model
    /// assumes derivative-like instruments.
    pub market_kind: MarketKind,
    pub initial_balance: Decimal,
    pub risk: crate::risk::RiskConfig,
    /// Queue capacity bound (live mode); `None` is unbounded.
    pub queue_capacity: Option<usize>,
    /// Retain fills in memory for post-run analysis (backtests).
    pub record_fills: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            symbol: Symbol::new("BTCUSDT"),
            venue: Venue::Sim,
            market_kind: MarketKind::PerpFuture,
            initial_balance: Decimal::new(10_000, 0),
            risk: crate::risk::RiskConfig::default(),
            queue_capacity: None,
            record_fills: false,
        }
    }
}

/// The trading engine core: a single-threaded cooperative dispatch loop that
/// owns the clock, event queue, order store, risk gate, strategy runtime and
/// executor, and emits NDJSON events through an [`EventSink`].
///
/// All state mutation happens on the dispatch thread; auxiliary tasks only
/// feed the input channel.
pub struct Engine<Clk: EngineClock> {
    config: EngineConfig,
    status: EngineStatus,
    clock: Clk,
    queue: EventQueue<EngineEvent>,
    state: EngineState,
    risk: RiskEngine,
    strategies: StrategyRuntime,
    execution: ExecutionHandler,
    command_reader: CommandReader,
    sink: Box<dyn EventSink>,
    subscriptions: HashSet<StreamSpec>,
    commands_processed: u64,
    fills: Vec<Fill>,
    progress_callback: Option<Box<dyn FnMut(f64) + Send>>,
    progress_last_report: Option<std::time::Instant>,
}

impl<Clk: EngineClock> std::fmt::Debug for Engine<Clk> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("status", &self.status)
            .field("queue_len", &self.queue.len())
            .field("commands_processed", &self.commands_processed)
            .finish()
    }
}

impl<Clk: EngineClock> Engine<Clk> {
    /// Constructs a new [`Engine`] in `Idle` state.
    pub fn new(
        config: EngineConfig,
        clock: Clk,
        execution: ExecutionHandler,
        sink: Box<dyn EventSink>,
    ) -> Self {
        let account = state::account::AccountState::with_deposit(
            quote_asset(&config.symbol),
            config.initial_balance,
        );
        let queue = match config.queue_capacity {
            Some(capacity) => EventQueue::bounded(capacity),
            None => EventQueue::unbounded(),
        };
        let risk = RiskEngine::new(config.risk.clone(), config.initial_balance);
        let command_reader = CommandReader::new(config.venue);

        Self {
            config,
            status: EngineStatus::Idle,
            clock,
            queue,
            state: EngineState::new(account),
            risk,
            strategies: StrategyRuntime::new(),
            execution,
            command_reader,
            sink,
            subscriptions: HashSet::new(),
            commands_processed: 0,
            fills: Vec::new(),
            progress_callback: None,
            progress_last_report: None,
        }
    }

    pub fn status(&self) -> EngineStatus {
        self.status
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    pub fn strategies(&self) -> &StrategyRuntime {
        &self.strategies
    }

    pub fn clock(&self) -> &Clk {
        &self.clock
    }

    pub fn queue_metrics(&self) -> QueueMetrics {
        self.queue.metrics()
    }

    /// Fills recorded this session (when `record_fills` is enabled).
    pub fn fills(&self) -> &[Fill] {
        &self.fills
    }

    pub fn commands_processed(&self) -> u64 {
        self.commands_processed
    }

    /// Register a progress callback, invoked at most every 100 ms wall-clock.
    pub fn on_progress(&mut self, callback: impl FnMut(f64) + Send + 'static) {
        self.progress_callback = Some(Box::new(callback));
    }

    /// Load and start a strategy instance programmatically (harness path; the
    /// command path goes through `STRATEGY LOAD`/`START`).
    pub fn load_strategy(
        &mut self,
        id: &str,
        type_name: &str,
        params: &crate::strategy::Params,
        symbol: Symbol,
    ) -> Result<(), crate::strategy::StrategyError> {
        let now = self.clock.now_ns();
        let instrument = self.instrument_for(symbol);
        self.strategies.load(id, type_name, params, instrument, now)?;
        self.strategies.start(id)?;
        Ok(())
    }

    /// Instrument identity for `symbol` on this engine's venue and market.
    fn instrument_for(&self, symbol: Symbol) -> Instrument {
        Instrument::new(symbol, self.config.venue, self.config.market_kind)
    }

    /// `Idle -> Initialized`. Anchors the risk daily-loss window at current
    /// equity.
    pub fn initialize(&mut self) -> Result<(), EngineError> {
        self.require_status(EngineStatus::Idle, "initialize")?;
        self.risk.reset(self.state.equity());
        self.status = EngineStatus::Initialized;
        Ok(())
    }

    /// `Initialized -> Running`. Emits `engine_started`.
    pub fn start(&mut self) -> Result<(), EngineError> {
        self.require_status(EngineStatus::Initialized, "start")?;
        self.status = EngineStatus::Running;
        self.emit(OutputEvent::EngineStarted {
            version: env!("CARGO_PKG_VERSION").to_string(),
        });
        info!(version = env!("CARGO_PKG_VERSION"), "engine started");
        Ok(())
    }

    /// `Running -> Paused`.
    pub fn pause(&mut self) -> Result<(), EngineError> {
        self.require_status(EngineStatus::Running, "pause")?;
        self.status = EngineStatus::Paused;
        Ok(())
    }

    /// `Paused -> Running`.
    pub fn resume(&mut self) -> Result<(), EngineError> {
        self.require_status(EngineStatus::Paused, "resume")?;
        self.status = EngineStatus::Running;
        Ok(())
    }

    /// Any live state `-> Stopping`. The run loop drains and then calls
    /// [`Self::finish`].
    pub fn stop(&mut self) {
        if !matches!(self.status, EngineStatus::Stopped | EngineStatus::Error) {
            self.status = EngineStatus::Stopping;
        }
    }

    /// `Stopping -> Stopped`. Emits `engine_stopped`.
    pub fn finish(&mut self) -> Result<(), EngineError> {
        self.require_status(EngineStatus::Stopping, "finish")?;
        self.status = EngineStatus::Stopped;
        self.emit(OutputEvent::EngineStopped {
            commands_processed: self.commands_processed,
        });
        info!(
            commands_processed = self.commands_processed,
            "engine stopped"
        );
        Ok(())
    }

    /// Enqueue an event for dispatch at `ts`.
    pub fn enqueue(&mut self, ts: TimestampNs, event: EngineEvent) -> Result<(), EngineError> {
        let priority = event.priority();
        self.queue.push(ts, priority, event).map_err(|error| {
            self.emit(OutputEvent::Error {
                message: error.to_string(),
                tag: Some("overflow_error"),
                line_no: None,
            });
            EngineError::Queue(error)
        })
    }

    /// Enqueue a raw command line at the current clock time.
    pub fn enqueue_command_line(&mut self, line_no: u64, line: &str) -> Result<(), EngineError> {
        let now = self.clock.now_ns();
        self.enqueue(
            now,
            EngineEvent::Command {
                line_no,
                line: line.to_string(),
            },
        )
    }

    /// Pop and dispatch the next queued event. Returns the dispatched
    /// timestamp, or `None` when the queue is empty.
    pub fn dispatch_next(&mut self) -> Result<Option<TimestampNs>, EngineError> {
        let Some((ts, event)) = self.queue.pop() else {
            return Ok(None);
        };
        self.dispatch(ts, event)?;
        Ok(Some(ts))
    }

    /// Dispatch one event: advance the clock, route to the right handler,
    /// report progress. Fatal errors transition the engine to `Error`.
    pub fn dispatch(&mut self, ts: TimestampNs, event: EngineEvent) -> Result<(), EngineError> {
        match self.dispatch_inner(ts, event) {
            Ok(()) => {
                self.report_progress_throttled();
                Ok(())
            }
            Err(error) => {
                self.status = EngineStatus::Error;
                self.emit(OutputEvent::Error {
                    message: error.to_string(),
                    tag: Some("internal_error"),
                    line_no: None,
                });
                Err(error)
            }
        }
    }

    fn dispatch_inner(&mut self, ts: TimestampNs, event: EngineEvent) -> Result<(), EngineError> {
        match self.clock.advance_to(ts) {
            Ok(()) | Err(ClockError::NotVirtual) => {}
            Err(error @ ClockError::TimeReversal { .. }) => return Err(EngineError::Clock(error)),
        }

        match event {
            EngineEvent::Market(event) => self.process_market(event),
            EngineEvent::Command { line_no, line } => self.process_command(line_no, &line),
            EngineEvent::Timer { strategy_id, name } => {
                let actions = self.strategies.deliver_timer(&strategy_id, &name, ts);
                self.emit_strategy_errors();
                self.process_actions(actions)
            }
            EngineEvent::Execution(event) => self.process_execution_event(event),
            EngineEvent::Stop => {
                self.stop();
                Ok(())
            }
        }
    }

    fn process_market(&mut self, event: MarketEvent) -> Result<(), EngineError> {
        self.state.update_mark(&event);
        self.emit(OutputEvent::Market(event.clone()));

        let fills = match &mut self.execution {
            ExecutionHandler::Sim(sim) => sim.on_market_event(&event),
            ExecutionHandler::Live(_) => Vec::new(),
        };
        for fill in fills {
            self.process_fill(fill)?;
        }

        let actions = self.strategies.on_market_event(&event);
        self.emit_strategy_errors();
        self.process_actions(actions)
    }

    fn process_actions(&mut self, actions: Vec<(SmolStr, Action)>) -> Result<(), EngineError> {
        for (owner, action) in actions {
            match action {
                Action::Submit(request) => self.process_submit(Some(owner), request)?,
                Action::Cancel(cid) => self.process_cancel(&cid)?,
                Action::SetTimer { name, at } => {
                    // Overflow already surfaced as an event; timer loss is not
                    // fatal to the engine
                    if let Err(error) = self.enqueue(
                        at,
                        EngineEvent::Timer {
                            strategy_id: owner.clone(),
                            name,
                        },
                    ) {
                        warn!(strategy = %owner, %error, "dropped strategy timer");
                    }
                }
                Action::Log(message) => {
                    info!(strategy = %owner, "{message}");
                }
            }
        }
        Ok(())
    }

    fn process_submit(
        &mut self,
        owner: Option<SmolStr>,
        request: OrderRequest,
    ) -> Result<(), EngineError> {
        self.emit(OutputEvent::OrderReceived {
            cid: request.cid.0.clone(),
        });

        // Shape validation precedes everything, including duplicate checks
        if let Err(validation) = request.validate() {
            let mut snapshot = OrderSnapshot::from_request(&request);
            snapshot.status = OrderStatus::Rejected;
            snapshot.last_reason = Some(validation.tag().to_string());
            self.emit(OutputEvent::OrderUpdate {
                snapshot,
                reason: Some(validation.tag().to_string()),
            });
            return Ok(());
        }

        let now = self.clock.now_ns();
        if let Err(validation) = self.state.orders.submit(&request) {
            let mut snapshot = OrderSnapshot::from_request(&request);
            snapshot.status = OrderStatus::Rejected;
            snapshot.last_reason = Some(validation.tag().to_string());
            self.emit(OutputEvent::OrderUpdate {
                snapshot,
                reason: Some(validation.tag().to_string()),
            });
            return Ok(());
        }

        if let Err(rejection) = self.risk.check(&self.state, &request) {
            return self.reject_submitted(&request.cid, rejection);
        }

        // Place the margin hold backing the order
        let hold_price = request
            .price
            .or_else(|| self.state.mark(&request.symbol))
            .unwrap_or(Decimal::ZERO);
        let hold = hold_price * request.qty;
        if self
            .state
            .account
            .lock_for_order(&request.cid, quote_asset(&request.symbol), hold)
            .is_err()
        {
            return self.reject_submitted(
                &request.cid,
                RiskRejection::InsufficientBalance {
                    required: hold,
                    free: self.state.account.free(&quote_asset(&request.symbol)),
                },
            );
        }

        if let Some(owner) = owner {
            self.strategies.record_order_owner(&request.cid, &owner);
        }

        let events = match &mut self.execution {
            ExecutionHandler::Sim(sim) => sim.place(&request, now),
            ExecutionHandler::Live(live) => {
                live.submit_place(request, now);
                Vec::new()
            }
        };
        for event in events {
            self.process_execution_event(event)?;
        }
        Ok(())
    }

    /// Reject an order that is already `PendingNew` in the store.
    fn reject_submitted(
        &mut self,
        cid: &ClientOrderId,
        rejection: RiskRejection,
    ) -> Result<(), EngineError> {
        let now = self.clock.now_ns();
        let tag = rejection.tag();
        let snapshot = self.state.orders.on_reject(cid, tag, now)?;
        self.state.account.release_remaining(cid);

        self.emit(OutputEvent::RiskTriggered {
            reason: rejection.to_string(),
        });
        if matches!(rejection, RiskRejection::DailyLoss { .. }) {
            self.emit(OutputEvent::KillSwitchEngaged {
                reason: rejection.to_string(),
            });
        }
        self.emit(OutputEvent::OrderUpdate {
            snapshot: snapshot.clone(),
            reason: Some(tag.to_string()),
        });
        self.strategies.on_order_update(&snapshot);
        self.emit_strategy_errors();
        Ok(())
    }

    fn process_cancel(&mut self, cid: &ClientOrderId) -> Result<(), EngineError> {
        self.emit(OutputEvent::CancelReceived {
            cid: cid.0.clone(),
        });

        let now = self.clock.now_ns();
        let outcome = match self.state.orders.on_cancel_request(cid, now) {
            Ok(outcome) => outcome,
            Err(_) => {
                self.emit(OutputEvent::Error {
                    message: format!("unknown client order id: {cid}"),
                    tag: Some("invalid_command"),
                    line_no: None,
                });
                return Ok(());
            }
        };

        match outcome {
            CancelOutcome::Requested => {
                let snapshot = self
                    .state
                    .orders
                    .query(cid)
                    .ok_or_else(|| crate::engine::state::order::OrderStoreError::UnknownOrder(cid.clone()))?;
                let event = match &mut self.execution {
                    ExecutionHandler::Sim(sim) => Some(sim.cancel(cid, &snapshot.symbol, now)),
                    ExecutionHandler::Live(live) => {
                        match &snapshot.venue_order_id {
                            Some(venue_order_id) => {
                                live.submit_cancel(cid.clone(), venue_order_id.clone(), now);
                            }
                            None => {
                                warn!(%cid, "cancel requested before venue ack, awaiting ack");
                            }
                        }
                        None
                    }
                };
                if let Some(event) = event {
                    self.process_execution_event(event)?;
                }
            }
            CancelOutcome::AlreadyTerminal | CancelOutcome::AlreadyPending => {
                debug!(%cid, ?outcome, "cancel collapsed as idempotent no-op");
            }
            CancelOutcome::NotAcked => {
                self.emit(OutputEvent::Error {
                    message: format!("order {cid} not acknowledged yet, cancel not sent"),
                    tag: None,
                    line_no: None,
                });
            }
        }
        Ok(())
    }

    fn process_execution_event(&mut self, event: ExecutionEvent) -> Result<(), EngineError> {
        match event {
            ExecutionEvent::Accepted {
                cid,
                venue_order_id,
                ts,
            } => {
                let already_accepted = self
                    .state
                    .orders
                    .query(&cid)
                    .is_some_and(|snapshot| snapshot.status != OrderStatus::PendingNew);
                if already_accepted {
                    warn!(%cid, "duplicate venue accept ignored");
                    return Ok(());
                }
                let snapshot = self.state.orders.on_accept(&cid, Some(venue_order_id), ts)?;
                self.emit(OutputEvent::OrderUpdate {
                    snapshot: snapshot.clone(),
                    reason: None,
                });
                self.strategies.on_order_update(&snapshot);
                self.emit_strategy_errors();
            }
            ExecutionEvent::Rejected { cid, reason, ts } => {
                let snapshot = self.state.orders.on_reject(&cid, reason.clone(), ts)?;
                self.state.account.release_remaining(&cid);
                self.emit(OutputEvent::OrderUpdate {
                    snapshot: snapshot.clone(),
                    reason: Some(reason),
                });
                self.strategies.on_order_update(&snapshot);
                self.emit_strategy_errors();
            }
            ExecutionEvent::Fill(fill) => self.process_fill(fill)?,
            ExecutionEvent::CancelOk { cid, ts } => {
                let status = self.state.orders.query(&cid).map(|snapshot| snapshot.status);
                match status {
                    Some(OrderStatus::Accepted | OrderStatus::PartiallyFilled) => {
                        self.state.orders.on_cancel_request(&cid, ts)?;
                    }
                    Some(OrderStatus::PendingCancel) => {}
                    Some(status) if status.is_terminal() => {
                        debug!(%cid, %status, "cancel ack on terminal order ignored");
                        return Ok(());
                    }
                    _ => {
                        warn!(%cid, "cancel ack for unknown or pending order ignored");
                        return Ok(());
                    }
                }
                let snapshot = self.state.orders.on_cancel_ok(&cid, ts)?;
                self.state.account.release_remaining(&cid);
                self.emit(OutputEvent::OrderUpdate {
                    snapshot: snapshot.clone(),
                    reason: None,
                });
                self.strategies.on_order_update(&snapshot);
                self.emit_strategy_errors();
            }
            ExecutionEvent::CancelFailed { cid, reason, ts } => {
                let terminal = self
                    .state
                    .orders
                    .query(&cid)
                    .map(|snapshot| snapshot.status.is_terminal())
                    .unwrap_or(true);
                if terminal {
                    // Venue did not know the order because it already finished
                    debug!(%cid, %reason, "cancel failure on terminal order swallowed");
                    return Ok(());
                }
                if self
                    .state
                    .orders
                    .query(&cid)
                    .is_some_and(|snapshot| snapshot.status == OrderStatus::PendingCancel)
                {
                    self.state.orders.on_cancel_failed(&cid, ts)?;
                }
                self.emit(OutputEvent::Error {
                    message: format!("cancel failed for {cid}: {reason}"),
                    tag: Some("venue_reject"),
                    line_no: None,
                });
            }
            ExecutionEvent::Expired { cid, ts } => {
                let expirable = self.state.orders.query(&cid).is_some_and(|snapshot| {
                    matches!(
                        snapshot.status,
                        OrderStatus::Accepted | OrderStatus::PartiallyFilled
                    )
                });
                if !expirable {
                    debug!(%cid, "expiry for untracked or non-open order ignored");
                    return Ok(());
                }
                let snapshot = self.state.orders.on_expire(&cid, ts)?;
                self.state.account.release_remaining(&cid);
                self.emit(OutputEvent::OrderUpdate {
                    snapshot: snapshot.clone(),
                    reason: None,
                });
                self.strategies.on_order_update(&snapshot);
                self.emit_strategy_errors();
            }
            ExecutionEvent::ReconcileRequired { cid, .. } => {
                self.emit(OutputEvent::OrderReconcileRequired {
                    cid: cid.0.clone(),
                });
            }
        }
        Ok(())
    }

    fn process_fill(&mut self, fill: Fill) -> Result<(), EngineError> {
        let outcome = self
            .state
            .orders
            .on_fill(&fill.cid, fill.qty, fill.price, fill.ts)?;
        let snapshot = match outcome {
            FillOutcome::Applied(snapshot) => snapshot,
            FillOutcome::Stale => return Ok(()),
        };

        // Release the proportional hold and settle PnL/fees before any event
        // is emitted downstream
        let hold_price = snapshot.limit_price.unwrap_or(fill.price);
        self.state
            .account
            .release_partial(&fill.cid, hold_price * fill.qty);
        if snapshot.status == OrderStatus::Filled {
            self.state.account.release_remaining(&fill.cid);
        }

        let realized = self
            .state
            .position_mut(&fill.symbol)
            .apply_fill(fill.side, fill.qty, fill.price);
        let quote = quote_asset(&fill.symbol);
        self.state.account.apply_realized(quote.clone(), realized);
        self.state.account.debit_fee(quote, fill.fee);

        self.risk.on_fill(realized);

        if self.config.record_fills {
            self.fills.push(fill.clone());
        }

        self.emit(OutputEvent::Fill(fill.clone()));
        self.emit(OutputEvent::OrderUpdate {
            snapshot: snapshot.clone(),
            reason: None,
        });
        self.strategies.on_fill(&fill);
        self.strategies.on_order_update(&snapshot);
        self.emit_strategy_errors();
        Ok(())
    }

    fn process_command(&mut self, line_no: u64, line: &str) -> Result<(), EngineError> {
        if line.trim().is_empty() {
            return Ok(());
        }
        self.commands_processed += 1;

        let now = self.clock.now_ns();
        let command = match self.command_reader.parse(line, now) {
            Ok(command) => command,
            Err(error) => {
                self.emit(OutputEvent::Error {
                    message: error.to_string(),
                    tag: Some(error.tag()),
                    line_no: Some(line_no),
                });
                return Ok(());
            }
        };

        match command {
            Command::Order(request) => self.process_submit(None, request),
            Command::Cancel(cid) => self.process_cancel(&cid),
            Command::Query(query) => {
                self.process_query(query);
                Ok(())
            }
            Command::Strategy(command) => self.process_strategy_command(command),
            Command::Subscribe(spec) => {
                self.subscriptions.insert(spec.clone());
                self.emit(OutputEvent::SubscriptionStatus {
                    venue: spec.venue,
                    symbol: spec.symbol,
                    event_type: spec.event_type.as_str().to_string(),
                    subscribed: true,
                });
                Ok(())
            }
            Command::Unsubscribe(spec) => {
                self.subscriptions.remove(&spec);
                self.emit(OutputEvent::SubscriptionStatus {
                    venue: spec.venue,
                    symbol: spec.symbol,
                    event_type: spec.event_type.as_str().to_string(),
                    subscribed: false,
                });
                Ok(())
            }
        }
    }

    fn process_query(&mut self, query: QueryCommand) {
        self.emit(OutputEvent::QueryReceived {
            query: format!("{query:?}"),
        });

        match query {
            QueryCommand::Order { cid } => match self.state.orders.query(&cid) {
                Some(snapshot) => self.emit(OutputEvent::OrderState { snapshot }),
                None => self.emit(OutputEvent::Error {
                    message: format!("unknown client order id: {cid}"),
                    tag: Some("invalid_command"),
                    line_no: None,
                }),
            },
            QueryCommand::Orders => {
                for snapshot in self.state.orders.snapshot() {
                    self.emit(OutputEvent::OrderState { snapshot });
                }
            }
            QueryCommand::Account | QueryCommand::Positions => {
                let balances = self
                    .state
                    .account
                    .balances()
                    .map(|(asset, balance)| AccountBalanceEntry::new(asset, balance))
                    .collect();
                let positions = self
                    .state
                    .positions()
                    .map(|position| AccountPositionEntry {
                        symbol: position.symbol.clone(),
                        net_qty: position.net_qty,
                        avg_entry_price: position.avg_entry_price,
                        realized_pnl: position.realized_pnl,
                    })
                    .collect();
                self.emit(OutputEvent::Account {
                    balances,
                    positions,
                });
            }
        }
    }

    fn process_strategy_command(&mut self, command: StrategyCommand) -> Result<(), EngineError> {
        self.emit(OutputEvent::StrategyCommandReceived {
            command: format!("{command:?}"),
        });
        let now = self.clock.now_ns();

        let result: Result<(&'static str, StrategyEventPayload), crate::strategy::StrategyError> =
            match command {
                StrategyCommand::Load {
                    id,
                    type_name,
                    symbol,
                    params,
                } => {
                    let instrument = self
                        .instrument_for(symbol.unwrap_or_else(|| self.config.symbol.clone()));
                    self.strategies
                        .load(&id, &type_name, &params, instrument, now)
                        .map(|status| ("loaded", StrategyEventPayload::Status(status)))
                }
                StrategyCommand::Start { id } => self
                    .strategies
                    .start(&id)
                    .map(|status| ("started", StrategyEventPayload::Status(status))),
                StrategyCommand::Stop { id } => self
                    .strategies
                    .stop(&id)
                    .map(|status| ("stopped", StrategyEventPayload::Status(status))),
                StrategyCommand::Pause { id } => self
                    .strategies
                    .pause(&id)
                    .map(|status| ("paused", StrategyEventPayload::Status(status))),
                StrategyCommand::Resume { id } => match self.strategies.resume(&id) {
                    Ok((status, deferred_actions)) => {
                        self.emit(OutputEvent::Strategy {
                            action: "resumed",
                            payload: StrategyEventPayload::Status(status),
                        });
                        self.process_actions(deferred_actions)?;
                        return Ok(());
                    }
                    Err(error) => Err(error),
                },
                StrategyCommand::Unload { id } => self
                    .strategies
                    .unload(&id)
                    .map(|status| ("unloaded", StrategyEventPayload::Status(status))),
                StrategyCommand::List => Ok((
                    "list",
                    StrategyEventPayload::List {
                        types: self.strategies.registered_types(),
                    },
                )),
                StrategyCommand::Status { id: Some(id) } => self
                    .strategies
                    .status(&id)
                    .map(|status| ("status", StrategyEventPayload::Status(status))),
                StrategyCommand::Status { id: None } => Ok((
                    "status_all",
                    StrategyEventPayload::StatusAll {
                        strategies: self.strategies.status_all(),
                    },
                )),
                StrategyCommand::Params { id, params } => self
                    .strategies
                    .update_params(&id, &params)
                    .map(|status| ("params_updated", StrategyEventPayload::Status(status))),
                StrategyCommand::Metrics { id: Some(id) } => {
                    self.strategies.status(&id).map(|status| {
                        (
                            "metrics",
                            StrategyEventPayload::Metrics {
                                id: status.id.clone(),
                                metrics: status.metrics,
                            },
                        )
                    })
                }
                StrategyCommand::Metrics { id: None } => Ok((
                    "metrics_summary",
                    StrategyEventPayload::MetricsSummary {
                        strategies: self.strategies.status_all(),
                    },
                )),
            };

        match result {
            Ok((action, payload)) => {
                self.emit(OutputEvent::Strategy { action, payload });
            }
            Err(error) => {
                let tag = match &error {
                    crate::strategy::StrategyError::UnknownType(_)
                    | crate::strategy::StrategyError::UnknownInstance(_) => "unknown_strategy",
                    _ => "bad_params",
                };
                self.emit(OutputEvent::Error {
                    message: error.to_string(),
                    tag: Some(tag),
                    line_no: None,
                });
            }
        }
        Ok(())
    }

    fn emit_strategy_errors(&mut self) {
        for id in self.strategies.drain_errored() {
            self.emit(OutputEvent::Error {
                message: format!("strategy {id} panicked and was isolated"),
                tag: Some("strategy_panicked"),
                line_no: None,
            });
        }
    }

    fn emit(&mut self, event: OutputEvent) {
        self.sink.emit(self.clock.now_ns(), event);
    }

    fn report_progress_throttled(&mut self) {
        let Some(callback) = self.progress_callback.as_mut() else {
            return;
        };
        let due = self
            .progress_last_report
            .map(|last| last.elapsed() >= std::time::Duration::from_millis(100))
            .unwrap_or(true);
        if due {
            callback(self.clock.progress());
            self.progress_last_report = Some(std::time::Instant::now());
        }
    }

    fn require_status(
        &self,
        required: EngineStatus,
        action: &'static str,
    ) -> Result<(), EngineError> {
        if self.status != required {
            return Err(EngineError::InvalidTransition {
                from: self.status,
                action,
            });
        }
        Ok(())
    }
}

impl<Clk: EngineClock> Engine<Clk> {
    /// Live-mode run loop: consumes `(ts, event)` pairs from the bounded
    /// input channel (fed by venue I/O workers and the command reader),
    /// interleaves executor completions and due timers, and drains in-flight
    /// venue work on stop.
    pub async fn run_live(
        &mut self,
        mut input: tokio::sync::mpsc::Receiver<(TimestampNs, EngineEvent)>,
    ) -> Result<(), EngineError> {
        enum Wake {
            Input(Option<(TimestampNs, EngineEvent)>),
            Execution(Option<Vec<ExecutionEvent>>),
            TimerDue,
        }

        loop {
            if matches!(self.status, EngineStatus::Stopping) {
                break;
            }

            // Dispatch queued events that are already due (a paused engine
            // holds them until resume)
            while self.status == EngineStatus::Running {
                match self.queue.peek_ts() {
                    Some(ts) if ts <= self.clock.now_ns() => {}
                    _ => break,
                }
                let Some((ts, event)) = self.queue.pop() else {
                    break;
                };
                self.dispatch(ts, event)?;
            }
            if matches!(self.status, EngineStatus::Stopping) {
                break;
            }

            let sleep_duration = self
                .queue
                .peek_ts()
                .map(|ts| {
                    let delta_ns = ts.as_nanos() - self.clock.now_ns().as_nanos();
                    std::time::Duration::from_nanos(delta_ns.max(0) as u64)
                })
                .unwrap_or(std::time::Duration::from_secs(3600));

            let wake = {
                let live = match &mut self.execution {
                    ExecutionHandler::Live(live) => Some(live),
                    ExecutionHandler::Sim(_) => None,
                };
                let poll_execution = live.as_ref().map(|l| l.in_flight_count() > 0).unwrap_or(false);

                tokio::select! {
                    maybe = input.recv() => Wake::Input(maybe),
                    events = async {
                        match live {
                            Some(live) => live.next_events().await,
                            None => std::future::pending().await,
                        }
                    }, if poll_execution => Wake::Execution(events),
                    _ = tokio::time::sleep(sleep_duration) => Wake::TimerDue,
                }
            };

            match wake {
                Wake::Input(Some((ts, event))) => {
                    // Paused engines buffer events instead of dispatching,
                    // but a Stop must still get through
                    let paused = matches!(self.status, EngineStatus::Paused);
                    if paused && matches!(event, EngineEvent::Stop) {
                        self.stop();
                    } else if paused {
                        if let Err(error) = self.enqueue(ts, event) {
                            warn!(%error, "input event shed while paused");
                        }
                    } else {
                        self.dispatch(ts, event)?;
                    }
                }
                Wake::Input(None) => {
                    debug!("input channel closed, stopping engine");
                    self.stop();
                }
                Wake::Execution(Some(events)) => {
                    for event in events {
                        self.process_execution_event(event)?;
                    }
                }
                Wake::Execution(None) | Wake::TimerDue => {}
            }
        }

        // Drain: await in-flight venue RPCs up to the stop deadline, then
        // surface whatever is still unresolved as reconcile-required
        if let ExecutionHandler::Live(live) = &mut self.execution {
            let drained = live.drain(std::time::Duration::from_secs(5)).await;
            for event in drained {
                self.process_execution_event(event)?;
            }
        }
        self.finish()
    }
}
