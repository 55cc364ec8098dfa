#![forbid(unsafe_code)]
#![warn(
    unused,
    clippy::cognitive_complexity,
    unused_crate_dependencies,
    unused_extern_crates,
    clippy::unused_self,
    clippy::useless_let_if_seq,
    missing_debug_implementations,
    rust_2018_idioms
)]
#![allow(clippy::type_complexity, clippy::too_many_arguments)]

//! # Veloce
//! Veloce core is a Rust framework for building event-driven live-trading,
//! paper-trading and back-testing systems for crypto markets.
//!
//! At a high-level, it provides a few major components:
//! * `Engine` owning a priority-ordered event queue, a virtual or wall
//!   `EngineClock`, an order store, a pre-trade `RiskEngine`, a
//!   `StrategyRuntime` and a sim or live executor.
//! * Deterministic `SimExecutor` that matches resting client orders against
//!   incoming market ticks with price-time priority, fees and slippage.
//! * `LiveExecutor` driving a `VenueAdapter` capability with at-most-once
//!   placement and cancel idempotency.
//! * `BacktestHarness` that replays a `DataSource` through the same strategy
//!   surface under a virtual clock and produces a `BacktestResult`.
//! * Parameter `optimizer` (grid / random / genetic / bayesian) over the
//!   backtest harness.
//! * A line-command reader and an NDJSON event emitter as the only external
//!   surfaces.

use derive_more::Constructor;
use serde::{Deserialize, Serialize};

/// Trading `Engine`, its clock, event queue, state and dispatch loop.
pub mod engine;

/// Defines all possible errors in Veloce core.
pub mod error;

/// Sim and live executors, and the execution event model.
pub mod execution;

/// Provides default Veloce core Tracing logging initialisers.
pub mod logging;

/// Pre-trade risk gate and post-fill risk accounting.
pub mod risk;

/// Strategy behaviour interface, runtime and built-in strategies.
pub mod strategy;

/// Statistical algorithms for analysing equity curves and trade datasets.
///
/// eg/ `SharpeRatio`, `DrawdownGenerator`, `ProfitFactor`, etc.
pub mod statistic;

/// Backtesting harness and result summary.
pub mod backtest;

/// Parameter search over the backtest harness.
pub mod optimizer;

/// Line-delimited command protocol parser.
pub mod command;

/// NDJSON event stream emitter.
pub mod emit;

/// Monotonically increasing event sequence. Used to track `Engine` event
/// processing order and to break queue ties FIFO.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Default, Deserialize, Serialize,
    Constructor,
)]
pub struct Sequence(pub u64);

impl Sequence {
    pub fn value(&self) -> u64 {
        self.0
    }

    pub fn fetch_add(&mut self) -> Sequence {
        let sequence = *self;
        self.0 += 1;
        sequence
    }
}
