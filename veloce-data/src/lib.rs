#![forbid(unsafe_code)]
#![warn(
    unused,
    clippy::cognitive_complexity,
    unused_crate_dependencies,
    unused_extern_crates,
    clippy::unused_self,
    missing_debug_implementations,
    rust_2018_idioms
)]
#![allow(clippy::type_complexity)]

//! # Veloce-Data
//! Normalized market data model and historical data sources for the Veloce
//! trading engine.
//!
//! * [`event`] - the [`MarketEvent`](event::MarketEvent) every engine
//!   component consumes, with kinds for trades, book tops, book deltas,
//!   klines and coarse price ticks.
//! * [`feed`] - iterator-style feeds that drip market events into an engine.
//! * [`source`] - the `DataSource` capability used by the backtest harness,
//!   including a configurable CSV implementation.

/// Normalized market event model.
pub mod event;

/// Iterator-style market event feeds.
pub mod feed;

/// `DataSource` capability and concrete sources.
pub mod source;

/// Nanosecond timestamps used across the engine.
pub mod time;
