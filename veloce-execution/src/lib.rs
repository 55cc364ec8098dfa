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

//! # Veloce-Execution
//! Order model and execution capability consumed by the Veloce engine core:
//!
//! * [`order`] - order requests, identifiers, statuses and the aggregated
//!   per-client-order snapshot.
//! * [`trade`] - immutable [`Fill`](trade::Fill)s.
//! * [`balance`] - per-asset free/locked [`Balance`](balance::Balance)s.
//! * [`venue`] - the `VenueAdapter` capability a live executor drives.
//! * [`error`] - the execution error taxonomy.

/// Order requests, identifiers, statuses and snapshots.
pub mod order;

/// Immutable fills produced by an executor.
pub mod trade;

/// Per-asset account balances.
pub mod balance;

/// The `VenueAdapter` capability and its wire types.
pub mod venue;

/// Execution error taxonomy.
pub mod error;

pub use error::ExecutionError;
pub use order::{
    id::{ClientOrderId, VenueOrderId},
    OrderKind, OrderRequest, OrderSnapshot, OrderStatus, TimeInForce,
};
pub use trade::{Fill, Liquidity};
