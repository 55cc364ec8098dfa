use crate::engine::{clock::ClockError, queue::QueueError, state::order::OrderStoreError, EngineStatus};
use serde::Serialize;
use thiserror::Error;

/// Fatal engine errors.
///
/// Everything recoverable is converted into an `error` event on the outbound
/// stream; an `EngineError` means an invariant broke and the engine moves to
/// its terminal `Error` state.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Error)]
pub enum EngineError {
    #[error("invalid lifecycle transition from {from} on '{action}'")]
    InvalidTransition {
        from: EngineStatus,
        action: &'static str,
    },

    #[error("clock: {0}")]
    Clock(#[from] ClockError),

    #[error("event queue: {0}")]
    Queue(#[from] QueueError),

    #[error("order store: {0}")]
    OrderStore(#[from] OrderStoreError),
}
