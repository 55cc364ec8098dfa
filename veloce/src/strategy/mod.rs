use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use thiserror::Error;
use veloce_data::{event::MarketEvent, time::TimestampNs};
use veloce_execution::{order::OrderRequest, ClientOrderId, Fill, OrderSnapshot};
use veloce_execution::venue::StreamSpec;

/// Strategy runtime: loading, routing, metrics and lifecycle.
pub mod runtime;

/// Built-in fast/slow moving-average crossover strategy.
pub mod momentum;

/// Built-in rolling-band mean reversion strategy.
pub mod mean_reversion;

/// Validated strategy parameters, keyed by name.
pub type Params = IndexMap<String, f64>;

/// All possible strategy loading / lifecycle errors.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Error)]
pub enum StrategyError {
    #[error("unknown strategy type: {0}")]
    UnknownType(SmolStr),

    #[error("unknown strategy instance: {0}")]
    UnknownInstance(SmolStr),

    #[error("duplicate strategy instance id: {0}")]
    DuplicateInstance(SmolStr),

    #[error("unknown parameter '{name}'")]
    UnknownParam { name: String },

    #[error("parameter '{name}'={value} outside [{min}, {max}]")]
    ParamOutOfRange {
        name: String,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    #[error("strategy '{id}' is {state}, operation requires {required}")]
    BadState {
        id: SmolStr,
        state: &'static str,
        required: &'static str,
    },
}

/// Emitted by a strategy callback for the engine to act on, in order.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Action {
    Submit(OrderRequest),
    Cancel(ClientOrderId),
    SetTimer { name: SmolStr, at: TimestampNs },
    Log(String),
}

/// Context handed to a strategy on initialisation.
#[derive(Debug, Clone)]
pub struct StrategyContext {
    pub id: SmolStr,
    pub params: Params,
    /// Instrument this instance is assigned to trade.
    pub instrument: veloce_instrument::Instrument,
    pub now: TimestampNs,
}

/// Behaviour surface of a trading strategy.
///
/// Callbacks are invoked on the engine loop thread and must not block; long
/// running work yields by setting a timer. Panics are caught at the runtime
/// boundary and isolate the strategy rather than the engine.
pub trait Strategy: Send {
    /// One-time initialisation with validated parameters.
    fn on_init(&mut self, ctx: &StrategyContext);

    /// Handle a market event the strategy is subscribed to.
    fn on_market_event(&mut self, event: &MarketEvent) -> Vec<Action>;

    /// Observe an update to an order this strategy submitted.
    fn on_order_update(&mut self, _update: &OrderSnapshot) {}

    /// Observe a fill against an order this strategy submitted.
    fn on_fill(&mut self, _fill: &Fill) {}

    /// Handle a previously set timer firing.
    fn on_timer(&mut self, _name: &str, _ts: TimestampNs) -> Vec<Action> {
        Vec::new()
    }

    /// Final callback before the strategy is stopped or unloaded.
    fn on_stop(&mut self) {}

    /// Market streams this strategy wants routed to it.
    fn subscriptions(&self) -> Vec<StreamSpec>;
}

/// Declared range of one tunable strategy parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamSpec {
    pub name: &'static str,
    pub min: f64,
    pub max: f64,
    pub default: f64,
}

impl ParamSpec {
    pub const fn new(name: &'static str, min: f64, max: f64, default: f64) -> Self {
        Self {
            name,
            min,
            max,
            default,
        }
    }
}

/// Validate `params` against `specs`: unknown names and out-of-range values
/// are rejected, missing parameters take their declared defaults.
pub fn validate_params(specs: &[ParamSpec], params: &Params) -> Result<Params, StrategyError> {
    for (name, value) in params {
        let spec = specs
            .iter()
            .find(|spec| spec.name == name)
            .ok_or_else(|| StrategyError::UnknownParam { name: name.clone() })?;
        if *value < spec.min || *value > spec.max || !value.is_finite() {
            return Err(StrategyError::ParamOutOfRange {
                name: name.clone(),
                value: *value,
                min: spec.min,
                max: spec.max,
            });
        }
    }

    let mut validated = Params::new();
    for spec in specs {
        let value = params.get(spec.name).copied().unwrap_or(spec.default);
        validated.insert(spec.name.to_string(), value);
    }
    Ok(validated)
}
