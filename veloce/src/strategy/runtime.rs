use crate::strategy::{
    mean_reversion::MeanReversionStrategy, momentum::MomentumStrategy, Action, ParamSpec, Params,
    Strategy, StrategyContext, StrategyError,
};
use fnv::FnvHashMap;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::{
    collections::HashSet,
    panic::{catch_unwind, AssertUnwindSafe},
};
use tracing::{error, info};
use veloce_data::{event::MarketEvent, time::TimestampNs};
use veloce_execution::{venue::StreamSpec, ClientOrderId, Fill, OrderSnapshot};

/// Lifecycle state of a loaded strategy instance.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize,
)]
#[serde(rename_all = "snake_case")]
pub enum StrategyState {
    Loaded,
    Running,
    Paused,
    Stopped,
    /// A callback panicked; the strategy is isolated and receives no further
    /// events.
    Errored,
}

impl StrategyState {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyState::Loaded => "loaded",
            StrategyState::Running => "running",
            StrategyState::Paused => "paused",
            StrategyState::Stopped => "stopped",
            StrategyState::Errored => "errored",
        }
    }
}

/// Per-strategy execution metrics.
#[derive(Debug, Copy, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct StrategyMetrics {
    pub events_processed: u64,
    pub signals_generated: u64,
    /// Exponential moving average (alpha = 0.1) of callback execution time.
    pub avg_execution_time_us: f64,
    pub errors: u64,
}

impl StrategyMetrics {
    const EMA_ALPHA: f64 = 0.1;

    fn record(&mut self, elapsed_us: f64, signals: usize) {
        self.events_processed += 1;
        self.signals_generated += signals as u64;
        self.avg_execution_time_us = if self.events_processed == 1 {
            elapsed_us
        } else {
            Self::EMA_ALPHA * elapsed_us + (1.0 - Self::EMA_ALPHA) * self.avg_execution_time_us
        };
    }
}

/// Serializable description of a loaded strategy instance.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StrategyStatus {
    pub id: SmolStr,
    pub type_name: SmolStr,
    pub state: StrategyState,
    pub params: Params,
    pub metrics: StrategyMetrics,
}

struct Instance {
    id: SmolStr,
    type_name: SmolStr,
    params: Params,
    state: StrategyState,
    metrics: StrategyMetrics,
    strategy: Box<dyn Strategy>,
    subscriptions: HashSet<StreamSpec>,
    /// Timers that fired while paused, delivered in ts order on resume.
    deferred_timers: Vec<(SmolStr, TimestampNs)>,
}

impl std::fmt::Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instance")
            .field("id", &self.id)
            .field("type_name", &self.type_name)
            .field("state", &self.state)
            .finish()
    }
}

type FactoryFn = fn(&Params) -> Box<dyn Strategy>;

/// Loadable strategy type: parameter ranges plus a constructor.
#[derive(Clone)]
struct Factory {
    specs: Vec<ParamSpec>,
    build: FactoryFn,
}

/// Loads strategy instances by type name, routes market events to subscribed
/// instances, collects their [`Action`]s in order and tracks per-instance
/// metrics.
///
/// The runtime never talks to executors: every collected action is handed
/// back to the engine, which owns risk checking and execution.
#[derive(Debug)]
pub struct StrategyRuntime {
    registry: IndexMap<SmolStr, RegisteredType>,
    instances: IndexMap<SmolStr, Instance>,
    /// Orders submitted per strategy, for fill/update routing.
    order_owner: FnvHashMap<ClientOrderId, SmolStr>,
    /// Instances errored since the last drain, for engine error events.
    newly_errored: Vec<SmolStr>,
}

struct RegisteredType {
    factory: Factory,
}

impl std::fmt::Debug for RegisteredType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredType").finish()
    }
}

impl Default for StrategyRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl StrategyRuntime {
    /// Construct a runtime with the built-in strategy types registered.
    pub fn new() -> Self {
        let mut runtime = Self {
            registry: IndexMap::new(),
            instances: IndexMap::new(),
            order_owner: FnvHashMap::default(),
            newly_errored: Vec::new(),
        };
        runtime.register(
            "momentum",
            MomentumStrategy::param_specs(),
            MomentumStrategy::build,
        );
        runtime.register(
            "mean_reversion",
            MeanReversionStrategy::param_specs(),
            MeanReversionStrategy::build,
        );
        runtime
    }

    /// Register a loadable strategy type.
    pub fn register(&mut self, type_name: &str, specs: Vec<ParamSpec>, build: FactoryFn) {
        self.registry.insert(
            SmolStr::new(type_name),
            RegisteredType {
                factory: Factory { specs, build },
            },
        );
    }

    /// Load a new instance of `type_name` with `params`, validated against
    /// the type's declared ranges, assigned to trade `instrument`. The
    /// instance starts in `Loaded`.
    pub fn load(
        &mut self,
        id: &str,
        type_name: &str,
        params: &Params,
        instrument: veloce_instrument::Instrument,
        now: TimestampNs,
    ) -> Result<StrategyStatus, StrategyError> {
        let id = SmolStr::new(id);
        if self.instances.contains_key(&id) {
            return Err(StrategyError::DuplicateInstance(id));
        }
        let registered = self
            .registry
            .get(type_name)
            .ok_or_else(|| StrategyError::UnknownType(SmolStr::new(type_name)))?;

        let validated = super::validate_params(&registered.factory.specs, params)?;
        let mut strategy = (registered.factory.build)(&validated);
        strategy.on_init(&StrategyContext {
            id: id.clone(),
            params: validated.clone(),
            instrument,
            now,
        });
        let subscriptions = strategy.subscriptions().into_iter().collect();

        let instance = Instance {
            id: id.clone(),
            type_name: SmolStr::new(type_name),
            params: validated,
            state: StrategyState::Loaded,
            metrics: StrategyMetrics::default(),
            strategy,
            subscriptions,
            deferred_timers: Vec::new(),
        };
        info!(%id, type_name, "strategy loaded");
        let status = status_of(&instance);
        self.instances.insert(id, instance);
        Ok(status)
    }

    pub fn start(&mut self, id: &str) -> Result<StrategyStatus, StrategyError> {
        self.transition(id, &[StrategyState::Loaded, StrategyState::Stopped], StrategyState::Running)
    }

    pub fn pause(&mut self, id: &str) -> Result<StrategyStatus, StrategyError> {
        self.transition(id, &[StrategyState::Running], StrategyState::Paused)
    }

    /// Resume a paused strategy, returning any actions produced by timers
    /// that fired while paused (delivered in ts order).
    pub fn resume(
        &mut self,
        id: &str,
    ) -> Result<(StrategyStatus, Vec<(SmolStr, Action)>), StrategyError> {
        let status = self.transition(id, &[StrategyState::Paused], StrategyState::Running)?;

        let instance = self.instance_mut(id)?;
        let mut deferred = std::mem::take(&mut instance.deferred_timers);
        deferred.sort_by_key(|(_, ts)| *ts);

        let mut actions = Vec::new();
        for (name, ts) in deferred {
            actions.extend(self.deliver_timer(id, &name, ts));
        }
        Ok((status, actions))
    }

    pub fn stop(&mut self, id: &str) -> Result<StrategyStatus, StrategyError> {
        let instance = self.instance_mut(id)?;
        if !matches!(
            instance.state,
            StrategyState::Running | StrategyState::Paused | StrategyState::Loaded
        ) {
            return Err(StrategyError::BadState {
                id: instance.id.clone(),
                state: instance.state.as_str(),
                required: "running|paused|loaded",
            });
        }
        instance.strategy.on_stop();
        instance.state = StrategyState::Stopped;
        Ok(status_of(instance))
    }

    /// Unload an instance entirely, calling `on_stop` if it is still live.
    pub fn unload(&mut self, id: &str) -> Result<StrategyStatus, StrategyError> {
        let mut instance = self
            .instances
            .shift_remove(id)
            .ok_or_else(|| StrategyError::UnknownInstance(SmolStr::new(id)))?;
        if matches!(
            instance.state,
            StrategyState::Running | StrategyState::Paused | StrategyState::Loaded
        ) {
            instance.strategy.on_stop();
        }
        self.order_owner.retain(|_, owner| owner != id);
        Ok(status_of(&instance))
    }

    /// Record that order `cid` belongs to strategy `id`, for routing fills
    /// and order updates back.
    pub fn record_order_owner(&mut self, cid: &ClientOrderId, id: &SmolStr) {
        self.order_owner.insert(cid.clone(), id.clone());
    }

    /// Owner strategy of an order, if it was strategy-submitted.
    pub fn order_owner(&self, cid: &ClientOrderId) -> Option<&SmolStr> {
        self.order_owner.get(cid)
    }

    /// Instances that moved to `Errored` since the last call.
    pub fn drain_errored(&mut self) -> Vec<SmolStr> {
        std::mem::take(&mut self.newly_errored)
    }

    /// Re-validate and replace the parameters of a loaded instance.
    ///
    /// The new parameters take effect the next time the strategy consults
    /// them; running state is not reset.
    pub fn update_params(&mut self, id: &str, params: &Params) -> Result<StrategyStatus, StrategyError> {
        let specs = {
            let instance = self.instance_mut(id)?;
            let type_name = instance.type_name.clone();
            self.registry
                .get(&type_name)
                .map(|registered| registered.factory.specs.clone())
                .ok_or(StrategyError::UnknownType(type_name))?
        };
        let validated = super::validate_params(&specs, params)?;
        let instance = self.instance_mut(id)?;
        instance.params = validated;
        Ok(status_of(instance))
    }

    /// Route a market event to every running instance subscribed to its
    /// `(venue, symbol, kind)` stream, collecting `(owner, action)` pairs in
    /// instance-load order.
    pub fn on_market_event(&mut self, event: &MarketEvent) -> Vec<(SmolStr, Action)> {
        let spec = StreamSpec::new(event.venue, event.symbol.clone(), event.kind_tag());
        let mut collected = Vec::new();

        let ids: Vec<SmolStr> = self
            .instances
            .values()
            .filter(|instance| {
                instance.state == StrategyState::Running
                    && instance.subscriptions.contains(&spec)
            })
            .map(|instance| instance.id.clone())
            .collect();

        for id in ids {
            let Some(instance) = self.instances.get_mut(&id) else {
                continue;
            };
            let started = std::time::Instant::now();
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                instance.strategy.on_market_event(event)
            }));
            let elapsed_us = started.elapsed().as_secs_f64() * 1e6;

            match outcome {
                Ok(actions) => {
                    let signals = actions
                        .iter()
                        .filter(|action| matches!(action, Action::Submit(_) | Action::Cancel(_)))
                        .count();
                    instance.metrics.record(elapsed_us, signals);
                    collected.extend(actions.into_iter().map(|action| (id.clone(), action)));
                }
                Err(_) => {
                    instance.metrics.errors += 1;
                    instance.state = StrategyState::Errored;
                    self.newly_errored.push(id.clone());
                    error!(id = %id, "strategy panicked in on_market_event, moved to Errored");
                }
            }
        }

        collected
    }

    /// Deliver a fill to the strategy that owns the order, if it is live.
    pub fn on_fill(&mut self, fill: &Fill) {
        let Some(owner) = self.order_owner.get(&fill.cid).cloned() else {
            return;
        };
        let Some(instance) = self.instances.get_mut(&owner) else {
            return;
        };
        if !matches!(instance.state, StrategyState::Running | StrategyState::Paused) {
            return;
        }
        if catch_unwind(AssertUnwindSafe(|| instance.strategy.on_fill(fill))).is_err() {
            instance.metrics.errors += 1;
            instance.state = StrategyState::Errored;
            self.newly_errored.push(owner.clone());
            error!(id = %owner, "strategy panicked in on_fill, moved to Errored");
        }
    }

    /// Deliver an order update to the strategy that owns the order.
    pub fn on_order_update(&mut self, update: &OrderSnapshot) {
        let Some(owner) = self.order_owner.get(&update.cid).cloned() else {
            return;
        };
        let Some(instance) = self.instances.get_mut(&owner) else {
            return;
        };
        if !matches!(instance.state, StrategyState::Running | StrategyState::Paused) {
            return;
        }
        if catch_unwind(AssertUnwindSafe(|| instance.strategy.on_order_update(update))).is_err() {
            instance.metrics.errors += 1;
            instance.state = StrategyState::Errored;
            self.newly_errored.push(owner.clone());
            error!(id = %owner, "strategy panicked in on_order_update, moved to Errored");
        }
    }

    /// Deliver a timer to its strategy. Timers firing while paused are
    /// buffered and replayed on resume.
    pub fn deliver_timer(&mut self, id: &str, name: &str, ts: TimestampNs) -> Vec<(SmolStr, Action)> {
        let Some(instance) = self.instances.get_mut(id) else {
            return Vec::new();
        };

        match instance.state {
            StrategyState::Paused => {
                instance.deferred_timers.push((SmolStr::new(name), ts));
                Vec::new()
            }
            StrategyState::Running => {
                let owner = instance.id.clone();
                match catch_unwind(AssertUnwindSafe(|| instance.strategy.on_timer(name, ts))) {
                    Ok(actions) => actions.into_iter().map(|action| (owner.clone(), action)).collect(),
                    Err(_) => {
                        instance.metrics.errors += 1;
                        instance.state = StrategyState::Errored;
                        self.newly_errored.push(owner.clone());
                        error!(id = %owner, "strategy panicked in on_timer, moved to Errored");
                        Vec::new()
                    }
                }
            }
            _ => Vec::new(),
        }
    }

    /// Status of one instance.
    pub fn status(&self, id: &str) -> Result<StrategyStatus, StrategyError> {
        self.instances
            .get(id)
            .map(status_of)
            .ok_or_else(|| StrategyError::UnknownInstance(SmolStr::new(id)))
    }

    /// Status of every loaded instance, in load order.
    pub fn status_all(&self) -> Vec<StrategyStatus> {
        self.instances.values().map(status_of).collect()
    }

    /// Names of registered loadable types.
    pub fn registered_types(&self) -> Vec<SmolStr> {
        self.registry.keys().cloned().collect()
    }

    /// Declared parameter ranges of a registered type.
    pub fn param_specs(&self, type_name: &str) -> Option<&[ParamSpec]> {
        self.registry
            .get(type_name)
            .map(|registered| registered.factory.specs.as_slice())
    }

    fn transition(
        &mut self,
        id: &str,
        from: &[StrategyState],
        to: StrategyState,
    ) -> Result<StrategyStatus, StrategyError> {
        let instance = self.instance_mut(id)?;
        if !from.contains(&instance.state) {
            return Err(StrategyError::BadState {
                id: instance.id.clone(),
                state: instance.state.as_str(),
                required: match to {
                    StrategyState::Running => "loaded|stopped|paused",
                    StrategyState::Paused => "running",
                    _ => "live",
                },
            });
        }
        instance.state = to;
        Ok(status_of(instance))
    }

    fn instance_mut(&mut self, id: &str) -> Result<&mut Instance, StrategyError> {
        self.instances
            .get_mut(id)
            .ok_or_else(|| StrategyError::UnknownInstance(SmolStr::new(id)))
    }
}

fn status_of(instance: &Instance) -> StrategyStatus {
    StrategyStatus {
        id: instance.id.clone(),
        type_name: instance.type_name.clone(),
        state: instance.state,
        params: instance.params.clone(),
        metrics: instance.metrics,
    }
}
