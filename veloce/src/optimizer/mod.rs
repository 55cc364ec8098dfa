use crate::{
    backtest::{summary::BacktestResult, BacktestError, BacktestRunner},
    strategy::Params,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Exhaustive cartesian-product search.
pub mod grid;

/// Uniform random search.
pub mod random;

/// Genetic algorithm search.
pub mod genetic;

/// Gaussian-process Bayesian search.
pub mod bayesian;

/// All possible optimizer errors.
#[derive(Debug, Clone, PartialEq, Serialize, Error)]
pub enum OptimizerError {
    #[error("invalid optimizer config: {0}")]
    Config(String),

    #[error("trial failed: {0}")]
    Trial(#[from] BacktestError),
}

/// One tunable parameter's search range.
///
/// `step: Some(..)` makes the range discrete (grid points); `None` means
/// continuous sampling.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ParamRange {
    pub name: String,
    pub min: f64,
    pub max: f64,
    pub step: Option<f64>,
}

impl ParamRange {
    pub fn stepped(name: &str, min: f64, max: f64, step: f64) -> Self {
        Self {
            name: name.to_string(),
            min,
            max,
            step: Some(step),
        }
    }

    pub fn continuous(name: &str, min: f64, max: f64) -> Self {
        Self {
            name: name.to_string(),
            min,
            max,
            step: None,
        }
    }

    /// Grid points of the range. Continuous ranges are discretised into ten
    /// evenly spaced points for grid search.
    pub fn grid_values(&self) -> Vec<f64> {
        match self.step {
            Some(step) if step > 0.0 => {
                let mut values = Vec::new();
                let mut value = self.min;
                while value <= self.max + step * 1e-9 {
                    values.push(value.min(self.max));
                    value += step;
                }
                values
            }
            _ => {
                const DIVISIONS: usize = 10;
                (0..DIVISIONS)
                    .map(|index| {
                        self.min
                            + (self.max - self.min) * index as f64 / (DIVISIONS - 1) as f64
                    })
                    .collect()
            }
        }
    }

    /// Clamp `value` into the range, snapping to the step grid when discrete.
    pub fn clamp(&self, value: f64) -> f64 {
        let clamped = value.clamp(self.min, self.max);
        match self.step {
            Some(step) if step > 0.0 => {
                let snapped = self.min + ((clamped - self.min) / step).round() * step;
                snapped.clamp(self.min, self.max)
            }
            _ => clamped,
        }
    }

    fn validate(&self) -> Result<(), OptimizerError> {
        if !(self.min.is_finite() && self.max.is_finite()) || self.min > self.max {
            return Err(OptimizerError::Config(format!(
                "bad range for '{}': [{}, {}]",
                self.name, self.min, self.max
            )));
        }
        Ok(())
    }
}

/// Validate a full range set.
pub(crate) fn validate_ranges(ranges: &[ParamRange]) -> Result<(), OptimizerError> {
    if ranges.is_empty() {
        return Err(OptimizerError::Config("no parameter ranges".to_string()));
    }
    for range in ranges {
        range.validate()?;
    }
    Ok(())
}

/// Objective a search maximises.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Objective {
    Sharpe,
    TotalReturn,
    WinRate,
    Custom(fn(&BacktestResult) -> f64),
}

impl Objective {
    pub fn fitness(&self, result: &BacktestResult) -> f64 {
        let value = match self {
            Objective::Sharpe => result.sharpe_ratio,
            Objective::TotalReturn => result.total_return,
            Objective::WinRate => result.win_rate,
            Objective::Custom(function) => function(result),
        };
        if value.is_nan() { f64::NEG_INFINITY } else { value }
    }
}

/// Progress snapshot delivered to the optimizer callback after each trial.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizerProgress {
    pub current_iteration: usize,
    pub total_iterations: usize,
    pub best_fitness: f64,
    pub current_fitness: f64,
    pub best_params: Params,
    pub current_params: Params,
}

/// Callback receiving [`OptimizerProgress`] updates.
pub type ProgressFn<'a> = &'a mut dyn FnMut(&OptimizerProgress);

/// One evaluated trial.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedEntry {
    pub params: Params,
    pub fitness: f64,
    pub result: BacktestResult,
}

/// Trials ranked by descending fitness.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RankedResults {
    pub entries: Vec<RankedEntry>,
}

impl RankedResults {
    pub fn push(&mut self, entry: RankedEntry) {
        self.entries.push(entry);
    }

    /// Sort descending by fitness (stable, so equal-fitness trials keep
    /// evaluation order).
    pub fn rank(&mut self) {
        self.entries.sort_by(|a, b| {
            b.fitness
                .partial_cmp(&a.fitness)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
    }

    pub fn best(&self) -> Option<&RankedEntry> {
        self.entries.first()
    }
}

/// Shared surface of every parameter search algorithm.
pub trait Optimizer {
    /// Run the search over `runner`, maximising `objective`, reporting each
    /// trial through `progress`.
    fn optimize(
        &mut self,
        runner: &BacktestRunner,
        ranges: &[ParamRange],
        objective: &Objective,
        progress: Option<ProgressFn<'_>>,
    ) -> Result<RankedResults, OptimizerError>;
}

/// Evaluate a batch of candidates, fanning trials across up to `parallelism`
/// threads. Results come back in candidate order.
pub(crate) fn evaluate_batch(
    runner: &BacktestRunner,
    candidates: &[Params],
    objective: &Objective,
    parallelism: usize,
) -> Result<Vec<(f64, BacktestResult)>, OptimizerError> {
    let parallelism = parallelism.max(1);
    if parallelism == 1 || candidates.len() <= 1 {
        return candidates
            .iter()
            .map(|params| {
                let result = runner.run_with_params(params)?;
                Ok((objective.fitness(&result), result))
            })
            .collect();
    }

    let outcomes: Vec<parking_lot::Mutex<Option<Result<(f64, BacktestResult), OptimizerError>>>> =
        candidates.iter().map(|_| parking_lot::Mutex::new(None)).collect();
    let next = std::sync::atomic::AtomicUsize::new(0);

    std::thread::scope(|scope| {
        for _ in 0..parallelism.min(candidates.len()) {
            scope.spawn(|| loop {
                let index = next.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                let Some(params) = candidates.get(index) else {
                    break;
                };
                let outcome = runner
                    .run_with_params(params)
                    .map(|result| (objective.fitness(&result), result))
                    .map_err(OptimizerError::from);
                *outcomes[index].lock() = Some(outcome);
            });
        }
    });

    outcomes
        .into_iter()
        .map(|cell| {
            cell.into_inner()
                .unwrap_or_else(|| Err(OptimizerError::Config("trial never ran".to_string())))
        })
        .collect()
}

/// Emit a progress update, tracking the running best.
pub(crate) fn report_progress(
    progress: &mut Option<ProgressFn<'_>>,
    iteration: usize,
    total: usize,
    best: &mut Option<(f64, Params)>,
    current_fitness: f64,
    current_params: &Params,
) {
    let improved = best
        .as_ref()
        .map(|(fitness, _)| current_fitness > *fitness)
        .unwrap_or(true);
    if improved {
        *best = Some((current_fitness, current_params.clone()));
    }

    if let Some(callback) = progress.as_mut() {
        let (best_fitness, best_params) = best
            .as_ref()
            .map(|(fitness, params)| (*fitness, params.clone()))
            .unwrap_or((current_fitness, current_params.clone()));
        callback(&OptimizerProgress {
            current_iteration: iteration,
            total_iterations: total,
            best_fitness,
            current_fitness,
            best_params,
            current_params: current_params.clone(),
        });
    }
}
