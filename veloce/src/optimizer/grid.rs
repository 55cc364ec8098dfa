use crate::{
    backtest::BacktestRunner,
    optimizer::{
        evaluate_batch, report_progress, validate_ranges, Objective, Optimizer, OptimizerError,
        ParamRange, ProgressFn, RankedEntry, RankedResults,
    },
    strategy::Params,
};
use tracing::info;

/// Exhaustive search over the cartesian product of every range's grid points,
/// bounded by `max_iterations`.
#[derive(Debug, Clone)]
pub struct GridOptimizer {
    pub max_iterations: usize,
    /// Trials evaluated concurrently.
    pub parallelism: usize,
}

impl Default for GridOptimizer {
    fn default() -> Self {
        Self {
            max_iterations: 1_000,
            parallelism: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        }
    }
}

/// All grid points of the cartesian product, in range-major order.
pub(crate) fn cartesian_product(ranges: &[ParamRange]) -> Vec<Params> {
    let value_sets: Vec<Vec<f64>> = ranges.iter().map(ParamRange::grid_values).collect();
    let mut combinations = vec![Params::new()];

    for (range, values) in ranges.iter().zip(&value_sets) {
        let mut expanded = Vec::with_capacity(combinations.len() * values.len());
        for combination in &combinations {
            for value in values {
                let mut next = combination.clone();
                next.insert(range.name.clone(), *value);
                expanded.push(next);
            }
        }
        combinations = expanded;
    }
    combinations
}

impl Optimizer for GridOptimizer {
    fn optimize(
        &mut self,
        runner: &BacktestRunner,
        ranges: &[ParamRange],
        objective: &Objective,
        mut progress: Option<ProgressFn<'_>>,
    ) -> Result<RankedResults, OptimizerError> {
        validate_ranges(ranges)?;

        let mut candidates = cartesian_product(ranges);
        if candidates.len() > self.max_iterations {
            info!(
                total = candidates.len(),
                cap = self.max_iterations,
                "grid truncated to max_iterations"
            );
            candidates.truncate(self.max_iterations);
        }
        let total = candidates.len();

        let outcomes = evaluate_batch(runner, &candidates, objective, self.parallelism)?;

        let mut ranked = RankedResults::default();
        let mut best: Option<(f64, Params)> = None;
        for (iteration, (params, (fitness, result))) in
            candidates.into_iter().zip(outcomes).enumerate()
        {
            report_progress(
                &mut progress,
                iteration + 1,
                total,
                &mut best,
                fitness,
                &params,
            );
            ranked.push(RankedEntry {
                params,
                fitness,
                result,
            });
        }
        ranked.rank();
        Ok(ranked)
    }
}
