use crate::{
    backtest::BacktestRunner,
    optimizer::{
        evaluate_batch, report_progress, validate_ranges, Objective, Optimizer, OptimizerError,
        ParamRange, ProgressFn, RankedEntry, RankedResults,
    },
    strategy::Params,
};
use rand::{rngs::StdRng, Rng, SeedableRng};

/// Uniform random search: `max_iterations` independent samples of the range
/// box.
#[derive(Debug, Clone)]
pub struct RandomOptimizer {
    pub max_iterations: usize,
    pub parallelism: usize,
    /// Seed for reproducible searches.
    pub seed: u64,
}

impl Default for RandomOptimizer {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            parallelism: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            seed: 42,
        }
    }
}

/// Draw one uniform sample of every range.
pub(crate) fn sample_params(ranges: &[ParamRange], rng: &mut StdRng) -> Params {
    ranges
        .iter()
        .map(|range| {
            let value = if range.min == range.max {
                range.min
            } else {
                rng.random_range(range.min..=range.max)
            };
            (range.name.clone(), range.clamp(value))
        })
        .collect()
}

impl Optimizer for RandomOptimizer {
    fn optimize(
        &mut self,
        runner: &BacktestRunner,
        ranges: &[ParamRange],
        objective: &Objective,
        mut progress: Option<ProgressFn<'_>>,
    ) -> Result<RankedResults, OptimizerError> {
        validate_ranges(ranges)?;

        let mut rng = StdRng::seed_from_u64(self.seed);
        let candidates: Vec<Params> = (0..self.max_iterations)
            .map(|_| sample_params(ranges, &mut rng))
            .collect();
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
