use crate::{
    backtest::BacktestRunner,
    optimizer::{
        evaluate_batch, random::sample_params, report_progress, validate_ranges, Objective,
        Optimizer, OptimizerError, ParamRange, ProgressFn, RankedEntry, RankedResults,
    },
    strategy::Params,
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use tracing::debug;

/// Genetic algorithm search.
///
/// Tournament selection, uniform crossover and gaussian mutation over a
/// fixed-size population, with elitism so the best fitness is monotonically
/// non-decreasing across generations. Converges when the best fitness
/// improves by less than `convergence_delta` over `convergence_generations`
/// consecutive generations.
#[derive(Debug, Clone)]
pub struct GeneticOptimizer {
    pub population: usize,
    pub tournament_size: usize,
    pub crossover_rate: f64,
    pub mutation_rate: f64,
    /// Top individuals copied unchanged into the next generation.
    pub elitism: usize,
    pub max_generations: usize,
    pub convergence_delta: f64,
    pub convergence_generations: usize,
    pub parallelism: usize,
    pub seed: u64,
}

impl Default for GeneticOptimizer {
    fn default() -> Self {
        Self {
            population: 30,
            tournament_size: 3,
            crossover_rate: 0.8,
            mutation_rate: 0.1,
            elitism: 2,
            max_generations: 20,
            convergence_delta: 1e-6,
            convergence_generations: 5,
            parallelism: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            seed: 42,
        }
    }
}

impl GeneticOptimizer {
    fn validate(&self) -> Result<(), OptimizerError> {
        if self.population < 2 {
            return Err(OptimizerError::Config("population must be >= 2".to_string()));
        }
        if self.tournament_size == 0 || self.tournament_size > self.population {
            return Err(OptimizerError::Config(
                "tournament size must be in [1, population]".to_string(),
            ));
        }
        if self.elitism >= self.population {
            return Err(OptimizerError::Config(
                "elitism must be below population".to_string(),
            ));
        }
        Ok(())
    }

    /// Pick the fittest of `tournament_size` uniformly drawn individuals.
    fn tournament<'a>(
        &self,
        scored: &'a [(Params, f64)],
        rng: &mut StdRng,
    ) -> &'a (Params, f64) {
        let mut best: Option<&(Params, f64)> = None;
        for _ in 0..self.tournament_size {
            let candidate = &scored[rng.random_range(0..scored.len())];
            best = match best {
                Some(current) if current.1 >= candidate.1 => Some(current),
                _ => Some(candidate),
            };
        }
        best.unwrap_or(&scored[0])
    }

    /// Uniform crossover: each gene swaps between parents with probability
    /// one half when a crossover occurs at all.
    fn crossover(
        &self,
        mother: &Params,
        father: &Params,
        ranges: &[ParamRange],
        rng: &mut StdRng,
    ) -> Params {
        if rng.random::<f64>() >= self.crossover_rate {
            return mother.clone();
        }
        ranges
            .iter()
            .map(|range| {
                let source = if rng.random::<f64>() < 0.5 { mother } else { father };
                let value = source.get(&range.name).copied().unwrap_or(range.min);
                (range.name.clone(), value)
            })
            .collect()
    }

    /// Gaussian mutation with sigma one tenth of the range span, clamped and
    /// snapped back into range.
    fn mutate(&self, individual: &mut Params, ranges: &[ParamRange], rng: &mut StdRng) {
        for range in ranges {
            if rng.random::<f64>() >= self.mutation_rate {
                continue;
            }
            let sigma = (range.max - range.min) / 10.0;
            let noise = gaussian(rng) * sigma;
            if let Some(value) = individual.get_mut(&range.name) {
                *value = range.clamp(*value + noise);
            }
        }
    }
}

/// Standard normal sample via Box-Muller.
fn gaussian(rng: &mut StdRng) -> f64 {
    let u1: f64 = rng.random_range(f64::MIN_POSITIVE..1.0);
    let u2: f64 = rng.random::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

impl Optimizer for GeneticOptimizer {
    fn optimize(
        &mut self,
        runner: &BacktestRunner,
        ranges: &[ParamRange],
        objective: &Objective,
        mut progress: Option<ProgressFn<'_>>,
    ) -> Result<RankedResults, OptimizerError> {
        validate_ranges(ranges)?;
        self.validate()?;

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut population: Vec<Params> = (0..self.population)
            .map(|_| sample_params(ranges, &mut rng))
            .collect();

        let total = self.population * self.max_generations;
        let mut ranked = RankedResults::default();
        let mut best: Option<(f64, Params)> = None;
        let mut best_history: Vec<f64> = Vec::new();

        for generation in 0..self.max_generations {
            let outcomes = evaluate_batch(runner, &population, objective, self.parallelism)?;

            let mut scored: Vec<(Params, f64)> = Vec::with_capacity(self.population);
            for (index, (params, (fitness, result))) in
                population.iter().cloned().zip(outcomes).enumerate()
            {
                report_progress(
                    &mut progress,
                    generation * self.population + index + 1,
                    total,
                    &mut best,
                    fitness,
                    &params,
                );
                ranked.push(RankedEntry {
                    params: params.clone(),
                    fitness,
                    result,
                });
                scored.push((params, fitness));
            }

            // Fittest first
            scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
            let generation_best = scored[0].1;
            best_history.push(generation_best);
            debug!(generation, generation_best, "GA generation evaluated");

            // Converged when the best improved less than delta for the
            // configured number of consecutive generations
            if best_history.len() > self.convergence_generations {
                let window_start =
                    best_history[best_history.len() - 1 - self.convergence_generations];
                if (generation_best - window_start).abs() < self.convergence_delta {
                    debug!(generation, "GA converged");
                    break;
                }
            }
            if generation + 1 == self.max_generations {
                break;
            }

            // Next generation: elites unchanged, rest bred
            let mut next: Vec<Params> = scored
                .iter()
                .take(self.elitism)
                .map(|(params, _)| params.clone())
                .collect();
            while next.len() < self.population {
                let mother = self.tournament(&scored, &mut rng).0.clone();
                let father = self.tournament(&scored, &mut rng).0.clone();
                let mut child = self.crossover(&mother, &father, ranges, &mut rng);
                self.mutate(&mut child, ranges, &mut rng);
                next.push(child);
            }
            population = next;
        }

        ranked.rank();
        Ok(ranked)
    }
}
