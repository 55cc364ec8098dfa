use crate::{
    backtest::BacktestRunner,
    optimizer::{
        evaluate_batch, random::sample_params, report_progress, validate_ranges, Objective,
        Optimizer, OptimizerError, ParamRange, ProgressFn, RankedEntry, RankedResults,
    },
    strategy::Params,
};
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Acquisition function steering the next trial.
#[derive(Debug, Copy, Clone, PartialEq, Deserialize, Serialize)]
pub enum Acquisition {
    /// Expected improvement over the incumbent.
    ExpectedImprovement,
    /// Upper confidence bound `mean + kappa * std`.
    UpperConfidenceBound { kappa: f64 },
    /// Probability of improving the incumbent by at least `xi`.
    ProbabilityOfImprovement { xi: f64 },
}

/// Gaussian-process Bayesian search.
///
/// Seeds with `initial_samples` random trials, fits an RBF-kernel GP
/// surrogate over the normalized parameter box, and repeatedly evaluates the
/// candidate maximising the acquisition function. Stops at `max_iterations`
/// or when the best acquisition value falls below `acquisition_threshold`.
#[derive(Debug, Clone)]
pub struct BayesianOptimizer {
    pub initial_samples: usize,
    pub max_iterations: usize,
    pub acquisition: Acquisition,
    /// Convergence threshold on the best acquisition value.
    pub acquisition_threshold: f64,
    /// Random candidates scored per iteration.
    pub candidate_pool: usize,
    /// RBF kernel length scale in normalized coordinates.
    pub length_scale: f64,
    /// Observation noise added to the kernel diagonal.
    pub noise: f64,
    pub parallelism: usize,
    pub seed: u64,
}

impl Default for BayesianOptimizer {
    fn default() -> Self {
        Self {
            initial_samples: 8,
            max_iterations: 40,
            acquisition: Acquisition::ExpectedImprovement,
            acquisition_threshold: 1e-7,
            candidate_pool: 256,
            length_scale: 0.2,
            noise: 1e-6,
            parallelism: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            seed: 42,
        }
    }
}

/// GP posterior over normalized points, refit after every observation.
struct Surrogate {
    points: Vec<Vec<f64>>,
    values: Vec<f64>,
    /// Cholesky factor of the kernel matrix.
    chol: Vec<Vec<f64>>,
    /// `K^-1 y`.
    alpha: Vec<f64>,
    length_scale: f64,
}

impl Surrogate {
    fn fit(
        points: Vec<Vec<f64>>,
        values: Vec<f64>,
        length_scale: f64,
        noise: f64,
    ) -> Option<Self> {
        let n = points.len();
        let mut kernel = vec![vec![0.0; n]; n];
        for i in 0..n {
            for j in 0..n {
                kernel[i][j] = rbf(&points[i], &points[j], length_scale);
            }
            kernel[i][i] += noise;
        }

        let chol = cholesky(&kernel)?;
        let alpha = chol_solve(&chol, &values);
        Some(Self {
            points,
            values,
            chol,
            alpha,
            length_scale,
        })
    }

    /// Posterior mean and standard deviation at `x`.
    fn predict(&self, x: &[f64]) -> (f64, f64) {
        let k_star: Vec<f64> = self
            .points
            .iter()
            .map(|point| rbf(point, x, self.length_scale))
            .collect();

        let mean: f64 = k_star
            .iter()
            .zip(&self.alpha)
            .map(|(k, alpha)| k * alpha)
            .sum();

        // var = k(x,x) - k*^T K^-1 k*, via the Cholesky factor
        let v = forward_substitute(&self.chol, &k_star);
        let variance = (1.0 - v.iter().map(|value| value * value).sum::<f64>()).max(1e-12);
        (mean, variance.sqrt())
    }

    fn best_observed(&self) -> f64 {
        self.values
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max)
    }
}

/// Squared-exponential kernel over normalized coordinates.
fn rbf(a: &[f64], b: &[f64], length_scale: f64) -> f64 {
    let sq_dist: f64 = a
        .iter()
        .zip(b)
        .map(|(ai, bi)| (ai - bi) * (ai - bi))
        .sum();
    (-sq_dist / (2.0 * length_scale * length_scale)).exp()
}

/// Lower-triangular Cholesky factor of a symmetric positive-definite matrix.
fn cholesky(matrix: &[Vec<f64>]) -> Option<Vec<Vec<f64>>> {
    let n = matrix.len();
    let mut chol = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in 0..=i {
            let sum: f64 = (0..j).map(|k| chol[i][k] * chol[j][k]).sum();
            if i == j {
                let diagonal = matrix[i][i] - sum;
                if diagonal <= 0.0 {
                    return None;
                }
                chol[i][j] = diagonal.sqrt();
            } else {
                chol[i][j] = (matrix[i][j] - sum) / chol[j][j];
            }
        }
    }
    Some(chol)
}

/// Solve `L y = b` for lower-triangular `L`.
fn forward_substitute(chol: &[Vec<f64>], b: &[f64]) -> Vec<f64> {
    let n = b.len();
    let mut y = vec![0.0; n];
    for i in 0..n {
        let sum: f64 = (0..i).map(|k| chol[i][k] * y[k]).sum();
        y[i] = (b[i] - sum) / chol[i][i];
    }
    y
}

/// Solve `K x = b` given the Cholesky factor of `K`.
fn chol_solve(chol: &[Vec<f64>], b: &[f64]) -> Vec<f64> {
    let n = b.len();
    let y = forward_substitute(chol, b);
    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        let sum: f64 = (i + 1..n).map(|k| chol[k][i] * x[k]).sum();
        x[i] = (y[i] - sum) / chol[i][i];
    }
    x
}

/// Standard normal CDF via the Abramowitz-Stegun erf approximation.
fn normal_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / std::f64::consts::SQRT_2))
}

fn normal_pdf(x: f64) -> f64 {
    (-0.5 * x * x).exp() / (2.0 * std::f64::consts::PI).sqrt()
}

fn erf(x: f64) -> f64 {
    // Abramowitz & Stegun 7.1.26, |error| < 1.5e-7
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + 0.3275911 * x);
    let poly = t
        * (0.254829592
            + t * (-0.284496736 + t * (1.421413741 + t * (-1.453152027 + t * 1.061405429))));
    sign * (1.0 - poly * (-x * x).exp())
}

impl Acquisition {
    /// Score a candidate from its GP posterior and the incumbent best.
    fn score(&self, mean: f64, std_dev: f64, best: f64) -> f64 {
        match self {
            Acquisition::ExpectedImprovement => {
                if std_dev <= 0.0 {
                    return 0.0;
                }
                let z = (mean - best) / std_dev;
                (mean - best) * normal_cdf(z) + std_dev * normal_pdf(z)
            }
            Acquisition::UpperConfidenceBound { kappa } => mean + kappa * std_dev,
            Acquisition::ProbabilityOfImprovement { xi } => {
                if std_dev <= 0.0 {
                    return 0.0;
                }
                normal_cdf((mean - best - xi) / std_dev)
            }
        }
    }

    /// UCB has no natural zero, so only improvement-based acquisitions use
    /// the convergence threshold.
    fn converges(&self) -> bool {
        !matches!(self, Acquisition::UpperConfidenceBound { .. })
    }
}

fn normalize(params: &Params, ranges: &[ParamRange]) -> Vec<f64> {
    ranges
        .iter()
        .map(|range| {
            let value = params.get(&range.name).copied().unwrap_or(range.min);
            if range.max == range.min {
                0.0
            } else {
                (value - range.min) / (range.max - range.min)
            }
        })
        .collect()
}

impl Optimizer for BayesianOptimizer {
    fn optimize(
        &mut self,
        runner: &BacktestRunner,
        ranges: &[ParamRange],
        objective: &Objective,
        mut progress: Option<ProgressFn<'_>>,
    ) -> Result<RankedResults, OptimizerError> {
        validate_ranges(ranges)?;
        if self.initial_samples == 0 || self.initial_samples > self.max_iterations {
            return Err(OptimizerError::Config(
                "initial_samples must be in [1, max_iterations]".to_string(),
            ));
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut ranked = RankedResults::default();
        let mut best: Option<(f64, Params)> = None;
        let mut observed_x: Vec<Vec<f64>> = Vec::new();
        let mut observed_y: Vec<f64> = Vec::new();

        // Seed phase: random exploration, evaluated in parallel
        let seeds: Vec<Params> = (0..self.initial_samples)
            .map(|_| sample_params(ranges, &mut rng))
            .collect();
        let outcomes = evaluate_batch(runner, &seeds, objective, self.parallelism)?;
        for (iteration, (params, (fitness, result))) in seeds.into_iter().zip(outcomes).enumerate()
        {
            observed_x.push(normalize(&params, ranges));
            observed_y.push(fitness);
            report_progress(
                &mut progress,
                iteration + 1,
                self.max_iterations,
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

        // Surrogate-guided phase
        for iteration in self.initial_samples..self.max_iterations {
            let Some(surrogate) = Surrogate::fit(
                observed_x.clone(),
                observed_y.clone(),
                self.length_scale,
                self.noise,
            ) else {
                debug!("GP kernel became singular, stopping surrogate phase");
                break;
            };
            let incumbent = surrogate.best_observed();

            let mut best_candidate: Option<(f64, Params)> = None;
            for _ in 0..self.candidate_pool {
                let candidate = sample_params(ranges, &mut rng);
                let (mean, std_dev) = surrogate.predict(&normalize(&candidate, ranges));
                let score = self.acquisition.score(mean, std_dev, incumbent);
                if best_candidate
                    .as_ref()
                    .map(|(best_score, _)| score > *best_score)
                    .unwrap_or(true)
                {
                    best_candidate = Some((score, candidate));
                }
            }
            let Some((score, candidate)) = best_candidate else {
                break;
            };

            if self.acquisition.converges() && score < self.acquisition_threshold {
                debug!(iteration, score, "acquisition below threshold, converged");
                break;
            }

            let result = runner.run_with_params(&candidate)?;
            let fitness = objective.fitness(&result);
            observed_x.push(normalize(&candidate, ranges));
            observed_y.push(fitness);
            report_progress(
                &mut progress,
                iteration + 1,
                self.max_iterations,
                &mut best,
                fitness,
                &candidate,
            );
            ranked.push(RankedEntry {
                params: candidate,
                fitness,
                result,
            });
        }

        ranked.rank();
        Ok(ranked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_erf_reference_values() {
        assert_relative_eq!(erf(0.0), 0.0, epsilon = 1e-7);
        assert_relative_eq!(erf(1.0), 0.8427008, epsilon = 1e-6);
        assert_relative_eq!(erf(-1.0), -0.8427008, epsilon = 1e-6);
        assert_relative_eq!(normal_cdf(0.0), 0.5, epsilon = 1e-9);
    }

    #[test]
    fn test_cholesky_solve_round_trip() {
        // K = [[4, 2], [2, 3]], b = [8, 7] -> x = [1.25, 1.5]
        let kernel = vec![vec![4.0, 2.0], vec![2.0, 3.0]];
        let chol = cholesky(&kernel).unwrap();
        let x = chol_solve(&chol, &[8.0, 7.0]);
        assert_relative_eq!(4.0 * x[0] + 2.0 * x[1], 8.0, epsilon = 1e-9);
        assert_relative_eq!(2.0 * x[0] + 3.0 * x[1], 7.0, epsilon = 1e-9);
    }

    #[test]
    fn test_surrogate_interpolates_observations() {
        let points = vec![vec![0.0], vec![0.5], vec![1.0]];
        let values = vec![0.0, 1.0, 0.0];
        let surrogate = Surrogate::fit(points, values, 0.2, 1e-9).unwrap();

        let (mean_at_observed, std_at_observed) = surrogate.predict(&[0.5]);
        assert_relative_eq!(mean_at_observed, 1.0, epsilon = 1e-3);
        assert!(std_at_observed < 0.01);

        // Uncertainty grows away from the data
        let (_, std_far) = surrogate.predict(&[2.0]);
        assert!(std_far > 0.5);
    }

    #[test]
    fn test_acquisition_prefers_uncertain_improvement() {
        let ei = Acquisition::ExpectedImprovement;
        // Same mean: higher uncertainty scores higher
        assert!(ei.score(1.0, 0.5, 1.0) > ei.score(1.0, 0.1, 1.0));
        // Clear improvement beats clear regression
        assert!(ei.score(2.0, 0.1, 1.0) > ei.score(0.0, 0.1, 1.0));

        let ucb = Acquisition::UpperConfidenceBound { kappa: 2.0 };
        assert_relative_eq!(ucb.score(1.0, 0.5, 0.0), 2.0);
    }
}
