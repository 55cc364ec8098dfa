//! Backtest determinism (S5-style) over CSV kline data, plus optimizer
//! behaviour over the backtest harness.

mod util;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::io::Write;
use std::path::PathBuf;
use veloce::{
    backtest::{BacktestConfig, BacktestHarness, BacktestRunner},
    optimizer::{
        bayesian::BayesianOptimizer, genetic::GeneticOptimizer, grid::GridOptimizer,
        random::RandomOptimizer, Objective, Optimizer, ParamRange,
    },
    strategy::Params,
};
use veloce_data::{
    event::MarketEvent,
    source::{
        csv::{CsvDataSource, CsvFormat, CsvSourceConfig},
        DataSource, DataType, TimeFrame,
    },
    time::TimestampNs,
};
use veloce_instrument::Venue;

const BARS: usize = 2_000;

/// Deterministic pseudo-random walk of OHLCV bars.
fn write_kline_csv(label: &str) -> PathBuf {
    let mut path = std::env::temp_dir();
    path.push(format!(
        "veloce-backtest-bars-{}-{label}.csv",
        std::process::id()
    ));

    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "start_ms,open,high,low,close,volume").unwrap();

    // Simple LCG keeps the walk reproducible without any RNG dependency
    let mut state: u64 = 0x2545F4914F6CDD1D;
    let mut price = 10_000.0f64;
    for bar in 0..BARS {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        let step = ((state >> 33) as f64 / u32::MAX as f64 - 0.5) * 40.0;
        let open = price;
        price = (price + step).max(100.0);
        let close = price;
        let high = open.max(close) + 5.0;
        let low = open.min(close) - 5.0;
        writeln!(
            file,
            "{},{:.2},{:.2},{:.2},{:.2},{:.2}",
            bar as i64 * 60_000,
            open,
            high,
            low,
            close,
            50.0
        )
        .unwrap();
    }
    path
}

async fn load_events(path: &PathBuf) -> Vec<MarketEvent> {
    let mut source = CsvDataSource::new(CsvSourceConfig::new(
        path,
        CsvFormat::Ohlcv,
        Venue::Sim,
    ));
    source.connect().await.unwrap();
    source
        .get_data(
            &veloce_instrument::Symbol::new("BTCUSDT"),
            0,
            i64::MAX,
            DataType::Kline,
            TimeFrame::M1,
        )
        .await
        .unwrap()
}

fn config() -> BacktestConfig {
    BacktestConfig {
        initial_balance: dec!(10000),
        params: Params::from_iter([
            ("fast".to_string(), 10.0),
            ("slow".to_string(), 20.0),
            ("qty".to_string(), 0.05),
        ]),
        ..BacktestConfig::new(
            "momentum",
            "BTCUSDT",
            TimestampNs::ZERO,
            TimestampNs::from_millis(BARS as i64 * 60_000 + 60_000),
        )
    }
}

#[tokio::test]
async fn test_backtest_runs_are_exactly_identical() {
    let path = write_kline_csv("identical");
    let events = load_events(&path).await;

    let run = |events: Vec<MarketEvent>| {
        let mut harness = BacktestHarness::new(config(), events, None).unwrap();
        harness.run().unwrap()
    };

    let first = run(events.clone());
    let second = run(events);

    assert!(first.trade_count > 0, "walk should produce crossovers");
    assert_eq!(first.trade_count, second.trade_count);
    assert_eq!(first.final_balance, second.final_balance);
    assert_eq!(first.total_return, second.total_return);
    assert_eq!(first.max_drawdown, second.max_drawdown);
    assert_eq!(first.sharpe_ratio, second.sharpe_ratio);
    assert_eq!(first.trades, second.trades);
    assert_eq!(first.equity_curve, second.equity_curve);

    std::fs::remove_file(path).ok();
}

#[tokio::test]
async fn test_backtest_balance_round_trip() {
    let path = write_kline_csv("round-trip");
    let events = load_events(&path).await;

    let mut harness = BacktestHarness::new(config(), events, None).unwrap();
    let result = harness.run().unwrap();

    let realized: Decimal = harness
        .engine()
        .state()
        .positions()
        .map(|position| position.realized_pnl)
        .sum();
    assert_eq!(
        result.final_balance,
        result.initial_balance + realized - result.total_fees
    );

    std::fs::remove_file(path).ok();
}

#[tokio::test]
async fn test_grid_optimizer_ranks_descending_and_reports_progress() {
    let path = write_kline_csv("grid");
    let events = load_events(&path).await;
    let runner = BacktestRunner::new(config(), events);

    let ranges = vec![
        ParamRange::stepped("fast", 5.0, 15.0, 5.0),
        ParamRange::stepped("slow", 20.0, 40.0, 20.0),
    ];

    let mut progress_count = 0usize;
    let mut last_best = f64::NEG_INFINITY;
    let mut optimizer = GridOptimizer {
        max_iterations: 100,
        parallelism: 2,
    };
    let ranked = {
        let mut on_progress = |progress: &veloce::optimizer::OptimizerProgress| {
            progress_count += 1;
            // Best fitness reported to the callback never regresses
            assert!(progress.best_fitness >= last_best);
            last_best = progress.best_fitness;
        };
        optimizer
            .optimize(&runner, &ranges, &Objective::TotalReturn, Some(&mut on_progress))
            .unwrap()
    };

    // 3 fast values x 2 slow values
    assert_eq!(ranked.entries.len(), 6);
    assert_eq!(progress_count, 6);
    for window in ranked.entries.windows(2) {
        assert!(window[0].fitness >= window[1].fitness);
    }
    // Trials carry the parameters that produced them
    assert!(ranked.best().unwrap().params.contains_key("fast"));

    std::fs::remove_file(path).ok();
}

#[tokio::test]
async fn test_random_optimizer_is_seed_reproducible() {
    let path = write_kline_csv("random");
    let events = load_events(&path).await;
    let runner = BacktestRunner::new(config(), events);

    let ranges = vec![
        ParamRange::stepped("fast", 3.0, 15.0, 1.0),
        ParamRange::stepped("slow", 16.0, 60.0, 2.0),
    ];

    let run = || {
        let mut optimizer = RandomOptimizer {
            max_iterations: 8,
            parallelism: 2,
            seed: 99,
        };
        optimizer
            .optimize(&runner, &ranges, &Objective::Sharpe, None)
            .unwrap()
    };

    let first = run();
    let second = run();
    let params_of = |ranked: &veloce::optimizer::RankedResults| {
        ranked
            .entries
            .iter()
            .map(|entry| entry.params.clone())
            .collect::<Vec<_>>()
    };
    assert_eq!(params_of(&first), params_of(&second));
    assert_eq!(
        first.best().map(|entry| entry.fitness),
        second.best().map(|entry| entry.fitness)
    );

    std::fs::remove_file(path).ok();
}

#[tokio::test]
async fn test_genetic_optimizer_best_fitness_monotone_per_generation() {
    let path = write_kline_csv("genetic");
    let events = load_events(&path).await;
    let runner = BacktestRunner::new(config(), events);

    let ranges = vec![
        ParamRange::stepped("fast", 3.0, 15.0, 1.0),
        ParamRange::stepped("slow", 16.0, 60.0, 2.0),
    ];

    let population = 6;
    let mut optimizer = GeneticOptimizer {
        population,
        tournament_size: 2,
        elitism: 1,
        max_generations: 4,
        convergence_generations: 10,
        parallelism: 2,
        seed: 7,
        ..GeneticOptimizer::default()
    };

    // Reconstruct per-generation bests from the progress stream
    let mut generation_bests: Vec<f64> = Vec::new();
    let mut current_gen_best = f64::NEG_INFINITY;
    let mut seen = 0usize;
    let mut on_progress = |progress: &veloce::optimizer::OptimizerProgress| {
        current_gen_best = current_gen_best.max(progress.current_fitness);
        seen += 1;
        if seen % population == 0 {
            generation_bests.push(current_gen_best);
            current_gen_best = f64::NEG_INFINITY;
        }
    };

    optimizer
        .optimize(&runner, &ranges, &Objective::TotalReturn, Some(&mut on_progress))
        .unwrap();

    assert!(generation_bests.len() >= 2);
    for window in generation_bests.windows(2) {
        assert!(
            window[1] >= window[0],
            "best fitness regressed across generations: {generation_bests:?}"
        );
    }

    std::fs::remove_file(path).ok();
}

#[tokio::test]
async fn test_bayesian_optimizer_improves_on_seed_phase() {
    let path = write_kline_csv("bayesian");
    let events = load_events(&path).await;
    let runner = BacktestRunner::new(config(), events);

    let ranges = vec![
        ParamRange::stepped("fast", 3.0, 15.0, 1.0),
        ParamRange::stepped("slow", 16.0, 60.0, 2.0),
    ];

    let mut optimizer = BayesianOptimizer {
        initial_samples: 4,
        max_iterations: 10,
        candidate_pool: 64,
        parallelism: 2,
        seed: 13,
        ..BayesianOptimizer::default()
    };
    let ranked = optimizer
        .optimize(&runner, &ranges, &Objective::TotalReturn, None)
        .unwrap();

    assert!(!ranked.entries.is_empty());
    assert!(ranked.entries.len() <= 10);
    let best = ranked.best().unwrap();
    // The ranked surface is sorted and self-consistent
    for entry in &ranked.entries {
        assert!(best.fitness >= entry.fitness);
    }

    std::fs::remove_file(path).ok();
}
