use crate::{
    backtest::BacktestError, command::ParseError, engine::error::EngineError,
    optimizer::OptimizerError, strategy::StrategyError,
};
use serde::Serialize;
use thiserror::Error;
use veloce_data::source::DataError;
use veloce_execution::ExecutionError;

/// Top-level error aggregating every Veloce subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Error)]
pub enum VeloceError {
    #[error("engine: {0}")]
    Engine(#[from] EngineError),

    #[error("backtest: {0}")]
    Backtest(#[from] BacktestError),

    #[error("optimizer: {0}")]
    Optimizer(#[from] OptimizerError),

    #[error("strategy: {0}")]
    Strategy(#[from] StrategyError),

    #[error("command: {0}")]
    Command(#[from] ParseError),

    #[error("market data: {0}")]
    Data(#[from] DataError),

    #[error("execution: {0}")]
    Execution(#[from] ExecutionError),
}
