use crate::event::MarketEvent;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use veloce_instrument::Symbol;

/// Configurable CSV-backed [`DataSource`].
pub mod csv;

/// All errors a [`DataSource`] can produce.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, Error)]
pub enum DataError {
    #[error("data source is not connected")]
    NotConnected,

    #[error("symbol not available from this source: {0}")]
    SymbolUnavailable(Symbol),

    #[error("unsupported data type for this source: {0}")]
    UnsupportedDataType(String),

    #[error("io: {0}")]
    Io(String),

    #[error("malformed row {line}: {message}")]
    MalformedRow { line: u64, message: String },

    #[error("events are not sorted by timestamp at row {line}")]
    Unsorted { line: u64 },
}

/// Kind of historical data requested from a [`DataSource`].
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize,
)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Trade,
    Kline,
    BookTop,
}

/// Candle interval of a [`DataType::Kline`] request.
///
/// Also determines the annualisation factor used by the statistics suite.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize,
)]
#[serde(rename_all = "lowercase")]
pub enum TimeFrame {
    #[serde(rename = "1s")]
    S1,
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "30m")]
    M30,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "1d")]
    D1,
}

impl TimeFrame {
    /// Duration of one period in milliseconds.
    pub fn period_ms(&self) -> i64 {
        match self {
            TimeFrame::S1 => 1_000,
            TimeFrame::M1 => 60_000,
            TimeFrame::M5 => 300_000,
            TimeFrame::M15 => 900_000,
            TimeFrame::M30 => 1_800_000,
            TimeFrame::H1 => 3_600_000,
            TimeFrame::H4 => 14_400_000,
            TimeFrame::D1 => 86_400_000,
        }
    }

    /// Number of periods in a (365 day) year, used to annualise per-period
    /// return statistics.
    pub fn periods_per_year(&self) -> f64 {
        const YEAR_MS: f64 = 365.0 * 86_400_000.0;
        YEAR_MS / self.period_ms() as f64
    }

    /// Parse a [`TimeFrame`] from its conventional string form (eg/ "1m").
    pub fn parse(input: &str) -> Option<Self> {
        match input.to_ascii_lowercase().as_str() {
            "1s" => Some(TimeFrame::S1),
            "1m" => Some(TimeFrame::M1),
            "5m" => Some(TimeFrame::M5),
            "15m" => Some(TimeFrame::M15),
            "30m" => Some(TimeFrame::M30),
            "1h" => Some(TimeFrame::H1),
            "4h" => Some(TimeFrame::H4),
            "1d" => Some(TimeFrame::D1),
            _ => None,
        }
    }
}

/// Capability consumed by the backtest harness to obtain historical
/// [`MarketEvent`]s.
///
/// Implementations must deliver events sorted non-decreasingly by timestamp,
/// each carrying a complete symbol and venue.
#[async_trait]
pub trait DataSource {
    /// Establish any connection or file handle required to serve data.
    async fn connect(&mut self) -> Result<(), DataError>;

    /// Release resources held by the source.
    async fn disconnect(&mut self) -> Result<(), DataError>;

    /// Load all events in `[start_ms, end_ms]` for the `symbol` into memory.
    async fn get_data(
        &mut self,
        symbol: &Symbol,
        start_ms: i64,
        end_ms: i64,
        data_type: DataType,
        time_frame: TimeFrame,
    ) -> Result<Vec<MarketEvent>, DataError>;

    /// Stream events in `[start_ms, end_ms]` into `sink`, stopping early if
    /// the sink returns `false`.
    async fn stream(
        &mut self,
        symbol: &Symbol,
        start_ms: i64,
        end_ms: i64,
        data_type: DataType,
        time_frame: TimeFrame,
        sink: &mut (dyn FnMut(MarketEvent) -> bool + Send),
    ) -> Result<(), DataError>;
}
