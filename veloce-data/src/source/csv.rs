use crate::{
    event::{BookTop, Kline, MarketEvent, PublicTrade},
    source::{DataError, DataSource, DataType, TimeFrame},
    time::TimestampNs,
};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, warn};
use veloce_instrument::{Symbol, Venue};

/// Row layout of a CSV data file.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CsvFormat {
    /// `ts_ms, price, qty, is_buyer_maker, trade_id`
    Trade,
    /// `start_ms, open, high, low, close, volume`
    Ohlcv,
    /// `ts_ms, bid_px, bid_qty, ask_px, ask_qty`
    Book,
}

/// Configuration for constructing a [`CsvDataSource`] via the new() constructor
/// method.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct CsvSourceConfig {
    pub path: PathBuf,
    pub format: CsvFormat,
    pub venue: Venue,
    /// Field delimiter, `b','` by default.
    pub delimiter: u8,
    /// Whether the first row is a header and should be skipped.
    pub has_header: bool,
    /// Skip rows with unparseable numeric fields instead of failing the load.
    pub skip_invalid_rows: bool,
}

impl CsvSourceConfig {
    pub fn new(path: impl Into<PathBuf>, format: CsvFormat, venue: Venue) -> Self {
        Self {
            path: path.into(),
            format,
            venue,
            delimiter: b',',
            has_header: true,
            skip_invalid_rows: false,
        }
    }
}

/// [`DataSource`] that serves historical [`MarketEvent`]s from a CSV file.
///
/// Rows must be sorted non-decreasingly by timestamp; the load fails with
/// [`DataError::Unsorted`] otherwise.
#[derive(Debug)]
pub struct CsvDataSource {
    config: CsvSourceConfig,
    connected: bool,
    /// Invalid rows skipped during the most recent load.
    pub rows_skipped: u64,
}

#[derive(Debug, Deserialize)]
struct TradeRow {
    ts_ms: i64,
    price: Decimal,
    qty: Decimal,
    is_buyer_maker: bool,
    trade_id: u64,
}

#[derive(Debug, Deserialize)]
struct OhlcvRow {
    start_ms: i64,
    open: Decimal,
    high: Decimal,
    low: Decimal,
    close: Decimal,
    volume: Decimal,
}

#[derive(Debug, Deserialize)]
struct BookRow {
    ts_ms: i64,
    bid_px: Decimal,
    bid_qty: Decimal,
    ask_px: Decimal,
    ask_qty: Decimal,
}

impl CsvDataSource {
    /// Constructs a new [`CsvDataSource`] component using the provided
    /// configuration struct.
    pub fn new(config: CsvSourceConfig) -> Self {
        Self {
            config,
            connected: false,
            rows_skipped: 0,
        }
    }

    fn reader(&self) -> Result<csv::Reader<std::fs::File>, DataError> {
        csv::ReaderBuilder::new()
            .delimiter(self.config.delimiter)
            .has_headers(self.config.has_header)
            .flexible(false)
            .from_path(&self.config.path)
            .map_err(|error| DataError::Io(error.to_string()))
    }

    fn load(
        &mut self,
        symbol: &Symbol,
        start_ms: i64,
        end_ms: i64,
        data_type: DataType,
        time_frame: TimeFrame,
        sink: &mut (dyn FnMut(MarketEvent) -> bool + Send),
    ) -> Result<(), DataError> {
        if !self.connected {
            return Err(DataError::NotConnected);
        }

        let expected_format = match data_type {
            DataType::Trade => CsvFormat::Trade,
            DataType::Kline => CsvFormat::Ohlcv,
            DataType::BookTop => CsvFormat::Book,
        };
        if expected_format != self.config.format {
            return Err(DataError::UnsupportedDataType(format!(
                "requested {data_type:?} from a {:?} file",
                self.config.format
            )));
        }

        self.rows_skipped = 0;
        let mut reader = self.reader()?;
        let mut last_ts_ms = i64::MIN;

        for (index, record) in reader.records().enumerate() {
            // Header occupies line 1 when present
            let line = index as u64 + 1 + u64::from(self.config.has_header);

            let record = record.map_err(|error| DataError::Io(error.to_string()))?;
            let event = match self.parse_row(symbol, &record, line, time_frame) {
                Ok(event) => event,
                Err(error) if self.config.skip_invalid_rows => {
                    warn!(%symbol, line, %error, "skipping invalid CSV row");
                    self.rows_skipped += 1;
                    continue;
                }
                Err(error) => return Err(error),
            };

            let ts_ms = event.ts.as_millis();
            if ts_ms < last_ts_ms {
                return Err(DataError::Unsorted { line });
            }
            last_ts_ms = ts_ms;

            if ts_ms < start_ms || ts_ms > end_ms {
                continue;
            }

            if !sink(event) {
                debug!(%symbol, line, "CSV stream sink requested early stop");
                break;
            }
        }

        Ok(())
    }

    fn parse_row(
        &self,
        symbol: &Symbol,
        record: &csv::StringRecord,
        line: u64,
        time_frame: TimeFrame,
    ) -> Result<MarketEvent, DataError> {
        let malformed = |error: csv::Error| DataError::MalformedRow {
            line,
            message: error.to_string(),
        };

        let event = match self.config.format {
            CsvFormat::Trade => {
                let row: TradeRow = record.deserialize(None).map_err(malformed)?;
                MarketEvent::trade(
                    symbol.clone(),
                    self.config.venue,
                    TimestampNs::from_millis(row.ts_ms),
                    PublicTrade::new(row.price, row.qty, row.is_buyer_maker, row.trade_id),
                )
            }
            CsvFormat::Ohlcv => {
                let row: OhlcvRow = record.deserialize(None).map_err(malformed)?;
                // Candle events are stamped at close time so the virtual
                // clock never sees a bar before it has completed.
                let close_ms = row.start_ms + time_frame.period_ms();
                MarketEvent::new(
                    symbol.clone(),
                    self.config.venue,
                    TimestampNs::from_millis(close_ms),
                    Kline::new(
                        row.open, row.high, row.low, row.close, row.volume, row.start_ms, close_ms,
                    )
                    .into(),
                )
            }
            CsvFormat::Book => {
                let row: BookRow = record.deserialize(None).map_err(malformed)?;
                MarketEvent::book_top(
                    symbol.clone(),
                    self.config.venue,
                    TimestampNs::from_millis(row.ts_ms),
                    BookTop::new(row.bid_px, row.bid_qty, row.ask_px, row.ask_qty),
                )
            }
        };

        Ok(event)
    }
}

#[async_trait]
impl DataSource for CsvDataSource {
    async fn connect(&mut self) -> Result<(), DataError> {
        if !self.config.path.exists() {
            return Err(DataError::Io(format!(
                "no such file: {}",
                self.config.path.display()
            )));
        }
        self.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), DataError> {
        self.connected = false;
        Ok(())
    }

    async fn get_data(
        &mut self,
        symbol: &Symbol,
        start_ms: i64,
        end_ms: i64,
        data_type: DataType,
        time_frame: TimeFrame,
    ) -> Result<Vec<MarketEvent>, DataError> {
        let mut events = Vec::new();
        self.load(symbol, start_ms, end_ms, data_type, time_frame, &mut |event| {
            events.push(event);
            true
        })?;
        Ok(events)
    }

    async fn stream(
        &mut self,
        symbol: &Symbol,
        start_ms: i64,
        end_ms: i64,
        data_type: DataType,
        time_frame: TimeFrame,
        sink: &mut (dyn FnMut(MarketEvent) -> bool + Send),
    ) -> Result<(), DataError> {
        self.load(symbol, start_ms, end_ms, data_type, time_frame, sink)
    }
}
