use crate::time::TimestampNs;
use derive_more::{Constructor, From};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use veloce_instrument::{Symbol, Venue};

/// Normalized market event produced by a venue stream or a historical
/// [`DataSource`](crate::source::DataSource).
///
/// Every event carries the [`Symbol`] and [`Venue`] it originated from, plus
/// the venue timestamp it was stamped with. The payload lives in
/// [`MarketEventKind`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Constructor)]
pub struct MarketEvent {
    pub symbol: Symbol,
    pub venue: Venue,
    pub ts: TimestampNs,
    pub kind: MarketEventKind,
}

impl MarketEvent {
    /// Construct a [`MarketEventKind::Trade`] event.
    pub fn trade(symbol: Symbol, venue: Venue, ts: TimestampNs, trade: PublicTrade) -> Self {
        Self::new(symbol, venue, ts, MarketEventKind::Trade(trade))
    }

    /// Construct a [`MarketEventKind::BookTop`] event.
    pub fn book_top(symbol: Symbol, venue: Venue, ts: TimestampNs, top: BookTop) -> Self {
        Self::new(symbol, venue, ts, MarketEventKind::BookTop(top))
    }

    /// Short tag of the payload kind, used for subscription routing and the
    /// NDJSON `type` field.
    pub fn kind_tag(&self) -> EventTypeTag {
        match &self.kind {
            MarketEventKind::Trade(_) => EventTypeTag::Trade,
            MarketEventKind::BookTop(_) => EventTypeTag::BookTop,
            MarketEventKind::BookDelta(_) => EventTypeTag::BookDelta,
            MarketEventKind::Kline(_) => EventTypeTag::Kline,
            MarketEventKind::PriceTick(_) => EventTypeTag::PriceTick,
        }
    }

    /// Best-effort reference price of the event, used for mark-to-market.
    pub fn reference_price(&self) -> Option<Decimal> {
        match &self.kind {
            MarketEventKind::Trade(trade) => Some(trade.price),
            MarketEventKind::BookTop(top) => Some(top.mid_price()),
            MarketEventKind::Kline(kline) => Some(kline.close),
            MarketEventKind::PriceTick(tick) => Some(tick.price),
            MarketEventKind::BookDelta(_) => None,
        }
    }
}

/// Payload variants of a [`MarketEvent`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, From)]
#[serde(rename_all = "snake_case")]
pub enum MarketEventKind {
    Trade(PublicTrade),
    BookTop(BookTop),
    BookDelta(BookDelta),
    Kline(Kline),
    PriceTick(PriceTick),
}

/// Tag identifying a market event payload kind, without the payload.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize,
)]
#[serde(rename_all = "snake_case")]
pub enum EventTypeTag {
    Trade,
    BookTop,
    BookDelta,
    Kline,
    PriceTick,
}

impl EventTypeTag {
    /// Return the &str representation of this [`EventTypeTag`].
    pub fn as_str(&self) -> &'static str {
        match self {
            EventTypeTag::Trade => "trade",
            EventTypeTag::BookTop => "booktop",
            EventTypeTag::BookDelta => "bookdelta",
            EventTypeTag::Kline => "kline",
            EventTypeTag::PriceTick => "pricetick",
        }
    }

    /// Parse an [`EventTypeTag`] from a case-insensitive string.
    pub fn parse(input: &str) -> Option<Self> {
        match input.to_ascii_lowercase().as_str() {
            "trade" => Some(EventTypeTag::Trade),
            "booktop" | "book_top" => Some(EventTypeTag::BookTop),
            "bookdelta" | "book_delta" => Some(EventTypeTag::BookDelta),
            "kline" => Some(EventTypeTag::Kline),
            "pricetick" | "price_tick" => Some(EventTypeTag::PriceTick),
            _ => None,
        }
    }
}

/// Public trade executed on a venue.
///
/// `is_buyer_maker == true` means the aggressor was a seller (the resting
/// buyer "made" the market).
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, Constructor)]
pub struct PublicTrade {
    pub price: Decimal,
    pub qty: Decimal,
    pub is_buyer_maker: bool,
    pub trade_id: u64,
}

/// Best bid and ask of a venue order book.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, Constructor)]
pub struct BookTop {
    pub bid_px: Decimal,
    pub bid_qty: Decimal,
    pub ask_px: Decimal,
    pub ask_qty: Decimal,
}

impl BookTop {
    /// Arithmetic mid price.
    pub fn mid_price(&self) -> Decimal {
        (self.bid_px + self.ask_px) / Decimal::TWO
    }
}

/// A single (price, quantity) book level.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Deserialize, Serialize, Constructor)]
pub struct Level {
    pub price: Decimal,
    pub qty: Decimal,
}

/// Incremental order book update with venue sequence number.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, Constructor)]
pub struct BookDelta {
    pub sequence: u64,
    pub bids: Vec<Level>,
    pub asks: Vec<Level>,
}

/// OHLCV candle over `[start_ms, close_ms]`.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, Constructor)]
pub struct Kline {
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub start_ms: i64,
    pub close_ms: i64,
}

/// Coarse price update used when no richer event stream is available.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, Constructor)]
pub struct PriceTick {
    pub price: Decimal,
}
