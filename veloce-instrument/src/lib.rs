#![forbid(unsafe_code)]
#![warn(
    unused,
    clippy::cognitive_complexity,
    unused_crate_dependencies,
    unused_extern_crates,
    clippy::unused_self,
    missing_debug_implementations,
    rust_2018_idioms
)]

//! # Veloce-Instrument
//! Market identity primitives used throughout the Veloce trading engine:
//! [`Symbol`], [`Venue`], [`MarketKind`], [`Side`] and the composite
//! [`Instrument`].

use derive_more::{Constructor, Display};
use serde::{Deserialize, Serialize};

pub mod symbol;

pub use symbol::Symbol;

/// [`Side`] of a trade or order - Buy or Sell.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display,
)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    #[display("buy")]
    Buy,
    #[display("sell")]
    Sell,
}

impl Side {
    /// Return the opposing `Side`.
    pub fn inverse(&self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }

    /// Signed unit multiplier: `+1` for Buy, `-1` for Sell.
    pub fn sign(&self) -> i8 {
        match self {
            Self::Buy => 1,
            Self::Sell => -1,
        }
    }
}

/// Unique identifier for a trading venue the engine can interact with.
///
/// `Sim` represents the internal deterministic fill simulator rather than a
/// remote execution server.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display,
)]
#[serde(rename_all = "snake_case")]
pub enum Venue {
    Binance,
    Okx,
    Bybit,
    Sim,
}

impl Venue {
    /// Return the &str representation of this [`Venue`].
    pub fn as_str(&self) -> &'static str {
        match self {
            Venue::Binance => "binance",
            Venue::Okx => "okx",
            Venue::Bybit => "bybit",
            Venue::Sim => "sim",
        }
    }

    /// Parse a [`Venue`] from a case-insensitive string representation.
    pub fn parse(input: &str) -> Option<Self> {
        match input.to_ascii_lowercase().as_str() {
            "binance" => Some(Venue::Binance),
            "okx" => Some(Venue::Okx),
            "bybit" => Some(Venue::Bybit),
            "sim" | "simulated" => Some(Venue::Sim),
            _ => None,
        }
    }
}

/// Kind of market an [`Instrument`] trades on.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display,
)]
#[serde(rename_all = "snake_case")]
pub enum MarketKind {
    Spot,
    PerpFuture,
    DatedFuture,
}

/// Unique identity of a tradeable market: a [`Symbol`] on a [`Venue`] with a
/// [`MarketKind`].
#[derive(
    Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Constructor,
)]
pub struct Instrument {
    pub symbol: Symbol,
    pub venue: Venue,
    pub kind: MarketKind,
}

impl Instrument {
    /// Convenience constructor for a spot [`Instrument`] on the given venue.
    pub fn spot<S: Into<Symbol>>(symbol: S, venue: Venue) -> Self {
        Self {
            symbol: symbol.into(),
            venue,
            kind: MarketKind::Spot,
        }
    }
}

impl std::fmt::Display for Instrument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.venue.as_str(), self.symbol, self.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_inverse_and_sign() {
        assert_eq!(Side::Buy.inverse(), Side::Sell);
        assert_eq!(Side::Sell.inverse(), Side::Buy);
        assert_eq!(Side::Buy.sign(), 1);
        assert_eq!(Side::Sell.sign(), -1);
    }

    #[test]
    fn test_venue_parse_round_trip() {
        struct TestCase {
            input: &'static str,
            expected: Option<Venue>,
        }

        let cases = vec![
            TestCase {
                input: "binance",
                expected: Some(Venue::Binance),
            },
            TestCase {
                input: "BYBIT",
                expected: Some(Venue::Bybit),
            },
            TestCase {
                input: "Okx",
                expected: Some(Venue::Okx),
            },
            TestCase {
                input: "simulated",
                expected: Some(Venue::Sim),
            },
            TestCase {
                input: "nyse",
                expected: None,
            },
        ];

        for (index, test) in cases.into_iter().enumerate() {
            assert_eq!(Venue::parse(test.input), test.expected, "TC{index} failed");
            if let Some(venue) = test.expected {
                assert_eq!(Venue::parse(venue.as_str()), Some(venue), "TC{index} failed");
            }
        }
    }

    #[test]
    fn test_instrument_display_and_spot_constructor() {
        let instrument = Instrument::new(Symbol::new("btcusdt"), Venue::Bybit, MarketKind::PerpFuture);
        assert_eq!(instrument.to_string(), "bybit:BTCUSDT:PerpFuture");

        let spot = Instrument::spot("ethusdt", Venue::Binance);
        assert_eq!(spot.kind, MarketKind::Spot);
        assert_eq!(spot.symbol, Symbol::new("ETHUSDT"));
    }

    #[test]
    fn test_serde_snake_case_tags() {
        assert_eq!(
            serde_json::to_string(&Venue::Binance).unwrap(),
            "\"binance\""
        );
        assert_eq!(
            serde_json::to_string(&MarketKind::PerpFuture).unwrap(),
            "\"perp_future\""
        );
        assert_eq!(serde_json::to_string(&Side::Sell).unwrap(), "\"sell\"");
    }
}
