use derive_more::{Display, From};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::borrow::Borrow;

/// Interned market symbol (eg/ "BTCUSDT").
///
/// Backed by a [`SmolStr`], so symbols up to 23 bytes are stack-allocated and
/// cheap to clone. Symbols are upper-cased on construction so lookups are
/// case-insensitive at the edges without repeated normalisation inside the
/// engine.
#[derive(
    Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display, From,
)]
pub struct Symbol(SmolStr);

impl Symbol {
    /// Construct a [`Symbol`], upper-casing the input.
    pub fn new<S: AsRef<str>>(symbol: S) -> Self {
        Self(SmolStr::new(symbol.as_ref().to_ascii_uppercase()))
    }

    /// Return the &str representation of this [`Symbol`].
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<&str> for Symbol {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Symbol {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl Borrow<str> for Symbol {
    fn borrow(&self) -> &str {
        self.0.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_new_upper_cases() {
        assert_eq!(Symbol::new("btcusdt").as_str(), "BTCUSDT");
        assert_eq!(Symbol::new("EthUsdt").as_str(), "ETHUSDT");
    }

    #[test]
    fn test_symbol_borrow_str_lookup() {
        let mut map = std::collections::HashMap::new();
        map.insert(Symbol::new("btcusdt"), 1u8);
        assert_eq!(map.get("BTCUSDT"), Some(&1));
    }
}
