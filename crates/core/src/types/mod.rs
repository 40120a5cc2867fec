//! Shared newtypes and small value types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// The exchange a symbol trades on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Market {
    #[serde(rename = "HK")]
    Hk,
    #[serde(rename = "US")]
    Us,
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Market::Hk => write!(f, "HK"),
            Market::Us => write!(f, "US"),
        }
    }
}

impl FromStr for Market {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HK" => Ok(Market::Hk),
            "US" => Ok(Market::Us),
            other => Err(Error::InvalidSymbol(format!("unknown market {other}"))),
        }
    }
}

impl Market {
    /// Settlement/quoting currency for this market.
    pub fn currency(&self) -> &'static str {
        match self {
            Market::Hk => "HKD",
            Market::Us => "USD",
        }
    }
}

/// A `SYMBOL.MARKET` trading symbol, e.g. `AAPL.US` or `700.HK`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol {
    pub code: String,
    pub market: Market,
}

impl Symbol {
    pub fn new(code: impl Into<String>, market: Market) -> Self {
        Self { code: code.into(), market }
    }

    /// True if this symbol matches the broker's options-chain naming
    /// convention: `^[A-Z]+\d{6}[CP]\d+\.(US|HK|SH|SZ)$`.
    pub fn is_option(&self) -> bool {
        let bytes = self.code.as_bytes();
        let mut i = 0;
        while i < bytes.len() && bytes[i].is_ascii_alphabetic() {
            i += 1;
        }
        if i == 0 || i + 6 >= bytes.len() {
            return false;
        }
        let digits_ok = bytes[i..i + 6].iter().all(u8::is_ascii_digit);
        if !digits_ok {
            return false;
        }
        let cp = bytes[i + 6];
        if cp != b'C' && cp != b'P' {
            return false;
        }
        bytes[i + 7..].iter().any(u8::is_ascii_digit)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.code, self.market)
    }
}

impl FromStr for Symbol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (code, market) = s
            .rsplit_once('.')
            .ok_or_else(|| Error::InvalidSymbol(format!("missing market suffix: {s}")))?;
        Ok(Symbol::new(code, market.parse()?))
    }
}

impl TryFrom<String> for Symbol {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Symbol> for String {
    fn from(value: Symbol) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_us_symbol() {
        let s: Symbol = "AAPL.US".parse().unwrap();
        assert_eq!(s.code, "AAPL");
        assert_eq!(s.market, Market::Us);
        assert_eq!(s.to_string(), "AAPL.US");
    }

    #[test]
    fn parses_hk_symbol() {
        let s: Symbol = "700.HK".parse().unwrap();
        assert_eq!(s.market, Market::Hk);
        assert_eq!(s.market.currency(), "HKD");
    }

    #[test]
    fn recognizes_option_code() {
        let s = Symbol::new("AAPL250117C00150000", Market::Us);
        assert!(s.is_option());
        let s = Symbol::new("AAPL", Market::Us);
        assert!(!s.is_option());
    }

    #[test]
    fn rejects_missing_market() {
        let res: Result<Symbol, _> = "AAPL".parse();
        assert!(res.is_err());
    }
}
