use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Fallback currency tag for sessions created without one.
pub const DEFAULT_CURRENCY: &str = "RUB";

const MAX_CURRENCY_LEN: usize = 8;

/// Opaque currency tag attached to a session's amounts.
///
/// Stored uppercase, 1–8 ASCII alphanumerics. No conversion is ever
/// performed; the tag only travels alongside amounts.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CurrencyCode(String);

impl CurrencyCode {
    pub fn parse(raw: &str) -> Result<Self, TypeError> {
        let code = raw.trim().to_ascii_uppercase();
        if code.is_empty()
            || code.len() > MAX_CURRENCY_LEN
            || !code.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(TypeError::InvalidCurrency(raw.to_string()));
        }
        Ok(Self(code))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CurrencyCode {
    fn default() -> Self {
        Self(DEFAULT_CURRENCY.to_string())
    }
}

impl FromStr for CurrencyCode {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for CurrencyCode {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CurrencyCode> for String {
    fn from(value: CurrencyCode) -> Self {
        value.0
    }
}

impl fmt::Debug for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CurrencyCode({})", self.0)
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A tip percentage in the inclusive range 0–100.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct TipPercent(u8);

impl TipPercent {
    pub const ZERO: Self = Self(0);

    pub fn new(value: i64) -> Result<Self, TypeError> {
        if !(0..=100).contains(&value) {
            return Err(TypeError::InvalidTipPercent(value));
        }
        Ok(Self(value as u8))
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// The percentage as an exact decimal (e.g. `10` → `10`).
    pub fn as_decimal(self) -> Decimal {
        Decimal::from(self.0)
    }
}

impl TryFrom<i64> for TipPercent {
    type Error = TypeError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TipPercent> for u8 {
    fn from(value: TipPercent) -> Self {
        value.0
    }
}

impl fmt::Display for TipPercent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}
