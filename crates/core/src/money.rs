use rust_decimal::Decimal;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoneyError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
}

/// A payment amount as reported by the bank.
///
/// Parsed exactly: the scale the bank sent is kept, so `"1500.50"` displays
/// as `1500.50` and `100.005` is not rounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Money(Decimal);

impl FromStr for Money {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Decimal::from_str(trimmed)
            .or_else(|_| Decimal::from_scientific(trimmed))
            .map(Money)
            .map_err(|_| MoneyError::InvalidAmount(s.to_string()))
    }
}

/// JSON numbers are parsed from their literal text, numeric strings as is.
impl TryFrom<&Value> for Money {
    type Error = MoneyError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        match value {
            Value::Number(n) => n.to_string().parse(),
            Value::String(s) => s.parse(),
            other => Err(MoneyError::InvalidAmount(other.to_string())),
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}
