//! Decimal-as-string values for financial fields.
//!
//! Prices, quantities and notional amounts are carried as validated decimal
//! strings so they never pass through binary floating point. The original
//! textual precision is preserved: `"1.50"` and `"1.5"` are distinct values
//! and hash differently.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Errors from parsing a [`Decimal`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecimalError {
    #[error("empty decimal")]
    Empty,
    #[error("invalid decimal {0:?}: expected -?digits[.digits]")]
    Malformed(String),
}

/// A decimal number held as its exact textual representation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Decimal(String);

impl Decimal {
    /// Parse and validate a decimal string.
    ///
    /// # Errors
    ///
    /// Returns [`DecimalError`] for empty input, exponents, signs other than
    /// a single leading `-`, or any non-digit characters.
    pub fn parse(raw: &str) -> Result<Self, DecimalError> {
        if raw.is_empty() {
            return Err(DecimalError::Empty);
        }
        let unsigned = raw.strip_prefix('-').unwrap_or(raw);
        let (int_part, frac_part) = match unsigned.split_once('.') {
            Some((i, f)) => (i, Some(f)),
            None => (unsigned, None),
        };
        let all_digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
        let valid = all_digits(int_part) && frac_part.is_none_or(all_digits);
        if valid {
            Ok(Self(raw.to_owned()))
        } else {
            Err(DecimalError::Malformed(raw.to_owned()))
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when the value is negative (and not a negative zero).
    #[must_use]
    pub fn is_negative(&self) -> bool {
        self.0.starts_with('-') && self.0.bytes().any(|b| matches!(b, b'1'..=b'9'))
    }
}

impl FromStr for Decimal {
    type Err = DecimalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Decimal {
    type Error = DecimalError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Decimal> for String {
    fn from(value: Decimal) -> Self {
        value.0
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
