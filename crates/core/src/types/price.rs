//! Type-safe price representation using decimal arithmetic.
//!
//! The backend stores prices as a plain JSON number. On the client they are
//! held as a [`Decimal`] so that `9.99` stays `9.99` when displayed or compared,
//! and a `Price` can only exist when it is finite and strictly positive.

use core::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

/// Errors that can occur when building a [`Price`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PriceError {
    /// The input could not be read as a number.
    #[error("Must be a number")]
    NotANumber,
    /// The value is NaN or infinite.
    #[error("Price must be a finite number")]
    NotFinite,
    /// The value is zero or negative.
    #[error("Price must be greater than zero")]
    NotPositive,
}

/// A product price in the catalog's single display currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Price(Decimal);

impl Price {
    /// Create a price from a decimal amount.
    ///
    /// # Errors
    ///
    /// Returns `PriceError::NotPositive` if the amount is zero or negative.
    pub fn new(amount: Decimal) -> Result<Self, PriceError> {
        if amount <= Decimal::ZERO {
            return Err(PriceError::NotPositive);
        }
        Ok(Self(amount))
    }

    /// Parse a price typed by a user (e.g. `"49.99"`).
    ///
    /// # Errors
    ///
    /// Returns `PriceError::NotANumber` for non-numeric input and
    /// `PriceError::NotPositive` for zero or negative amounts.
    pub fn parse(input: &str) -> Result<Self, PriceError> {
        let amount = Decimal::from_str(input.trim()).map_err(|_| PriceError::NotANumber)?;
        Self::new(amount)
    }

    /// The decimal amount.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// Format for display (e.g. `$9.99`).
    #[must_use]
    pub fn display(&self) -> String {
        format!("${:.2}", self.0)
    }
}

impl TryFrom<f64> for Price {
    type Error = PriceError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        if !value.is_finite() {
            return Err(PriceError::NotFinite);
        }
        if value <= 0.0 {
            return Err(PriceError::NotPositive);
        }
        // Go through the shortest round-trip representation so 9.99 stays 9.99.
        // Positive values outside the decimal range clamp to its ends.
        let amount = Decimal::from_str(&value.to_string())
            .ok()
            .filter(|amount| *amount > Decimal::ZERO)
            .unwrap_or(if value < 1.0 {
                Decimal::new(1, 28)
            } else {
                Decimal::MAX
            });
        Self::new(amount)
    }
}

impl From<Price> for f64 {
    fn from(price: Price) -> Self {
        price.0.to_f64().unwrap_or(Self::NAN)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_from_float_keeps_cents() {
        let price = Price::try_from(9.99).unwrap();
        assert_eq!(price.amount(), Decimal::new(999, 2));
        assert_eq!(price.display(), "$9.99");
    }

    #[test]
    fn test_price_rejects_invalid() {
        assert_eq!(Price::try_from(0.0), Err(PriceError::NotPositive));
        assert_eq!(Price::try_from(-3.5), Err(PriceError::NotPositive));
        assert_eq!(Price::try_from(f64::NAN), Err(PriceError::NotFinite));
        assert_eq!(Price::try_from(f64::INFINITY), Err(PriceError::NotFinite));
    }

    #[test]
    fn test_price_accepts_positive_floats_outside_decimal_range() {
        let tiny = Price::try_from(1e-30).unwrap();
        assert!(tiny.amount() > Decimal::ZERO);

        let huge = Price::try_from(1e300).unwrap();
        assert_eq!(huge.amount(), Decimal::MAX);

        let smallest = Price::try_from(f64::MIN_POSITIVE).unwrap();
        assert_eq!(smallest.amount(), tiny.amount());
    }

    #[test]
    fn test_price_parse_user_input() {
        assert_eq!(Price::parse(" 49.99 ").unwrap().amount(), Decimal::new(4999, 2));
        assert_eq!(Price::parse("abc"), Err(PriceError::NotANumber));
        assert_eq!(Price::parse("0"), Err(PriceError::NotPositive));
    }

    #[test]
    fn test_price_wire_format_is_a_number() {
        let price = Price::parse("12.5").unwrap();
        assert_eq!(serde_json::to_string(&price).unwrap(), "12.5");

        let parsed: Price = serde_json::from_str("9.99").unwrap();
        assert_eq!(parsed.amount(), Decimal::new(999, 2));

        assert!(serde_json::from_str::<Price>("-1").is_err());
    }

    #[test]
    fn test_price_display_pads_cents() {
        assert_eq!(Price::parse("5").unwrap().to_string(), "$5.00");
    }
}
