//! Discounts

use std::{fmt, str::FromStr};

use num_traits::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors specific to discount values.
#[derive(Debug, Error)]
pub enum DiscountError {
    /// Discount text could not be parsed as a decimal number.
    #[error("invalid discount value: {0}")]
    Parse(#[from] rust_decimal::Error),

    /// Discount was negative.
    #[error("discount cannot be negative: {0}")]
    Negative(Decimal),
}

/// A discount tier, expressed in percentage points (e.g. `20` is 20% off).
///
/// Discounts are exact decimals so that tiers read from different rows compare and hash equal
/// regardless of how they were written (`20`, `20.0`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Discount(Decimal);

impl Discount {
    /// No discount.
    pub const ZERO: Discount = Discount(Decimal::ZERO);

    /// Create a discount from a decimal number of percentage points.
    ///
    /// # Errors
    ///
    /// Returns [`DiscountError::Negative`] if `points` is negative.
    pub fn new(points: Decimal) -> Result<Self, DiscountError> {
        if points.is_sign_negative() && !points.is_zero() {
            return Err(DiscountError::Negative(points));
        }

        Ok(Discount(points.normalize()))
    }

    /// Create a discount from a whole number of percentage points.
    pub fn from_points(points: u32) -> Self {
        Discount(Decimal::from(points))
    }

    /// Percentage points as an exact decimal.
    pub fn points(self) -> Decimal {
        self.0
    }

    /// Percentage points as a solver coefficient.
    pub fn as_f64(self) -> f64 {
        self.0.to_f64().unwrap_or_default()
    }
}

impl FromStr for Discount {
    type Err = DiscountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Discount::new(Decimal::from_str(s.trim())?)
    }
}

impl fmt::Display for Discount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
