use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Neg, Sub};

/// Exact two-decimal monetary value. The engine does all of its
/// comparisons in integer cents; `Money` is the presentation type used
/// on output structures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Money(Decimal);

impl Money {
    pub fn from_cents(cents: i64) -> Self {
        Money(Decimal::from(cents) / Decimal::from(100))
    }

    /// Saturates at the `i64` bounds if the value cannot be represented
    /// in cents.
    pub fn to_cents(self) -> i64 {
        let cents = self.0 * Decimal::from(100);
        cents.to_i64().unwrap_or(if cents.is_sign_negative() {
            i64::MIN
        } else {
            i64::MAX
        })
    }

    pub fn from_decimal(decimal: Decimal) -> Self {
        Money(decimal.round_dp(2))
    }

    pub fn zero() -> Self {
        Money(Decimal::ZERO)
    }

    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    pub fn abs(self) -> Self {
        Money(self.0.abs())
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl Add for Money {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Money(self.0 + rhs.0)
    }
}

impl Sub for Money {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Money(self.0 - rhs.0)
    }
}

impl Neg for Money {
    type Output = Self;
    fn neg(self) -> Self {
        Money(-self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cents_round_trip() {
        assert_eq!(Money::from_cents(12345).to_cents(), 12345);
        assert_eq!(Money::from_cents(-99).to_cents(), -99);
        assert_eq!(Money::from_cents(0), Money::zero());
    }

    #[test]
    fn arithmetic_is_exact() {
        let a = Money::from_cents(10);
        let b = Money::from_cents(20);
        assert_eq!((a + b).to_cents(), 30);
        assert_eq!((a - b).to_cents(), -10);
        assert_eq!((-a).to_cents(), -10);
        assert_eq!((a - b).abs().to_cents(), 10);
    }

    #[test]
    fn out_of_range_cents_saturate() {
        let huge = Money::from_decimal(Decimal::from(i64::MAX));
        assert_eq!(huge.to_cents(), i64::MAX);
        assert_eq!((-huge).to_cents(), i64::MIN);
    }

    #[test]
    fn display_two_decimals() {
        assert_eq!(Money::from_cents(150).to_string(), "1.50");
        assert_eq!(Money::from_cents(-7).to_string(), "-0.07");
    }
}
