//! Fixed-point money. All amounts are two-decimal-place `Decimal`s; nothing in
//! this module (or anything downstream of it) touches `f32`/`f64`.

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, Neg, Sub};
use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

const SCALE: u32 = 2;

/// An amount in rupees and paise, always held rounded to two decimal places
/// (half-away-from-zero), never normalized in a way that would change its
/// sign or drop the scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Money(Decimal);

impl Money {
    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    pub fn from_decimal(value: Decimal) -> Self {
        Self(round(value))
    }

    pub fn from_paise(paise: i64) -> Self {
        Self(Decimal::new(paise, SCALE))
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    pub fn abs(&self) -> Self {
        Self(self.0.abs())
    }

    /// Multiply by a dimensionless factor (a rate, a proportion, a count),
    /// rounding the result back to two decimal places.
    pub fn scale(&self, factor: Decimal) -> Self {
        Self(round(self.0 * factor))
    }

    /// The absolute difference between two amounts, used by the
    /// reconciliation invariant on split bills and vendor payments.
    pub fn abs_diff(&self, other: &Self) -> Self {
        Self((self.0 - other.0).abs())
    }
}

fn round(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(SCALE, RoundingStrategy::MidpointAwayFromZero)
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl FromStr for Money {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Decimal::from_str(s.trim()).map(Self::from_decimal)
    }
}

impl Add for Money {
    type Output = Money;
    fn add(self, rhs: Self) -> Self::Output {
        Self(round(self.0 + rhs.0))
    }
}

impl Sub for Money {
    type Output = Money;
    fn sub(self, rhs: Self) -> Self::Output {
        Self(round(self.0 - rhs.0))
    }
}

impl Neg for Money {
    type Output = Money;
    fn neg(self) -> Self::Output {
        Self(-self.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

/// Serialized as a decimal string ("1234.56"), matching the rest of the
/// pack's convention of never letting an amount pass through a JSON number —
/// `serde_json`'s f64 backing would reintroduce the precision loss this type
/// exists to avoid.
impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Money::from_str(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_half_away_from_zero() {
        assert_eq!(Money::from_str("10.005").unwrap().to_string(), "10.01");
        assert_eq!(Money::from_str("-10.005").unwrap().to_string(), "-10.01");
    }

    #[test]
    fn arithmetic_stays_rounded() {
        let a = Money::from_str("10.10").unwrap();
        let b = Money::from_str("0.05").unwrap();
        assert_eq!((a + b).to_string(), "10.15");
        assert_eq!((a - b).to_string(), "10.05");
    }

    #[test]
    fn scale_rounds_the_product() {
        let amount = Money::from_str("100.00").unwrap();
        let third = amount.scale(Decimal::new(1, 0) / Decimal::new(3, 0));
        assert_eq!(third.to_string(), "33.33");
    }

    #[test]
    fn serializes_as_decimal_string_not_json_number() {
        let amount = Money::from_str("1234.50").unwrap();
        let json = serde_json::to_string(&amount).unwrap();
        assert_eq!(json, "\"1234.50\"");
        let roundtrip: Money = serde_json::from_str(&json).unwrap();
        assert_eq!(roundtrip, amount);
    }

    #[test]
    fn abs_diff_is_always_nonnegative() {
        let a = Money::from_str("5.00").unwrap();
        let b = Money::from_str("7.50").unwrap();
        assert_eq!(a.abs_diff(&b).to_string(), "2.50");
        assert_eq!(b.abs_diff(&a).to_string(), "2.50");
    }
}
