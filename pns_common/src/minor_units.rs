use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, AddAssign, Neg, Sub},
    str::FromStr,
};

use rust_decimal::{prelude::ToPrimitive, Decimal};
use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::newtype_ops;

/// Number of decimal places between the major and minor currency unit. Every currency the service currently
/// integrates with (CNY, USD, EUR) uses cents.
pub const MINOR_UNIT_SCALE: u32 = 2;

//--------------------------------------     MinorUnits       ---------------------------------------------------------
/// An amount of money expressed in the smallest unit of its currency (fen, cents).
///
/// Gateways disagree on the wire format of amounts. Alipay sends decimal strings in yuan (`"99.00"`), Stripe sends
/// integer cents. Everything inside the service works on `MinorUnits` so that amounts can be compared exactly.
#[derive(Debug, Clone, Copy, Default, Type, PartialEq, Eq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct MinorUnits(i64);

newtype_ops!(MinorUnits { binary: Add::add, Sub::sub; assign: AddAssign::add_assign; unary: Neg::neg });

impl Sum for MinorUnits {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Value cannot be represented in minor units: {0}")]
pub struct MinorUnitsConversionError(String);

impl From<i64> for MinorUnits {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl TryFrom<u64> for MinorUnits {
    type Error = MinorUnitsConversionError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        i64::try_from(value)
            .map(Self)
            .map_err(|_| MinorUnitsConversionError(format!("{value} is too large to convert to MinorUnits")))
    }
}

impl MinorUnits {
    pub fn value(&self) -> i64 {
        self.0
    }

    /// Parses a decimal amount in major units, e.g. `"99.00"`, into minor units.
    ///
    /// The conversion is exact. Amounts carrying more precision than the minor unit allows (`"1.005"`) are rejected
    /// rather than rounded, since a rounded amount would silently pass the amount guard.
    pub fn from_major_str(s: &str) -> Result<Self, MinorUnitsConversionError> {
        let s = s.trim();
        let major = Decimal::from_str(s).map_err(|e| MinorUnitsConversionError(format!("'{s}' is not a number. {e}")))?;
        let minor = major * Decimal::from(10i64.pow(MINOR_UNIT_SCALE));
        if !minor.fract().is_zero() {
            return Err(MinorUnitsConversionError(format!("'{s}' has more than {MINOR_UNIT_SCALE} decimal places")));
        }
        minor.to_i64().map(Self).ok_or_else(|| MinorUnitsConversionError(format!("'{s}' is out of range")))
    }

    /// Formats the amount in major units with exactly two decimal places, e.g. `9900` becomes `"99.00"`.
    pub fn to_major_string(&self) -> String {
        Decimal::new(self.0, MINOR_UNIT_SCALE).to_string()
    }
}

impl Display for MinorUnits {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_major_string())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_major_amounts() {
        assert_eq!(MinorUnits::from_major_str("99.00").unwrap(), MinorUnits::from(9900));
        assert_eq!(MinorUnits::from_major_str("99.9").unwrap(), MinorUnits::from(9990));
        assert_eq!(MinorUnits::from_major_str(" 50 ").unwrap(), MinorUnits::from(5000));
        assert_eq!(MinorUnits::from_major_str("0.01").unwrap(), MinorUnits::from(1));
    }

    #[test]
    fn reject_excess_precision() {
        assert!(MinorUnits::from_major_str("1.005").is_err());
        assert!(MinorUnits::from_major_str("abc").is_err());
        assert!(MinorUnits::from_major_str("").is_err());
    }

    #[test]
    fn display_in_major_units() {
        assert_eq!(MinorUnits::from(9900).to_string(), "99.00");
        assert_eq!(MinorUnits::from(5).to_major_string(), "0.05");
    }

    #[test]
    fn arithmetic() {
        let a = MinorUnits::from(100);
        let b = MinorUnits::from(50);
        assert_eq!(a - b, MinorUnits::from(50));
        assert_eq!(vec![a, b].into_iter().sum::<MinorUnits>(), MinorUnits::from(150));
    }
}
