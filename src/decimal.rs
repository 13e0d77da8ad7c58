//! Fixed-point decimal type with 4 decimal places precision.
//!
//! Uses `rust_decimal` internally with scale enforcement so that balances,
//! sums and clamps never pick up floating-point error. Values are persisted
//! as text to keep SQLite from coercing them to `REAL`.

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub, SubAssign};
use std::str::FromStr;

/// A decimal type that maintains exactly 4 decimal places of precision.
///
/// # Examples
///
/// ```
/// use std::str::FromStr;
/// use coop_ledger::Decimal4;
///
/// let amount = Decimal4::from_str("10.5").unwrap();
/// assert_eq!(amount.to_string(), "10.5000");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub struct Decimal4(Decimal);

impl Decimal4 {
    /// The number of decimal places to maintain.
    pub const SCALE: u32 = 4;

    /// Zero value.
    pub const ZERO: Self = Decimal4(Decimal::ZERO);

    /// Amounts read from text or storage must stay below `10^15` in magnitude.
    pub const MAX_INTEGER_DIGITS: u32 = 15;

    /// Creates a new `Decimal4` from a `Decimal`, normalizing to 4 decimal places.
    ///
    /// Values too large to carry 4 decimal places keep a smaller scale; use
    /// [`Decimal4::checked_new`] for untrusted input.
    pub fn new(value: Decimal) -> Self {
        let mut normalized = value;
        normalized.rescale(Self::SCALE);
        Decimal4(normalized)
    }

    /// Like [`Decimal4::new`], but `None` unless the magnitude is below
    /// `10^MAX_INTEGER_DIGITS`.
    pub fn checked_new(value: Decimal) -> Option<Self> {
        let limit = Decimal::from(10u64.pow(Self::MAX_INTEGER_DIGITS));
        if value.abs() >= limit {
            return None;
        }
        Some(Self::new(value))
    }

    /// `None` if the sum cannot be held at 4 decimal places.
    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0
            .checked_add(rhs.0)
            .map(Self::new)
            .filter(|d| d.0.scale() == Self::SCALE)
    }

    /// `None` if the difference cannot be held at 4 decimal places.
    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        self.0
            .checked_sub(rhs.0)
            .map(Self::new)
            .filter(|d| d.0.scale() == Self::SCALE)
    }

    /// Returns `true` if this value is zero.
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Returns `true` if this value is strictly greater than zero.
    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    /// Returns `true` if this value is strictly less than zero.
    pub fn is_negative(&self) -> bool {
        self.0 < Decimal::ZERO
    }

    /// Subtracts `rhs`, flooring the result at zero.
    pub fn saturating_sub(self, rhs: Self) -> Self {
        let diff = self - rhs;
        if diff.is_negative() {
            Self::ZERO
        } else {
            diff
        }
    }
}

impl FromStr for Decimal4 {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let trimmed = s.trim();
        let decimal = Decimal::from_str(trimmed)?;
        Decimal4::checked_new(decimal).ok_or(rust_decimal::Error::ExceedsMaximumPossibleValue)
    }
}

// The value already carries its scale, so plain `{}` prints 4 places.
// Formatting with `{:.4}` panics when the mantissa has no room to rescale.
impl fmt::Display for Decimal4 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Add for Decimal4 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Decimal4::new(self.0 + rhs.0)
    }
}

impl AddAssign for Decimal4 {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
        self.0.rescale(Self::SCALE);
    }
}

impl Sub for Decimal4 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Decimal4::new(self.0 - rhs.0)
    }
}

impl SubAssign for Decimal4 {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
        self.0.rescale(Self::SCALE);
    }
}

impl Sum for Decimal4 {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Decimal4::ZERO, |acc, x| acc + x)
    }
}

impl Serialize for Decimal4 {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Decimal4 {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Decimal4::from_str(&s).map_err(serde::de::Error::custom)
    }
}

impl ToSql for Decimal4 {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.to_string()))
    }
}

impl FromSql for Decimal4 {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value {
            ValueRef::Text(_) => {
                let s = value.as_str()?;
                Decimal4::from_str(s).map_err(|e| FromSqlError::Other(Box::new(e)))
            }
            ValueRef::Integer(i) => {
                Decimal4::checked_new(Decimal::from(i)).ok_or(FromSqlError::OutOfRange(i))
            }
            _ => Err(FromSqlError::InvalidType),
        }
    }
}
