//! Fixed-point token amounts.
//!
//! Wraps `rust_decimal` so every balance, fee, and loan principal is exact.
//! The token's precision is an engine setting rather than a type parameter,
//! so precision checks happen at the engine boundary via [`Amount::fits_precision`].

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub, SubAssign};
use std::str::FromStr;

/// An amount of the stable-value token, in whole token units.
///
/// `Amount` itself does not forbid negative values so that intermediate
/// arithmetic stays ergonomic; the engine rejects negative inputs and only
/// ever stores results of checked arithmetic.
///
/// # Examples
///
/// ```
/// use std::str::FromStr;
/// use savings_ledger::Amount;
///
/// let fee = Amount::from_str("10.50").unwrap();
/// assert_eq!(fee.to_string(), "10.5");
/// assert!(fee.fits_precision(6));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount(Decimal);

impl Amount {
    /// Zero value.
    pub const ZERO: Self = Amount(Decimal::ZERO);

    /// Creates an amount from a `Decimal`, dropping trailing zeros.
    pub fn new(value: Decimal) -> Self {
        Amount(value.normalize())
    }

    /// Creates an amount of whole token units.
    pub fn from_units(units: u64) -> Self {
        Amount(Decimal::from(units))
    }

    /// Returns the underlying decimal value.
    pub fn value(&self) -> Decimal {
        self.0
    }

    /// Returns `true` if this value is zero.
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Returns `true` if this value is strictly below zero.
    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    /// Returns `true` if the amount can be represented with `decimals`
    /// fractional digits.
    pub fn fits_precision(&self, decimals: u32) -> bool {
        self.0.normalize().scale() <= decimals
    }

    /// Adds two amounts, returning `None` on overflow.
    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Amount::new)
    }

    /// Subtracts `rhs`, returning `None` on overflow or if the result would
    /// be negative.
    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        let diff = self.0.checked_sub(rhs.0)?;
        if diff.is_sign_negative() && !diff.is_zero() {
            return None;
        }
        Some(Amount::new(diff))
    }

    /// Multiplies by `rate`, truncating the result toward zero at `decimals`.
    pub fn mul_truncated(self, rate: Decimal, decimals: u32) -> Option<Self> {
        let product = self.0.checked_mul(rate)?;
        Some(Amount::new(
            product.round_dp_with_strategy(decimals, RoundingStrategy::ToZero),
        ))
    }

    /// Splits the amount into `parts` equal shares truncated at `decimals`.
    ///
    /// The split runs on integer minor units, so the truncation remainder is
    /// exact and is added to the first share. The shares always sum to
    /// `self`. Returns `None` when `parts` is zero, when the amount has more
    /// fractional digits than `decimals`, or when a share cannot be
    /// represented at that precision.
    pub fn split_even(self, parts: usize, decimals: u32) -> Option<Vec<Amount>> {
        if parts == 0 || !self.fits_precision(decimals) {
            return None;
        }
        let normalized = self.0.normalize();
        let widen = 10i128.checked_pow(decimals - normalized.scale())?;
        let minor_units = normalized.mantissa().checked_mul(widen)?;

        let divisor = i128::try_from(parts).ok()?;
        let share = minor_units / divisor;
        let remainder = minor_units % divisor;

        let even = Amount::new(Decimal::try_from_i128_with_scale(share, decimals).ok()?);
        let first = Amount::new(
            Decimal::try_from_i128_with_scale(share + remainder, decimals).ok()?,
        );

        let mut shares = vec![even; parts];
        shares[0] = first;
        Some(shares)
    }
}

impl From<Decimal> for Amount {
    fn from(value: Decimal) -> Self {
        Amount::new(value)
    }
}

impl FromStr for Amount {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let decimal = Decimal::from_str(s.trim())?;
        Ok(Amount::new(decimal))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unchecked addition for tests and already-bounded totals.
///
/// # Panics
///
/// Panics if the result overflows `Decimal`. Ledger state changes go through
/// [`Amount::checked_add`] instead.
impl Add for Amount {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Amount::new(self.0 + rhs.0)
    }
}

impl AddAssign for Amount {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

/// Unchecked subtraction; the result may be negative.
///
/// # Panics
///
/// Panics if the result overflows `Decimal`.
impl Sub for Amount {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Amount::new(self.0 - rhs.0)
    }
}

impl SubAssign for Amount {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

/// # Panics
///
/// Panics if the running total overflows.
impl Sum for Amount {
    fn sum<I: Iterator<Item = Amount>>(iter: I) -> Self {
        iter.fold(Amount::ZERO, |acc, a| acc + a)
    }
}

impl<'a> Sum<&'a Amount> for Amount {
    fn sum<I: Iterator<Item = &'a Amount>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

impl Serialize for Amount {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Amount::from_str(&s).map_err(serde::de::Error::custom)
    }
}
