//! # Money Module
//!
//! Integer money in minor currency units (paisa, cents).
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  A bill is a sum of many lines plus add-ons, then a ledger fold over   │
//! │  months of entries. Floating point drifts on both:                     │
//! │                                                                         │
//! │    0.1 + 0.2 = 0.30000000000000004                                      │
//! │                                                                         │
//! │  Minor units never drift:                                               │
//! │    10 + 20 = 30                                                         │
//! │                                                                         │
//! │  The ledger due amount is a fold; a fold of i64 is exact.              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use tavola_core::money::Money;
//!
//! let momo = Money::from_cents(300);
//! let line = momo.multiply_quantity(2);
//! assert_eq!(line.cents(), 600);
//! assert_eq!(line.to_string(), "6.00");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};
use ts_rs::TS;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit.
///
/// Signed: ledger effects, discounts and reversals are negative.
///
/// ## Where Money Flows
/// ```text
/// Dish.price ──► OrderItem.unit_price ──► OrderItem.total_price ──► Order.total
///                                                                      │
/// Checkout.amount ──► Payment.amount ──► LedgerEntry.amount ◄──────────┘
///                                              │
///                                              ▼
///                                     closing_balance (fold)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from minor units.
    ///
    /// ## Example
    /// ```rust
    /// use tavola_core::money::Money;
    ///
    /// let price = Money::from_cents(1099);
    /// assert_eq!(price.cents(), 1099);
    /// ```
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Creates a Money value from major and minor units.
    ///
    /// For negative amounts only the major unit carries the sign:
    /// `from_major_minor(-5, 50)` is -5.50.
    ///
    /// ```rust
    /// use tavola_core::money::Money;
    ///
    /// assert_eq!(Money::from_major_minor(10, 99).cents(), 1099);
    /// assert_eq!(Money::from_major_minor(-5, 50).cents(), -550);
    /// ```
    #[inline]
    pub const fn from_major_minor(major: i64, minor: i64) -> Self {
        if major < 0 {
            Money(major * 100 - minor)
        } else {
            Money(major * 100 + minor)
        }
    }

    /// Returns the value in minor units.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the whole major-unit portion, truncated toward zero.
    #[inline]
    pub const fn major(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the minor-unit remainder (always 0-99).
    #[inline]
    pub const fn minor_part(&self) -> i64 {
        (self.0 % 100).abs()
    }

    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    #[inline]
    pub const fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    /// Multiplies a unit price by a quantity.
    ///
    /// ```rust
    /// use tavola_core::money::Money;
    ///
    /// let unit_price = Money::from_cents(299);
    /// assert_eq!(unit_price.multiply_quantity(3).cents(), 897);
    /// ```
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0 * qty)
    }

    /// `multiply_quantity` that returns `None` instead of overflowing.
    #[inline]
    pub const fn checked_multiply_quantity(&self, qty: i64) -> Option<Self> {
        match self.0.checked_mul(qty) {
            Some(cents) => Some(Money(cents)),
            None => None,
        }
    }

    /// Addition that returns `None` instead of overflowing.
    ///
    /// ```rust
    /// use tavola_core::money::Money;
    ///
    /// assert!(Money::from_cents(i64::MAX).checked_add(Money::from_cents(1)).is_none());
    /// assert_eq!(Money::from_cents(5).checked_add(Money::from_cents(1)), Some(Money::from_cents(6)));
    /// ```
    #[inline]
    pub const fn checked_add(&self, other: Money) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(cents) => Some(Money(cents)),
            None => None,
        }
    }

    /// Whole units of `divisor` contained in this amount, floored at zero.
    ///
    /// Used for loyalty points: a negative or tiny amount earns nothing.
    ///
    /// ```rust
    /// use tavola_core::money::Money;
    ///
    /// assert_eq!(Money::from_cents(25_999).whole_units_of(100), 259);
    /// assert_eq!(Money::from_cents(-500).whole_units_of(100), 0);
    /// ```
    pub fn whole_units_of(&self, divisor: i64) -> i64 {
        if divisor <= 0 || self.0 <= 0 {
            return 0;
        }
        self.0 / divisor
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Plain decimal rendering with no currency symbol; the front end localizes.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}{}.{:02}", sign, self.major().abs(), self.minor_part())
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Neg for Money {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Money(-self.0)
    }
}

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + *m)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_cents() {
        let money = Money::from_cents(1099);
        assert_eq!(money.cents(), 1099);
        assert_eq!(money.major(), 10);
        assert_eq!(money.minor_part(), 99);
    }

    #[test]
    fn test_display() {
        assert_eq!(Money::from_cents(60000).to_string(), "600.00");
        assert_eq!(Money::from_cents(-550).to_string(), "-5.50");
        assert_eq!(Money::from_cents(7).to_string(), "0.07");
    }

    #[test]
    fn test_arithmetic() {
        let a = Money::from_cents(600);
        let b = Money::from_cents(100);
        assert_eq!((a + b).cents(), 700);
        assert_eq!((a - b).cents(), 500);
        assert_eq!((-a).cents(), -600);
        assert_eq!((b * 3).cents(), 300);

        let mut c = a;
        c -= b;
        c += Money::from_cents(1);
        assert_eq!(c.cents(), 501);
    }

    #[test]
    fn test_sum() {
        let lines = vec![
            Money::from_cents(600),
            Money::from_cents(150),
            Money::from_cents(-50),
        ];
        let total: Money = lines.iter().sum();
        assert_eq!(total.cents(), 700);
        let owned: Money = lines.into_iter().sum();
        assert_eq!(owned, total);
    }

    #[test]
    fn test_whole_units_of() {
        assert_eq!(Money::from_cents(60000).whole_units_of(10000), 6);
        assert_eq!(Money::from_cents(9999).whole_units_of(10000), 0);
        assert_eq!(Money::from_cents(600).whole_units_of(0), 0);
    }

    #[test]
    fn test_checked_ops() {
        let max = Money::from_cents(i64::MAX);
        assert_eq!(max.checked_add(Money::from_cents(1)), None);
        assert_eq!(max.checked_multiply_quantity(2), None);
        assert_eq!(
            Money::from_cents(250).checked_multiply_quantity(4),
            Some(Money::from_cents(1000))
        );
    }
}
