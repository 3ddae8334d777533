//! Fixed-point currency amounts.
//!
//! # Motivation
//!
//! Recognition schedules must tie out to the cent. Binary floating point
//! cannot represent most decimal cent values exactly, so every amount in the
//! schedule path is an integer count of minor units (cents) wrapped in
//! [`Money`]. The only float in the engine is the derived FX ratio.
//!
//! # Scale
//!
//! 1.00 = `Money::from_cents(100)`. Amounts arriving with more than two
//! decimals are rounded on entry.
//!
//! # Rounding
//!
//! Every rounding step is **half away from zero** ("commercial half-up"):
//! `10.005 -> 10.01`, `-10.005 -> -10.01`, `10.004999 -> 10.00`.
//! [`Money::div_round`] applies the same rule to integer division, so a
//! straight-line split is exact and reproducible on every platform.
//!
//! # Wire format
//!
//! Serialized as a JSON number (`33.34`). Deserialization accepts numbers
//! or decimal strings (`"33.34"`); strings avoid any float round-trip.
//!
//! # Range
//!
//! Schedule amounts are bounded by [`Money::LIMIT`]: fifteen significant
//! digits, so every in-range amount survives the float encoding exactly.
//! Callers that accept amounts check [`Money::is_within_limit`] and combine
//! them with [`Money::checked_add`].

use std::fmt;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Minor units per major unit.
pub const CENTS_SCALE: i64 = 100;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A string that is not a plain decimal amount.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MoneyParseError {
    pub input: String,
}

impl fmt::Display for MoneyParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid amount {:?}", self.input)
    }
}

impl std::error::Error for MoneyParseError {}

// ---------------------------------------------------------------------------
// Money newtype
// ---------------------------------------------------------------------------

/// A currency amount in cents.
///
/// There is intentionally no `From<i64>`: callers must say whether a raw
/// integer is cents ([`Money::from_cents`]) or whole units
/// ([`Money::from_major`]).
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    /// One minor unit (0.01).
    pub const CENT: Money = Money(1);

    pub const MAX: Money = Money(i64::MAX);

    pub const MIN: Money = Money(i64::MIN);

    /// Largest magnitude a schedule amount may take: 9,999,999,999,999.99.
    pub const LIMIT: Money = Money(999_999_999_999_999);

    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Whole units; `None` on overflow.
    #[inline]
    pub fn from_major(units: i64) -> Option<Self> {
        units.checked_mul(CENTS_SCALE).map(Money)
    }

    #[inline]
    pub const fn cents(self) -> i64 {
        self.0
    }

    /// `None` on i64 overflow.
    #[inline]
    pub fn checked_add(self, rhs: Money) -> Option<Money> {
        self.0.checked_add(rhs.0).map(Money)
    }

    #[inline]
    pub fn checked_sub(self, rhs: Money) -> Option<Money> {
        self.0.checked_sub(rhs.0).map(Money)
    }

    #[inline]
    pub fn saturating_add(self, rhs: Money) -> Money {
        Money(self.0.saturating_add(rhs.0))
    }

    #[inline]
    pub fn saturating_sub(self, rhs: Money) -> Money {
        Money(self.0.saturating_sub(rhs.0))
    }

    /// Absolute value. `Money::MIN.abs()` saturates to `Money::MAX`.
    #[inline]
    pub fn abs(self) -> Money {
        Money(self.0.saturating_abs())
    }

    /// `1`, `0` or `-1` as a plain integer.
    #[inline]
    pub fn signum(self) -> i64 {
        self.0.signum()
    }

    #[inline]
    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    /// `|self| <= Money::LIMIT`.
    #[inline]
    pub fn is_within_limit(self) -> bool {
        (-Self::LIMIT.0..=Self::LIMIT.0).contains(&self.0)
    }

    /// Divide into `parts` equal shares, rounded half away from zero to the
    /// cent.
    ///
    /// # Panics
    /// If `parts <= 0`. A schedule always spans at least one period, so a
    /// non-positive divisor is a caller bug.
    pub fn div_round(self, parts: i64) -> Money {
        assert!(parts > 0, "div_round: parts must be > 0, got {parts}");
        let num = i128::from(self.0);
        let den = i128::from(parts);
        let mut q = num / den;
        let r = num % den;
        if 2 * r.abs() >= den {
            q += num.signum();
        }
        // |q| <= |num| so the quotient always fits back into i64.
        Money(q as i64)
    }

    /// `self / denom` as a float ratio, `None` when `denom` is zero.
    ///
    /// Used for FX rates (reporting / local), which are derived values and
    /// never fed back into amount arithmetic.
    pub fn ratio(self, denom: Money) -> Option<f64> {
        if denom.0 == 0 {
            return None;
        }
        Some(self.0 as f64 / denom.0 as f64)
    }

    /// Parse a plain decimal string (`"-1234.5"`, `"0.005"`, `"7"`).
    ///
    /// Digits beyond the second decimal are rounded half away from zero.
    /// No exponents, no thousands separators.
    pub fn parse_decimal(s: &str) -> Result<Money, MoneyParseError> {
        let err = || MoneyParseError {
            input: s.to_string(),
        };
        let t = s.trim();
        let (negative, body) = match t.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, t.strip_prefix('+').unwrap_or(t)),
        };
        let (int_part, frac_part) = match body.split_once('.') {
            Some((i, f)) => (i, f),
            None => (body, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(err());
        }
        if !int_part.bytes().all(|b| b.is_ascii_digit())
            || !frac_part.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(err());
        }

        let whole: i64 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().map_err(|_| err())?
        };
        let digit = |i: usize| -> i64 {
            frac_part
                .as_bytes()
                .get(i)
                .map(|b| i64::from(b - b'0'))
                .unwrap_or(0)
        };
        let mut cents = whole
            .checked_mul(CENTS_SCALE)
            .and_then(|c| c.checked_add(digit(0) * 10 + digit(1)))
            .ok_or_else(err)?;
        if digit(2) >= 5 {
            cents = cents.checked_add(1).ok_or_else(err)?;
        }
        Ok(Money(if negative { -cents } else { cents }))
    }

    /// Convert a float via its shortest decimal representation, so `10.005`
    /// rounds as the decimal it was written as, not as its binary neighbour.
    pub fn from_f64(v: f64) -> Option<Money> {
        if !v.is_finite() {
            return None;
        }
        Self::parse_decimal(&v.to_string()).ok()
    }

    /// Lossy float view for serialization and display-only maths.
    pub fn to_f64(self) -> f64 {
        self.0 as f64 / CENTS_SCALE as f64
    }
}

// ---------------------------------------------------------------------------
// Arithmetic operators (closed over Money)
// ---------------------------------------------------------------------------

impl Add for Money {
    type Output = Money;
    #[inline]
    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl Sub for Money {
    type Output = Money;
    #[inline]
    fn sub(self, rhs: Money) -> Money {
        Money(self.0 - rhs.0)
    }
}

impl Neg for Money {
    type Output = Money;
    #[inline]
    fn neg(self) -> Money {
        Money(-self.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, rhs: Money) {
        self.0 += rhs.0;
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, rhs: Money) {
        self.0 -= rhs.0;
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, |acc, m| acc + m)
    }
}

// ---------------------------------------------------------------------------
// Display
// ---------------------------------------------------------------------------

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / CENTS_SCALE;
        let frac = (self.0 % CENTS_SCALE).abs();
        // Truncation loses the sign for -0.xx; emit it explicitly.
        if self.0 < 0 && whole == 0 {
            write!(f, "-{whole}.{frac:02}")
        } else {
            write!(f, "{whole}.{frac:02}")
        }
    }
}

// ---------------------------------------------------------------------------
// Serde
// ---------------------------------------------------------------------------

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.to_f64())
    }
}

struct MoneyVisitor;

impl<'de> Visitor<'de> for MoneyVisitor {
    type Value = Money;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a decimal amount as a number or string")
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Money, E> {
        Money::from_major(v).ok_or_else(|| E::custom(format!("amount {v} out of range")))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Money, E> {
        i64::try_from(v)
            .ok()
            .and_then(Money::from_major)
            .ok_or_else(|| E::custom(format!("amount {v} out of range")))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Money, E> {
        Money::from_f64(v).ok_or_else(|| E::custom(format!("amount {v} out of range")))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Money, E> {
        Money::parse_decimal(v).map_err(E::custom)
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Money, D::Error> {
        deserializer.deserialize_any(MoneyVisitor)
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
