//! cbk-period
//!
//! Calendar-month period keys (`YYYY-MM`).
//!
//! Pure deterministic logic. No IO, no wall-clock. Callers that need "the
//! current period" pass a timestamp in via [`Period::containing`].
//!
//! # Ordering
//!
//! The canonical key is a fixed-width, zero-padded `YYYY-MM` string, so plain
//! string comparison of two keys orders them chronologically.
//! [`compare_period_keys`] is exactly that string comparison; the derived
//! `Ord` on [`Period`] (year, then month) agrees with it for every valid key.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::Datelike;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A string that is not a valid `YYYY-MM` period key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeriodParseError {
    pub input: String,
}

impl fmt::Display for PeriodParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid period key {:?}: expected YYYY-MM", self.input)
    }
}

impl std::error::Error for PeriodParseError {}

// ---------------------------------------------------------------------------
// Period
// ---------------------------------------------------------------------------

/// A calendar month. Serialized as the literal `YYYY-MM` key.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Period {
    year: u16,
    month: u8,
}

impl Period {
    /// Earliest representable period.
    pub const MIN: Period = Period { year: 0, month: 1 };

    /// Latest representable period (keys stay four-digit).
    pub const MAX: Period = Period {
        year: 9999,
        month: 12,
    };

    /// Construct from a year and a 1-based month.
    pub fn new(year: u16, month: u8) -> Option<Self> {
        if year > 9999 || !(1..=12).contains(&month) {
            return None;
        }
        Some(Self { year, month })
    }

    /// Parse a `YYYY-MM` key. Exactly seven characters, zero-padded month.
    pub fn parse(s: &str) -> Result<Self, PeriodParseError> {
        let err = || PeriodParseError {
            input: s.to_string(),
        };
        if !is_period_key_shape(s) {
            return Err(err());
        }
        let year: u16 = s[0..4].parse().map_err(|_| err())?;
        let month: u8 = s[5..7].parse().map_err(|_| err())?;
        Self::new(year, month).ok_or_else(err)
    }

    /// The period containing a calendar date or timestamp.
    pub fn containing<D: Datelike>(date: &D) -> Option<Self> {
        let year = u16::try_from(date.year()).ok()?;
        let month = u8::try_from(date.month()).ok()?;
        Self::new(year, month)
    }

    pub fn year(self) -> u16 {
        self.year
    }

    pub fn month(self) -> u8 {
        self.month
    }

    /// Months since `0000-01`; a dense index used for arithmetic.
    fn index(self) -> i64 {
        i64::from(self.year) * 12 + i64::from(self.month) - 1
    }

    fn from_index(idx: i64) -> Option<Self> {
        if idx < Self::MIN.index() || idx > Self::MAX.index() {
            return None;
        }
        let year = u16::try_from(idx / 12).ok()?;
        let month = u8::try_from(idx % 12 + 1).ok()?;
        Self::new(year, month)
    }

    /// Add `n` calendar months (negative `n` steps backwards).
    ///
    /// Returns `None` when the result falls outside `0000-01..=9999-12`.
    pub fn add_months(self, n: i64) -> Option<Self> {
        Self::from_index(self.index().checked_add(n)?)
    }

    /// Next calendar month, `None` past [`Period::MAX`].
    pub fn succ(self) -> Option<Self> {
        self.add_months(1)
    }

    /// Canonical `YYYY-MM` key.
    pub fn key(self) -> String {
        self.to_string()
    }

    /// Iterate `start..=end` month by month. Empty when `end < start`.
    pub fn range_inclusive(start: Period, end: Period) -> PeriodRange {
        PeriodRange {
            next: if start <= end { Some(start) } else { None },
            end,
        }
    }
}

/// Number of calendar months from `start` to `end`, counting both ends.
///
/// `2024-01 ..= 2024-03` is 3. Zero or negative when `end < start`; callers
/// that need a non-empty span must check.
pub fn months_between(start: Period, end: Period) -> i64 {
    end.index() - start.index() + 1
}

/// Compare two period keys as plain strings.
///
/// Only correct because keys are fixed-width and zero-padded; malformed keys
/// (e.g. `"2024-1"`) compare wrongly, which is why keys are validated on
/// entry via [`Period::parse`].
pub fn compare_period_keys(a: &str, b: &str) -> Ordering {
    a.cmp(b)
}

/// `true` when `s` has the literal shape `^\d{4}-\d{2}$`.
///
/// Shape only: `"2024-13"` passes here and fails [`Period::parse`].
pub fn is_period_key_shape(s: &str) -> bool {
    let b = s.as_bytes();
    b.len() == 7
        && b[..4].iter().all(u8::is_ascii_digit)
        && b[4] == b'-'
        && b[5..].iter().all(u8::is_ascii_digit)
}

// ---------------------------------------------------------------------------
// Iteration
// ---------------------------------------------------------------------------

/// Iterator returned by [`Period::range_inclusive`].
#[derive(Clone, Debug)]
pub struct PeriodRange {
    next: Option<Period>,
    end: Period,
}

impl Iterator for PeriodRange {
    type Item = Period;

    fn next(&mut self) -> Option<Period> {
        let cur = self.next?;
        self.next = if cur < self.end { cur.succ() } else { None };
        Some(cur)
    }
}

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for Period {
    type Err = PeriodParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Period {
    type Error = PeriodParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<Period> for String {
    fn from(p: Period) -> String {
        p.to_string()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
