//! Statement periods and their portal addressing.
//!
//! The portal's search control does not take calendar dates; it addresses
//! statement periods by how many whole months they lie before the current
//! month (0 = the current month). This module converts between the two views.

use std::fmt;

use chrono::{Datelike, NaiveDate};
use serde::{de, Deserialize, Deserializer};

/// Months-before-present index used by the portal's search interval control.
pub type MonthOffset = i64;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("invalid month {value:?}: expected {expected}")]
pub struct MonthParseError {
    value: String,
    expected: &'static str,
}

impl MonthParseError {
    fn new(value: &str, expected: &'static str) -> Self {
        Self {
            value: value.to_string(),
            expected,
        }
    }
}

/// A calendar month, ordered chronologically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Result<Self, MonthParseError> {
        if !(1..=12).contains(&month) {
            return Err(MonthParseError::new(
                &format!("{year}-{month}"),
                "a month between 01 and 12",
            ));
        }
        Ok(Self { year, month })
    }

    /// Parse the configuration form, `MM/YYYY`.
    pub fn from_mm_yyyy(s: &str) -> Result<Self, MonthParseError> {
        let expected = "MM/YYYY";
        let (month, year) = s
            .trim()
            .split_once('/')
            .ok_or_else(|| MonthParseError::new(s, expected))?;
        let month = month
            .parse::<u32>()
            .map_err(|_| MonthParseError::new(s, expected))?;
        let year = year
            .parse::<i32>()
            .map_err(|_| MonthParseError::new(s, expected))?;
        Self::new(year, month).map_err(|_| MonthParseError::new(s, expected))
    }

    /// Parse the statement filename form, `YYYY-MM`.
    pub fn from_yyyy_mm(s: &str) -> Result<Self, MonthParseError> {
        let expected = "YYYY-MM";
        let (year, month) = s
            .trim()
            .split_once('-')
            .ok_or_else(|| MonthParseError::new(s, expected))?;
        let year = year
            .parse::<i32>()
            .map_err(|_| MonthParseError::new(s, expected))?;
        let month = month
            .parse::<u32>()
            .map_err(|_| MonthParseError::new(s, expected))?;
        Self::new(year, month).map_err(|_| MonthParseError::new(s, expected))
    }

    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// Whole months between this month and `today`'s month. Positive values
    /// lie in the past; the current month is 0.
    pub fn offset_from(&self, today: NaiveDate) -> MonthOffset {
        (today.year() - self.year) as i64 * 12 + today.month() as i64 - self.month as i64
    }

    /// Inverse of [`offset_from`](Self::offset_from).
    pub fn from_offset(today: NaiveDate, offset: MonthOffset) -> Self {
        let index = today.year() as i64 * 12 + (today.month() as i64 - 1) - offset;
        Self {
            year: index.div_euclid(12) as i32,
            month: (index.rem_euclid(12) + 1) as u32,
        }
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Serde deserializer for the `MM/YYYY` configuration form.
///
/// Use with `#[serde(deserialize_with = "deserialize_month")]`.
pub fn deserialize_month<'de, D>(deserializer: D) -> Result<YearMonth, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    YearMonth::from_mm_yyyy(&s).map_err(de::Error::custom)
}

/// Resolve a configured `{from, to}` range into the descending sequence of
/// portal offsets, `offset(from)` down to `offset(to)` inclusive.
///
/// `from` lies further in the past than `to`, so its offset is the larger
/// one. An inverted range (where `from` is the more recent month) resolves to
/// no offsets at all; that is accepted silently, the request simply covers
/// nothing.
pub fn resolve_range(today: NaiveDate, from: YearMonth, to: YearMonth) -> Vec<MonthOffset> {
    let start = from.offset_from(today);
    let end = to.offset_from(today);
    if start < end {
        return Vec::new();
    }
    (end..=start).rev().collect()
}
