//! Canonical `YYYY-MM` month key

use chrono::{Datelike, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MonthKeyError {
    #[error("invalid month key '{0}', expected YYYY-MM")]
    Format(String),
    #[error("month {0} is out of range 1-12")]
    Month(u32),
    #[error("quarter {0} is out of range 1-4")]
    Quarter(u32),
    #[error("year {0} is out of range 1-9999")]
    Year(i32),
}

/// A calendar month, ordered chronologically.
///
/// Serializes as the zero-padded persistence key (`2025-06`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MonthKey {
    year: i32,
    month: u32,
}

impl MonthKey {
    pub fn new(year: i32, month: u32) -> Result<Self, MonthKeyError> {
        if !(1..=9999).contains(&year) {
            return Err(MonthKeyError::Year(year));
        }
        if !(1..=12).contains(&month) {
            return Err(MonthKeyError::Month(month));
        }
        Ok(Self { year, month })
    }

    /// The month containing `date`, `None` outside years 1-9999
    pub fn from_date(date: NaiveDate) -> Option<Self> {
        Self::new(date.year(), date.month()).ok()
    }

    /// The current month in the local timezone, evaluated on every call
    pub fn current() -> Self {
        let today = Local::now().date_naive();
        Self::from_date(today).unwrap_or(Self {
            year: today.year().clamp(1, 9999),
            month: today.month(),
        })
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// Calendar quarter, 1-4
    pub fn quarter(&self) -> u32 {
        (self.month - 1) / 3 + 1
    }

    /// Months since year 0, so that consecutive months differ by exactly one
    /// across year boundaries.
    pub fn linear(&self) -> i64 {
        i64::from(self.year) * 12 + i64::from(self.month) - 1
    }

    fn from_linear(index: i64) -> Option<Self> {
        let year = i32::try_from(index.div_euclid(12)).ok()?;
        let month = u32::try_from(index.rem_euclid(12)).ok()? + 1;
        Self::new(year, month).ok()
    }

    /// Move by `months` (negative goes back). `None` when leaving years 1-9999.
    pub fn shift(&self, months: i64) -> Option<Self> {
        Self::from_linear(self.linear() + months)
    }

    /// The three months of `quarter` in `year`, in order
    pub fn quarter_months(quarter: u32, year: i32) -> Result<[MonthKey; 3], MonthKeyError> {
        if !(1..=4).contains(&quarter) {
            return Err(MonthKeyError::Quarter(quarter));
        }
        let first = (quarter - 1) * 3 + 1;
        Ok([
            Self::new(year, first)?,
            Self::new(year, first + 1)?,
            Self::new(year, first + 2)?,
        ])
    }

    /// Key prefix matching every month of `year`
    pub fn year_prefix(year: i32) -> String {
        format!("{year:04}-")
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for MonthKey {
    type Err = MonthKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.as_bytes();
        let well_formed = bytes.len() == 7
            && bytes[4] == b'-'
            && bytes[..4].iter().all(u8::is_ascii_digit)
            && bytes[5..].iter().all(u8::is_ascii_digit);
        if !well_formed {
            return Err(MonthKeyError::Format(s.to_string()));
        }

        let year = s[..4]
            .parse::<i32>()
            .map_err(|_| MonthKeyError::Format(s.to_string()))?;
        let month = s[5..]
            .parse::<u32>()
            .map_err(|_| MonthKeyError::Format(s.to_string()))?;
        Self::new(year, month)
    }
}

impl TryFrom<String> for MonthKey {
    type Error = MonthKeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MonthKey> for String {
    fn from(key: MonthKey) -> Self {
        key.to_string()
    }
}
