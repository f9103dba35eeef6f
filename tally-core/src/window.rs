//! Reporting windows: a year, optionally narrowed to one month.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use thiserror::Error;

use crate::time::{end_of_day, local_day, start_of_day};

pub const MIN_YEAR: i32 = 1000;
pub const MAX_YEAR: i32 = 9999;

pub const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WindowError {
    #[error("year {0} is outside 1000..=9999")]
    InvalidYear(i32),
    #[error("month {0} is outside 0..=11")]
    InvalidMonth(u32),
}

/// The selected reporting period.
///
/// `month` is zero-based (`0` = January). When absent the window spans the
/// whole year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ReportingWindow {
    year: i32,
    month: Option<u32>,
}

impl ReportingWindow {
    pub fn new(year: i32, month: Option<u32>) -> Result<Self, WindowError> {
        if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
            return Err(WindowError::InvalidYear(year));
        }
        if let Some(m) = month {
            if m > 11 {
                return Err(WindowError::InvalidMonth(m));
            }
        }
        Ok(Self { year, month })
    }

    pub fn year_only(year: i32) -> Result<Self, WindowError> {
        Self::new(year, None)
    }

    /// Window for the month containing `now` in `tz`.
    pub fn current_month(now: DateTime<Utc>, tz: Tz) -> Self {
        let today = local_day(now, tz);
        Self {
            year: today.year().clamp(MIN_YEAR, MAX_YEAR),
            month: Some(today.month0()),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    /// Zero-based month, if the window is narrowed to one.
    pub fn month(&self) -> Option<u32> {
        self.month
    }

    /// One-based month for display.
    pub fn month_number(&self) -> Option<u32> {
        self.month.map(|m| m + 1)
    }

    pub fn is_full_year(&self) -> bool {
        self.month.is_none()
    }

    /// First and last calendar day covered by the window.
    pub fn days(&self) -> (NaiveDate, NaiveDate) {
        match self.month {
            None => (
                ymd(self.year, 1, 1),
                ymd(self.year, 12, 31),
            ),
            Some(m) => {
                let first = ymd(self.year, m + 1, 1);
                let last = if m == 11 {
                    ymd(self.year, 12, 31)
                } else {
                    ymd(self.year, m + 2, 1).pred_opt().unwrap_or(first)
                };
                (first, last)
            }
        }
    }

    /// Inclusive instant bounds `[start, end]` of the window in `tz`.
    ///
    /// Derived purely from `year`/`month`; calling it twice yields the same
    /// bounds.
    pub fn bounds(&self, tz: Tz) -> (DateTime<Utc>, DateTime<Utc>) {
        let (first, last) = self.days();
        (start_of_day(first, tz), end_of_day(last, tz))
    }

    pub fn contains(&self, date: DateTime<Utc>, tz: Tz) -> bool {
        let (start, end) = self.bounds(tz);
        start <= date && date <= end
    }

    /// "March 2024" or "2024".
    pub fn label(&self) -> String {
        match self.month {
            Some(m) => format!("{} {}", MONTH_NAMES[m as usize], self.year),
            None => self.year.to_string(),
        }
    }
}

// Year and month are validated by the constructor, so the date always exists.
fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or(NaiveDate::MIN)
}

impl std::fmt::Display for ReportingWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.month {
            Some(m) => write!(f, "{:04}-{:02}", self.year, m + 1),
            None => write!(f, "{:04}", self.year),
        }
    }
}
