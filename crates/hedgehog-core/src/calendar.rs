//! Month layout and calendar-day comparisons.
//!
//! Weeks start on Monday: a month whose first day is a Wednesday gets two
//! leading blank cells. Timestamps are compared by the calendar day they fall
//! on in the project timezone, never by time of day.

use std::fmt;
use std::str::FromStr;

use anyhow::{Context, anyhow};
use chrono::{DateTime, Datelike, NaiveDate, Utc};

use crate::datetime::to_project_date;

pub const WEEKDAY_LABELS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

const MONTH_NAMES: [&str; 12] = [
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

/// Anything that can be reduced to a single calendar day.
pub trait CalendarDate {
    fn calendar_date(&self) -> NaiveDate;
}

impl CalendarDate for NaiveDate {
    fn calendar_date(&self) -> NaiveDate {
        *self
    }
}

impl CalendarDate for DateTime<Utc> {
    fn calendar_date(&self) -> NaiveDate {
        to_project_date(*self)
    }
}

/// True iff both sides are present and fall on the same calendar day.
pub fn is_same_day<A, B>(a: Option<&A>, b: Option<&B>) -> bool
where
    A: CalendarDate + ?Sized,
    B: CalendarDate + ?Sized,
{
    match (a, b) {
        (Some(a), Some(b)) => a.calendar_date() == b.calendar_date(),
        _ => false,
    }
}

pub fn is_today<A: CalendarDate + ?Sized>(date: Option<&A>) -> bool {
    is_today_at(date, Utc::now())
}

pub fn is_today_at<A: CalendarDate + ?Sized>(date: Option<&A>, now: DateTime<Utc>) -> bool {
    is_same_day(date, Some(&now))
}

/// Day cells for the month containing `anchor`: `None` for each blank slot
/// before the 1st, then every day of the month in order.
pub fn days_in_month(anchor: NaiveDate) -> Vec<Option<NaiveDate>> {
    CalendarMonth::containing(anchor).days()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CalendarMonth {
    year: i32,
    month: u32,
}

impl CalendarMonth {
    pub fn new(year: i32, month: u32) -> anyhow::Result<Self> {
        if !(1..=12).contains(&month) {
            return Err(anyhow!("month out of range: {month}"));
        }
        NaiveDate::from_ymd_opt(year, month, 1)
            .ok_or_else(|| anyhow!("year out of range: {year}"))?;
        Ok(Self { year, month })
    }

    pub fn containing(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn first_day(&self) -> NaiveDate {
        // Constructors only admit months whose 1st is representable.
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    /// 28 to 31, read off the last representable day of the month.
    pub fn day_count(&self) -> u32 {
        (29..=31)
            .rev()
            .find(|&day| NaiveDate::from_ymd_opt(self.year, self.month, day).is_some())
            .unwrap_or(28)
    }

    /// Weekday slots before the 1st, Monday = 0 through Sunday = 6.
    pub fn leading_blanks(&self) -> usize {
        self.first_day().weekday().num_days_from_monday() as usize
    }

    /// Moves by `delta` whole months, carrying into the year. Fails when the
    /// target month falls outside the supported date range.
    pub fn shift(&self, delta: i32) -> anyhow::Result<Self> {
        let index = i64::from(self.year) * 12 + i64::from(self.month - 1) + i64::from(delta);
        let year = i32::try_from(index.div_euclid(12))
            .map_err(|_| anyhow!("cannot move {delta} months from {self}: year out of range"))?;
        let month = index.rem_euclid(12) as u32 + 1;
        Self::new(year, month).with_context(|| format!("cannot move {delta} months from {self}"))
    }

    pub fn days(&self) -> Vec<Option<NaiveDate>> {
        let blanks = self.leading_blanks();
        let count = self.day_count();
        let mut cells = Vec::with_capacity(blanks + count as usize);
        cells.extend(std::iter::repeat_n(None, blanks));
        cells.extend(
            (1..=count).filter_map(|day| NaiveDate::from_ymd_opt(self.year, self.month, day).map(Some)),
        );
        cells
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date.year() == self.year && date.month() == self.month
    }

    pub fn label(&self) -> String {
        format!("{} {}", MONTH_NAMES[(self.month - 1) as usize], self.year)
    }
}

impl fmt::Display for CalendarMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for CalendarMonth {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (year, month) = s
            .trim()
            .split_once('-')
            .ok_or_else(|| anyhow!("expected YYYY-MM, got: {s}"))?;
        let year: i32 = year.parse().with_context(|| format!("invalid year in {s}"))?;
        let month: u32 = month.parse().with_context(|| format!("invalid month in {s}"))?;
        Self::new(year, month)
    }
}
