use std::fmt;

use chrono::{DateTime, Datelike, Days, Duration, Months, NaiveDate, TimeZone, Utc};

/// A calendar month in UTC, ordered chronologically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthKey(NaiveDate);

impl MonthKey {
    pub fn of(instant: DateTime<Utc>) -> Self {
        let date = instant.date_naive();
        Self(date - Days::new(u64::from(date.day0())))
    }

    pub fn first_day(self) -> NaiveDate {
        self.0
    }

    pub fn start(self) -> DateTime<Utc> {
        Utc.from_utc_datetime(&self.0.and_time(chrono::NaiveTime::MIN))
    }

    /// First instant of the following month; the window is `[start, next_start)`.
    pub fn next_start(self) -> DateTime<Utc> {
        self.next().start()
    }

    /// Last millisecond of the month (`23:59:59.999` on its last day).
    pub fn end(self) -> DateTime<Utc> {
        self.next_start() - Duration::milliseconds(1)
    }

    pub fn next(self) -> Self {
        // Adding one month to the first of a month never overflows the day.
        Self(self.0 + Months::new(1))
    }

    pub fn contains(self, instant: DateTime<Utc>) -> bool {
        instant >= self.start() && instant < self.next_start()
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.0.year(), self.0.month())
    }
}
