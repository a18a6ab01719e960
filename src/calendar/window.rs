use chrono::{Days, NaiveDate, Weekday};

/// A contiguous run of visible days, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DateWindow {
    start: NaiveDate,
    days: u32,
}

impl DateWindow {
    /// `days` is validated by [`CalendarConfig`](crate::config::CalendarConfig)
    /// before a controller is built.
    pub fn new(start: NaiveDate, days: u32) -> Self {
        debug_assert!(days >= 1);
        Self { start, days }
    }

    /// Window containing `anchor`. Whole-week windows snap back to the
    /// configured first weekday; anything else starts on the anchor itself.
    pub fn anchored(anchor: NaiveDate, days: u32, week_starts_on: Weekday) -> Self {
        let start = if days % 7 == 0 {
            anchor.week(week_starts_on).first_day()
        } else {
            anchor
        };
        Self::new(start, days)
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.start + Days::new(self.days as u64 - 1)
    }

    pub fn days(&self) -> u32 {
        self.days
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end()
    }

    pub fn next(&self) -> Self {
        Self::new(self.start + Days::new(self.days as u64), self.days)
    }

    pub fn prev(&self) -> Self {
        Self::new(self.start - Days::new(self.days as u64), self.days)
    }

    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end();
        self.start.iter_days().take_while(move |d| *d <= end)
    }
}
