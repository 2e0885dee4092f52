//! Resolving a daily time-of-day window into absolute instants.
use crate::schedule::{Schedule, Window};
use crate::time;
use chrono::prelude::*;
use chrono::TimeDelta;
use chrono_tz::Tz;

/// One concrete occurrence of a window: `[start, stop)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub start: DateTime<Utc>,
    pub stop: DateTime<Utc>,
}

impl Range {
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.stop
    }

    pub fn duration(&self) -> TimeDelta {
        self.stop - self.start
    }

    /// The civil day containing `instant`, from one local midnight to the next.
    pub fn day_of(tz: Tz, instant: DateTime<Utc>) -> Option<Self> {
        Window::whole_day().on(tz, time::local_date(tz, instant))
    }
}

impl Window {
    /// The occurrence of this window that opens on `date`.
    ///
    /// If the stop time isn't after the start time on that date, the window closes on the next
    /// civil day instead.
    pub fn on(&self, tz: Tz, date: NaiveDate) -> Option<Range> {
        let start = time::at_wall_clock(tz, date, self.start.as_naive_time())?;
        let mut stop = time::at_wall_clock(tz, date, self.stop.as_naive_time())?;
        if stop <= start {
            stop = time::at_wall_clock(tz, date.succ_opt()?, self.stop.as_naive_time())?;
        }
        Some(Range { start, stop })
    }

    /// The latest occurrence of this window that opens at or before `reference`.
    pub fn latest_before(&self, tz: Tz, reference: DateTime<Utc>) -> Option<Range> {
        let date = time::local_date(tz, reference);
        let range = self.on(tz, date)?;
        if range.start > reference {
            self.on(tz, date.pred_opt()?)
        } else {
            Some(range)
        }
    }
}

impl Schedule {
    /// The window occurrence that opened most recently at or before `reference`, or `None` if the
    /// schedule isn't restricted to a window.
    pub fn latest_range_before(&self, reference: DateTime<Utc>) -> Option<Range> {
        self.window?.latest_before(self.location, reference)
    }

    /// The window occurrence that opens on the civil `date`, or `None` if the schedule isn't
    /// restricted to a window.
    pub fn range_on(&self, date: NaiveDate) -> Option<Range> {
        self.window?.on(self.location, date)
    }
}
