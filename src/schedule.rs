//! A validated schedule: when a new version may be produced.
use crate::time;
use chrono::prelude::*;
use chrono::TimeDelta;
use chrono_tz::Tz;

/// A wall-clock time of day, with minute precision and no date or time zone attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimeOfDay(NaiveTime);

impl TimeOfDay {
    pub fn from_hm(hour: u32, minute: u32) -> Option<Self> {
        NaiveTime::from_hms_opt(hour, minute, 0).map(Self)
    }

    pub fn midnight() -> Self {
        Self(NaiveTime::MIN)
    }

    pub fn hour(&self) -> u32 {
        self.0.hour()
    }

    pub fn minute(&self) -> u32 {
        self.0.minute()
    }

    pub fn as_naive_time(&self) -> NaiveTime {
        self.0
    }
}

impl std::fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

/// A strictly positive repetition period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Interval(TimeDelta);

impl Interval {
    /// Returns `None` unless `period` is longer than zero.
    pub fn new(period: TimeDelta) -> Option<Self> {
        (period > TimeDelta::zero()).then_some(Self(period))
    }

    pub fn get(&self) -> TimeDelta {
        self.0
    }
}

/// The daily time-of-day range during which triggering is allowed.
///
/// `stop` may be earlier than `start`, in which case the window crosses midnight. If the two are
/// equal, the window covers a whole civil day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: TimeOfDay,
    pub stop: TimeOfDay,
}

impl Window {
    /// A window that spans the entire civil day, from midnight to midnight.
    pub fn whole_day() -> Self {
        Self {
            start: TimeOfDay::midnight(),
            stop: TimeOfDay::midnight(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Schedule {
    pub window: Option<Window>,
    pub interval: Option<Interval>,
    /// Weekdays on which triggering is allowed. Empty means every day.
    pub days: Vec<Weekday>,
    /// Time zone in which `window` and `days` are evaluated.
    pub location: Tz,
    /// No trigger is valid at or before this instant.
    pub start_after: Option<DateTime<Utc>>,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            window: None,
            interval: None,
            days: vec![],
            location: Tz::UTC,
            start_after: None,
        }
    }
}

impl Schedule {
    pub fn weekday_matches(&self, weekday: Weekday) -> bool {
        self.days.is_empty() || self.days.contains(&weekday)
    }

    /// Whether `instant` falls on one of the configured weekdays, as seen in `location`.
    pub fn days_match(&self, instant: DateTime<Utc>) -> bool {
        self.weekday_matches(time::local_weekday(self.location, instant))
    }

    /// Whether `instant` is past the `start_after` gate. Compared at whole-second precision.
    pub fn is_past_start_after(&self, instant: DateTime<Utc>) -> bool {
        match self.start_after {
            None => true,
            Some(after) => instant.trunc_subsecs(0) > after.trunc_subsecs(0),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn time_of_day_rejects_out_of_range_values() {
        assert!(TimeOfDay::from_hm(24, 0).is_none());
        assert!(TimeOfDay::from_hm(12, 60).is_none());
        assert_eq!(TimeOfDay::from_hm(23, 59).unwrap().to_string(), "23:59");
    }

    #[test]
    fn interval_must_be_positive() {
        assert!(Interval::new(TimeDelta::zero()).is_none());
        assert!(Interval::new(TimeDelta::seconds(-1)).is_none());
        assert_eq!(
            Interval::new(TimeDelta::minutes(2)).unwrap().get(),
            TimeDelta::minutes(2)
        );
    }

    #[test]
    fn empty_day_list_matches_every_day() {
        let schedule = Schedule::default();
        for day in [Weekday::Sun, Weekday::Wed, Weekday::Sat] {
            assert!(schedule.weekday_matches(day));
        }
    }

    #[test]
    fn days_are_evaluated_in_location() {
        let schedule = Schedule {
            days: vec![Weekday::Wed],
            location: chrono_tz::America::Indiana::Indianapolis,
            ..Schedule::default()
        };
        // Thursday 02:00 UTC is still Wednesday evening in Indianapolis.
        let thursday_utc = Utc.with_ymd_and_hms(2018, 1, 4, 2, 0, 0).unwrap();
        assert_eq!(thursday_utc.weekday(), Weekday::Thu);
        assert!(schedule.days_match(thursday_utc));
    }

    #[test]
    fn start_after_is_exclusive_at_second_precision() {
        let gate = Utc.with_ymd_and_hms(2018, 1, 1, 12, 0, 0).unwrap();
        let schedule = Schedule {
            start_after: Some(gate),
            ..Schedule::default()
        };
        assert!(!schedule.is_past_start_after(gate));
        assert!(!schedule.is_past_start_after(gate + TimeDelta::milliseconds(500)));
        assert!(schedule.is_past_start_after(gate + TimeDelta::seconds(1)));
    }
}
