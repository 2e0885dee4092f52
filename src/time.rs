//! Time-related utilities.
//!
//! Schedules are written in wall-clock terms ("between 8 PM and 8 AM in Europe/Berlin"), while
//! triggers are absolute instants. Converting between the two is where all the trouble lives:
//!
//! 1. a civil day is not always 24 hours long. Around daylight-saving transitions it is 23 or 25
//!    hours, so "the same time tomorrow" is computed by moving the *date* and asking the zone what
//!    instant that wall-clock time corresponds to, never by adding 24 hours;
//! 2. some wall-clock times don't exist (spring-forward gaps) and some exist twice (fall-back
//!    overlaps). See [`at_wall_clock()`] for how we resolve those.
use chrono::prelude::*;
use chrono::{LocalResult, TimeDelta};
use chrono_tz::Tz;

/// The instant at which the wall clock in `tz` shows `time` on `date`.
///
/// If that wall-clock time happens twice (fall-back overlap), the earlier instant is returned. If
/// it doesn't happen at all (spring-forward gap), it's read with the UTC offset that was in force
/// before the transition, which moves it forward by the size of the gap: in a one-hour gap, 2:30
/// becomes 3:30.
pub fn at_wall_clock(tz: Tz, date: NaiveDate, time: NaiveTime) -> Option<DateTime<Utc>> {
    let naive = date.and_time(time);
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(instant) => Some(instant.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _) => Some(earliest.with_timezone(&Utc)),
        LocalResult::None => {
            let day_before = naive.checked_sub_signed(TimeDelta::days(1))?;
            let offset = tz.from_local_datetime(&day_before).earliest()?.offset().fix();
            let utc = naive
                .checked_sub_signed(TimeDelta::seconds(i64::from(offset.local_minus_utc())))?;
            Some(Utc.from_utc_datetime(&utc))
        }
    }
}

/// The civil date of `instant` in `tz`.
pub fn local_date(tz: Tz, instant: DateTime<Utc>) -> NaiveDate {
    instant.with_timezone(&tz).date_naive()
}

/// The weekday of `instant` in `tz`.
pub fn local_weekday(tz: Tz, instant: DateTime<Utc>) -> Weekday {
    instant.with_timezone(&tz).weekday()
}

/// Midnight at the beginning of `date` in `tz`.
pub fn start_of_day(tz: Tz, date: NaiveDate) -> Option<DateTime<Utc>> {
    at_wall_clock(tz, date, NaiveTime::MIN)
}

/// The last representable instant of `date` in `tz`, one nanosecond before the next midnight.
pub fn end_of_day(tz: Tz, date: NaiveDate) -> Option<DateTime<Utc>> {
    start_of_day(tz, date.succ_opt()?)?.checked_sub_signed(TimeDelta::nanoseconds(1))
}

/// Unix timestamp of `0001-01-01T00:00:00Z`.
pub const ZERO_TIME_TIMESTAMP: i64 = -62_135_596_800;

/// Rounds `instant` down to a multiple of `step`, counted from `0001-01-01T00:00:00Z`.
///
/// Steps that divide a day give the same result as counting from the Unix epoch; others, like
/// 7 minutes, don't.
pub fn truncate(instant: DateTime<Utc>, step: TimeDelta) -> Option<DateTime<Utc>> {
    let step = i128::from(step.num_nanoseconds()?);
    if step <= 0 {
        return None;
    }
    let since_zero_time = i128::from(instant.timestamp().checked_sub(ZERO_TIME_TIMESTAMP)?)
        * 1_000_000_000
        + i128::from(instant.timestamp_subsec_nanos());
    let excess = i64::try_from(since_zero_time.rem_euclid(step)).ok()?;
    instant.checked_sub_signed(TimeDelta::nanoseconds(excess))
}
