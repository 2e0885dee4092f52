//! The `source` block of a pipeline's resource configuration, and its validation into a
//! [`Schedule`].
use crate::schedule::{Interval, Schedule, TimeOfDay, Window};
use anyhow::{anyhow, bail};
use chrono::prelude::*;
use chrono::TimeDelta;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Source configuration as the user wrote it. All fields are optional.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Source {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub days: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_after: Option<String>,
}

impl Source {
    /// Checks the configuration and turns it into a [`Schedule`].
    ///
    /// A source that configures neither a window nor an interval triggers once per day.
    pub fn validate(&self) -> anyhow::Result<Schedule> {
        let location = match non_empty(&self.location) {
            None => Tz::UTC,
            Some(name) => name
                .parse::<Tz>()
                .map_err(|_| anyhow!("unknown location '{}'", name))?,
        };

        let window = match (non_empty(&self.start), non_empty(&self.stop)) {
            (None, None) => None,
            (Some(_), None) => bail!("must configure 'stop' if 'start' is set"),
            (None, Some(_)) => bail!("must configure 'start' if 'stop' is set"),
            (Some(start), Some(stop)) => {
                let start = parse_time_of_day(start, location)
                    .ok_or_else(|| anyhow!("invalid start time '{}': could not parse time", start))?;
                let stop = parse_time_of_day(stop, location)
                    .ok_or_else(|| anyhow!("invalid stop time '{}': could not parse time", stop))?;
                Some(Window { start, stop })
            }
        };

        let interval = match non_empty(&self.interval) {
            None => None,
            Some(interval) => {
                let period = parse_duration(interval)
                    .map_err(|reason| anyhow!("invalid interval '{}': {}", interval, reason))?;
                match Interval::new(period) {
                    Some(interval) => Some(interval),
                    None => bail!("interval must be positive"),
                }
            }
        };

        let mut days = Vec::with_capacity(self.days.len());
        for day in &self.days {
            let weekday = day
                .trim()
                .parse::<Weekday>()
                .map_err(|_| anyhow!("invalid day '{}'", day))?;
            if !days.contains(&weekday) {
                days.push(weekday);
            }
        }

        let start_after = match non_empty(&self.start_after) {
            None => None,
            Some(after) => Some(
                DateTime::parse_from_rfc3339(after)
                    .map_err(|err| anyhow!("invalid start_after '{}': {}", after, err))?
                    .with_timezone(&Utc),
            ),
        };

        let window = match (window, interval) {
            (None, None) => Some(Window::whole_day()),
            (window, _) => window,
        };

        Ok(Schedule {
            window,
            interval,
            days,
            location,
            start_after,
        })
    }
}

fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Parses times like "3:04 PM", "3PM", "3 PM", "15:04" and "1504", optionally followed by a UTC
/// offset like "-0700".
///
/// A time with an offset is converted into the wall-clock time it corresponds to in `location`,
/// using the offset `location` had at the beginning of 2018.
fn parse_time_of_day(input: &str, location: Tz) -> Option<TimeOfDay> {
    let input = input.trim();
    let (clock, offset) = match input.rsplit_once(' ') {
        Some((clock, offset)) if offset.starts_with(['+', '-']) => {
            (clock.trim_end(), Some(parse_utc_offset(offset)?))
        }
        _ => (input, None),
    };

    let time = parse_clock(clock)?;
    let time = match offset {
        None => time,
        Some(offset) => {
            let reference = NaiveDate::from_ymd_opt(2018, 1, 1)?.and_time(time.as_naive_time());
            let local = offset
                .from_local_datetime(&reference)
                .single()?
                .with_timezone(&location)
                .time();
            TimeOfDay::from_hm(local.hour(), local.minute())?
        }
    };
    Some(time)
}

/// "-0700", "+0530".
fn parse_utc_offset(offset: &str) -> Option<FixedOffset> {
    let (sign, digits) = (offset.get(..1)?, offset.get(1..)?);
    if digits.len() != 4 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let (hours, minutes) = (digits.get(..2)?, digits.get(2..)?);
    let seconds = hours.parse::<i32>().ok()? * 3600 + minutes.parse::<i32>().ok()? * 60;
    match sign {
        "+" => FixedOffset::east_opt(seconds),
        "-" => FixedOffset::west_opt(seconds),
        _ => None,
    }
}

fn parse_clock(clock: &str) -> Option<TimeOfDay> {
    let upper = clock.to_ascii_uppercase();
    let meridiem = if let Some(rest) = upper.strip_suffix("AM") {
        Some((rest.trim_end(), false))
    } else {
        upper.strip_suffix("PM").map(|rest| (rest.trim_end(), true))
    };

    match meridiem {
        Some((rest, pm)) => {
            let (hour, minute) = match rest.split_once(':') {
                Some((hour, minute)) => (hour, parse_minute(minute)?),
                None => (rest, 0),
            };
            let hour = parse_digits(hour, 1..=2)?;
            if hour > 12 {
                return None;
            }
            let hour = match (hour, pm) {
                (12, false) => 0,
                (12, true) => 12,
                (hour, false) => hour,
                (hour, true) => hour + 12,
            };
            TimeOfDay::from_hm(hour, minute)
        }
        None => match clock.split_once(':') {
            Some((hour, minute)) => TimeOfDay::from_hm(parse_digits(hour, 1..=2)?, parse_minute(minute)?),
            None if clock.len() == 4 => {
                TimeOfDay::from_hm(parse_digits(clock.get(..2)?, 2..=2)?, parse_minute(clock.get(2..)?)?)
            }
            None => None,
        },
    }
}

fn parse_minute(minute: &str) -> Option<u32> {
    parse_digits(minute, 2..=2)
}

fn parse_digits(s: &str, width: std::ops::RangeInclusive<usize>) -> Option<u32> {
    if !width.contains(&s.len()) || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// Parses a duration like "90s", "1h30m", "1.5h" or "500ms".
///
/// Valid units are "ns", "us" (or "µs"), "ms", "s", "m" and "h". A leading sign is allowed, and a
/// bare "0" means zero.
pub fn parse_duration(input: &str) -> Result<TimeDelta, String> {
    let (negative, mut rest) = match input.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, input.strip_prefix('+').unwrap_or(input)),
    };
    if rest == "0" {
        return Ok(TimeDelta::zero());
    }
    if rest.is_empty() {
        return Err("empty duration".to_owned());
    }

    let overflow = || "duration out of range".to_owned();
    let mut total: i64 = 0;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .unwrap_or(rest.len());
        let (number, tail) = rest.split_at(number_len);
        let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
        if whole.is_empty() && fraction.is_empty() {
            return Err("expected a number".to_owned());
        }
        if fraction.contains('.') {
            return Err(format!("malformed number '{}'", number));
        }

        let unit_len = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_len);
        let nanos_per_unit: i64 = match unit {
            "ns" => 1,
            "us" | "µs" | "μs" => 1_000,
            "ms" => 1_000_000,
            "s" => 1_000_000_000,
            "m" => 60_000_000_000,
            "h" => 3_600_000_000_000,
            "" => return Err(format!("missing unit after '{}'", number)),
            _ => return Err(format!("unknown unit '{}'", unit)),
        };

        let whole: i64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| overflow())?
        };
        let mut nanos = whole.checked_mul(nanos_per_unit).ok_or_else(overflow)?;

        // Only as many fractional digits as the unit can resolve matter.
        let mut scale = nanos_per_unit;
        for digit in fraction.bytes() {
            scale /= 10;
            if scale == 0 {
                break;
            }
            nanos = nanos
                .checked_add(i64::from(digit - b'0') * scale)
                .ok_or_else(overflow)?;
        }

        total = total.checked_add(nanos).ok_or_else(overflow)?;
        rest = tail;
    }

    let total = if negative { -total } else { total };
    Ok(TimeDelta::nanoseconds(total))
}
