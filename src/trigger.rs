//! Deciding whether, and when, a schedule produces a trigger.
//!
//! A [`Trigger`] pairs a [`Schedule`] with the instant it last fired (if ever) and answers three
//! questions:
//!
//! * [`Trigger::check()`]: should it fire right now?
//! * [`Trigger::latest()`]: what's the most recent instant at which it should have fired?
//! * [`Trigger::list()`]: which instants has it missed since it last fired?
//!
//! Nothing here reads the clock or keeps state between calls, and nothing here can fail: "no
//! trigger" is expressed as `false`, `None` or an empty list.
use crate::schedule::{Interval, Schedule, Window};
use crate::time;
use crate::window::Range;
use chrono::prelude::*;
use chrono::TimeDelta;

/// Weekday patterns repeat weekly, so looking further back than this can't find anything new.
const MAX_DAYS_BACK: usize = 7;

#[derive(Debug, Clone)]
pub struct Trigger<'a> {
    schedule: &'a Schedule,
    previous: Option<DateTime<Utc>>,
}

impl<'a> Trigger<'a> {
    pub fn new(schedule: &'a Schedule, previous: Option<DateTime<Utc>>) -> Self {
        Self { schedule, previous }
    }

    /// Whether `now` is a valid instant to fire at, given when we fired last.
    pub fn check(&self, now: DateTime<Utc>) -> bool {
        let range = self.schedule.latest_range_before(now);

        if !self.schedule.days_match(now) {
            return false;
        }

        if let Some(range) = range {
            if !range.contains(now) {
                return false;
            }
        }

        if !self.schedule.is_past_start_after(now) {
            return false;
        }

        let previous = match self.previous {
            None => return true,
            Some(previous) => previous,
        };

        match (self.schedule.interval, range) {
            (Some(interval), _) => now.signed_duration_since(previous) >= interval.get(),
            (None, Some(range)) => previous < range.start,
            (None, None) => false,
        }
    }

    /// The most recent valid trigger instant at or before `reference`.
    pub fn latest(&self, reference: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if self.previous.is_some_and(|previous| previous > reference) {
            return None;
        }

        if !self.schedule.is_past_start_after(reference) {
            return None;
        }

        match self.schedule.window {
            Some(window) => self.latest_in_window(window, reference),
            None => self.latest_interval(reference),
        }
    }

    /// Every valid trigger instant after the previous one, up to and including `reference`,
    /// oldest first.
    ///
    /// Without a previous trigger there's nothing to catch up on, so the result is at most the
    /// single instant [`Trigger::latest()`] reports. Nothing at or before `start_after` is listed.
    pub fn list(&self, reference: DateTime<Utc>) -> Vec<DateTime<Utc>> {
        if !self.schedule.is_past_start_after(reference) {
            return vec![];
        }

        let previous = match self.previous {
            None => {
                return self
                    .latest(reference)
                    .filter(|instant| self.schedule.is_past_start_after(*instant))
                    .into_iter()
                    .collect()
            }
            Some(previous) => previous,
        };

        if previous >= reference {
            return vec![];
        }

        let candidates = match (self.schedule.window, self.schedule.interval) {
            (Some(window), interval) => self.list_in_windows(window, interval, previous, reference),
            (None, Some(interval)) => ticks_from(previous, interval)
                .skip(1)
                .take_while(|tick| *tick <= reference)
                .filter(|tick| self.schedule.days_match(*tick))
                .collect(),
            (None, None) => vec![],
        };

        strictly_increasing(
            candidates
                .into_iter()
                .filter(|instant| self.schedule.is_past_start_after(*instant)),
        )
    }

    fn latest_in_window(&self, window: Window, reference: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let (candidate, range) = self.latest_matching_range(window, reference)?;

        if self.previous.is_none() && !(candidate == reference && range.contains(reference)) {
            return None;
        }

        match self.schedule.interval {
            None => {
                if self.previous.is_some_and(|previous| previous > range.start) {
                    None
                } else {
                    Some(range.start)
                }
            }
            Some(interval) => ticks_in(range, interval)
                .take_while(|tick| *tick <= reference)
                .last(),
        }
    }

    fn latest_interval(&self, reference: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let interval = self.schedule.interval?;
        match self.previous {
            None => self.schedule.days_match(reference).then_some(reference),
            Some(previous) => ticks_from(previous, interval)
                .take_while(|tick| *tick <= reference)
                .filter(|tick| self.schedule.days_match(*tick))
                .last(),
        }
    }

    /// Steps back from `reference` to the end of each preceding civil day until we land on an
    /// allowed weekday.
    fn last_matching_day(&self, reference: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let tz = self.schedule.location;
        let mut candidate = reference;
        for _ in 0..MAX_DAYS_BACK {
            if self.schedule.days_match(candidate) {
                return Some(candidate);
            }
            let date = time::local_date(tz, candidate).pred_opt()?;
            candidate = time::end_of_day(tz, date)?;
        }
        None
    }

    /// The latest window occurrence that opens on an allowed weekday, and the instant it was
    /// resolved from.
    ///
    /// A reference before today's window resolves to yesterday's window, which may open on a
    /// filtered-out day; in that case we keep stepping back from just before it opened.
    fn latest_matching_range(
        &self,
        window: Window,
        reference: DateTime<Utc>,
    ) -> Option<(DateTime<Utc>, Range)> {
        let mut before = reference;
        for _ in 0..=MAX_DAYS_BACK {
            let candidate = self.last_matching_day(before)?;
            let range = window.latest_before(self.schedule.location, candidate)?;
            if self.schedule.days_match(range.start) {
                return Some((candidate, range));
            }
            before = range.start.checked_sub_signed(TimeDelta::nanoseconds(1))?;
        }
        None
    }

    /// Windows are attributed to the weekday of the civil date they open on, so a window crossing
    /// midnight counts for the day it started. [`Trigger::check()`] looks at `now`'s weekday
    /// instead.
    fn list_in_windows(
        &self,
        window: Window,
        interval: Option<Interval>,
        previous: DateTime<Utc>,
        reference: DateTime<Utc>,
    ) -> Vec<DateTime<Utc>> {
        let tz = self.schedule.location;
        let first = match window.latest_before(tz, previous) {
            Some(range) => time::local_date(tz, range.start),
            None => return vec![],
        };
        let last = time::local_date(tz, reference);

        let mut instants = vec![];
        let mut date = first;
        while date <= last {
            if self.schedule.weekday_matches(date.weekday()) {
                if let Some(range) = self.schedule.range_on(date) {
                    match interval {
                        None => {
                            if previous < range.start && range.start <= reference {
                                instants.push(range.start);
                            }
                        }
                        Some(interval) => instants.extend(
                            ticks_in(range, interval)
                                .take_while(|tick| *tick <= reference)
                                .filter(|tick| *tick > previous),
                        ),
                    }
                }
            }

            date = match date.succ_opt() {
                Some(next) => next,
                None => break,
            };
        }
        instants
    }
}

/// `start`, `start + interval`, `start + 2 * interval`, and so on, until the arithmetic overflows.
fn ticks_from(start: DateTime<Utc>, interval: Interval) -> impl Iterator<Item = DateTime<Utc>> {
    std::iter::successors(Some(start), move |tick| {
        tick.checked_add_signed(interval.get())
    })
}

/// The interval ticks that fall inside `range`.
fn ticks_in(range: Range, interval: Interval) -> impl Iterator<Item = DateTime<Utc>> {
    ticks_from(range.start, interval).take_while(move |tick| *tick < range.stop)
}

/// Drops every instant that isn't later than the one kept before it.
fn strictly_increasing(instants: impl IntoIterator<Item = DateTime<Utc>>) -> Vec<DateTime<Utc>> {
    let mut result: Vec<DateTime<Utc>> = vec![];
    for instant in instants {
        if result.last().map_or(true, |last| instant > *last) {
            result.push(instant);
        }
    }
    result
}
