//! Spreading identically scheduled pipelines across their window.
//!
//! If a thousand pipelines are all configured with `interval: 1h`, we don't want all of them to
//! trigger at the top of the hour. Instead, every pipeline is assigned a fixed position inside its
//! window (or interval), derived from a hash of the pipeline's identity. The position is measured
//! in whole minutes and doesn't change between runs, so every `check` agrees on where the version
//! for a given window lands.
use crate::schedule::Schedule;
use crate::time;
use crate::window::Range;
use chrono::prelude::*;
use chrono::TimeDelta;
use std::env;

pub const BUILD_TEAM_NAME: &str = "BUILD_TEAM_NAME";
pub const BUILD_PIPELINE_NAME: &str = "BUILD_PIPELINE_NAME";
pub const BUILD_PIPELINE_INSTANCE_VARS: &str = "BUILD_PIPELINE_INSTANCE_VARS";

/// Who is asking: the pipeline that the resource belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub team: String,
    pub pipeline: String,
    pub instance_vars: Option<String>,
}

impl Identity {
    pub fn new(team: &str, pipeline: &str) -> Self {
        Self {
            team: team.to_owned(),
            pipeline: pipeline.to_owned(),
            instance_vars: None,
        }
    }

    /// Reads the identity from the metadata variables the CI sets for resource containers.
    /// Missing variables are treated as empty.
    pub fn from_env() -> Self {
        Self {
            team: env::var(BUILD_TEAM_NAME).unwrap_or_default(),
            pipeline: env::var(BUILD_PIPELINE_NAME).unwrap_or_default(),
            instance_vars: env::var(BUILD_PIPELINE_INSTANCE_VARS)
                .ok()
                .filter(|vars| !vars.is_empty()),
        }
    }

    fn key(&self) -> String {
        match &self.instance_vars {
            None => format!("{}/{}", self.team, self.pipeline),
            Some(vars) => format!("{}/{}/{}", self.team, self.pipeline, vars),
        }
    }

    /// 32-bit FNV-1a of the identity.
    pub fn hash(&self) -> u32 {
        let mut hash: u32 = 0x811c_9dc5;
        for byte in self.key().as_bytes() {
            hash ^= u32::from(*byte);
            hash = hash.wrapping_mul(0x0100_0193);
        }
        hash
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Moves `reference` to this pipeline's position inside the window or interval it belongs to.
///
/// The period to spread over is the window `reference` falls in (the whole civil day if there's no
/// window), or the interval if that's shorter. Periods of a minute or less aren't spread at all.
pub fn offset(schedule: &Schedule, identity: &Identity, reference: DateTime<Utc>) -> DateTime<Utc> {
    let range = match schedule
        .latest_range_before(reference)
        .or_else(|| Range::day_of(schedule.location, reference))
    {
        Some(range) => range,
        None => return reference,
    };

    let mut start = range.start;
    let mut period = range.duration();
    if let Some(interval) = schedule.interval {
        if interval.get() < period {
            period = interval.get();
            start = time::truncate(reference, period).unwrap_or(reference);
        }
    }

    if period <= TimeDelta::minutes(1) {
        return start;
    }

    let minutes = period.num_minutes();
    let hash_per_minute = (i64::from(u32::MAX) / minutes).max(1);
    let minutes_to_offset = (i64::from(identity.hash()) / hash_per_minute).clamp(0, minutes - 1);

    start
        .checked_add_signed(TimeDelta::minutes(minutes_to_offset))
        .unwrap_or(start)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::schedule::{Interval, TimeOfDay, Window};

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    fn identities() -> [(Identity, i64); 4] {
        // Offsets, in minutes, into a 1440-minute day.
        [
            (Identity::new("", ""), 236),
            (Identity::new("concourse", "time-resource"), 718),
            (Identity::new("concourse", "concourse"), 1007),
            (Identity::new("foo", "bar"), 1123),
        ]
    }

    fn hours(h: i64) -> Option<Interval> {
        Interval::new(TimeDelta::hours(h))
    }

    #[test]
    fn fnv1a_hash() {
        assert_eq!(Identity::new("", "").hash(), 705_468_254);
        assert_eq!(Identity::new("foo", "bar").hash(), 3_349_617_645);
        let instanced = Identity {
            instance_vars: Some(r#"{"env":"prod"}"#.to_owned()),
            ..Identity::new("main", "deploy")
        };
        assert_eq!(instanced.hash(), 694_207_345);
        assert_eq!(instanced.to_string(), r#"main/deploy/{"env":"prod"}"#);
    }

    #[test]
    fn spreads_across_the_day_without_a_window() {
        let reference = utc(2012, 4, 21, 15, 4, 5);
        let midnight = utc(2012, 4, 21, 0, 0, 0);
        for (identity, minutes) in identities() {
            assert_eq!(
                offset(&Schedule::default(), &identity, reference),
                midnight + TimeDelta::minutes(minutes),
                "{identity}"
            );
        }
    }

    #[test]
    fn interval_longer_than_the_day_uses_the_day() {
        let schedule = Schedule {
            interval: hours(168),
            ..Schedule::default()
        };
        let reference = utc(2012, 4, 21, 15, 4, 5);
        let midnight = utc(2012, 4, 21, 0, 0, 0);
        for (identity, minutes) in identities() {
            assert_eq!(
                offset(&schedule, &identity, reference),
                midnight + TimeDelta::minutes(minutes)
            );
        }
    }

    #[test]
    fn interval_shorter_than_the_day_uses_the_interval() {
        let schedule = Schedule {
            interval: hours(1),
            ..Schedule::default()
        };
        let reference = utc(2012, 4, 21, 15, 4, 5);
        let expected = [9, 29, 41, 46];
        for ((identity, _), minutes) in identities().into_iter().zip(expected) {
            assert_eq!(
                offset(&schedule, &identity, reference),
                utc(2012, 4, 21, 15, 0, 0) + TimeDelta::minutes(minutes)
            );
        }
    }

    #[test]
    fn interval_periods_count_from_zero_time() {
        let schedule = Schedule {
            interval: Interval::new(TimeDelta::minutes(7)),
            ..Schedule::default()
        };
        // The 7-minute period containing 12:00 began at 11:58.
        let reference = utc(2018, 1, 3, 12, 0, 0);
        assert_eq!(
            offset(&schedule, &Identity::new("", ""), reference),
            utc(2018, 1, 3, 11, 59, 0)
        );
        assert_eq!(
            offset(&schedule, &Identity::new("concourse", "time-resource"), reference),
            utc(2018, 1, 3, 12, 1, 0)
        );
    }

    #[test]
    fn one_minute_interval_is_not_spread() {
        let schedule = Schedule {
            interval: Interval::new(TimeDelta::minutes(1)),
            ..Schedule::default()
        };
        let reference = utc(2012, 4, 21, 15, 4, 5);
        for (identity, _) in identities() {
            assert_eq!(
                offset(&schedule, &identity, reference),
                utc(2012, 4, 21, 15, 4, 0)
            );
        }
    }

    #[test]
    fn spreads_across_the_window() {
        let schedule = Schedule {
            window: Some(Window {
                start: TimeOfDay::from_hm(12, 0).unwrap(),
                stop: TimeOfDay::from_hm(18, 0).unwrap(),
            }),
            ..Schedule::default()
        };
        let reference = utc(2012, 4, 21, 15, 4, 5);
        let expected = [59, 179, 251, 280];
        for ((identity, _), minutes) in identities().into_iter().zip(expected) {
            assert_eq!(
                offset(&schedule, &identity, reference),
                utc(2012, 4, 21, 12, 0, 0) + TimeDelta::minutes(minutes)
            );
        }

        // An interval shorter than the window takes over.
        let schedule = Schedule {
            interval: hours(1),
            ..schedule
        };
        assert_eq!(
            offset(&schedule, &Identity::new("", ""), reference),
            utc(2012, 4, 21, 15, 9, 0)
        );
    }

    #[test]
    fn dst_days_have_fewer_or_more_minutes() {
        let schedule = Schedule {
            location: chrono_tz::America::New_York,
            ..Schedule::default()
        };
        let identity = Identity::new("", "");

        // 23-hour day: midnight EST is 05:00 UTC, 226 of 1380 minutes in.
        assert_eq!(
            offset(&schedule, &identity, utc(2012, 3, 11, 10, 17, 0)),
            utc(2012, 3, 11, 5, 0, 0) + TimeDelta::minutes(226)
        );

        // 25-hour day: midnight EDT is 04:00 UTC, 246 of 1500 minutes in.
        assert_eq!(
            offset(&schedule, &identity, utc(2012, 11, 4, 18, 17, 0)),
            utc(2012, 11, 4, 4, 0, 0) + TimeDelta::minutes(246)
        );
    }

    #[test]
    fn offset_is_deterministic_and_bounded() {
        let schedules = [
            Schedule::default(),
            Schedule {
                window: Some(Window {
                    start: TimeOfDay::from_hm(20, 0).unwrap(),
                    stop: TimeOfDay::from_hm(8, 0).unwrap(),
                }),
                location: chrono_tz::Europe::Berlin,
                ..Schedule::default()
            },
            Schedule {
                interval: Interval::new(TimeDelta::minutes(2)),
                ..Schedule::default()
            },
        ];
        let reference = utc(2018, 1, 3, 21, 30, 0);

        for schedule in &schedules {
            for team in ["a", "b", "main", "some-rather-long-team-name"] {
                let identity = Identity::new(team, "pipeline");
                let first = offset(schedule, &identity, reference);
                assert_eq!(first, offset(schedule, &identity, reference));

                let (start, period) = match schedule.interval {
                    Some(interval) => (
                        time::truncate(reference, interval.get()).unwrap(),
                        interval.get(),
                    ),
                    None => {
                        let range = schedule
                            .latest_range_before(reference)
                            .or_else(|| Range::day_of(schedule.location, reference))
                            .unwrap();
                        (range.start, range.duration())
                    }
                };
                assert!(start <= first && first < start + period);
            }
        }
    }
}
