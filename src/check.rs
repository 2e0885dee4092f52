//! `check`: report the versions that appeared since the one the CI saw last.
use crate::models::{CheckRequest, CheckResponse, Version};
use crate::offset::{offset, Identity};
use crate::trigger::Trigger;
use crate::with_loc;
use anyhow::Context;
use chrono::prelude::*;
use slog::{info, Logger};
use std::io;

pub fn main(logger: Logger, now: DateTime<Utc>, identity: &Identity) -> anyhow::Result<()> {
    let request: CheckRequest = serde_json::from_reader(io::stdin().lock())
        .context(with_loc!("Reading the check request from stdin"))?;

    let versions = run(&logger, &request, now, identity)?;

    serde_json::to_writer(io::stdout().lock(), &versions)
        .context(with_loc!("Writing the check response to stdout"))?;
    Ok(())
}

/// Lists every version that should exist between the requested one and `now`, oldest first.
///
/// The requested version is always included, so the CI doesn't consider it gone. Each missed
/// trigger is moved to this pipeline's offset inside its window; triggers whose offset hasn't
/// come yet are left for a later check.
pub fn run(
    logger: &Logger,
    request: &CheckRequest,
    now: DateTime<Utc>,
    identity: &Identity,
) -> anyhow::Result<CheckResponse> {
    let schedule = request.source.validate()?;
    info!(logger, "Checking {:?} for {} at {}", schedule, identity, now);

    let current = request.version().map(Version::instant);
    // The version we got may itself have been offset, so find the trigger it came from.
    let previous = current.and_then(|time| Trigger::new(&schedule, None).latest(time));

    let mut versions: CheckResponse = request.version().cloned().into_iter().collect();
    for instant in Trigger::new(&schedule, previous).list(now) {
        let time = offset(&schedule, identity, instant);
        if current.is_some_and(|current| time <= current)
            || !schedule.is_past_start_after(time)
        {
            continue;
        }
        if time > now {
            break;
        }
        info!(logger, "New version at {}", time);
        versions.push(Version::new(time, schedule.location));
    }

    Ok(versions)
}
