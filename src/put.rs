//! `out`: trigger a version by hand, regardless of when the last one was.
use crate::models::{MetadataField, OutRequest, Version, VersionResponse};
use crate::offset::{offset, Identity};
use crate::trigger::Trigger;
use crate::with_loc;
use anyhow::Context;
use chrono::prelude::*;
use slog::{info, Logger};
use std::io;

pub fn main(logger: Logger, now: DateTime<Utc>, identity: &Identity) -> anyhow::Result<()> {
    let request: OutRequest = serde_json::from_reader(io::stdin().lock())
        .context(with_loc!("Reading the out request from stdin"))?;

    let response = run(&logger, &request, now, identity)?;

    serde_json::to_writer(io::stdout().lock(), &response)
        .context(with_loc!("Writing the out response to stdout"))?;
    Ok(())
}

/// Reports the trigger that `check` would have produced for the current window, or `now` if that
/// trigger hasn't happened yet.
pub fn run(
    logger: &Logger,
    request: &OutRequest,
    now: DateTime<Utc>,
    identity: &Identity,
) -> anyhow::Result<VersionResponse> {
    let schedule = request.source.validate()?;

    let time = Trigger::new(&schedule, None)
        .latest(now)
        .map(|latest| offset(&schedule, identity, latest))
        .filter(|time| *time <= now && schedule.is_past_start_after(*time))
        .unwrap_or(now);
    info!(logger, "Putting version {} for {}", time, identity);

    let version = Version::new(time, schedule.location);
    Ok(VersionResponse {
        metadata: vec![MetadataField::new("time", version.time.to_rfc3339())],
        version,
    })
}
