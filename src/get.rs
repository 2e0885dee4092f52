//! `in`: materialize a version into a directory that build steps can read.
//!
//! Three files are written into the destination:
//!
//! * _input_: the request, as JSON;
//! * _timestamp_: the version's time in the source's location, human-readable;
//! * _epoch_: the version's time as seconds since the Unix epoch.
use crate::models::{InRequest, MetadataField, Version, VersionResponse};
use crate::with_loc;
use anyhow::Context;
use chrono::prelude::*;
use slog::{info, Logger};
use std::fs;
use std::io::{self, Write};
use std::path::Path;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f %z %Z";

pub fn main(logger: Logger, now: DateTime<Utc>, destination: &Path) -> anyhow::Result<()> {
    let request: InRequest = serde_json::from_reader(io::stdin().lock())
        .context(with_loc!("Reading the in request from stdin"))?;

    let response = run(&logger, &request, now, destination)?;

    serde_json::to_writer(io::stdout().lock(), &response)
        .context(with_loc!("Writing the in response to stdout"))?;
    Ok(())
}

pub fn run(
    logger: &Logger,
    request: &InRequest,
    now: DateTime<Utc>,
    destination: &Path,
) -> anyhow::Result<VersionResponse> {
    let schedule = request.source.validate()?;

    let version = match request.version() {
        Some(version) => version.clone(),
        None => Version::new(now, schedule.location),
    };
    info!(
        logger,
        "Fetching version {} into {}",
        version.time,
        destination.display()
    );

    fs::create_dir_all(destination).context(with_loc!("Creating the destination directory"))?;

    let input = serde_json::to_vec(request).context(with_loc!("Serializing the request"))?;
    write(destination, "input", &input).context(with_loc!("Writing the input file"))?;

    let timestamp = version
        .time
        .with_timezone(&schedule.location)
        .format(TIMESTAMP_FORMAT)
        .to_string();
    write(destination, "timestamp", timestamp.as_bytes())
        .context(with_loc!("Writing the timestamp file"))?;

    let epoch = version.time.timestamp();
    write(destination, "epoch", epoch.to_string().as_bytes())
        .context(with_loc!("Writing the epoch file"))?;

    Ok(VersionResponse {
        version,
        metadata: vec![
            MetadataField::new("time", timestamp),
            MetadataField::new("epoch", epoch),
        ],
    })
}

/// Atomically replaces `directory/filename` with `data`.
fn write(directory: &Path, filename: &str, data: &[u8]) -> anyhow::Result<()> {
    let mut file = tempfile::NamedTempFile::new_in(directory)
        .context(with_loc!("Creating a temporary file in the destination directory"))?;
    file.write_all(data)
        .context(with_loc!("Writing data into a temporary file"))?;

    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = file
            .as_file()
            .metadata()
            .context(with_loc!("Getting metadata of the temporary file"))?
            .permissions();
        perms.set_mode(0o644);
        file.as_file()
            .set_permissions(perms)
            .context(with_loc!("Setting permissions for the temporary file"))?;
    }

    file.persist(directory.join(filename))
        .context(with_loc!("Renaming temporary file to the desired filename"))?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use slog::o;

    fn fetch(request: &str, now: DateTime<Utc>, destination: &Path) -> VersionResponse {
        let logger = Logger::root(slog::Discard, o!());
        let request: InRequest = serde_json::from_str(request).unwrap();
        run(&logger, &request, now, destination).unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2018, 1, 3, 16, 58, 0).unwrap()
    }

    #[test]
    fn writes_the_requested_version() {
        let dir = tempfile::tempdir().unwrap();
        let request = r#"{
            "source": { "interval": "1h" },
            "version": { "time": "2018-01-03T11:58:00.5-05:00" }
        }"#;
        let response = fetch(request, now(), dir.path());

        assert_eq!(
            response.version.time.to_rfc3339(),
            "2018-01-03T11:58:00.500-05:00"
        );
        assert_eq!(
            fs::read_to_string(dir.path().join("timestamp")).unwrap(),
            "2018-01-03 16:58:00.500 +0000 UTC"
        );
        assert_eq!(
            fs::read_to_string(dir.path().join("epoch")).unwrap(),
            "1514998680"
        );
        assert_eq!(
            response.metadata,
            vec![
                MetadataField::new("time", "2018-01-03 16:58:00.500 +0000 UTC"),
                MetadataField::new("epoch", "1514998680"),
            ]
        );

        let input: serde_json::Value =
            serde_json::from_slice(&fs::read(dir.path().join("input")).unwrap()).unwrap();
        assert_eq!(input["source"]["interval"], "1h");
    }

    #[test]
    fn timestamp_is_in_the_location() {
        let dir = tempfile::tempdir().unwrap();
        let request = r#"{
            "source": { "location": "America/New_York" },
            "version": { "time": "2018-01-03T16:58:00Z" }
        }"#;
        fetch(request, now(), dir.path());
        assert_eq!(
            fs::read_to_string(dir.path().join("timestamp")).unwrap(),
            "2018-01-03 11:58:00 -0500 EST"
        );
    }

    #[test]
    fn no_version_uses_now() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("nested").join("time");
        let response = fetch(r#"{ "source": {} }"#, now(), &destination);
        assert_eq!(response.version.instant(), now());
        assert_eq!(
            fs::read_to_string(destination.join("epoch")).unwrap(),
            "1514998680"
        );
    }

    #[test]
    fn rewrites_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("epoch"), "stale").unwrap();
        fetch(r#"{ "source": {} }"#, now(), dir.path());
        assert_eq!(
            fs::read_to_string(dir.path().join("epoch")).unwrap(),
            "1514998680"
        );
    }
}
