#![deny(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::ok_expect,
    clippy::indexing_slicing,
    clippy::panic,
    clippy::match_on_vec_items
)]

use anyhow::{anyhow, bail};
use chrono::Utc;
use slog::{debug, error, o, Logger};
use std::path::PathBuf;

mod check;
mod get;
mod logging_helpers;
mod models;
mod offset;
mod put;
mod schedule;
mod source;
mod time;
mod trigger;
mod window;

enum Args {
    Check,
    In { destination: PathBuf },
    Out { source: PathBuf },
}

fn parse_args() -> anyhow::Result<Args> {
    use lexopt::prelude::*;

    let mut parser = lexopt::Parser::from_env();
    let mut positional = vec![];
    // The CI runs the binary through symlinks named after the commands, e.g. /opt/resource/check.
    if let Some(name @ ("check" | "in" | "out")) = parser.bin_name() {
        positional.push(name.to_owned());
    }
    while let Some(arg) = parser.next()? {
        match arg {
            Value(value) => {
                // .into_string() returns Result<String, OsString> , and OsString can't be
                // converted to anyhow::Error. To fix this, we convert the error into String.
                let value = value
                    .into_string()
                    .map_err(|ostr| anyhow!("{}", ostr.to_string_lossy()))?;
                positional.push(value);
            }
            _ => return Err(arg.unexpected().into()),
        }
    }

    let mut positional = positional.into_iter();
    let args = match positional.next().as_deref() {
        Some("check") => Args::Check,
        Some("in") => match positional.next() {
            Some(destination) => Args::In {
                destination: destination.into(),
            },
            None => bail!("usage: in <destination>"),
        },
        Some("out") => match positional.next() {
            Some(source) => Args::Out {
                source: source.into(),
            },
            None => bail!("usage: out <source directory>"),
        },
        Some(other) => bail!("unknown command '{}', expected check, in or out", other),
        None => bail!("missing command: check, in or out"),
    };

    if let Some(extra) = positional.next() {
        bail!("unexpected argument '{}'", extra);
    }

    Ok(args)
}

fn main() -> anyhow::Result<()> {
    let logger = logging_helpers::stderr_logger();
    logged_main(logger.clone()).map_err(|err| {
        error!(logger, "{:?}", err);
        err
    })
}

fn logged_main(logger: Logger) -> anyhow::Result<()> {
    let args = parse_args()?;
    let now = Utc::now();
    let identity = offset::Identity::from_env();
    match args {
        Args::Check => check::main(logger.new(o!("command" => "check")), now, &identity),
        Args::In { destination } => get::main(logger.new(o!("command" => "in")), now, &destination),
        Args::Out { source } => {
            let logger = logger.new(o!("command" => "out"));
            debug!(logger, "Ignoring the contents of {}", source.display());
            put::main(logger, now, &identity)
        }
    }
}
