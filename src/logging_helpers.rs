//! Logger construction, and macros to augment the logs.
use slog::{o, Drain, Logger};

/// Turns a string literal into a string prefixed with the caller's file path and line number.
///
/// This is meant to be used in conjunction with `anyhow::Context::context`:
///
/// ```rust,no_run
/// request.context(with_loc!("Reading the request"))?;
/// ```
#[macro_export]
macro_rules! with_loc {
    ($msg: literal) => {
        format!("[{}:{}] {}", file!(), line!(), $msg)
    };
}

/// A logger that writes plain-text records to stderr.
///
/// stdout carries the JSON response to the CI, so logs must never go there.
pub fn stderr_logger() -> Logger {
    let decorator = slog_term::PlainSyncDecorator::new(std::io::stderr());
    let drain = slog_term::FullFormat::new(decorator).build().ignore_res();
    Logger::root(drain, o!())
}
