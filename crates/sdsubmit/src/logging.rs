//! Log output for `sdsub`.
//!
//! Diagnostics go to stderr so stdout stays clean for `--json` output and
//! the verification preview.

use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// How much the binary reports, chosen with `-q`, `-v` and `-vv`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// Errors only; cancellations and failed entries still show.
    Quiet,
    /// Scan summaries and every submitted entry.
    #[default]
    Normal,
    /// Lock acquisition, queue ids and skipped folders.
    Verbose,
    /// Lock polling and everything else.
    Trace,
}

impl Verbosity {
    /// The most detailed level shown.
    #[must_use]
    pub fn to_level_filter(&self) -> Level {
        match self {
            Self::Quiet => Level::ERROR,
            Self::Normal => Level::INFO,
            Self::Verbose => Level::DEBUG,
            Self::Trace => Level::TRACE,
        }
    }

    fn directive(self) -> String {
        format!("sdsubmit={}", self.to_level_filter())
    }
}

/// Install the stderr subscriber.
///
/// `RUST_LOG`, when set, replaces the verbosity-derived filter. Calling this
/// more than once keeps the first subscriber.
pub fn init_logging(verbosity: Verbosity) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(verbosity.directive()));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .try_init();
}

/// Route `warn` and above into the test harness output.
#[cfg(test)]
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("warn")
        .with_test_writer()
        .try_init();
}
