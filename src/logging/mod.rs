//! Logging for keyhold
//!
//! Human-readable diagnostics go to stderr through tracing-subscriber;
//! the optional JSONL audit log is handled by [`JsonlWriter`].

pub mod jsonl;

pub use jsonl::{Decision, JsonlWriter, LogEvent, LogEventKind};

use tracing::Level;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

/// Verbosity selected on the command line
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Verbosity {
    /// Warnings and errors only
    Quiet,
    #[default]
    Normal,
    /// Debug output
    Verbose,
}

impl Verbosity {
    pub fn from_flags(verbose: bool, quiet: bool) -> Self {
        if quiet {
            Verbosity::Quiet
        } else if verbose {
            Verbosity::Verbose
        } else {
            Verbosity::Normal
        }
    }

    fn min_level(&self) -> Level {
        match self {
            Verbosity::Quiet => Level::WARN,
            Verbosity::Normal => Level::INFO,
            Verbosity::Verbose => Level::DEBUG,
        }
    }
}

/// Install the global stderr subscriber.
///
/// `RUST_LOG` overrides the level picked from `verbosity`. Calling this
/// twice is harmless; the second call is ignored.
pub fn init(verbosity: Verbosity) {
    let env_filter = EnvFilter::builder()
        .with_default_directive(verbosity.min_level().into())
        .from_env_lossy();

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false);

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_from_flags() {
        assert_eq!(Verbosity::from_flags(false, false), Verbosity::Normal);
        assert_eq!(Verbosity::from_flags(true, false), Verbosity::Verbose);
        // quiet wins when both are given
        assert_eq!(Verbosity::from_flags(true, true), Verbosity::Quiet);
    }

    #[test]
    fn test_min_level() {
        assert_eq!(Verbosity::Quiet.min_level(), Level::WARN);
        assert_eq!(Verbosity::Normal.min_level(), Level::INFO);
        assert_eq!(Verbosity::Verbose.min_level(), Level::DEBUG);
    }

    #[test]
    fn test_init_twice() {
        init(Verbosity::Normal);
        init(Verbosity::Verbose);
    }
}
