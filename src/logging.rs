//! Tracing subscriber setup for the CLI.
//!
//! `RUST_LOG` wins over the configured level. Logs go to stderr so command
//! output on stdout stays clean.

use tracing_subscriber::EnvFilter;

/// Filter from `RUST_LOG` if set and valid, else from `level`, else `info`.
pub fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber. Calling it again is a no-op.
pub fn init(level: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(build_filter(level))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
