//! Tracing setup for the `recall` binary.
//!
//! The library only emits events. `debug!` carries per-card detail, `info!`
//! marks deck and session milestones, and `warn!` reports recoverable
//! trouble such as a stale deck file or a skipped journal line. Nothing is
//! printed until a binary installs a subscriber through this module.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the subscriber used by a normal `recall` run.
///
/// Only warnings reach stderr, so prompts and listings on stdout stay
/// readable. `RUST_LOG` overrides the level.
pub fn init() {
    init_with_level("warn")
}

/// Install the subscriber with a chosen default level.
///
/// `recall -v` calls this with `"debug"` to trace each deck load and
/// save. `RUST_LOG` still takes precedence when set.
pub fn init_with_level(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact().with_target(false).with_writer(std::io::stderr))
        .init();
}

/// Route library events into the test harness output, at debug level
#[cfg(test)]
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(EnvFilter::new("debug"))
        .try_init();
}
