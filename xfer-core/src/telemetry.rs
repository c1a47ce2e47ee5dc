//! Logging setup.
//!
//! Trimmed relative to larger sibling projects in this tree: those carry a
//! custom non-blocking JSON writer sized for very high log volume. A file
//! transfer session logs a handful of lines per transfer, so a plain
//! `fmt` layer over `EnvFilter` is all the volume here justifies.

use std::time::Instant;

use once_cell::sync::Lazy;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

pub static APPLICATION_START_TIME: Lazy<Instant> = Lazy::new(Instant::now);

/// Guard returned by [`setup_logging`]. Dropping it has no effect today --
/// it exists so call sites read the same way regardless of whether the
/// underlying layer ever grows a flush-on-drop writer.
#[must_use]
pub struct LoggingGuard;

/// Initializes the global `tracing` subscriber from `RUST_LOG`
/// (`tracing_subscriber::EnvFilter::from_default_env`), defaulting to `info`
/// when unset. Safe to call once per process; a second call is a no-op.
pub fn setup_logging() -> LoggingGuard {
    Lazy::force(&APPLICATION_START_TIME);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true));
    if registry.try_init().is_err() {
        // A subscriber is already installed (e.g. under `cargo test`); keep going.
    }
    LoggingGuard
}
