//! Subscriber setup for binaries and tests.
//!
//! The filter comes from `RUST_LOG` and falls back to `info`, e.g.
//! `RUST_LOG=flowtwin_core=debug` to see run, seek and mutation logs, or
//! `trace` for one line per tick.

use tracing_subscriber::{EnvFilter, fmt};

/// Install the global subscriber. Calling it twice is a no-op.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_line_number(true)
        .try_init();
}

/// Debug-level subscriber writing through the test harness.
pub fn init_test() {
    let _ = fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}
