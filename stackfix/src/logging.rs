//! Diagnostic tracing on stderr.
//!
//! User-facing output (proposed fixes, run summaries) is printed directly and
//! never goes through this layer.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Env var that turns on debug output for this crate only.
pub const DEBUG_ENV: &str = "STACKFIX_DEBUG";

/// Install the global subscriber.
///
/// `STACKFIX_DEBUG=1` wins and selects `stackfix=debug`; otherwise `RUST_LOG`
/// is honored, defaulting to `warn`. Output: stderr, compact format.
///
/// # Example
/// ```bash
/// STACKFIX_DEBUG=1 stackfix -- pytest -q
/// ```
pub fn init() {
    let debug = std::env::var(DEBUG_ENV).is_ok_and(|value| value == "1");
    tracing_subscriber::registry()
        .with(filter(debug))
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}

fn filter(debug: bool) -> EnvFilter {
    if debug {
        return EnvFilter::new("stackfix=debug");
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
}
