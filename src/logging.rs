//! Diagnostic tracing, separate from the agent's stdout transcript.
//!
//! Reads `RUST_LOG` (default `warn`) and writes compact lines to stderr, so
//! `RUST_LOG=tinker=debug` shows rounds and provider calls without mixing
//! into the answer printed on stdout.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
