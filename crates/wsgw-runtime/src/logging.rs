//! Logging setup for gateway binaries and tests.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initializes logging with the default `info` filter.
///
/// # Panics
///
/// Panics if a subscriber has already been set.
pub fn init() {
    init_with_filter("info");
}

/// Initializes logging with a custom filter string, e.g.
/// `"wsgw_runtime=debug,wsgw_core=trace"`. `RUST_LOG` takes precedence
/// when set.
///
/// # Panics
///
/// Panics if a subscriber has already been set.
pub fn init_with_filter(filter: &str) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(env_filter)
        .init();
}

/// Like [`init`], but returns an error instead of panicking when a
/// subscriber is already installed. Used by tests.
pub fn try_init() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(env_filter)
        .try_init()
        .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>)
}
