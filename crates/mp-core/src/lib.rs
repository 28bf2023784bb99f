//! mp-core: configuration, logging and the one-shot query runner behind `mpq`.
//!
//! Exposed as a library for integration testing.

pub mod config;
pub mod query;

use tracing_subscriber::EnvFilter;

/// Install the stderr subscriber. `RUST_LOG` overrides the default filter.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("mp_backend=info,mp_core=info"));

    // A second initialisation (tests) is not an error worth surfacing.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init();
}
