//! Tracing setup.
//!
//! `RUST_LOG` controls the filter; without it everything from `info` up is
//! shown.

use tracing_subscriber::EnvFilter;

/// Install a global `fmt` subscriber. Calling it twice is harmless; the
/// second call keeps the first subscriber.
pub fn init_tracing() {
    init_tracing_with_default("info");
}

pub fn init_tracing_with_default(default_directive: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive)),
        )
        .with_target(false)
        .try_init();
}
