//! Diagnostic logging setup.
//!
//! `RUST_LOG` wins over the level passed in; logs go to stderr so the
//! console operator's prompts stay readable on stdout.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Install the global subscriber. Safe to call more than once; later calls
/// are no-ops.
pub fn init(level: &str) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr),
        )
        .try_init();
}
