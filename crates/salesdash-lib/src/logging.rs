//! `tracing` subscriber setup for the binary.
//!
//! Library code only emits events; installing a subscriber is left to the host.

use tracing_subscriber::EnvFilter;

/// Level used when `RUST_LOG` is unset.
pub fn default_level(debug: bool) -> &'static str {
    if debug {
        "salesdash=debug,salesdash_lib=debug"
    } else {
        "warn"
    }
}

/// Install a compact stderr subscriber. `RUST_LOG` wins over `debug`.
///
/// Returns `false` if a global subscriber was already set.
#[must_use]
pub fn init_logging(debug: bool) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_level(debug))),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .try_init()
        .is_ok()
}
