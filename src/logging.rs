//! Logging setup for the `csync` binary.
//!
//! Library code only emits `tracing` events. The binary installs a `fmt`
//! subscriber on **stderr** so stdout stays parseable. The filter comes from
//! `CSYNC_LOG` (e.g. `CSYNC_LOG=context_sync=debug`), defaulting to the
//! level passed in.

use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "CSYNC_LOG";

/// Install the global subscriber. Safe to call more than once; later calls
/// are no-ops.
pub fn init(default_level: &str) {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
