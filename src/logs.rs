//! Logging setup for the command line tool.
//!
//! Everything goes to stderr; stdout only ever carries the verdict.

use std::env;
use std::io;

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is not set.
///
/// Debug output is enabled by `--verbose` or by the mere presence
/// of the `DEBUG` environment variable.
fn default_directive(verbose: bool, debug_env: bool) -> &'static str {
    if verbose || debug_env {
        "bgsense=debug"
    } else {
        "bgsense=warn"
    }
}

/// Install the stderr subscriber.
pub fn init(verbose: bool) {
    let directive = default_directive(verbose, env::var_os("DEBUG").is_some());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}
