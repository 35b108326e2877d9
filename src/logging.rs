//! Tracing subscriber setup.
//!
//! Logs go to stderr so stdout stays reserved for command output.

use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber.
///
/// `RUST_LOG` wins when set; otherwise the level is `warn`, or `info`
/// with `--verbose`. Calling twice is a no-op.
pub fn init_tracing(verbose: bool) {
    let default_level = if verbose { "info" } else { "warn" };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(verbose)
        .try_init();
}
