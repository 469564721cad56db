//! Logging setup.

use tracing_subscriber::EnvFilter;

/// Initialize the tracing subscriber. `RUST_LOG` wins when set;
/// otherwise the level is `debug` or `info` depending on `debug`.
/// Calling this more than once is harmless.
pub fn init_logging(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
