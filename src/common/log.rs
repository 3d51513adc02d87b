//! Logging helpers
//!
//! Thin wrapper around `env_logger` so every binary and test initializes
//! logging the same way.

/// Initialize the logging system
///
/// `RUST_LOG` takes precedence over `level` when it is set.
///
/// # Parameters
///
/// * `level` - Log level (error, warn, info, debug, trace)
pub fn init_logger(level: &str) {
    let env = env_logger::Env::default()
        .filter_or("RUST_LOG", level);

    // A second initialization (tests) is harmless
    let _ = env_logger::Builder::from_env(env)
        .format_timestamp_millis()
        .try_init();
}

/// Resolve the effective log level from the configured level and the debug flag
pub fn effective_level(level: &str, debug: bool) -> &str {
    if debug {
        "debug"
    } else {
        level
    }
}
